//! HTTP surface: router, handlers and the serve loop.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    backend::{IndexTtsWorker, SpeechBackend, WorkerCommand},
    config::ServerConfig,
    error::ApiError,
    health::{check_startup, ServiceState, StartupPaths},
    request::{authenticate, SpeechRequest, SUPPORTED_MODELS, SUPPORTED_VOICES},
    stream::ArtifactStream,
    synth::SynthesisInvoker,
    voices::VoiceResolver,
};

/// Largest request body read by `/v1/audio/speech`.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared per-process state handed to every request.
#[derive(Debug)]
pub struct AppState {
    pub service: ServiceState,
    pub api_key: String,
    pub voices: VoiceResolver,
    pub invoker: SynthesisInvoker,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/v1/audio/speech",
            post(create_speech).layer(DefaultBodyLimit::disable()),
        )
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn create_speech(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let backend = state.service.backend().cloned().ok_or(ApiError::ServiceUnavailable)?;
    authenticate(&headers, &state.api_key)?;

    // Read only after availability and auth have been checked.
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::UnreadableBody(e.to_string()))?;
    let request = SpeechRequest::from_body(&body)?;

    tracing::info!(
        model = request.model.as_str(),
        voice = %request.voice,
        response_format = %request.response_format,
        chars = request.input.chars().count(),
        "speech request accepted"
    );

    let reference = state.voices.resolve(request.voice)?;

    // No yield point during inference; keep it off the async workers.
    let invoker = state.invoker.clone();
    let audio = tokio::task::spawn_blocking(move || {
        invoker.invoke(Some(&backend), &request.input, &reference)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow!("synthesis task failed: {e}")))??;

    let mime_type = audio.mime_type;
    let stream = ArtifactStream::open(audio.artifact)
        .await
        .context("Cannot open generated audio for streaming")
        .map_err(ApiError::Internal)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .body(stream.into_body())
        .map_err(|e| ApiError::Internal(e.into()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model_version: Option<String>,
    reference_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.service.is_ready();
    let body = HealthResponse {
        status: if ready { "ok" } else { "unavailable" },
        version: env!("CARGO_PKG_VERSION"),
        model_version: state.service.model_version().map(str::to_owned),
        reference_audio: state.voices.reference().is_file(),
        reason: state.service.reason().map(str::to_owned),
    };
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

// ─────────────────────────────────────────────────────────────────────────────
// Startup
// ─────────────────────────────────────────────────────────────────────────────

/// Run the startup check, then serve until Ctrl-C / SIGTERM.
pub async fn run(config: ServerConfig) -> Result<()> {
    tracing::info!("starting IndexTTS API server");

    fetch_missing_checkpoints(&config).await?;

    let paths = StartupPaths::from(&config);
    let worker = WorkerCommand {
        program: config.worker_program.clone(),
        args: config.worker_args.clone(),
        model_dir: config.model_dir.clone(),
        config_path: config.config_path(),
    };
    let report = tokio::task::spawn_blocking(move || {
        check_startup(&paths, || {
            let w = IndexTtsWorker::spawn(&worker)?;
            Ok(Arc::new(w) as Arc<dyn SpeechBackend>)
        })
    })
    .await
    .context("startup check task failed")?;

    if !report.is_healthy() {
        tracing::error!(
            model_dir = %config.model_dir.display(),
            reference_audio = %config.reference_audio_path().display(),
            "essential dependencies are missing"
        );
        if config.require_ready {
            bail!("startup check failed and --require-ready is set");
        }
    }

    let state = Arc::new(AppState {
        service: report.service,
        api_key: config.api_key.clone(),
        voices: VoiceResolver::shared(config.reference_audio_path()),
        invoker: SynthesisInvoker::new(config.generation_params()),
    });

    tracing::info!(path = %config.reference_audio_path().display(), "all voices use this reference audio");
    tracing::info!("supported models: {:?}", SUPPORTED_MODELS);
    tracing::info!("supported voices: {:?} (all share one reference)", SUPPORTED_VOICES);
    tracing::info!("output is always WAV; response_format is logged but not honoured");

    serve(&config, state).await
}

#[cfg(all(feature = "download", not(any(target_os = "ios", target_os = "android"))))]
async fn fetch_missing_checkpoints(config: &ServerConfig) -> Result<()> {
    let Some(repo) = config.download_from.clone() else {
        return Ok(());
    };
    if config.config_path().is_file() {
        return Ok(());
    }
    let model_dir = config.model_dir.clone();
    tokio::task::spawn_blocking(move || crate::download::fetch_checkpoints(&repo, &model_dir))
        .await
        .context("checkpoint download task failed")?
}

#[cfg(not(all(feature = "download", not(any(target_os = "ios", target_os = "android")))))]
async fn fetch_missing_checkpoints(config: &ServerConfig) -> Result<()> {
    if config.download_from.is_some() {
        tracing::warn!("--download-from ignored: built without the `download` feature");
    }
    Ok(())
}

/// Bind and serve `state` until a shutdown signal arrives.
pub async fn serve(config: &ServerConfig, state: Arc<AppState>) -> Result<()> {
    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
