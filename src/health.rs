//! Startup health check and the process-lifetime service state.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;

use crate::{backend::SpeechBackend, config::ServerConfig};

/// Whether the model is usable. Built once at startup and never changes.
#[derive(Clone)]
pub enum ServiceState {
    Ready(Arc<dyn SpeechBackend>),
    Unavailable { reason: String },
}

impl ServiceState {
    pub fn backend(&self) -> Option<&Arc<dyn SpeechBackend>> {
        match self {
            Self::Ready(b) => Some(b),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn model_version(&self) -> Option<&str> {
        self.backend().and_then(|b| b.model_version())
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(b) => f
                .debug_struct("Ready")
                .field("model_version", &b.model_version())
                .finish(),
            Self::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

/// Filesystem locations the startup check looks at.
#[derive(Debug, Clone)]
pub struct StartupPaths {
    pub model_dir: PathBuf,
    pub config_path: PathBuf,
    pub voices_dir: PathBuf,
    pub reference_audio: PathBuf,
}

impl From<&ServerConfig> for StartupPaths {
    fn from(c: &ServerConfig) -> Self {
        Self {
            model_dir: c.model_dir.clone(),
            config_path: c.config_path(),
            voices_dir: c.voices_dir.clone(),
            reference_audio: c.reference_audio_path(),
        }
    }
}

/// Outcome of [`check_startup`].
#[derive(Debug)]
pub struct StartupReport {
    pub service: ServiceState,
    pub reference_present: bool,
}

impl StartupReport {
    /// Everything needed to serve a request is in place.
    pub fn is_healthy(&self) -> bool {
        self.service.is_ready() && self.reference_present
    }
}

/// Verify the model and reference audio, loading the model with `load`.
///
/// Never fails: problems are logged and reflected in the report, so the
/// server can still answer with structured 503s.
pub fn check_startup<F>(paths: &StartupPaths, load: F) -> StartupReport
where
    F: FnOnce() -> Result<Arc<dyn SpeechBackend>>,
{
    ensure_voices_dir(&paths.voices_dir);

    let service = match model_files_problem(paths) {
        Some(reason) => {
            tracing::error!("{reason}");
            ServiceState::Unavailable { reason }
        }
        None => {
            tracing::info!(model_dir = %paths.model_dir.display(), "initialising IndexTTS");
            match load() {
                Ok(backend) => {
                    tracing::info!(
                        model_version = backend.model_version().unwrap_or("N/A"),
                        "IndexTTS initialised"
                    );
                    ServiceState::Ready(backend)
                }
                Err(e) => {
                    let reason = format!("IndexTTS initialisation failed: {e:#}");
                    tracing::error!("{reason}");
                    ServiceState::Unavailable { reason }
                }
            }
        }
    };

    if !service.is_ready() {
        tracing::error!("TTS service failed to initialise; every request will get 503");
    }

    let reference_present = paths.reference_audio.is_file();
    if reference_present {
        tracing::info!(path = %paths.reference_audio.display(), "reference audio found");
    } else {
        tracing::error!(
            path = %paths.reference_audio.display(),
            voices_dir = %paths.voices_dir.display(),
            "reference audio not found; place it in the voices directory"
        );
    }

    StartupReport { service, reference_present }
}

fn model_files_problem(paths: &StartupPaths) -> Option<String> {
    if !paths.model_dir.is_dir() {
        return Some(format!(
            "Model directory '{}' does not exist",
            paths.model_dir.display()
        ));
    }
    if !paths.config_path.is_file() {
        return Some(format!(
            "Model config file '{}' does not exist",
            paths.config_path.display()
        ));
    }
    None
}

fn ensure_voices_dir(dir: &Path) {
    if dir.is_dir() {
        return;
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => tracing::info!(path = %dir.display(), "created reference voices directory"),
        Err(e) => tracing::error!(
            path = %dir.display(),
            error = %e,
            "could not create voices directory; create it manually"
        ),
    }
}
