//! `indextts-server`: OpenAI-compatible speech endpoint for IndexTTS.
//!
//! Usage:
//!   indextts-server --model-dir checkpoints/indextts-1.5 --port 5000
//!   INDEXTTS_API_KEY=sk-... indextts-server --require-ready
//!
//! Logging is controlled with `RUST_LOG` (default `indextts_api=info,tower_http=info`).

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use indextts_api::ServerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "indextts_api=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::parse();

    match indextts_api::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
