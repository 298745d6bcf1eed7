//! # indextts-api
//!
//! OpenAI-compatible `POST /v1/audio/speech` server in front of an
//! [IndexTTS](https://github.com/index-tts/index-tts) model.
//!
//! ## Quick start
//!
//! ```text
//! indextts-server --model-dir checkpoints/indextts-1.5 --api-key sk-local
//!
//! curl http://localhost:5000/v1/audio/speech \
//!   -H "Authorization: Bearer sk-local" \
//!   -H "Content-Type: application/json" \
//!   -d '{"model":"tts-1","input":"Hello!","voice":"alloy"}' -o hello.wav
//! ```
//!
//! ## Request lifecycle
//! 1. **Availability**: a model that failed to load yields 503 on every request.
//! 2. **Auth**: `Authorization: Bearer <key>`, compared in constant time.
//! 3. **Validation**: JSON body, `model`, `input`, `voice` (in that order).
//! 4. **Reference voice**: every voice maps to one shared recording.
//! 5. **Synthesis**: blocking call into the model worker, writing a
//!    uniquely named temporary WAV.
//! 6. **Streaming**: the WAV goes out in 8 KiB chunks and is deleted once,
//!    whether the client reads it all or goes away mid-stream.
//!
//! Output is always `audio/wav`; `response_format` is accepted but not honoured.
//!
//! ## Model worker
//! The model runs in a child process speaking line-delimited JSON; see
//! [`backend`] for the protocol. Anything implementing
//! [`backend::SpeechBackend`] can stand in for it.

pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod health;
pub mod params;
pub mod request;
pub mod server;
pub mod stream;
pub mod synth;
pub mod voices;

// Checkpoint download from HuggingFace Hub is desktop-only: mobile targets
// never host the model.
#[cfg(all(feature = "download", not(any(target_os = "ios", target_os = "android"))))]
pub mod download;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use backend::SpeechBackend;
pub use config::ServerConfig;
pub use error::{ApiError, ErrorKind};
pub use server::{router, run, AppState};
