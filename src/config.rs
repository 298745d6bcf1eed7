//! Server configuration: command-line flags with environment fallbacks.
//!
//! Every flag can also be supplied through an `INDEXTTS_*` environment
//! variable so the server can be configured from a container manifest without a
//! wrapper script.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser};

use crate::params::GenerationParams;

/// Key accepted when none is configured. Intended for local testing only.
pub const DEFAULT_API_KEY: &str = "sk-test-api-key-1234567890";

/// Command-line configuration for `indextts-server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "indextts-server")]
#[command(about = "OpenAI-compatible /v1/audio/speech endpoint backed by IndexTTS")]
pub struct ServerConfig {
    /// Interface to bind.
    #[arg(long, env = "INDEXTTS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "INDEXTTS_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Bearer token clients must present.
    #[arg(long, env = "INDEXTTS_API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    pub api_key: String,

    /// IndexTTS checkpoint directory.
    #[arg(long, env = "INDEXTTS_MODEL_DIR", default_value = "checkpoints/indextts-1.5")]
    pub model_dir: PathBuf,

    /// Model config file. Defaults to `<model-dir>/config.yaml`.
    #[arg(long, env = "INDEXTTS_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Directory holding the reference voice; created on start if absent.
    #[arg(long, env = "INDEXTTS_VOICES_DIR", default_value = "voices")]
    pub voices_dir: PathBuf,

    /// Reference audio file name inside the voices directory.
    #[arg(long, env = "INDEXTTS_REFERENCE_AUDIO", default_value = "audio.wav")]
    pub reference_audio: String,

    /// Program that hosts the IndexTTS model worker.
    #[arg(long, env = "INDEXTTS_WORKER_PROGRAM", default_value = "python3")]
    pub worker_program: String,

    /// Arguments passed to the worker program, before `--model-dir`/`--config`.
    #[arg(
        long = "worker-arg",
        env = "INDEXTTS_WORKER_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true,
        default_values_t = [String::from("-m"), String::from("indextts_worker")]
    )]
    pub worker_args: Vec<String>,

    /// Exit instead of serving 503s when the startup check fails.
    #[arg(long, env = "INDEXTTS_REQUIRE_READY")]
    pub require_ready: bool,

    /// HuggingFace repository to fetch checkpoints from when `config.yaml`
    /// is missing (e.g. `IndexTeam/IndexTTS-1.5`).
    #[arg(long, env = "INDEXTTS_DOWNLOAD_FROM")]
    pub download_from: Option<String>,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

/// Generation knobs forwarded to every synthesis call.
#[derive(Debug, Clone, Args)]
pub struct GenerationArgs {
    #[arg(long, env = "INDEXTTS_DO_SAMPLE", default_value_t = true, action = clap::ArgAction::Set)]
    pub do_sample: bool,
    #[arg(long, env = "INDEXTTS_TEMPERATURE", default_value_t = 1.0)]
    pub temperature: f32,
    #[arg(long, env = "INDEXTTS_TOP_P", default_value_t = 0.8)]
    pub top_p: f32,
    /// `0` leaves top-k unset.
    #[arg(long, env = "INDEXTTS_TOP_K", default_value_t = 30)]
    pub top_k: u32,
    #[arg(long, env = "INDEXTTS_NUM_BEAMS", default_value_t = 3)]
    pub num_beams: u32,
    #[arg(long, env = "INDEXTTS_REPETITION_PENALTY", default_value_t = 10.0)]
    pub repetition_penalty: f32,
    #[arg(long, env = "INDEXTTS_LENGTH_PENALTY", default_value_t = 0.0, allow_negative_numbers = true)]
    pub length_penalty: f32,
    #[arg(long, env = "INDEXTTS_MAX_MEL_TOKENS", default_value_t = 600)]
    pub max_mel_tokens: u32,
    #[arg(long, env = "INDEXTTS_MAX_TEXT_TOKENS_PER_SENTENCE", default_value_t = 120)]
    pub max_text_tokens_per_sentence: u32,
    #[arg(long, env = "INDEXTTS_SENTENCES_BUCKET_MAX_SIZE", default_value_t = 4)]
    pub sentences_bucket_max_size: u32,
    /// Ask the worker for per-call progress output on its stderr.
    #[arg(long, env = "INDEXTTS_VERBOSE", default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

impl From<&GenerationArgs> for GenerationParams {
    fn from(a: &GenerationArgs) -> Self {
        Self {
            do_sample: a.do_sample,
            temperature: a.temperature,
            top_p: a.top_p,
            top_k: a.top_k,
            num_beams: a.num_beams,
            repetition_penalty: a.repetition_penalty,
            length_penalty: a.length_penalty,
            max_mel_tokens: a.max_mel_tokens,
            max_text_tokens_per_sentence: a.max_text_tokens_per_sentence,
            sentences_bucket_max_size: a.sentences_bucket_max_size,
            verbose: a.verbose,
        }
    }
}

impl ServerConfig {
    /// Resolved path to the model config file.
    pub fn config_path(&self) -> PathBuf {
        self.config_file
            .clone()
            .unwrap_or_else(|| self.model_dir.join("config.yaml"))
    }

    /// Full path of the shared reference audio file.
    pub fn reference_audio_path(&self) -> PathBuf {
        self.voices_dir.join(&self.reference_audio)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::from(&self.generation)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}
