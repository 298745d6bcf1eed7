//! IndexTTS model worker, the external synthesis collaborator.
//!
//! The model itself lives in a separate, long-lived worker process that
//! loads the checkpoints once and then serves jobs over a line-delimited JSON
//! protocol on its stdin/stdout:
//!
//! | Direction       | Line                                                        |
//! |-----------------|-------------------------------------------------------------|
//! | worker → server | `{"event":"ready","model_version":"1.5"}` once, after load  |
//! | worker → server | `{"event":"error","message":"..."}` if loading failed       |
//! | server → worker | one [`InferenceJob`] per synthesis                          |
//! | worker → server | `{"ok":true}` or `{"ok":false,"error":"..."}` per job       |
//!
//! Any stdout line that does not parse as one of the above (model progress
//! output, warnings) is logged at debug level and skipped.

use std::{
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::Mutex,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::params::GenerationKwargs;

/// One synthesis call as the worker receives it.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceJob<'a> {
    pub audio_prompt: &'a Path,
    pub text: &'a str,
    pub output_path: &'a Path,
    pub verbose: bool,
    pub max_text_tokens_per_sentence: u32,
    pub sentences_bucket_max_size: u32,
    #[serde(flatten)]
    pub generation: GenerationKwargs,
}

/// Anything that can turn an [`InferenceJob`] into a WAV file on disk.
///
/// Calls block for the full duration of inference.
pub trait SpeechBackend: Send + Sync {
    /// Write synthesized speech to `job.output_path`.
    fn infer(&self, job: &InferenceJob<'_>) -> Result<()>;

    /// Model version reported at load time, if any.
    fn model_version(&self) -> Option<&str> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker process
// ─────────────────────────────────────────────────────────────────────────────

/// How to launch the worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub model_dir: PathBuf,
    pub config_path: PathBuf,
}

impl WorkerCommand {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--model-dir")
            .arg(&self.model_dir)
            .arg("--config")
            .arg(&self.config_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Handshake {
    Ready {
        #[serde(default)]
        model_version: Option<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct JobReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    /// Read lines until one deserializes as `T`.
    fn read_message<T: for<'de> Deserialize<'de>>(&mut self) -> Result<T> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .stdout
                .read_line(&mut line)
                .context("Failed to read from model worker")?;
            if n == 0 {
                let status = self.child.try_wait().ok().flatten();
                bail!("model worker closed its output (exit status: {:?})", status);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(trimmed) {
                Ok(msg) => return Ok(msg),
                Err(_) => tracing::debug!(target: "indextts_api::worker", "{trimmed}"),
            }
        }
    }

    fn send(&mut self, job: &InferenceJob<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(job).context("Failed to encode inference job")?;
        line.push(b'\n');
        self.stdin.write_all(&line).context("Failed to write to model worker")?;
        self.stdin.flush().context("Failed to flush model worker input")
    }
}

impl WorkerProcess {
    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// A loaded IndexTTS model hosted in a worker process.
///
/// Jobs are serialised: one synthesis at a time per worker.
pub struct IndexTtsWorker {
    process: Mutex<WorkerProcess>,
    model_version: Option<String>,
}

impl IndexTtsWorker {
    /// Start the worker and wait until it reports the model loaded.
    pub fn spawn(worker_cmd: &WorkerCommand) -> Result<Self> {
        tracing::info!(
            program = %worker_cmd.program,
            model_dir = %worker_cmd.model_dir.display(),
            "starting IndexTTS model worker"
        );
        let mut child = worker_cmd
            .command()
            .spawn()
            .with_context(|| format!("Cannot start model worker '{}'", worker_cmd.program))?;

        let stdin = child.stdin.take().context("worker stdin not captured")?;
        let stdout = child.stdout.take().context("worker stdout not captured")?;
        let mut process = WorkerProcess { child, stdin, stdout: BufReader::new(stdout) };

        let model_version = match process.read_message::<Handshake>()? {
            Handshake::Ready { model_version } => model_version,
            Handshake::Error { message } => bail!("IndexTTS failed to load: {message}"),
        };

        Ok(Self { process: Mutex::new(process), model_version })
    }
}

impl SpeechBackend for IndexTtsWorker {
    fn infer(&self, job: &InferenceJob<'_>) -> Result<()> {
        let mut process = match self.process.lock() {
            Ok(p) => p,
            Err(poisoned) => {
                // A job may have been sent without its reply being read; the
                // line protocol can no longer be trusted.
                let mut p = poisoned.into_inner();
                p.kill();
                bail!("model worker is out of sync after an interrupted job");
            }
        };
        process.send(job)?;
        let reply: JobReply = process.read_message()?;
        if reply.ok {
            Ok(())
        } else {
            Err(anyhow!(reply.error.unwrap_or_else(|| "model worker reported failure".into())))
        }
    }

    fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GenerationParams;

    #[test]
    fn test_job_wire_format() {
        let p = GenerationParams::default();
        let job = InferenceJob {
            audio_prompt: Path::new("voices/audio.wav"),
            text: "hello",
            output_path: Path::new("/tmp/indextts-x.wav"),
            verbose: p.verbose,
            max_text_tokens_per_sentence: p.max_text_tokens_per_sentence,
            sentences_bucket_max_size: p.sentences_bucket_max_size,
            generation: p.effective(),
        };
        let v = serde_json::to_value(&job).unwrap();
        assert_eq!(v["audio_prompt"], "voices/audio.wav");
        assert_eq!(v["output_path"], "/tmp/indextts-x.wav");
        assert_eq!(v["max_text_tokens_per_sentence"], 120);
        // generation kwargs are flattened into the job object
        assert_eq!(v["num_beams"], 3);
        assert_eq!(v["do_sample"], false);
    }

    #[test]
    fn test_handshake_parse() {
        let h: Handshake = serde_json::from_str(r#"{"event":"ready","model_version":"1.5"}"#).unwrap();
        assert!(matches!(h, Handshake::Ready { model_version: Some(v) } if v == "1.5"));

        let h: Handshake = serde_json::from_str(r#"{"event":"error","message":"no gpu"}"#).unwrap();
        assert!(matches!(h, Handshake::Error { message } if message == "no gpu"));
    }

    #[test]
    fn test_missing_program() {
        let worker_cmd = WorkerCommand {
            program: "/nonexistent/indextts-worker".into(),
            args: vec![],
            model_dir: "checkpoints".into(),
            config_path: "checkpoints/config.yaml".into(),
        };
        let err = IndexTtsWorker::spawn(&worker_cmd).err().unwrap();
        assert!(format!("{err:#}").contains("Cannot start model worker"));
    }

    #[cfg(unix)]
    #[test]
    fn test_worker_protocol_over_shell() {
        // A stand-in worker: handshake, skip a noise line, then answer one job.
        let script = r#"echo 'loading weights...'; echo '{"event":"ready","model_version":"1.5"}'; read job; echo 'progress 100%'; echo '{"ok":false,"error":"text too long"}'"#;
        let worker_cmd = WorkerCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "worker".into()],
            model_dir: "m".into(),
            config_path: "m/config.yaml".into(),
        };
        let worker = IndexTtsWorker::spawn(&worker_cmd).unwrap();
        assert_eq!(worker.model_version(), Some("1.5"));

        let p = GenerationParams::default();
        let job = InferenceJob {
            audio_prompt: Path::new("a.wav"),
            text: "hi",
            output_path: Path::new("out.wav"),
            verbose: false,
            max_text_tokens_per_sentence: p.max_text_tokens_per_sentence,
            sentences_bucket_max_size: p.sentences_bucket_max_size,
            generation: p.effective(),
        };
        let err = worker.infer(&job).unwrap_err();
        assert_eq!(err.to_string(), "text too long");

        // The script has exited; the next job must fail rather than hang.
        assert!(worker.infer(&job).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupted_job_retires_worker() {
        let script = r#"echo '{"event":"ready"}'; while read job; do echo '{"ok":true}'; done"#;
        let worker_cmd = WorkerCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into(), "worker".into()],
            model_dir: "m".into(),
            config_path: "m/config.yaml".into(),
        };
        let worker = std::sync::Arc::new(IndexTtsWorker::spawn(&worker_cmd).unwrap());

        let p = GenerationParams::default();
        let job = InferenceJob {
            audio_prompt: Path::new("a.wav"),
            text: "hi",
            output_path: Path::new("out.wav"),
            verbose: false,
            max_text_tokens_per_sentence: p.max_text_tokens_per_sentence,
            sentences_bucket_max_size: p.sentences_bucket_max_size,
            generation: p.effective(),
        };
        worker.infer(&job).unwrap();

        // A panic while holding the worker leaves its reply stream unknown.
        let w = worker.clone();
        let joined = std::thread::spawn(move || {
            let _guard = w.process.lock().unwrap();
            panic!("interrupted between send and reply");
        })
        .join();
        assert!(joined.is_err());

        let err = worker.infer(&job).unwrap_err();
        assert!(err.to_string().contains("out of sync"), "{err}");
        assert!(worker.infer(&job).is_err());
    }
}
