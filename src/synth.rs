//! Synthesis invoker: the only place a [`TempAudioArtifact`] is created.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{anyhow, Context};

use crate::{
    artifact::TempAudioArtifact,
    backend::{InferenceJob, SpeechBackend},
    error::SynthesisError,
    params::GenerationParams,
};

/// MIME type of everything the backend produces.
pub const OUTPUT_MIME: &str = "audio/wav";

/// Characters of input text echoed into logs.
const LOG_TEXT_CHARS: usize = 30;

/// Header facts read back from a generated file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f32,
}

/// A finished synthesis: the artifact plus what to label it as.
#[derive(Debug)]
pub struct GeneratedAudio {
    pub artifact: TempAudioArtifact,
    pub mime_type: &'static str,
    pub info: WavInfo,
}

/// Wraps backend calls with temp-file allocation, parameter normalisation
/// and cleanup on failure.
#[derive(Debug, Clone, Default)]
pub struct SynthesisInvoker {
    params: GenerationParams,
    temp_dir: Option<PathBuf>,
}

impl SynthesisInvoker {
    pub fn new(params: GenerationParams) -> Self {
        Self { params, temp_dir: None }
    }

    /// Put artifacts in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Synthesize `text` in the timbre of `reference`.
    ///
    /// Blocks for the whole inference. On any failure after the artifact was
    /// allocated, it is deleted before the error is returned.
    pub fn invoke(
        &self,
        backend: Option<&Arc<dyn SpeechBackend>>,
        text: &str,
        reference: &Path,
    ) -> Result<GeneratedAudio, SynthesisError> {
        let backend = backend.ok_or(SynthesisError::Unavailable)?;
        if !reference.exists() {
            return Err(SynthesisError::ReferenceNotFound(reference.to_path_buf()));
        }

        let mut artifact =
            TempAudioArtifact::allocate(self.temp_dir.as_deref()).map_err(SynthesisError::TempFile)?;

        let job = InferenceJob {
            audio_prompt: reference,
            text,
            output_path: artifact.path(),
            verbose: self.params.verbose,
            max_text_tokens_per_sentence: self.params.max_text_tokens_per_sentence,
            sentences_bucket_max_size: self.params.sentences_bucket_max_size,
            generation: self.params.effective(),
        };

        let preview: String = text.chars().take(LOG_TEXT_CHARS).collect();
        tracing::info!(
            audio_prompt = %reference.display(),
            text = %preview,
            output = %artifact.path().display(),
            "running inference"
        );
        tracing::debug!(?job, "inference parameters");

        let started = Instant::now();
        let result = backend
            .infer(&job)
            .and_then(|()| probe_wav(artifact.path()));

        match result {
            Ok(info) => {
                tracing::info!(
                    output = %artifact.path().display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    audio_secs = info.duration_secs,
                    sample_rate = info.sample_rate,
                    "audio generated"
                );
                Ok(GeneratedAudio { artifact, mime_type: OUTPUT_MIME, info })
            }
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "inference failed");
                artifact.delete();
                Err(SynthesisError::Failed(e))
            }
        }
    }
}

/// Read the WAV header the backend wrote.
fn probe_wav(path: &Path) -> anyhow::Result<WavInfo> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Generated file is not a readable WAV: {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(anyhow!("Generated WAV has a zero sample rate"));
    }
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_secs: reader.duration() as f32 / spec.sample_rate as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every job; writes a short tone or fails after a partial write.
    struct FakeBackend {
        fail: bool,
        seen: Mutex<Vec<(bool, PathBuf)>>,
    }

    impl FakeBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self { fail, seen: Mutex::new(Vec::new()) })
        }
    }

    impl SpeechBackend for FakeBackend {
        fn infer(&self, job: &InferenceJob<'_>) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((job.generation.do_sample, job.output_path.to_path_buf()));
            if self.fail {
                std::fs::write(job.output_path, b"RIFF partial")?;
                anyhow::bail!("decoder exploded");
            }
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 24_000,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut w = hound::WavWriter::create(job.output_path, spec)?;
            for i in 0..2_400 {
                w.write_sample(((i % 100) as i16 - 50) * 100)?;
            }
            w.finalize()?;
            Ok(())
        }
    }

    fn reference(dir: &Path) -> PathBuf {
        let p = dir.join("audio.wav");
        std::fs::write(&p, b"RIFF").unwrap();
        p
    }

    #[test]
    fn test_success_returns_wav_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeBackend::new(false);
        let backend: Arc<dyn SpeechBackend> = fake.clone();
        let inv = SynthesisInvoker::default().with_temp_dir(dir.path());

        let out = inv.invoke(Some(&backend), "hello", &reference(dir.path())).unwrap();
        assert_eq!(out.mime_type, "audio/wav");
        assert!(out.artifact.path().exists());
        assert_eq!(out.info.sample_rate, 24_000);
        assert!((out.info.duration_secs - 0.1).abs() < 1e-3);

        // default params use beam search, so sampling is off at the model call
        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].0);
        assert_eq!(seen[0].1, out.artifact.path());
    }

    #[test]
    fn test_failure_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeBackend::new(true);
        let backend: Arc<dyn SpeechBackend> = fake.clone();
        let inv = SynthesisInvoker::default().with_temp_dir(dir.path());

        let err = inv.invoke(Some(&backend), "hello", &reference(dir.path())).unwrap_err();
        assert!(matches!(err, SynthesisError::Failed(_)));
        assert!(err.to_string().contains("decoder exploded"));

        let out_path = fake.seen.lock().unwrap()[0].1.clone();
        assert!(!out_path.exists());
    }

    #[test]
    fn test_unavailable_and_missing_reference() {
        let dir = tempfile::tempdir().unwrap();
        let inv = SynthesisInvoker::default().with_temp_dir(dir.path());
        let err = inv.invoke(None, "hello", &reference(dir.path())).unwrap_err();
        assert!(matches!(err, SynthesisError::Unavailable));

        let backend: Arc<dyn SpeechBackend> = FakeBackend::new(false);
        let err = inv
            .invoke(Some(&backend), "hello", &dir.path().join("missing.wav"))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::ReferenceNotFound(_)));

        // only the reference file is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sampling_kept_with_single_beam() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeBackend::new(false);
        let backend: Arc<dyn SpeechBackend> = fake.clone();
        let params = GenerationParams { num_beams: 1, ..Default::default() };
        let inv = SynthesisInvoker::new(params).with_temp_dir(dir.path());
        inv.invoke(Some(&backend), "hi", &reference(dir.path())).unwrap();
        assert!(fake.seen.lock().unwrap()[0].0);
    }
}
