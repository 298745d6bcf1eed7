//! Reference-voice resolution.
//!
//! IndexTTS clones timbre from a reference recording. Every OpenAI voice
//! name currently points at the same shared file.

use std::path::{Path, PathBuf};

use crate::{error::ApiError, request::Voice};

/// Voice identifier → reference audio path.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    reference: PathBuf,
}

impl VoiceResolver {
    /// Map every voice to `reference`.
    pub fn shared(reference: impl Into<PathBuf>) -> Self {
        Self { reference: reference.into() }
    }

    /// The shared reference recording.
    pub fn reference(&self) -> &Path {
        &self.reference
    }

    /// Path the voice maps to, whether or not it exists yet.
    pub fn path_for(&self, _voice: Voice) -> &Path {
        self.reference()
    }

    /// Resolve `voice` to an existing reference file.
    ///
    /// A missing file is a server fault: the voice name itself was valid.
    pub fn resolve(&self, voice: Voice) -> Result<PathBuf, ApiError> {
        let path = self.path_for(voice);
        if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            tracing::error!(
                %voice,
                path = %path.display(),
                "reference audio for voice not found"
            );
            Err(ApiError::ReferenceAudioMissing)
        }
    }
}
