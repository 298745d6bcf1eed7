//! Error taxonomy of the speech endpoint and its JSON rendering.
//!
//! Components return typed errors; only [`ApiError`] knows about HTTP. The
//! body shape mirrors OpenAI's: `{"error": {"message": ..., "type": ...}}`.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::request::{SUPPORTED_MODELS, SUPPORTED_VOICES};

/// The `type` field of an error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationError,
    InvalidRequestError,
    ServerError,
}

/// Failures of the Synthesis Invoker.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("TTS service is not available due to initialization failure.")]
    Unavailable,

    #[error("Reference audio file '{}' not found for TTS.", .0.display())]
    ReferenceNotFound(PathBuf),

    #[error("could not allocate output file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("Audio generation failed: {0:#}")]
    Failed(#[source] anyhow::Error),
}

/// Every way a `/v1/audio/speech` request can fail before streaming begins.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("TTS service is currently unavailable. Please check server logs.")]
    ServiceUnavailable,

    #[error("Missing or invalid Authorization header.")]
    MissingCredentials,

    #[error("Invalid API key.")]
    InvalidApiKey,

    #[error("Could not read request body: {0}")]
    UnreadableBody(String),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Missing JSON body.")]
    MissingBody,

    #[error("Request body must be a JSON object.")]
    NotAnObject,

    #[error("Invalid or missing model. Supported: {:?}", SUPPORTED_MODELS)]
    InvalidModel,

    #[error("Missing input text.")]
    MissingInput,

    #[error("Invalid or missing voice. Supported: {:?}", SUPPORTED_VOICES)]
    InvalidVoice,

    #[error("Server configuration error: reference audio missing.")]
    ReferenceAudioMissing,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("An unexpected server error occurred.")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredentials | Self::InvalidApiKey => ErrorKind::AuthenticationError,
            Self::UnreadableBody(_)
            | Self::InvalidJson(_)
            | Self::MissingBody
            | Self::NotAnObject
            | Self::InvalidModel
            | Self::MissingInput
            | Self::InvalidVoice => ErrorKind::InvalidRequestError,
            Self::ServiceUnavailable
            | Self::ReferenceAudioMissing
            | Self::Synthesis(_)
            | Self::Internal(_) => ErrorKind::ServerError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ServiceUnavailable | Self::Synthesis(SynthesisError::Unavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::MissingCredentials | Self::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Self::UnreadableBody(_)
            | Self::InvalidJson(_)
            | Self::MissingBody
            | Self::NotAnObject
            | Self::InvalidModel
            | Self::MissingInput
            | Self::InvalidVoice => StatusCode::BAD_REQUEST,
            Self::ReferenceAudioMissing | Self::Synthesis(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message.
    fn message(&self) -> String {
        match self {
            Self::Synthesis(SynthesisError::ReferenceNotFound(_)) => {
                format!("Server configuration error: {self}")
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: ErrorKind,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.kind() {
            ErrorKind::ServerError => tracing::error!(%status, error = ?self, "request failed"),
            _ => tracing::info!(%status, "request rejected: {self}"),
        }
        let body = ErrorBody {
            error: ErrorDetail { message: self.message(), kind: self.kind() },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_kind() {
        let cases = [
            (ApiError::ServiceUnavailable, 503, ErrorKind::ServerError),
            (ApiError::MissingCredentials, 401, ErrorKind::AuthenticationError),
            (ApiError::InvalidApiKey, 401, ErrorKind::AuthenticationError),
            (ApiError::UnreadableBody("length limit exceeded".into()), 400, ErrorKind::InvalidRequestError),
            (ApiError::InvalidJson("eof".into()), 400, ErrorKind::InvalidRequestError),
            (ApiError::MissingBody, 400, ErrorKind::InvalidRequestError),
            (ApiError::InvalidModel, 400, ErrorKind::InvalidRequestError),
            (ApiError::MissingInput, 400, ErrorKind::InvalidRequestError),
            (ApiError::InvalidVoice, 400, ErrorKind::InvalidRequestError),
            (ApiError::ReferenceAudioMissing, 500, ErrorKind::ServerError),
        ];
        for (err, status, kind) in cases {
            assert_eq!(err.status().as_u16(), status, "{err}");
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_synthesis_mapping() {
        let e = ApiError::from(SynthesisError::Unavailable);
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);

        let e = ApiError::from(SynthesisError::Failed(anyhow::anyhow!("CUDA out of memory")));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.kind(), ErrorKind::ServerError);
        assert!(e.message().contains("CUDA out of memory"));

        let e = ApiError::from(SynthesisError::ReferenceNotFound("voices/audio.wav".into()));
        assert!(e.message().starts_with("Server configuration error:"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let v = serde_json::to_value(ErrorKind::InvalidRequestError).unwrap();
        assert_eq!(v, "invalid_request_error");
    }

    #[test]
    fn test_model_message_lists_supported() {
        let msg = ApiError::InvalidModel.to_string();
        assert!(msg.contains("tts-1-hd"));
    }
}
