//! Request validation and API-key authentication for `/v1/audio/speech`.
//!
//! Checks run in a fixed order and the first failure wins:
//! auth header presence → bearer scheme → key → JSON parse → non-empty body
//! → `model` → `input` → `voice`. Service availability is checked by the
//! handler before any of these.

use std::fmt;

use axum::http::{header, HeaderMap};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use crate::error::ApiError;

pub const SUPPORTED_MODELS: [&str; 2] = ["tts-1", "tts-1-hd"];

pub const SUPPORTED_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Formats a client may ask for. Output is always WAV regardless.
pub const SUPPORTED_FORMATS: [&str; 5] = ["mp3", "opus", "aac", "flac", "wav"];

const BEARER_PREFIX: &str = "Bearer ";

// ─────────────────────────────────────────────────────────────────────────────
// Enumerations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechModel {
    Tts1,
    Tts1Hd,
}

impl SpeechModel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tts-1" => Some(Self::Tts1),
            "tts-1-hd" => Some(Self::Tts1Hd),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tts1 => "tts-1",
            Self::Tts1Hd => "tts-1-hd",
        }
    }
}

/// OpenAI voice identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] =
        [Self::Alloy, Self::Echo, Self::Fable, Self::Onyx, Self::Nova, Self::Shimmer];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SpeechRequest
// ─────────────────────────────────────────────────────────────────────────────

/// A fully validated speech request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub model: SpeechModel,
    pub input: String,
    pub voice: Voice,
    /// Format the client asked for; advisory only.
    pub response_format: String,
}

impl SpeechRequest {
    /// Validate a raw request body.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        let data: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))?
        };

        if is_empty_json(&data) {
            return Err(ApiError::MissingBody);
        }
        let Value::Object(obj) = data else {
            return Err(ApiError::NotAnObject);
        };

        let model = str_field(&obj, "model")
            .and_then(SpeechModel::parse)
            .ok_or(ApiError::InvalidModel)?;

        let input = str_field(&obj, "input")
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::MissingInput)?
            .to_owned();

        let voice = str_field(&obj, "voice")
            .and_then(Voice::parse)
            .ok_or(ApiError::InvalidVoice)?;

        let response_format = match obj.get("response_format") {
            None => "wav".to_owned(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        if !SUPPORTED_FORMATS.contains(&response_format.as_str()) {
            tracing::warn!(
                requested = %response_format,
                "client requested unsupported format; generating WAV"
            );
        }

        Ok(Self { model, input, voice, response_format })
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// JSON values a client could send that carry no request at all.
fn is_empty_json(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication
// ─────────────────────────────────────────────────────────────────────────────

/// Check `Authorization: Bearer <key>` against the configured key.
pub fn authenticate(headers: &HeaderMap, api_key: &str) -> Result<(), ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::MissingCredentials)?
        .to_str()
        .map_err(|_| ApiError::MissingCredentials)?;

    let provided = value.strip_prefix(BEARER_PREFIX).ok_or(ApiError::MissingCredentials)?;

    if bool::from(provided.as_bytes().ct_eq(api_key.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!("API key mismatch");
        Err(ApiError::InvalidApiKey)
    }
}
