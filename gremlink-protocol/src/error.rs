//! Protocol error types and the Gremlin Server status taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while encoding requests or decoding responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid frame header: {0}")]
    InvalidHeader(&'static str),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Status codes returned by Gremlin Server.
///
/// Anything outside the documented set is kept as `Unknown` with the raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    NoContent,
    PartialContent,
    Unauthorized,
    AuthenticationRequired,
    MalformedRequest,
    InvalidRequestArguments,
    ServerError,
    ServerUnavailable,
    ScriptEvaluationError,
    ServerTimeout,
    SerializationError,
    Unknown(u16),
}

impl StatusCode {
    pub fn from_code(code: u16) -> Self {
        match code {
            200 => StatusCode::Success,
            204 => StatusCode::NoContent,
            206 => StatusCode::PartialContent,
            401 => StatusCode::Unauthorized,
            407 => StatusCode::AuthenticationRequired,
            498 => StatusCode::MalformedRequest,
            499 => StatusCode::InvalidRequestArguments,
            500 => StatusCode::ServerError,
            503 => StatusCode::ServerUnavailable,
            597 => StatusCode::ScriptEvaluationError,
            598 => StatusCode::ServerTimeout,
            599 => StatusCode::SerializationError,
            other => StatusCode::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Success => 200,
            StatusCode::NoContent => 204,
            StatusCode::PartialContent => 206,
            StatusCode::Unauthorized => 401,
            StatusCode::AuthenticationRequired => 407,
            StatusCode::MalformedRequest => 498,
            StatusCode::InvalidRequestArguments => 499,
            StatusCode::ServerError => 500,
            StatusCode::ServerUnavailable => 503,
            StatusCode::ScriptEvaluationError => 597,
            StatusCode::ServerTimeout => 598,
            StatusCode::SerializationError => 599,
            StatusCode::Unknown(code) => *code,
        }
    }

    /// Human-readable label for the code.
    pub fn label(&self) -> &'static str {
        match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::NoContent => "NO CONTENT",
            StatusCode::PartialContent => "PARTIAL CONTENT",
            StatusCode::Unauthorized => "UNAUTHORIZED",
            StatusCode::AuthenticationRequired => "AUTHENTICATION REQUIRED",
            StatusCode::MalformedRequest => "MALFORMED REQUEST",
            StatusCode::InvalidRequestArguments => "INVALID REQUEST ARGUMENTS",
            StatusCode::ServerError => "SERVER ERROR",
            StatusCode::ServerUnavailable => "SERVER UNAVAILABLE",
            StatusCode::ScriptEvaluationError => "SCRIPT EVALUATION ERROR",
            StatusCode::ServerTimeout => "SERVER TIMEOUT",
            StatusCode::SerializationError => "SERIALIZATION ERROR",
            StatusCode::Unknown(_) => "UNKNOWN ERROR",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            StatusCode::Success | StatusCode::NoContent | StatusCode::PartialContent
        )
    }

    /// Returns whether the server may accept the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StatusCode::ServerUnavailable | StatusCode::ServerTimeout
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.label())
    }
}

impl Serialize for StatusCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u16::deserialize(deserializer).map(StatusCode::from_code)
    }
}

/// A non-success status reported by the server for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} ({}): {message}", .code.label(), .code.code())]
pub struct StatusError {
    pub code: StatusCode,
    /// Server message, verbatim.
    pub message: String,
}

impl StatusError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
