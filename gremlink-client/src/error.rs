//! Client error types.

use gremlink_protocol::{StatusCode, StatusError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] gremlink_protocol::ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection disposed")]
    Disposed,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection is nil")]
    NilConnection,

    #[error("request timeout")]
    Timeout,

    #[error("server error: {0}")]
    Server(#[from] StatusError),

    #[error("authentication required but no credentials are configured")]
    NoCredentials,

    #[error("odd number of property parameters: {0}")]
    OddParameters(usize),

    #[error("query returned no results")]
    EmptyResult,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::WebSocket(_) => true,
            ClientError::Server(err) => err.code.is_retryable(),
            _ => false,
        }
    }

    /// Returns the server status code, if the server rejected the request.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::Server(err) => Some(err.code),
            _ => None,
        }
    }
}
