//! Transport abstraction.
//!
//! A transport is a message-oriented duplex link to one server. Reads and
//! writes may run concurrently from different tasks; implementations keep
//! the two directions independently locked.

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::websocket::WebSocketTransport;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the link and marks the transport live.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Sends one binary message.
    async fn write(&self, message: Vec<u8>) -> Result<(), ClientError>;

    /// Receives the next data message. Control frames are handled internally.
    async fn read(&self) -> Result<Vec<u8>, ClientError>;

    /// Sends a liveness probe. On failure the transport is marked not live.
    async fn ping(&self) -> Result<(), ClientError>;

    /// Sends a close frame, then releases the link. Calling it twice is a no-op.
    async fn close(&self) -> Result<(), ClientError>;

    fn is_connected(&self) -> bool;

    fn is_disposed(&self) -> bool;

    fn address(&self) -> &str;
}

/// Creates transports for an address. Used on dial and reconnect.
pub trait TransportFactory: Send + Sync {
    fn create(&self, address: &str, config: &ConnectionConfig) -> Arc<dyn Transport>;
}

/// Creates [`WebSocketTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    fn create(&self, address: &str, config: &ConnectionConfig) -> Arc<dyn Transport> {
        Arc::new(WebSocketTransport::new(address, config.clone()))
    }
}
