//! # gremlink-client
//!
//! Async client for Gremlin Server.
//!
//! This crate provides:
//! - WebSocket transport with optional TLS
//! - Request multiplexing with per-request result correlation
//! - Transparent SASL authentication on 407 challenges
//! - Keepalive probing, redial and reconnect
//! - A small traversal builder and GraphSON element decoding

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod pending;
pub mod query;
pub mod stream;
pub mod tls;
pub mod transport;
pub mod websocket;

#[cfg(test)]
mod mock;

pub use client::Client;
pub use config::{
    AuthProvider, ClientSettings, ConnectionConfig, Credentials, DialOption, StaticHeaders,
    TlsClientConfig,
};
pub use connection::{Connection, ConnectionState};
pub use dispatch::ResultFrames;
pub use error::ClientError;
pub use model::{Edge, Property, Vertex, VertexProperty};
pub use query::{g, Literal, QueryBuilder, Traversal};
pub use transport::{Transport, TransportFactory, WebSocketFactory};
pub use websocket::WebSocketTransport;
