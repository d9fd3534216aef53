//! WebSocket transport.
//!
//! The socket is split after the handshake so the read loop and the write
//! path never wait on each other. Each half sits behind its own lock.

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::stream::ClientStream;
use crate::transport::Transport;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as UpgradeRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{client_async_with_config, WebSocketStream};

type WsStream = WebSocketStream<BufReader<ClientStream>>;

/// Transport speaking WebSocket to a Gremlin Server endpoint such as
/// `ws://localhost:8182/gremlin`.
pub struct WebSocketTransport {
    address: String,
    config: ConnectionConfig,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    live: AtomicBool,
    disposed: AtomicBool,
}

impl WebSocketTransport {
    /// Creates a transport (not yet connected).
    pub fn new(address: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            address: address.into(),
            config,
            sink: Mutex::new(None),
            stream: Mutex::new(None),
            live: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    fn upgrade_request(&self) -> Result<UpgradeRequest, ClientError> {
        let mut request = self
            .address
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidAddress(format!("{}: {}", self.address, e)))?;

        if let Some(ref provider) = self.config.auth_provider {
            for (name, value) in provider.headers()? {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ClientError::Connect(format!("invalid header name: {}", e)))?;
                let value = HeaderValue::from_str(&value)
                    .map_err(|e| ClientError::Connect(format!("invalid header value: {}", e)))?;
                request.headers_mut().insert(name, value);
            }
        }

        Ok(request)
    }

    fn mark_broken(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

fn handshake_error(err: WsError) -> ClientError {
    match err {
        WsError::Http(response) => {
            let body = response
                .body()
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            ClientError::Connect(format!(
                "handshake rejected with {}: {}",
                response.status(),
                body
            ))
        }
        other => ClientError::WebSocket(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<(), ClientError> {
        if self.is_disposed() {
            return Err(ClientError::Disposed);
        }

        let request = self.upgrade_request()?;
        let uri = request.uri();
        let secure = match uri.scheme_str() {
            Some("ws") => false,
            Some("wss") => true,
            _ => {
                return Err(ClientError::InvalidAddress(format!(
                    "{}: scheme must be ws or wss",
                    self.address
                )))
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| ClientError::InvalidAddress(format!("{}: missing host", self.address)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

        let tls = if secure {
            Some(self.config.tls.clone().unwrap_or_default())
        } else {
            None
        };
        let stream = ClientStream::dial(
            &host,
            port,
            tls.as_ref(),
            self.config.connect_timeout,
            self.config.handshake_timeout,
        )
        .await?;
        let stream = BufReader::with_capacity(self.config.read_buffer_size, stream);

        if self.config.compression {
            tracing::warn!("Compression requested but not supported; sending uncompressed frames");
        }
        let mut ws_config = WebSocketConfig::default();
        ws_config.write_buffer_size = self.config.write_buffer_size;

        tracing::debug!("Starting WebSocket handshake with {}...", self.address);
        let (ws, _response) = tokio::time::timeout(
            self.config.handshake_timeout,
            client_async_with_config(request, stream, Some(ws_config)),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Handshake timeout");
            ClientError::Timeout
        })?
        .map_err(handshake_error)?;
        tracing::debug!("Handshake complete");

        let (sink, stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        *self.stream.lock().await = Some(stream);
        self.live.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn write(&self, message: Vec<u8>) -> Result<(), ClientError> {
        if self.is_disposed() {
            return Err(ClientError::Disposed);
        }

        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(ClientError::NotConnected)?;

        let result = tokio::time::timeout(self.config.write_wait, sink.send(Message::Binary(message)))
            .await
            .map_err(|_| ClientError::Timeout)
            .and_then(|r| r.map_err(|e| ClientError::WebSocket(e.to_string())));
        if result.is_err() {
            self.mark_broken();
        }
        result
    }

    async fn read(&self) -> Result<Vec<u8>, ClientError> {
        if self.is_disposed() {
            return Err(ClientError::Disposed);
        }

        let mut stream_guard = self.stream.lock().await;
        let stream = stream_guard.as_mut().ok_or(ClientError::NotConnected)?;

        loop {
            let next = match tokio::time::timeout(self.config.read_wait, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.mark_broken();
                    return Err(ClientError::Timeout);
                }
            };

            match next {
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    self.live.store(true, Ordering::SeqCst);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Server closed the connection: {:?}", frame);
                    self.mark_broken();
                    return Err(ClientError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    self.mark_broken();
                    return Err(ClientError::WebSocket(e.to_string()));
                }
                None => {
                    self.mark_broken();
                    return Err(ClientError::ConnectionClosed);
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), ClientError> {
        if self.is_disposed() {
            return Err(ClientError::Disposed);
        }

        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(ClientError::NotConnected)?;

        let result = tokio::time::timeout(self.config.write_wait, sink.send(Message::Ping(Vec::new())))
            .await
            .map_err(|_| ClientError::Timeout)
            .and_then(|r| r.map_err(|e| ClientError::WebSocket(e.to_string())));
        if result.is_err() {
            self.mark_broken();
        }
        result
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!("Closing connection to {}...", self.address);
        self.mark_broken();

        if let Some(mut sink) = self.sink.lock().await.take() {
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: Cow::Borrowed(""),
            }));
            let _ = tokio::time::timeout(self.config.write_wait, sink.send(close)).await;
            let _ = sink.close().await;
        }

        // The read loop may hold the read half; it drops out on its own.
        if let Ok(mut stream) = self.stream.try_lock() {
            stream.take();
        }

        tracing::debug!("Connection closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live.load(Ordering::SeqCst) && !self.is_disposed()
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn address(&self) -> &str {
        &self.address
    }
}
