//! Byte stream under the WebSocket: plain TCP or TLS.

use crate::config::TlsClientConfig;
use crate::error::ClientError;
use crate::tls::tls_connector;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;

pin_project! {
    /// A client stream that can be either plain TCP or TLS.
    #[project = ClientStreamProj]
    pub enum ClientStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: ClientTlsStream<TcpStream> },
    }
}

impl ClientStream {
    /// Dials `host:port`, upgrading to TLS when a TLS config is given.
    ///
    /// The TCP dial is bounded by `connect_timeout`, the TLS handshake by
    /// `handshake_timeout`.
    pub async fn dial(
        host: &str,
        port: u16,
        tls: Option<&TlsClientConfig>,
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Result<Self, ClientError> {
        tracing::debug!("Dialing {}:{}...", host, port);

        let tcp_stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                tracing::debug!("Dial timeout");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::debug!("Dial failed: {}", e);
                ClientError::Io(e)
            })?;

        tcp_stream.set_nodelay(true).ok();

        let Some(tls_config) = tls else {
            return Ok(ClientStream::Plain { stream: tcp_stream });
        };

        if tls_config.insecure {
            tracing::warn!("Using insecure TLS (certificate verification disabled)");
        }
        let (connector, server_name) = tls_connector(tls_config, host)?;

        tracing::debug!("Performing TLS handshake...");
        let tls_stream = tokio::time::timeout(
            handshake_timeout,
            connector.connect(server_name, tcp_stream),
        )
        .await
        .map_err(|_| ClientError::TlsHandshake("handshake timed out".to_string()))?
        .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;
        tracing::debug!("TLS handshake complete");

        Ok(ClientStream::Tls { stream: tls_stream })
    }

    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, ClientStream::Tls { .. })
    }
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            ClientStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            ClientStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_flush(cx),
            ClientStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            ClientStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = ClientStream::dial(
            "127.0.0.1",
            port,
            None,
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert!(!stream.is_tls());
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = ClientStream::dial(
            "127.0.0.1",
            port,
            None,
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
