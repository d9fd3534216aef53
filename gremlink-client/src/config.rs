//! Connection configuration and dial options.

use crate::error::ClientError;
use gremlink_protocol::{ProtocolVersion, RequestIdSource};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default socket buffer size (8 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum socket buffer size (1 KiB).
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Maximum socket buffer size (1 MiB).
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Default outbound queue capacity.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// TLS configuration for `wss://` connections.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the web PKI roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
    /// Server name for SNI (defaults to the URL host).
    pub server_name: Option<String>,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// Username/password for SASL PLAIN authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies extra headers for the WebSocket upgrade request, e.g. signed
/// cloud credentials.
pub trait AuthProvider: Send + Sync {
    fn headers(&self) -> Result<Vec<(String, String)>, ClientError>;
}

/// An [`AuthProvider`] returning a fixed header set.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(pub Vec<(String, String)>);

impl AuthProvider for StaticHeaders {
    fn headers(&self) -> Result<Vec<(String, String)>, ClientError> {
        Ok(self.0.clone())
    }
}

/// Per-connection configuration shared by the transport and the engine.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// GraphSON version advertised in the mimetype header.
    pub protocol_version: ProtocolVersion,
    /// TCP dial timeout.
    pub connect_timeout: Duration,
    /// WebSocket (and TLS) handshake timeout.
    pub handshake_timeout: Duration,
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Upper bound for a single frame write.
    pub write_wait: Duration,
    /// Upper bound for waiting on the next inbound frame.
    pub read_wait: Duration,
    /// Upper bound for one request's end-to-end wait.
    pub request_timeout: Duration,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Outbound queue capacity; callers wait when it is full.
    pub concurrency: usize,
    pub credentials: Option<Credentials>,
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
    pub compression: bool,
    pub tls: Option<TlsClientConfig>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::V3,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
            write_wait: Duration::from_secs(15),
            read_wait: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            credentials: None,
            auth_provider: None,
            compression: false,
            tls: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("protocol_version", &self.protocol_version)
            .field("connect_timeout", &self.connect_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("ping_interval", &self.ping_interval)
            .field("write_wait", &self.write_wait)
            .field("read_wait", &self.read_wait)
            .field("request_timeout", &self.request_timeout)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("concurrency", &self.concurrency)
            .field("credentials", &self.credentials)
            .field("auth_provider", &self.auth_provider.is_some())
            .field("compression", &self.compression)
            .field("tls", &self.tls)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }
}

/// Everything a client is dialed with.
#[derive(Default)]
pub struct ClientSettings {
    pub connection: ConnectionConfig,
    /// Receives connection-wide failures. A bounded internal channel is used
    /// when absent.
    pub error_sink: Option<mpsc::Sender<ClientError>>,
    /// Subscriber the background loops log through.
    pub logger: Option<tracing::Dispatch>,
    /// Request identifier source; random UUIDs when absent.
    pub request_ids: Option<Arc<dyn RequestIdSource>>,
}

/// One configuration override, applied in order at dial time.
///
/// Each option sets exactly one field; when two options set the same field
/// the later one wins.
pub enum DialOption {
    ErrorSink(mpsc::Sender<ClientError>),
    Logger(tracing::Dispatch),
    ProtocolVersion(ProtocolVersion),
    Concurrency(usize),
    Credentials { username: String, password: String },
    AuthProvider(Arc<dyn AuthProvider>),
    ConnectTimeout(Duration),
    PingInterval(Duration),
    WriteWait(Duration),
    ReadWait(Duration),
    RequestTimeout(Duration),
    WriteBufferSize(usize),
    ReadBufferSize(usize),
    HandshakeTimeout(Duration),
    Compression(bool),
    Tls(TlsClientConfig),
    RequestIds(Arc<dyn RequestIdSource>),
}

impl DialOption {
    pub fn credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        DialOption::Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn apply(self, settings: &mut ClientSettings) {
        let conn = &mut settings.connection;
        match self {
            DialOption::ErrorSink(sink) => settings.error_sink = Some(sink),
            DialOption::Logger(dispatch) => settings.logger = Some(dispatch),
            DialOption::ProtocolVersion(version) => conn.protocol_version = version,
            DialOption::Concurrency(n) => conn.concurrency = n.max(1),
            DialOption::Credentials { username, password } => {
                conn.credentials = Some(Credentials { username, password })
            }
            DialOption::AuthProvider(provider) => conn.auth_provider = Some(provider),
            DialOption::ConnectTimeout(d) => conn.connect_timeout = d,
            DialOption::PingInterval(d) => conn.ping_interval = d,
            DialOption::WriteWait(d) => conn.write_wait = d,
            DialOption::ReadWait(d) => conn.read_wait = d,
            DialOption::RequestTimeout(d) => conn.request_timeout = d,
            DialOption::WriteBufferSize(n) => {
                conn.write_buffer_size = n.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
            }
            DialOption::ReadBufferSize(n) => {
                conn.read_buffer_size = n.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
            }
            DialOption::HandshakeTimeout(d) => conn.handshake_timeout = d,
            DialOption::Compression(enabled) => conn.compression = enabled,
            DialOption::Tls(tls) => conn.tls = Some(tls),
            DialOption::RequestIds(ids) => settings.request_ids = Some(ids),
        }
    }
}

impl ClientSettings {
    /// Applies options left to right.
    pub fn from_options(options: impl IntoIterator<Item = DialOption>) -> Self {
        let mut settings = Self::default();
        for option in options {
            option.apply(&mut settings);
        }
        settings
    }
}
