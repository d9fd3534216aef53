//! High-level client API.

use crate::config::{ClientSettings, Credentials, DialOption};
use crate::connection::{Connection, ConnectionState};
use crate::dispatch::{Dispatcher, ResultFrames};
use crate::error::ClientError;
use crate::model::{self, Edge, Vertex};
use crate::query::{g, Literal, QueryBuilder, Traversal};
use crate::transport::{Transport, TransportFactory, WebSocketFactory};
use gremlink_protocol::{Bindings, UuidV4};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the error channel created when no sink is supplied.
const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 64;

/// Client for one Gremlin Server endpoint.
///
/// Safe to share across tasks; concurrent calls are multiplexed over the
/// single connection.
pub struct Client {
    conn: Arc<Connection>,
    errors: Mutex<Option<mpsc::Receiver<ClientError>>>,
}

impl Client {
    /// Dials `address` (`ws://host:port/path` or `wss://...`) over WebSocket.
    pub async fn dial(
        address: &str,
        options: impl IntoIterator<Item = DialOption>,
    ) -> Result<Self, ClientError> {
        Self::dial_with_factory(address, Arc::new(WebSocketFactory), options).await
    }

    /// Dials through a custom transport factory.
    pub async fn dial_with_factory(
        address: &str,
        factory: Arc<dyn TransportFactory>,
        options: impl IntoIterator<Item = DialOption>,
    ) -> Result<Self, ClientError> {
        let settings = ClientSettings::from_options(options);

        let (sink, errors) = match settings.error_sink {
            Some(sink) => (sink, None),
            None => {
                let (tx, rx) = mpsc::channel(DEFAULT_ERROR_CHANNEL_CAPACITY);
                (tx, Some(rx))
            }
        };
        let ids = settings.request_ids.unwrap_or_else(|| Arc::new(UuidV4));
        let dispatcher = Arc::new(Dispatcher::new(&settings.connection, ids, sink));
        let conn = Arc::new(Connection::new(
            address,
            settings.connection,
            factory,
            dispatcher,
            settings.logger,
        ));

        conn.attach_new();
        conn.launch().await?;

        Ok(Self {
            conn,
            errors: Mutex::new(errors),
        })
    }

    /// Closes the connection. In-flight requests fail with `ConnectionClosed`.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn is_broken(&self) -> bool {
        self.conn.is_broken()
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn address(&self) -> &str {
        self.conn.address()
    }

    /// Credentials used to answer authentication challenges.
    pub fn auth_info(&self) -> Option<&Credentials> {
        self.conn.config().credentials.as_ref()
    }

    /// Number of requests waiting in the outbound queue.
    pub fn queued(&self) -> usize {
        self.conn.dispatcher().queued()
    }

    /// Routes log output of this client to `logger`.
    pub fn set_logger(&self, logger: tracing::Dispatch) {
        self.conn.set_logger(logger);
    }

    /// Takes the receiver of connection-wide errors.
    ///
    /// Returns `None` if an error sink was supplied at dial time or the
    /// receiver was already taken.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<ClientError>> {
        self.errors.lock().take()
    }

    /// Replaces the transport and relaunches.
    pub async fn redial(&self, transport: Arc<dyn Transport>) -> Result<(), ClientError> {
        self.conn.redial(transport).await
    }

    /// Replaces a disposed transport with a fresh one for the same address.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.conn.reconnect().await
    }

    // =========================================================================
    // Query execution
    // =========================================================================

    /// Executes a script and returns the serialized `result.data` of each
    /// response frame.
    pub async fn execute(&self, query: &str) -> Result<ResultFrames, ClientError> {
        self.conn.execute(query, Bindings::new(), HashMap::new()).await
    }

    pub async fn execute_with_bindings(
        &self,
        query: &str,
        bindings: Bindings,
        rebindings: HashMap<String, String>,
    ) -> Result<ResultFrames, ClientError> {
        self.conn.execute(query, bindings, rebindings).await
    }

    pub async fn execute_query(&self, query: &impl QueryBuilder) -> Result<ResultFrames, ClientError> {
        self.execute(&query.to_query()).await
    }

    // =========================================================================
    // Graph operations
    // =========================================================================

    pub async fn get_vertices(&self, query: &impl QueryBuilder) -> Result<Vec<Vertex>, ClientError> {
        let frames = self.execute_query(query).await?;
        model::unmarshal_vertices(&frames)
    }

    pub async fn get_edges(&self, query: &impl QueryBuilder) -> Result<Vec<Edge>, ClientError> {
        let frames = self.execute_query(query).await?;
        model::unmarshal_edges(&frames)
    }

    /// Runs a counting query and returns the count.
    pub async fn get_count(&self, query: &impl QueryBuilder) -> Result<i64, ClientError> {
        let frames = self.execute_query(query).await?;
        model::unmarshal_values::<i64>(&frames)?
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyResult)
    }

    /// Adds a vertex. `properties` is a flat list of key/value pairs.
    pub async fn add_vertex(&self, label: &str, properties: &[Literal]) -> Result<Vertex, ClientError> {
        let query = with_properties(g().add_v(label), properties)?;
        self.get_vertices(&query)
            .await?
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyResult)
    }

    /// Adds an edge from vertex `from` to vertex `to`.
    pub async fn add_edge(
        &self,
        label: &str,
        from: impl Into<Literal>,
        to: impl Into<Literal>,
        properties: &[Literal],
    ) -> Result<Edge, ClientError> {
        let query = with_properties(g().add_e(label).from_v(from).to_v(to), properties)?;
        self.get_edges(&query)
            .await?
            .into_iter()
            .next()
            .ok_or(ClientError::EmptyResult)
    }

    pub async fn drop_vertex(&self, id: impl Into<Literal>) -> Result<(), ClientError> {
        let id: Literal = id.into();
        self.execute_query(&g().v([id]).drop()).await?;
        Ok(())
    }

    pub async fn drop_edge(&self, id: impl Into<Literal>) -> Result<(), ClientError> {
        let id: Literal = id.into();
        self.execute_query(&g().e([id]).drop()).await?;
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.conn.signal_shutdown();
    }
}

fn with_properties(mut traversal: Traversal, properties: &[Literal]) -> Result<Traversal, ClientError> {
    if properties.len() % 2 != 0 {
        return Err(ClientError::OddParameters(properties.len()));
    }
    for pair in properties.chunks(2) {
        let key = match &pair[0] {
            Literal::Str(key) => key.clone(),
            other => other.to_string(),
        };
        traversal = traversal.property(&key, pair[1].clone());
    }
    Ok(traversal)
}
