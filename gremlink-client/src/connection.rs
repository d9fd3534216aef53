//! Connection lifecycle.
//!
//! A connection owns the current transport and the background loops that
//! serve it: write, read and keepalive probe. Each launch starts a session
//! with its own shutdown channel; closing, redialing or reconnecting stops
//! the previous session before anything new is spawned.

use crate::config::ConnectionConfig;
use crate::dispatch::{Dispatcher, ResultFrames};
use crate::error::ClientError;
use crate::transport::{Transport, TransportFactory};
use gremlink_protocol::Bindings;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
    /// Connect failed or a loop hit an unrecoverable error.
    Broken,
}

struct Session {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Connection {
    address: String,
    config: ConnectionConfig,
    factory: Arc<dyn TransportFactory>,
    dispatcher: Arc<Dispatcher>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    state: Mutex<ConnectionState>,
    session: AsyncMutex<Option<Session>>,
    logger: RwLock<Option<Dispatch>>,
}

impl Connection {
    pub fn new(
        address: impl Into<String>,
        config: ConnectionConfig,
        factory: Arc<dyn TransportFactory>,
        dispatcher: Arc<Dispatcher>,
        logger: Option<Dispatch>,
    ) -> Self {
        Self {
            address: address.into(),
            config,
            factory,
            dispatcher,
            transport: RwLock::new(None),
            state: Mutex::new(ConnectionState::Unconnected),
            session: AsyncMutex::new(None),
            logger: RwLock::new(logger),
        }
    }

    /// Creates a transport for the configured address through the factory.
    pub fn attach_new(&self) -> Arc<dyn Transport> {
        let transport = self.factory.create(&self.address, &self.config);
        *self.transport.write() = Some(transport.clone());
        transport
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
            && self.transport().is_some_and(|t| t.is_connected())
    }

    pub fn is_broken(&self) -> bool {
        self.state() == ConnectionState::Broken
    }

    /// Replaces the subscriber used by loops spawned from now on.
    pub fn set_logger(&self, logger: Dispatch) {
        *self.logger.write() = Some(logger);
    }

    fn logger(&self) -> Option<Dispatch> {
        self.logger.read().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::debug!("Connection {} {:?} -> {:?}", self.address, *current, state);
            *current = state;
        }
    }

    /// Connects the current transport and starts the session loops.
    ///
    /// On failure the connection is marked broken and nothing is spawned.
    pub async fn launch(self: &Arc<Self>) -> Result<(), ClientError> {
        let transport = self.transport().ok_or(ClientError::NilConnection)?;
        self.stop_session().await;

        self.set_state(ConnectionState::Connecting);
        tracing::debug!("Connecting to {}...", transport.address());
        if let Err(e) = transport.connect().await {
            tracing::warn!("Connect to {} failed: {}", transport.address(), e);
            self.set_state(ConnectionState::Broken);
            return Err(e);
        }
        self.set_state(ConnectionState::Connected);

        let (shutdown, _) = broadcast::channel(1);
        let tasks = vec![
            self.spawn_write_loop(&transport, &shutdown),
            self.spawn_read_loop(&transport, &shutdown),
            self.spawn({
                let transport = transport.clone();
                let dispatcher = self.dispatcher.clone();
                let interval = self.config.ping_interval;
                let shutdown = shutdown.subscribe();
                probe_loop(transport, dispatcher, interval, shutdown)
            }),
        ];
        *self.session.lock().await = Some(Session { shutdown, tasks });

        tracing::info!("Connected to {}", transport.address());
        Ok(())
    }

    fn spawn_write_loop(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        shutdown: &broadcast::Sender<()>,
    ) -> JoinHandle<()> {
        let conn = self.clone();
        let transport = transport.clone();
        let rx = shutdown.subscribe();
        let tx = shutdown.clone();
        self.spawn(async move {
            if let Err(e) = conn.dispatcher.write_loop(transport.clone(), rx).await {
                conn.fail("write", &transport, &tx, e).await;
            }
        })
    }

    fn spawn_read_loop(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        shutdown: &broadcast::Sender<()>,
    ) -> JoinHandle<()> {
        let conn = self.clone();
        let transport = transport.clone();
        let rx = shutdown.subscribe();
        let tx = shutdown.clone();
        self.spawn(async move {
            if let Err(e) = conn.dispatcher.read_loop(transport.clone(), rx).await {
                conn.fail("read", &transport, &tx, e).await;
            }
        })
    }

    fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.logger() {
            Some(logger) => tokio::spawn(future.with_subscriber(logger)),
            None => tokio::spawn(future),
        }
    }

    /// Handles an unrecoverable loop error. Only the first failure of a
    /// session has any effect.
    async fn fail(
        &self,
        which: &str,
        transport: &Arc<dyn Transport>,
        shutdown: &broadcast::Sender<()>,
        err: ClientError,
    ) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Connected {
                tracing::debug!("{} loop ended while {:?}: {}", which, *state, err);
                return;
            }
            *state = ConnectionState::Broken;
        }

        tracing::error!("{} loop failed on {}: {}", which, transport.address(), err);
        let _ = shutdown.send(());
        if let Err(e) = transport.close().await {
            tracing::debug!("Close after failure: {}", e);
        }
        let woken = self.dispatcher.pending().abort_all();
        if woken > 0 {
            tracing::warn!("Aborted {} in-flight requests", woken);
        }
        self.dispatcher.report(err);
    }

    /// Signals the current session to stop and waits for its loops.
    async fn stop_session(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        let _ = session.shutdown.send(());
        for task in session.tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("Connection task panicked: {}", e);
                }
            }
        }
    }

    /// Fires the session shutdown without waiting. Used when the owner is
    /// dropped outside an async context.
    pub fn signal_shutdown(&self) {
        if let Ok(session) = self.session.try_lock() {
            if let Some(session) = session.as_ref() {
                let _ = session.shutdown.send(());
            }
        }
    }

    pub async fn execute(
        &self,
        gremlin: &str,
        bindings: Bindings,
        rebindings: HashMap<String, String>,
    ) -> Result<ResultFrames, ClientError> {
        let transport = self.transport().ok_or(ClientError::NilConnection)?;
        let request = self
            .dispatcher
            .execute(transport.as_ref(), gremlin, bindings, rebindings);
        match self.logger() {
            Some(logger) => request.with_subscriber(logger).await,
            None => request.await,
        }
    }

    /// Closes the transport and stops the session. Waiting callers are
    /// released with `ConnectionClosed`.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection to {}...", self.address);
        self.set_state(ConnectionState::Closing);

        let result = match self.transport() {
            Some(transport) => transport.close().await,
            None => Ok(()),
        };
        self.stop_session().await;

        let woken = self.dispatcher.pending().abort_all();
        tracing::debug!("Released {} pending requests", woken);
        self.set_state(ConnectionState::Closed);
        result
    }

    /// Swaps in `transport` and launches it. A live previous transport is
    /// closed first.
    pub async fn redial(self: &Arc<Self>, transport: Arc<dyn Transport>) -> Result<(), ClientError> {
        if let Some(old) = self.transport() {
            if !old.is_disposed() {
                tracing::debug!("Closing previous transport before redial");
                self.close().await?;
            }
        }
        *self.transport.write() = Some(transport);
        self.launch().await
    }

    /// Replaces a disposed transport with a fresh one for the same address.
    ///
    /// Does nothing while the current transport is still usable.
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), ClientError> {
        let current = self.transport().ok_or(ClientError::NilConnection)?;
        if !current.is_disposed() {
            tracing::debug!("Transport to {} not disposed, skipping reconnect", self.address);
            return Ok(());
        }

        tracing::info!("Reconnecting to {}", self.address);
        self.attach_new();
        self.launch().await
    }
}

/// Sends a keepalive ping every `interval`. Failures are reported and the
/// loop keeps going; a zero interval disables probing.
async fn probe_loop(
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    if interval.is_zero() {
        let _ = shutdown.recv().await;
        return;
    }

    let mut ticker = interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {}
        }
        if let Err(e) = transport.ping().await {
            tracing::warn!("Ping to {} failed: {}", transport.address(), e);
            dispatcher.report(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockFactory};
    use gremlink_protocol::{Response, UuidV4};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tokio::sync::{mpsc, Semaphore};

    const ADDR: &str = "ws://mock:8182/gremlin";

    struct Fixture {
        conn: Arc<Connection>,
        factory: Arc<MockFactory>,
        errors: mpsc::Receiver<ClientError>,
    }

    fn fixture(config: ConnectionConfig) -> Fixture {
        let factory = Arc::new(MockFactory::default());
        let (errors_tx, errors) = mpsc::channel(16);
        let dispatcher = Arc::new(Dispatcher::new(&config, Arc::new(UuidV4), errors_tx));
        let conn = Arc::new(Connection::new(
            ADDR,
            config,
            factory.clone(),
            dispatcher,
            None,
        ));
        Fixture {
            conn,
            factory,
            errors,
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    /// Runs one query against the `index`-th mock server.
    async fn round_trip(f: &Fixture, index: usize) {
        let mut server = f.factory.take_server(index);
        let conn = f.conn.clone();
        let call = tokio::spawn(async move {
            conn.execute("g.V().count()", Bindings::new(), HashMap::new())
                .await
        });
        let id = server.next_request().await.1.request_id;
        server.reply(&Response::ok(&id, json!([1])));
        assert_eq!(call.await.unwrap().unwrap(), vec![b"[1]".to_vec()]);
    }

    #[tokio::test]
    async fn test_launch_and_execute() {
        let f = fixture(ConnectionConfig::default());
        assert_eq!(f.conn.state(), ConnectionState::Unconnected);

        f.conn.attach_new();
        f.conn.launch().await.unwrap();
        assert_eq!(f.conn.state(), ConnectionState::Connected);
        assert!(f.conn.is_connected());

        round_trip(&f, 0).await;
    }

    #[tokio::test]
    async fn test_launch_failure_marks_broken() {
        let f = fixture(ConnectionConfig::default());
        f.conn.attach_new();
        f.factory.transport(0).refuse_connect();

        let err = f.conn.launch().await.unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
        assert!(f.conn.is_broken());
        assert!(f.conn.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_launch_without_transport() {
        let f = fixture(ConnectionConfig::default());
        assert!(matches!(
            f.conn.launch().await,
            Err(ClientError::NilConnection)
        ));
        assert!(matches!(
            f.conn.execute("g.V()", Bindings::new(), HashMap::new()).await,
            Err(ClientError::NilConnection)
        ));
    }

    #[tokio::test]
    async fn test_close_disposes_transport() {
        let f = fixture(ConnectionConfig::default());
        f.conn.attach_new();
        f.conn.launch().await.unwrap();

        f.conn.close().await.unwrap();
        assert_eq!(f.conn.state(), ConnectionState::Closed);
        assert!(!f.conn.is_connected());
        assert!(f.factory.transport(0).is_disposed());
        assert!(f.conn.session.lock().await.is_none());

        let result = f.conn.execute("g.V()", Bindings::new(), HashMap::new()).await;
        assert!(matches!(result, Err(ClientError::Disposed)));
    }

    #[tokio::test]
    async fn test_reconnect_never_dialed() {
        let f = fixture(ConnectionConfig::default());
        let err = f.conn.reconnect().await.unwrap_err();
        assert_eq!(err.to_string(), "connection is nil");
    }

    #[tokio::test]
    async fn test_reconnect_live_transport_is_noop() {
        let f = fixture(ConnectionConfig::default());
        f.conn.attach_new();
        f.conn.launch().await.unwrap();

        f.conn.reconnect().await.unwrap();
        assert_eq!(f.factory.created(), 1);
        assert_eq!(f.factory.transport(0).connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_hang_up_breaks_then_reconnects() {
        let mut f = fixture(ConnectionConfig::default());
        f.conn.attach_new();
        f.conn.launch().await.unwrap();

        let conn = f.conn.clone();
        let waiting = tokio::spawn(async move {
            conn.execute("g.V()", Bindings::new(), HashMap::new()).await
        });
        let mut server = f.factory.take_server(0);
        server.next_request().await;
        server.hang_up();

        assert!(matches!(
            waiting.await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
        wait_for(|| f.conn.is_broken()).await;
        assert!(f.factory.transport(0).is_disposed());
        assert!(matches!(
            f.errors.recv().await,
            Some(ClientError::ConnectionClosed)
        ));

        f.conn.reconnect().await.unwrap();
        assert_eq!(f.factory.created(), 2);
        assert_eq!(f.conn.state(), ConnectionState::Connected);
        round_trip(&f, 1).await;
    }

    #[tokio::test]
    async fn test_break_releases_queued_callers_and_drops_their_frames() {
        let mut f = fixture(ConnectionConfig::default().with_concurrency(1));
        let gate = Arc::new(Semaphore::new(0));
        let (first, server) = mock::gated_pair(ADDR, gate);
        f.conn.redial(first.clone()).await.unwrap();

        let spawn = |gremlin: &'static str| {
            let conn = f.conn.clone();
            tokio::spawn(async move { conn.execute(gremlin, Bindings::new(), HashMap::new()).await })
        };
        // One frame stuck in a write, one queued, one waiting for queue space.
        let held = spawn("g.addV('a')");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let queued = spawn("g.addV('b')");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let blocked = spawn("g.addV('c')");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.conn.dispatcher().queued(), 1);
        assert!(!blocked.is_finished());

        server.hang_up();
        for call in [held, queued, blocked] {
            let result = tokio::time::timeout(Duration::from_millis(500), call)
                .await
                .expect("caller not released after the connection broke");
            assert!(matches!(result.unwrap(), Err(ClientError::ConnectionClosed)));
        }
        wait_for(|| f.conn.is_broken()).await;
        assert!(first.is_disposed());
        assert!(matches!(
            f.errors.recv().await,
            Some(ClientError::ConnectionClosed)
        ));

        f.conn.reconnect().await.unwrap();
        let mut server = f.factory.take_server(0);
        let call = spawn("g.V().count()");
        let request = server.next_request().await.1;
        assert_eq!(request.gremlin(), Some("g.V().count()"));
        server.reply(&Response::ok(&request.request_id, json!([1])));
        assert!(call.await.unwrap().is_ok());
        assert_eq!(f.conn.dispatcher().queued(), 0);
    }

    #[tokio::test]
    async fn test_close_does_not_wait_for_blocked_write() {
        let f = fixture(ConnectionConfig::default());
        let (transport, _server) = mock::gated_pair(ADDR, Arc::new(Semaphore::new(0)));
        f.conn.redial(transport).await.unwrap();

        let conn = f.conn.clone();
        let call = tokio::spawn(async move {
            conn.execute("g.V()", Bindings::new(), HashMap::new()).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_millis(500), f.conn.close())
            .await
            .expect("close stalled behind a blocked write")
            .unwrap();
        assert!(matches!(
            call.await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_write_failure_breaks_connection() {
        let mut f = fixture(ConnectionConfig::default());
        f.conn.attach_new();
        f.conn.launch().await.unwrap();
        f.factory.transport(0).fail_writes();

        let result = f.conn.execute("g.V()", Bindings::new(), HashMap::new()).await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(f.conn.is_broken());
        assert!(matches!(
            f.errors.recv().await,
            Some(ClientError::WebSocket(_))
        ));
    }

    #[tokio::test]
    async fn test_redial_replaces_transport() {
        let f = fixture(ConnectionConfig::default());
        let first = f.conn.attach_new();
        f.conn.launch().await.unwrap();

        let second = f.factory.create(ADDR, f.conn.config());
        f.conn.redial(second).await.unwrap();

        assert!(first.is_disposed());
        assert_eq!(f.conn.state(), ConnectionState::Connected);
        round_trip(&f, 1).await;
    }

    #[tokio::test]
    async fn test_probe_pings_periodically() {
        let config = ConnectionConfig::default().with_ping_interval(Duration::from_millis(10));
        let f = fixture(config);
        f.conn.attach_new();
        f.conn.launch().await.unwrap();

        let transport = f.factory.transport(0);
        wait_for(|| transport.pings.load(Ordering::SeqCst) >= 3).await;

        f.conn.close().await.unwrap();
        let after_close = transport.pings.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.pings.load(Ordering::SeqCst), after_close);
    }

    #[tokio::test]
    async fn test_logger_applies_to_loops() {
        #[derive(Clone, Default)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer({
                let capture = capture.clone();
                move || capture.clone()
            })
            .finish();

        let f = fixture(ConnectionConfig::default());
        f.conn.set_logger(Dispatch::new(subscriber));
        f.conn.attach_new();
        f.conn.launch().await.unwrap();

        wait_for(|| {
            String::from_utf8_lossy(&capture.0.lock()).contains("Read loop started")
        })
        .await;
    }
}
