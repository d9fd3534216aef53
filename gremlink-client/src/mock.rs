//! In-memory transport and scripted server for tests.

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::transport::{Transport, TransportFactory};
use async_trait::async_trait;
use gremlink_protocol::{Decoder, Encoder, ProtocolVersion, Request, Response};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};

pub(crate) struct MockTransport {
    address: String,
    to_server: mpsc::UnboundedSender<Vec<u8>>,
    from_server: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    live: AtomicBool,
    disposed: AtomicBool,
    refuse_connect: AtomicBool,
    fail_writes: AtomicBool,
    /// When set, each write consumes one permit.
    write_gate: Option<Arc<Semaphore>>,
    pub(crate) pings: AtomicUsize,
    pub(crate) connects: AtomicUsize,
}

/// The far end of a [`MockTransport`].
pub(crate) struct MockServer {
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
    responses: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockServer {
    /// Waits for the next request frame and decodes it.
    pub(crate) async fn next_request(&mut self) -> (ProtocolVersion, Request) {
        let frame = self.requests.recv().await.expect("client hung up");
        Decoder::decode_request(&frame).expect("client sent an invalid frame")
    }

    pub(crate) fn reply(&self, response: &Response) {
        let bytes = Encoder::encode_response(response).expect("encodable response");
        let _ = self.responses.send(bytes);
    }

    pub(crate) fn reply_raw(&self, bytes: &[u8]) {
        let _ = self.responses.send(bytes.to_vec());
    }

    /// Ends the inbound stream, as if the server dropped the socket.
    pub(crate) fn hang_up(self) {
        drop(self);
    }
}

pub(crate) fn pair(address: &str) -> (Arc<MockTransport>, MockServer) {
    build(address, None)
}

/// A pair whose writes block until `gate` hands out permits.
pub(crate) fn gated_pair(address: &str, gate: Arc<Semaphore>) -> (Arc<MockTransport>, MockServer) {
    build(address, Some(gate))
}

fn build(address: &str, write_gate: Option<Arc<Semaphore>>) -> (Arc<MockTransport>, MockServer) {
    let (to_server, requests) = mpsc::unbounded_channel();
    let (responses, from_server) = mpsc::unbounded_channel();
    let transport = MockTransport {
        address: address.to_string(),
        to_server,
        from_server: Mutex::new(from_server),
        live: AtomicBool::new(false),
        disposed: AtomicBool::new(false),
        refuse_connect: AtomicBool::new(false),
        fail_writes: AtomicBool::new(false),
        write_gate,
        pings: AtomicUsize::new(0),
        connects: AtomicUsize::new(0),
    };
    (Arc::new(transport), MockServer { requests, responses })
}

impl MockTransport {
    pub(crate) fn refuse_connect(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Connect("refused".to_string()));
        }
        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, message: Vec<u8>) -> Result<(), ClientError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }
        if let Some(gate) = &self.write_gate {
            gate.acquire()
                .await
                .map_err(|_| ClientError::ConnectionClosed)?
                .forget();
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            self.live.store(false, Ordering::SeqCst);
            return Err(ClientError::WebSocket("broken pipe".to_string()));
        }
        self.to_server
            .send(message)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    async fn read(&self) -> Result<Vec<u8>, ClientError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }
        self.from_server
            .lock()
            .await
            .recv()
            .await
            .ok_or(ClientError::ConnectionClosed)
    }

    async fn ping(&self) -> Result<(), ClientError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.disposed.store(true, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Hands out fresh mock pairs and keeps the server ends for the test.
#[derive(Default)]
pub(crate) struct MockFactory {
    servers: SyncMutex<Vec<MockServer>>,
    transports: SyncMutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    pub(crate) fn created(&self) -> usize {
        self.transports.lock().len()
    }

    pub(crate) fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.transports.lock()[index].clone()
    }

    /// Removes the server end of the `index`-th transport.
    pub(crate) fn take_server(&self, index: usize) -> MockServer {
        let mut servers = self.servers.lock();
        assert!(index < servers.len(), "no server at {}", index);
        // Keep positions stable for later indices.
        let (_, placeholder) = build("placeholder", None);
        std::mem::replace(&mut servers[index], placeholder)
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, address: &str, _config: &ConnectionConfig) -> Arc<dyn Transport> {
        let (transport, server) = pair(address);
        self.servers.lock().push(server);
        self.transports.lock().push(transport.clone());
        transport
    }
}
