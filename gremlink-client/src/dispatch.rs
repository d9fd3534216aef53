//! Request dispatch and response correlation.
//!
//! Callers enqueue encoded requests on a bounded queue drained by the write
//! loop. The read loop decodes every inbound frame and routes it to the
//! pending entry carrying the same request id. A 407 challenge is answered
//! here, without involving the caller.

use crate::config::{ConnectionConfig, Credentials};
use crate::error::ClientError;
use crate::pending::{Fragment, PendingGuard, PendingTable, RequestState};
use crate::transport::Transport;
use gremlink_protocol::{
    Bindings, Decoder, Encoder, Outcome, ProtocolVersion, Request, RequestIdSource, Response,
    StatusCode, StatusError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::Instant;

/// Result of one request: the serialized `result.data` of every data frame,
/// in arrival order. A 204 No Content frame contributes no element.
pub type ResultFrames = Vec<Vec<u8>>;

/// An encoded request waiting for the write loop.
struct Outbound {
    id: String,
    frame: Vec<u8>,
}

pub struct Dispatcher {
    version: ProtocolVersion,
    credentials: Option<Credentials>,
    request_timeout: Duration,
    write_wait: Duration,
    ids: Arc<dyn RequestIdSource>,
    pending: Arc<PendingTable>,
    outbound: mpsc::Sender<Outbound>,
    /// Receiving end of the outbound queue, handed to whichever write loop is
    /// running. Frames whose caller stopped waiting are skipped, never sent.
    queue: Mutex<mpsc::Receiver<Outbound>>,
    errors: mpsc::Sender<ClientError>,
}

impl Dispatcher {
    pub fn new(
        config: &ConnectionConfig,
        ids: Arc<dyn RequestIdSource>,
        errors: mpsc::Sender<ClientError>,
    ) -> Self {
        let (outbound, queue) = mpsc::channel(config.concurrency.max(1));
        Self {
            version: config.protocol_version,
            credentials: config.credentials.clone(),
            request_timeout: config.request_timeout,
            write_wait: config.write_wait,
            ids,
            pending: Arc::new(PendingTable::new()),
            outbound,
            queue: Mutex::new(queue),
            errors,
        }
    }

    pub fn pending(&self) -> &Arc<PendingTable> {
        &self.pending
    }

    /// Number of encoded requests waiting for the write loop.
    pub fn queued(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }

    /// Sends a script and waits for its complete result.
    ///
    /// Fails fast with `Disposed` when the transport is gone; nothing is
    /// queued in that case. Queueing and waiting share one `request_timeout`
    /// deadline, and both end with `ConnectionClosed` once the connection
    /// aborts pending requests. The first error fragment ends the drain.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        gremlin: &str,
        bindings: Bindings,
        rebindings: HashMap<String, String>,
    ) -> Result<ResultFrames, ClientError> {
        if transport.is_disposed() {
            return Err(ClientError::Disposed);
        }

        let request =
            Encoder::build_eval_request(self.ids.as_ref(), gremlin, bindings, rebindings);
        let frame = Encoder::encode_request(&request, self.version)?;
        let id = request.request_id;

        // Register before the frame can reach the wire.
        let mut done = self.pending.register(&id);
        let _guard = PendingGuard::new(self.pending.clone(), id.clone());
        let deadline = Instant::now() + self.request_timeout;

        tracing::debug!("Queueing request id={}", id);
        let outbound = Outbound {
            id: id.clone(),
            frame,
        };
        let queued = tokio::time::timeout_at(deadline, async {
            tokio::select! {
                sent = self.outbound.send(outbound) => {
                    sent.map_err(|_| ClientError::ConnectionClosed)
                }
                // Nothing was sent yet, so the notifier only resolves when
                // it is dropped by an abort.
                _ = &mut done => Err(ClientError::ConnectionClosed),
            }
        })
        .await;
        match queued {
            Err(_) => {
                tracing::warn!("Request id={} not queued within {:?}", id, self.request_timeout);
                return Err(ClientError::Timeout);
            }
            Ok(result) => result?,
        }

        match tokio::time::timeout_at(deadline, done).await {
            Err(_) => {
                tracing::warn!("Request id={} timed out after {:?}", id, self.request_timeout);
                Err(ClientError::Timeout)
            }
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Ok(Ok(())) => {
                let fragments = self.pending.take(&id).unwrap_or_default();
                drain(fragments)
            }
        }
    }

    /// Drains the outbound queue into the transport until shutdown.
    ///
    /// Frames of requests nobody waits for any more (timed out, or aborted
    /// by a broken connection) are discarded. A write failure ends the loop
    /// with that error; the caller decides what happens to the connection.
    pub async fn write_loop(
        &self,
        transport: Arc<dyn Transport>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ClientError> {
        let mut queue = tokio::select! {
            biased;
            _ = shutdown.recv() => return Ok(()),
            queue = self.queue.lock() => queue,
        };
        tracing::debug!("Write loop started for {}", transport.address());

        loop {
            let outbound = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!("Write loop received shutdown");
                    return Ok(());
                }
                outbound = queue.recv() => match outbound {
                    Some(outbound) => outbound,
                    None => return Ok(()),
                },
            };

            if !self.pending.is_awaiting(&outbound.id) {
                tracing::debug!("Discarding stale request id={}", outbound.id);
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!("Write loop received shutdown mid-write");
                    return Ok(());
                }
                written = transport.write(outbound.frame) => written?,
            }
        }
    }

    /// Reads, decodes and routes inbound frames until shutdown.
    ///
    /// Frames that fail to decode are reported and skipped. A transport read
    /// failure ends the loop with that error.
    pub async fn read_loop(
        &self,
        transport: Arc<dyn Transport>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ClientError> {
        tracing::debug!("Read loop started for {}", transport.address());

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!("Read loop received shutdown");
                    return Ok(());
                }
                frame = transport.read() => frame?,
            };

            match Decoder::decode_response(&frame) {
                Ok(response) => self.route(response).await,
                Err(e) => {
                    tracing::warn!("Failed to decode response: {}", e);
                    self.report(e.into());
                }
            }
        }
    }

    async fn route(&self, response: Response) {
        let Some(id) = response.request_id.clone() else {
            tracing::warn!(
                "Dropping response without request id (status {})",
                response.code()
            );
            return;
        };

        let outcome = response.outcome();
        let terminal = outcome.is_terminal();
        let fragment = match outcome {
            Outcome::AuthRequired => {
                self.authenticate(&id).await;
                return;
            }
            Outcome::Partial(data) | Outcome::Final(data) => Some(Ok(data)),
            Outcome::NoContent => None,
            Outcome::Failed(err) => Some(Err(ClientError::Server(err))),
        };

        if !self.pending.push(&id, fragment, terminal) {
            tracing::debug!("Dropping response for unknown request id={}", id);
        }
    }

    /// Answers a 407 challenge by sending credentials under the same id.
    async fn authenticate(&self, id: &str) {
        match self.pending.begin_auth(id) {
            None => {
                tracing::debug!("Dropping auth challenge for unknown request id={}", id);
                return;
            }
            Some(RequestState::AwaitingResult) => {}
            Some(_) => {
                // Challenged again after answering: the credentials were not accepted.
                self.fail(
                    id,
                    ClientError::Server(StatusError::new(
                        StatusCode::AuthenticationRequired,
                        "authentication was not accepted",
                    )),
                );
                return;
            }
        }

        let Some(credentials) = &self.credentials else {
            tracing::warn!("Server requires authentication for id={}", id);
            self.fail(id, ClientError::NoCredentials);
            return;
        };

        let request = Request::authentication(id, &credentials.username, &credentials.password);
        let frame = match Encoder::encode_request(&request, self.version) {
            Ok(frame) => frame,
            Err(e) => {
                self.fail(id, e.into());
                return;
            }
        };
        let outbound = Outbound {
            id: id.to_string(),
            frame,
        };

        tracing::debug!("Answering auth challenge for id={}", id);
        match tokio::time::timeout(self.write_wait, self.outbound.send(outbound)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => self.fail(id, ClientError::ConnectionClosed),
            Err(_) => self.fail(id, ClientError::Timeout),
        }
    }

    fn fail(&self, id: &str, err: ClientError) {
        self.pending.push(id, Some(Err(err)), true);
    }

    /// Forwards a connection-wide error to the error sink without blocking.
    pub fn report(&self, err: ClientError) {
        if let Err(e) = self.errors.try_send(err) {
            tracing::debug!("Error sink unavailable, dropping error: {}", e);
        }
    }
}

fn drain(fragments: Vec<Fragment>) -> Result<ResultFrames, ClientError> {
    let mut frames = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        frames.push(serde_json::to_vec(&fragment?)?);
    }
    Ok(frames)
}
