//! Pending-result table.
//!
//! Correlates inbound fragments with the callers waiting on them. The read
//! loop is the only writer of fragments; the waiting caller is the only one
//! that removes its entry.

use crate::error::ClientError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// One protocol fragment: result data or the error that ends the request.
pub type Fragment = Result<Value, ClientError>;

/// Where an in-flight request stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Dispatched; zero or more partial fragments received.
    AwaitingResult,
    /// The server answered 407 and an authentication envelope was sent
    /// under the same identifier.
    AwaitingAuth,
    /// Terminal fragment received; caller has been notified.
    Ready,
}

#[derive(Debug)]
struct PendingEntry {
    fragments: Vec<Fragment>,
    notify: Option<oneshot::Sender<()>>,
    state: RequestState,
}

#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns the receiver signalled once its
    /// terminal fragment arrives.
    pub fn register(&self, id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            fragments: Vec::new(),
            notify: Some(tx),
            state: RequestState::AwaitingResult,
        };
        if self.entries.lock().insert(id.to_string(), entry).is_some() {
            tracing::warn!("Replaced pending entry for duplicate request id={}", id);
        }
        rx
    }

    /// Appends a fragment (if any) and, when `terminal`, notifies the caller.
    ///
    /// Returns false when no request with this id is pending.
    pub fn push(&self, id: &str, fragment: Option<Fragment>, terminal: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if entry.state == RequestState::Ready {
            tracing::warn!("Dropping fragment for already completed request id={}", id);
            return true;
        }

        if let Some(fragment) = fragment {
            entry.fragments.push(fragment);
        }
        if terminal {
            entry.state = RequestState::Ready;
            if let Some(tx) = entry.notify.take() {
                let _ = tx.send(());
            }
        }
        true
    }

    /// Moves a request into `AwaitingAuth`, returning its previous state.
    pub fn begin_auth(&self, id: &str) -> Option<RequestState> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id)?;
        let previous = entry.state;
        if previous == RequestState::AwaitingResult {
            entry.state = RequestState::AwaitingAuth;
        }
        Some(previous)
    }

    pub fn state(&self, id: &str) -> Option<RequestState> {
        self.entries.lock().get(id).map(|e| e.state)
    }

    /// Removes the entry and returns its fragments in arrival order.
    pub fn take(&self, id: &str) -> Option<Vec<Fragment>> {
        self.entries.lock().remove(id).map(|e| e.fragments)
    }

    pub fn remove(&self, id: &str) {
        self.entries.lock().remove(id);
    }

    /// Wakes every waiting caller without a result. Entries stay until their
    /// callers remove them.
    pub fn abort_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let mut woken = 0;
        for entry in entries.values_mut() {
            if entry.notify.take().is_some() {
                woken += 1;
            }
        }
        woken
    }

    /// Whether a caller is still waiting on `id`. False once the request
    /// completed, was aborted, or its caller went away.
    pub fn is_awaiting(&self, id: &str) -> bool {
        self.entries
            .lock()
            .get(id)
            .is_some_and(|e| e.notify.is_some())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Removes a request's entry when the waiting caller goes away, including
/// when its future is dropped mid-wait.
pub(crate) struct PendingGuard {
    table: Arc<PendingTable>,
    id: String,
}

impl PendingGuard {
    pub(crate) fn new(table: Arc<PendingTable>, id: String) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_terminal_fragment_notifies() {
        let table = PendingTable::new();
        let rx = table.register("a");

        assert!(table.push("a", Some(Ok(json!(1))), false));
        assert!(table.push("a", Some(Ok(json!(2))), false));
        assert_eq!(table.state("a"), Some(RequestState::AwaitingResult));
        assert!(table.push("a", Some(Ok(json!(3))), true));
        assert_eq!(table.state("a"), Some(RequestState::Ready));

        rx.await.unwrap();
        let fragments: Vec<Value> = table
            .take("a")
            .unwrap()
            .into_iter()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(fragments, vec![json!(1), json!(2), json!(3)]);
        assert!(!table.contains("a"));
    }

    #[test]
    fn test_unknown_id_is_not_created() {
        let table = PendingTable::new();
        assert!(!table.push("ghost", Some(Ok(json!(1))), true));
        assert!(table.is_empty());
    }

    #[test]
    fn test_fragment_after_completion_is_dropped() {
        let table = PendingTable::new();
        let _rx = table.register("a");
        table.push("a", Some(Ok(json!(1))), true);
        table.push("a", Some(Ok(json!(2))), true);
        assert_eq!(table.take("a").unwrap().len(), 1);
    }

    #[test]
    fn test_begin_auth_transitions_once() {
        let table = PendingTable::new();
        let _rx = table.register("a");

        assert_eq!(table.begin_auth("a"), Some(RequestState::AwaitingResult));
        assert_eq!(table.state("a"), Some(RequestState::AwaitingAuth));
        assert_eq!(table.begin_auth("a"), Some(RequestState::AwaitingAuth));
        assert_eq!(table.begin_auth("missing"), None);
    }

    #[tokio::test]
    async fn test_abort_all_wakes_waiters() {
        let table = PendingTable::new();
        let rx1 = table.register("a");
        let rx2 = table.register("b");

        assert_eq!(table.abort_all(), 2);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_is_awaiting_until_completed_or_aborted() {
        let table = PendingTable::new();
        let _a = table.register("a");
        let _b = table.register("b");
        assert!(table.is_awaiting("a"));
        assert!(!table.is_awaiting("missing"));

        table.push("a", Some(Ok(json!(1))), true);
        assert!(!table.is_awaiting("a"));
        assert!(table.is_awaiting("b"));

        table.abort_all();
        assert!(!table.is_awaiting("b"));
        assert!(table.contains("b"));
    }

    #[test]
    fn test_guard_removes_entry() {
        let table = Arc::new(PendingTable::new());
        let _rx = table.register("a");
        {
            let _guard = PendingGuard::new(table.clone(), "a".to_string());
        }
        assert!(!table.contains("a"));
    }
}
