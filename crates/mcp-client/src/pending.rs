//! Thread-safe map from request id to a one-shot result channel.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use agentsdk_domain::error::{Error, Result};

use crate::protocol::JsonRpcResponse;

struct Inner {
    waiters: HashMap<String, oneshot::Sender<Result<JsonRpcResponse>>>,
    closed: bool,
}

/// Tracks in-flight requests by id so a reader task can deliver responses to
/// the caller that is waiting on them.
pub struct PendingTracker {
    inner: Mutex<Inner>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { waiters: HashMap::new(), closed: false }),
        }
    }

    /// Register a new pending call, returning the receiver half. Refuses a
    /// closed tracker or a duplicate id.
    pub fn add(&self, id: &str) -> Result<oneshot::Receiver<Result<JsonRpcResponse>>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::TransportClosed);
        }
        if inner.waiters.contains_key(id) {
            return Err(Error::Validation(format!("duplicate in-flight request id: {id}")));
        }
        let (tx, rx) = oneshot::channel();
        inner.waiters.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Deliver a result to the waiter registered for `id`, if any.
    pub fn deliver(&self, id: &str, result: Result<JsonRpcResponse>) {
        let waiter = self.inner.lock().waiters.remove(id);
        if let Some(tx) = waiter {
            let _ = tx.send(result);
        }
    }

    /// Drop the waiter for `id` without delivering a result.
    pub fn cancel(&self, id: &str) {
        self.inner.lock().waiters.remove(id);
    }

    /// Fail every pending call with `err`, but leave the tracker open for
    /// future `add` calls.
    pub fn flush(&self, err: &Error) {
        let waiters = std::mem::take(&mut self.inner.lock().waiters);
        for (_, tx) in waiters {
            let _ = tx.send(Err(clone_error(err)));
        }
    }

    /// Flush, then mark the tracker closed so further `add` calls fail.
    pub fn fail_all(&self, err: &Error) {
        self.flush(err);
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Default for PendingTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_error(err: &Error) -> Error {
    match err {
        Error::TransportClosed => Error::TransportClosed,
        Error::Timeout(s) => Error::Timeout(s.clone()),
        Error::Canceled => Error::Canceled,
        other => Error::Other(other.to_string()),
    }
}
