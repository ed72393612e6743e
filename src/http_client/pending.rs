//! HTTP client - list of in-flight cancellable requests.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identity of a request, used to detect superseded calls.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PendingKey(String);

impl PendingKey {
    /// Build key from request URL (as passed by the caller) and HTTP method.
    #[must_use]
    pub fn new(url: &str, method: &http::Method) -> Self {
        Self(format!("{url}&{}", method.as_str().to_ascii_lowercase()))
    }

    /// Key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Single in-flight request.
#[derive(Debug)]
struct PendingRecord {
    key: PendingKey,
    id: u64,
    cancel: CancellationToken,
}

/// Registration handle owned by the request a record belongs to.
///
/// Dropping the ticket removes its record, whether the request finished or was abandoned.
#[derive(Debug)]
pub(crate) struct PendingTicket<'a> {
    list: &'a PendingRequests,
    key: PendingKey,
    id: u64,
    token: CancellationToken,
}

impl PendingTicket<'_> {
    /// Token cancelled when a newer request with the same key is registered.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for PendingTicket<'_> {
    fn drop(&mut self) {
        self.list.complete(&self.key, self.id);
    }
}

/// List of requests currently in flight.
///
/// Holds at most one record per [`PendingKey`].
#[derive(Debug, Default)]
pub struct PendingRequests {
    records: Mutex<Vec<PendingRecord>>,
    next_id: AtomicU64,
}

impl PendingRequests {
    /// Create empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and drop every record with the same key, then register a new one.
    ///
    /// Both steps happen under a single lock.
    pub(crate) fn supersede(&self, key: &PendingKey) -> PendingTicket<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut records = self.records.lock();
        records.retain(|rec| {
            if rec.key == *key {
                debug!(key = key.as_str(), id = rec.id, "cancelling superseded request");
                rec.cancel.cancel();
                false
            } else {
                true
            }
        });
        records.push(PendingRecord {
            key: key.clone(),
            id,
            cancel: token.clone(),
        });
        drop(records);
        PendingTicket {
            list: self,
            key: key.clone(),
            id,
            token,
        }
    }

    /// Drop record after its request has completed, without cancelling it.
    ///
    /// Records registered later under the same key are left untouched.
    fn complete(&self, key: &PendingKey, id: u64) {
        self.records
            .lock()
            .retain(|rec| !(rec.key == *key && rec.id == id));
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no requests are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Whether a request with this key is in flight.
    #[must_use]
    pub fn contains(&self, key: &PendingKey) -> bool {
        self.records.lock().iter().any(|rec| rec.key == *key)
    }
}
