//! Coordination primitives: commit-timestamp computation, commit-wait, the
//! async single-writer lock every mutating client path runs inside, and an
//! in-memory lease/lock provider for embedders that need named exclusion
//! beyond the in-process writer lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use vectra_core::clock::{Clock, Millis};

pub use vectra_core::clock::{FixedClock, OffsetClock, SystemClock};

/// `commitTs = max(prepareTs, lastCommittedTs + delta, now())`.
pub fn compute_commit_ts(clock: &dyn Clock, prepare_ts: Millis, last_committed_ts: Millis, delta_ms: Millis) -> Millis {
    prepare_ts.max(last_committed_ts + delta_ms).max(clock.now_ms())
}

/// Spins with small sleeps until `now() > commit_ts + epsilon_ms`, giving
/// external consistency to any reader using the same clock thereafter.
/// `epsilon_ms <= 0` disables commit-wait entirely.
pub async fn commit_wait(clock: &dyn Clock, commit_ts: Millis, epsilon_ms: Millis) {
    if epsilon_ms <= 0 {
        return;
    }
    while clock.now_ms() <= commit_ts + epsilon_ms {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// An asynchronous mutex serializing every write path (upsert/remove/
/// set-meta/save) so WAL records land in the exact order their exclusive
/// section ran, and so a save observes a consistent store snapshot.
#[derive(Default)]
pub struct WriterLock {
    inner: tokio::sync::Mutex<()>,
}

impl WriterLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run_exclusive<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.inner.lock().await;
        f().await
    }
}

/// An issued lease: the epoch that owns it and the millisecond timestamp it
/// expires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub epoch: u64,
    pub until: Millis,
}

struct LeaseEntry {
    epoch: u64,
    until: Millis,
    holder: String,
}

/// In-memory named lease provider. Epochs increase monotonically per name;
/// an expired lease is reacquirable by anyone, with a strictly higher
/// epoch than whatever was issued before.
pub struct LeaseProvider {
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<String, LeaseEntry>>,
}

impl LeaseProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a new lease for `name` if it's unheld or expired.
    pub fn acquire(&self, name: &str, ttl_ms: Millis, holder: &str) -> Option<Lease> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let next_epoch = match state.get(name) {
            Some(entry) if entry.until > now => return None,
            Some(entry) => entry.epoch + 1,
            None => 1,
        };
        let until = now + ttl_ms;
        state.insert(
            name.to_string(),
            LeaseEntry {
                epoch: next_epoch,
                until,
                holder: holder.to_string(),
            },
        );
        Some(Lease { epoch: next_epoch, until })
    }

    /// Extends the lease's expiry, only if `epoch` still owns it.
    pub fn renew(&self, name: &str, epoch: u64, ttl_ms: Millis) -> Option<Lease> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let entry = state.get_mut(name)?;
        if entry.epoch != epoch {
            return None;
        }
        entry.until = now + ttl_ms;
        Some(Lease {
            epoch: entry.epoch,
            until: entry.until,
        })
    }

    /// Clears the lease, only if `epoch` still owns it.
    pub fn release(&self, name: &str, epoch: u64) {
        let mut state = self.state.lock();
        if let Some(entry) = state.get(name) {
            if entry.epoch == epoch {
                state.remove(name);
            }
        }
    }

    /// Current holder name, for diagnostics; `None` if unheld or expired.
    pub fn holder(&self, name: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let state = self.state.lock();
        state.get(name).filter(|e| e.until > now).map(|e| e.holder.clone())
    }
}
