//! Autosave: tracks pending write operations and decides when a background
//! save should run, driven either by an operation-count threshold or by
//! wait/max-wait deadlines since the first pending op.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// `ops`: flush once this many ops have accumulated. `wait`: flush this
/// long after the first pending op if nothing else triggers it sooner.
/// `max_wait`: hard ceiling on how long an op can stay unflushed regardless
/// of further activity. Any field left `None` disables that trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutosavePolicy {
    pub ops: Option<u64>,
    pub wait: Option<Duration>,
    pub max_wait: Option<Duration>,
}

impl AutosavePolicy {
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Tracks accumulated ops since the last flush. Pure bookkeeping; callers
/// decide what a "flush" actually does.
pub struct AutosaveTracker {
    policy: AutosavePolicy,
    pending_ops: u64,
    first_pending_at: Option<Instant>,
}

impl AutosaveTracker {
    pub fn new(policy: AutosavePolicy) -> Self {
        Self {
            policy,
            pending_ops: 0,
            first_pending_at: None,
        }
    }

    pub fn record_op(&mut self) {
        if self.first_pending_at.is_none() {
            self.first_pending_at = Some(Instant::now());
        }
        self.pending_ops += 1;
    }

    pub fn has_pending(&self) -> bool {
        self.pending_ops > 0
    }

    pub fn pending_ops(&self) -> u64 {
        self.pending_ops
    }

    /// True if the ops-count threshold alone (no clock consulted) has been
    /// reached.
    pub fn should_flush_now(&self) -> bool {
        match self.policy.ops {
            Some(threshold) => self.pending_ops >= threshold,
            None => false,
        }
    }

    /// True if either `wait` or `max_wait` has elapsed since the first
    /// pending op.
    pub fn deadline_elapsed(&self) -> bool {
        let Some(since) = self.first_pending_at else {
            return false;
        };
        let elapsed = since.elapsed();
        self.policy.wait.is_some_and(|w| elapsed >= w) || self.policy.max_wait.is_some_and(|w| elapsed >= w)
    }

    /// The instant a background driver should next wake at, if any trigger
    /// other than the ops threshold is configured.
    pub fn next_deadline(&self) -> Option<Instant> {
        let since = self.first_pending_at?;
        [self.policy.wait, self.policy.max_wait]
            .into_iter()
            .flatten()
            .map(|d| since + d)
            .min()
    }

    pub fn reset(&mut self) {
        self.pending_ops = 0;
        self.first_pending_at = None;
    }
}

/// Background driver wrapping an [`AutosaveTracker`] behind a shared lock,
/// waking on whichever is sooner: the next deadline or a new op being
/// recorded. `flush` is invoked under the caller-supplied async closure,
/// typically the client facade's save-and-truncate-WAL routine.
pub struct AutosaveDriver {
    tracker: std::sync::Arc<Mutex<AutosaveTracker>>,
    notify: std::sync::Arc<tokio::sync::Notify>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl AutosaveDriver {
    pub fn spawn<F, Fut>(policy: AutosavePolicy, flush: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let tracker = std::sync::Arc::new(Mutex::new(AutosaveTracker::new(policy)));
        let notify = std::sync::Arc::new(tokio::sync::Notify::new());

        let task_tracker = tracker.clone();
        let task_notify = notify.clone();
        let handle = tokio::spawn(async move {
            loop {
                let wait_until = {
                    let guard = task_tracker.lock();
                    if guard.should_flush_now() || guard.deadline_elapsed() {
                        None
                    } else {
                        guard.next_deadline()
                    }
                };

                match wait_until {
                    None if { task_tracker.lock().has_pending() } => {
                        flush().await;
                        task_tracker.lock().reset();
                    }
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline.into()) => {}
                            _ = task_notify.notified() => {}
                        }
                    }
                    None => {
                        task_notify.notified().await;
                    }
                }
            }
        });

        Self {
            tracker,
            notify,
            handle: Some(handle),
        }
    }

    pub fn record_op(&self) {
        self.tracker.lock().record_op();
        self.notify.notify_one();
    }

    pub fn has_pending(&self) -> bool {
        self.tracker.lock().has_pending()
    }

    /// Aborts the background loop. Callers wanting a final flush should
    /// check [`Self::has_pending`] and flush explicitly before calling
    /// this, since an aborted task may be mid-sleep with pending ops.
    pub fn dispose(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
