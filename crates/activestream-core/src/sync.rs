//! Coordination primitives shared by the pipeline workers
//!
//! - [`Event`]: level-triggered boolean with async wait (train trigger)
//! - [`Mailbox`]: single-slot, latest-value-wins hand-off (models, verdicts)
//! - [`StopToken`]: cooperative cancellation shared by every worker
//!
//! FIFO hand-off between stages uses bounded `tokio::sync::mpsc` channels;
//! the mailbox is deliberately a different discipline.

use crate::error::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

pub use tokio_util::sync::CancellationToken as StopToken;

/// Level-triggered event. Setting it twice is the same as setting it once.
#[derive(Debug, Default)]
pub struct Event {
    flag: AtomicBool,
    notify: Notify,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the event and wake every waiter
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Lower the event
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Atomically lower the event, returning whether it was raised
    pub fn consume(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Wait until the event is raised or the timeout elapses.
    /// Returns the event state afterwards.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `set` is not missed
        notified.as_mut().enable();
        if self.is_set() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.is_set()
    }
}

/// Single-slot mailbox. Publishing overwrites any unconsumed value.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing an unconsumed one. Returns true if a value was replaced.
    pub fn publish(&self, value: T) -> bool {
        let replaced = self.slot.lock().replace(value).is_some();
        self.notify.notify_one();
        replaced
    }

    /// Remove and return the current value, if any
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Whether a value is waiting
    pub fn is_full(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Take the value, waiting at most `timeout` for one to arrive
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(value) = self.take() {
            return Some(value);
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        self.take()
    }
}

impl<T: Clone> Mailbox<T> {
    /// Copy of the current value without consuming it
    pub fn peek(&self) -> Option<T> {
        self.slot.lock().clone()
    }
}

/// Sleep for `duration` unless stopped first. Returns true if stopped.
pub async fn sleep_or_stop(stop: &StopToken, duration: Duration) -> bool {
    tokio::select! {
        _ = stop.cancelled() => true,
        _ = tokio::time::sleep(duration) => stop.is_cancelled(),
    }
}

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Run `operation` until it succeeds, retrying transient failures with
/// exponential backoff. Returns `Ok(None)` if stopped while backing off.
pub async fn retry_transient<T, F, Fut>(
    stop: &StopToken,
    operation: &str,
    mut f: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_INITIAL_DELAY;
    loop {
        match f().await {
            Ok(value) => return Ok(Some(value)),
            Err(e) if e.is_transient() => {
                warn!(operation, error = %e, ?delay, "Transient failure, retrying");
                if sleep_or_stop(stop, delay).await {
                    return Ok(None);
                }
                delay = (delay * 2).min(RETRY_MAX_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}
