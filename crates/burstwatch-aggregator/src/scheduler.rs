use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

/// Identifies a single-shot timer. At most one timer is live per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Debounced flush of the burst with this identity key.
    Flush(String),
    /// Post-flush eviction of the burst with this identity key.
    Evict(String),
}

pub type TimerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Delayed single-shot execution keyed by [`TimerKey`].
///
/// Scheduling a key that already has a live timer cancels the old timer
/// first. Cancellation is best-effort: a timer that has already elapsed runs
/// to completion, so tasks must tolerate firing after they were superseded.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule_once(&self, key: TimerKey, delay: Duration, task: TimerTask);
    fn cancel(&self, key: &TimerKey);
}

struct ArmedTimer {
    id: u64,
    handle: AbortHandle,
}

type TimerMap = HashMap<TimerKey, ArmedTimer>;

/// [`Scheduler`] backed by `tokio::spawn` + `tokio::time::sleep`.
#[derive(Default)]
pub struct TokioScheduler {
    timers: Arc<Mutex<TimerMap>>,
    next_id: AtomicU64,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have not elapsed or been cancelled yet.
    pub fn armed(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, key: TimerKey, delay: Duration, task: TimerTask) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let slot = key.clone();

        // Held across the spawn so a zero-delay timer cannot observe the map
        // before its own entry is in it.
        let mut map = lock(&self.timers);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = lock(&timers);
                if map.get(&slot).is_some_and(|armed| armed.id == id) {
                    map.remove(&slot);
                }
            }
            // Detached: once elapsed, the timer can no longer be cancelled.
            tokio::spawn(task);
        })
        .abort_handle();

        if let Some(previous) = map.insert(key, ArmedTimer { id, handle }) {
            previous.handle.abort();
        }
    }

    fn cancel(&self, key: &TimerKey) {
        if let Some(armed) = lock(&self.timers).remove(key) {
            armed.handle.abort();
        }
    }
}

fn lock(timers: &Mutex<TimerMap>) -> MutexGuard<'_, TimerMap> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}
