//! Auto-on scheduler
//!
//! Guarantees that protection comes back on a fixed time after it was turned
//! off, and that this guarantee survives a restart.
//!
//! At most one delayed task exists at a time. Its deadline is persisted
//! through a [`TimerStore`] whenever it is armed or disarmed, and
//! [`AutoOnScheduler::recover`] replays an unexpired deadline at startup.
//!
//! ## Ordering
//!
//! Slot changes ([`schedule`](AutoOnScheduler::schedule),
//! [`cancel`](AutoOnScheduler::cancel)) are synchronous so that the caller's
//! order of requests is the order they take effect in. Persisting is a
//! separate async step that always writes the slot's *latest* record, so
//! concurrent persists converge on the final state.

use crate::traits::{TimerRecord, TimerStore};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest delay the scheduler will honor (one year)
///
/// Recovered deadlines further out than this are treated as corrupt clocks
/// and clamped.
pub const MAX_AUTO_ON_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Milliseconds since the Unix epoch
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Single-slot durable delayed task
///
/// Cheap to clone; clones share the same slot and store.
#[derive(Clone)]
pub struct AutoOnScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: Box<dyn TimerStore>,
    slot: Mutex<Slot>,
    // Serializes store writes
    io: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    record: Option<TimerRecord>,
    task: Option<JoinHandle<()>>,
}

impl Slot {
    fn clear(&mut self) -> bool {
        let was_armed = matches!(self.record, Some(TimerRecord::Pending { .. }));
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.record = Some(TimerRecord::Idle);
        was_armed
    }
}

impl std::fmt::Debug for AutoOnScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoOnScheduler")
            .field("deadline_ms", &self.deadline_ms())
            .finish()
    }
}

impl AutoOnScheduler {
    /// Create a scheduler persisting through `store`
    pub fn new(store: Box<dyn TimerStore>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                slot: Mutex::new(Slot::default()),
                io: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deadline of the armed timer, if any
    pub fn deadline_ms(&self) -> Option<i64> {
        match self.slot().record {
            Some(TimerRecord::Pending { deadline_ms }) => Some(deadline_ms),
            _ => None,
        }
    }

    /// Whether a delayed task is pending
    pub fn is_armed(&self) -> bool {
        self.deadline_ms().is_some()
    }

    /// Replace the slot with a task running `action` after `delay`
    ///
    /// Aborts any previous task. Does not persist; follow up with
    /// [`persist`](Self::persist), or use [`arm`](Self::arm).
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> i64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = delay.min(MAX_AUTO_ON_DELAY);
        let record = TimerRecord::after(now_ms(), delay);
        let deadline_ms = match record {
            TimerRecord::Pending { deadline_ms } => deadline_ms,
            TimerRecord::Idle => 0,
        };

        let mut slot = self.slot();
        slot.clear();
        let generation = slot.generation;
        slot.record = Some(record);

        let scheduler = self.clone();
        slot.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !scheduler.expire(generation) {
                return;
            }
            scheduler.persist().await;
            action.await;
        }));

        debug!("Auto-on armed for {:?} (deadline {})", delay, deadline_ms);
        deadline_ms
    }

    /// Abort the pending task, if any, and mark the slot idle
    ///
    /// Returns whether a timer was armed. Does not persist.
    pub fn cancel(&self) -> bool {
        let was_armed = self.slot().clear();
        if was_armed {
            debug!("Auto-on cancelled");
        }
        was_armed
    }

    /// Abort the in-process task but keep the persisted record
    ///
    /// Used at shutdown so the deadline is replayed on the next start.
    pub fn suspend(&self) {
        let mut slot = self.slot();
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        slot.generation += 1;
    }

    // Clears the slot if `generation` is still current
    fn expire(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation {
            return false;
        }
        // Drop our own handle without aborting; the action still has to run
        slot.task = None;
        slot.generation += 1;
        slot.record = Some(TimerRecord::Idle);
        true
    }

    /// Write the slot's latest record to the store
    ///
    /// Storage errors are logged and swallowed.
    pub async fn persist(&self) {
        let _io = self.inner.io.lock().await;
        let record = self.slot().record;
        let Some(record) = record else {
            return;
        };

        if let Err(e) = self.inner.store.save(record).await {
            warn!("Failed to persist auto-on timer: {}", e);
        }
    }

    /// Arm a timer running `action` after `delay` and persist its deadline
    pub async fn arm<F>(&self, delay: Duration, action: F) -> i64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline_ms = self.schedule(delay, action);
        self.persist().await;
        deadline_ms
    }

    /// Cancel the pending timer and persist "no pending timer"
    ///
    /// Returns whether a timer was armed.
    pub async fn disarm(&self) -> bool {
        let was_armed = self.cancel();
        self.persist().await;
        was_armed
    }

    /// Replay a persisted deadline after a restart
    ///
    /// - missing record: initialized to `0`
    /// - corrupt record: reset to `0`
    /// - elapsed deadline: `action` runs right away
    /// - storage errors: logged, nothing armed
    ///
    /// Returns the delay that was armed, if any.
    pub async fn recover<F>(&self, action: F) -> Option<Duration>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(e) = self.inner.store.check_or_init().await {
            warn!("Failed to initialize auto-on timer record: {}", e);
        }

        let record = match self.inner.store.load().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Auto-on timer record is corrupt, resetting");
                {
                    let mut slot = self.slot();
                    slot.record = Some(TimerRecord::Idle);
                }
                self.persist().await;
                return None;
            }
            Err(e) => {
                warn!("Failed to read auto-on timer record: {}", e);
                return None;
            }
        };

        let remaining = record.remaining(now_ms(), MAX_AUTO_ON_DELAY)?;
        info!("Recovering auto-on timer, {:?} remaining", remaining);
        self.arm(remaining, action).await;
        Some(remaining)
    }
}
