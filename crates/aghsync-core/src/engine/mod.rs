//! Core reconciliation engine
//!
//! The ReconciliationEngine is responsible for:
//! - Polling the appliance on a fixed interval via ProtectionClient
//! - Tracking current (On/Off/Jammed) against target (On/Off)
//! - Writing requested states and arming/disarming the auto-on scheduler
//! - Emitting events whenever current or target changes
//!
//! ## Architecture
//!
//! ```text
//!   host: get() / request(want)
//!                │
//!                ▼
//!      ┌────────────────────────┐   poll / write   ┌──────────────────┐
//!      │ ReconciliationEngine   │─────────────────▶│ ProtectionClient │
//!      └────────────────────────┘                  └──────────────────┘
//!          │              │
//!          │ arm/disarm   │ EngineEvent
//!          ▼              ▼
//!   ┌────────────────┐  ┌────────────┐
//!   │ AutoOnScheduler│  │   Events   │
//!   │ (TimerStore)   │  │  (notify)  │
//!   └────────────────┘  └────────────┘
//! ```
//!
//! ## Failure handling
//!
//! Nothing here is retried. A failed read or write only moves `current` to
//! `Jammed`; `target` keeps its last valid value and the next tick is the
//! retry. Errors are logged, never returned to the host.

use crate::config::EndpointConfig;
use crate::device::{DeviceState, TriState};
use crate::error::Result;
use crate::scheduler::AutoOnScheduler;
use crate::traits::{ProtectionClient, TimerStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

/// Events emitted by the ReconciliationEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started polling
    Started {
        name: String,
    },

    /// `current` or `target` changed
    StateChanged {
        current: TriState,
        target: bool,
    },

    /// A poll failed and the device was reported unreachable
    PollFailed {
        error: String,
    },

    /// A poll failure right after a fresh login was not reported
    GlitchSuppressed {
        error: String,
    },

    /// Auto-on timer armed
    TimerArmed {
        deadline_ms: i64,
    },

    /// Pending auto-on timer cancelled by a manual "on"
    TimerCancelled,

    /// Auto-on timer expired and protection was turned back on
    TimerFired {
        success: bool,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Reconciliation engine for one accessory
///
/// Cheap to clone; clones drive the same device state.
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationEngine::new()`]
/// 2. Start with [`ReconciliationEngine::run()`] (recovers the auto-on timer, then polls)
/// 3. Host calls [`get`](Self::get) and [`request`](Self::request) at any time
/// 4. Engine stops on Ctrl-C or the shutdown signal
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// Remote control client
    client: Box<dyn ProtectionClient>,

    /// Auto-on timer
    scheduler: AutoOnScheduler,

    /// Current/target pair
    state: Mutex<DeviceState>,

    /// Post-login failure debounce
    debounce: Mutex<Debounce>,

    /// At most one outstanding read
    poll_in_flight: AtomicBool,

    /// Writes issued but not yet completed
    pending_writes: AtomicUsize,

    /// Orders writes to the appliance
    write_lock: tokio::sync::Mutex<()>,

    name: String,
    poll_interval: Duration,
    auto_on_delay: Option<Duration>,
    glitch_tolerance: u32,
    debug: bool,
    state_logging: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

#[derive(Debug, Default)]
struct Debounce {
    /// Client session epoch seen at the last completed poll
    seen_epoch: u64,
    /// Failures that may still be suppressed in the current login window
    allowance: u32,
}

/// Clears the in-flight flag even if the poll is cancelled
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tracks a write until it completes
struct PendingWrite<'a>(&'a AtomicUsize);

impl<'a> PendingWrite<'a> {
    fn begin(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("name", &self.inner.name)
            .field("client", &self.inner.client.client_name())
            .field("state", &self.state())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl ReconciliationEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `client`: remote control client for the endpoint's mode
    /// - `timer_store`: persistence for the auto-on deadline
    /// - `config`: endpoint configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        client: Box<dyn ProtectionClient>,
        timer_store: Box<dyn TimerStore>,
        config: &EndpointConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let inner = EngineInner {
            client,
            scheduler: AutoOnScheduler::new(timer_store),
            state: Mutex::new(DeviceState::new()),
            debounce: Mutex::new(Debounce::default()),
            poll_in_flight: AtomicBool::new(false),
            pending_writes: AtomicUsize::new(0),
            write_lock: tokio::sync::Mutex::new(()),
            name: config.name.clone(),
            poll_interval: config.poll_interval(),
            auto_on_delay: config.auto_on_delay(),
            glitch_tolerance: config.engine.glitch_tolerance,
            debug: config.debug,
            state_logging: config.state_logging,
            event_tx: tx,
        };

        Ok((
            Self {
                inner: Arc::new(inner),
            },
            rx,
        ))
    }

    /// Snapshot of current and target
    pub fn state(&self) -> DeviceState {
        *self.lock_state()
    }

    /// Last requested (or observed) protection flag
    pub fn target(&self) -> bool {
        self.lock_state().target
    }

    /// The auto-on scheduler
    pub fn scheduler(&self) -> &AutoOnScheduler {
        &self.inner.scheduler
    }

    /// Return the cached current state without waiting on the network
    ///
    /// Opportunistically starts a background refresh when called inside a
    /// Tokio runtime. The refresh is a no-op while another read is in flight.
    pub fn get(&self) -> TriState {
        let current = self.lock_state().current;

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let engine = self.clone();
            handle.spawn(async move {
                engine.poll().await;
            });
        }

        current
    }

    /// Fire-and-forget request for a new protection state
    ///
    /// `target` and the auto-on timer are updated before this returns; the
    /// remote write runs in the background.
    pub fn request(&self, want: bool) {
        self.request_with_timer(want, self.inner.auto_on_delay);
    }

    /// [`request`](Self::request) with an explicit auto-on delay
    pub fn request_with_timer(&self, want: bool, auto_on: Option<Duration>) {
        self.begin_set(want, auto_on);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.finish_set(want).await;
        });
    }

    /// Set protection and wait for the remote write
    ///
    /// Uses the configured auto-on delay. Returns the resulting `current`.
    pub async fn set(&self, want: bool) -> TriState {
        self.set_with_timer(want, self.inner.auto_on_delay).await
    }

    /// [`set`](Self::set) with an explicit auto-on delay
    ///
    /// Turning off with `Some(delay)` arms the auto-on timer; turning on
    /// cancels any pending timer.
    pub async fn set_with_timer(&self, want: bool, auto_on: Option<Duration>) -> TriState {
        self.begin_set(want, auto_on);
        self.finish_set(want).await
    }

    // Synchronous half of a set: intent and timer slot
    fn begin_set(&self, want: bool, auto_on: Option<Duration>) {
        self.inner.pending_writes.fetch_add(1, Ordering::AcqRel);
        self.update_state(|state| state.target = want);

        if want {
            if self.inner.scheduler.cancel() {
                self.emit_event(EngineEvent::TimerCancelled);
            }
        } else if let Some(delay) = auto_on {
            let deadline_ms = self.inner.scheduler.schedule(delay, self.auto_on_action());
            info!(
                "{}: protection will be re-enabled in {:?}",
                self.inner.name, delay
            );
            self.emit_event(EngineEvent::TimerArmed { deadline_ms });
        }
    }

    // Async half of a set: persist the timer, then write
    async fn finish_set(&self, want: bool) -> TriState {
        // Adopt the count taken in begin_set
        let pending = PendingWrite(&self.inner.pending_writes);
        self.inner.scheduler.persist().await;

        let _write = self.inner.write_lock.lock().await;
        let desired = self.target();
        if desired != want {
            debug!(
                "{}: request for {} superseded, writing {}",
                self.inner.name, want, desired
            );
        }

        let result = self.inner.client.write_protection(desired).await;
        drop(pending);

        match result {
            Ok(()) => {
                if self.inner.state_logging {
                    info!("{}: protection set to {}", self.inner.name, desired);
                }
                self.update_state(|state| {
                    if state.target == desired {
                        state.current = TriState::from_enabled(desired);
                    }
                })
                .current
            }
            Err(e) => {
                self.report_unreachable(&e);
                self.update_state(|state| state.current = TriState::Jammed)
                    .current
            }
        }
    }

    fn auto_on_action(&self) -> impl Future<Output = ()> + Send + 'static {
        let inner: Weak<EngineInner> = Arc::downgrade(&self.inner);
        async move {
            if let Some(inner) = inner.upgrade() {
                ReconciliationEngine { inner }.auto_on().await;
            }
        }
    }

    // Runs when the auto-on timer expires
    async fn auto_on(&self) {
        info!("{}: auto-on timer expired, enabling protection", self.inner.name);
        let pending = PendingWrite::begin(&self.inner.pending_writes);
        self.update_state(|state| state.target = true);

        let _write = self.inner.write_lock.lock().await;
        let result = self.inner.client.write_protection(true).await;
        drop(pending);

        let success = match result {
            Ok(()) => {
                self.update_state(|state| {
                    if state.target {
                        state.current = TriState::On;
                    }
                });
                true
            }
            Err(e) => {
                self.report_unreachable(&e);
                self.update_state(|state| state.current = TriState::Jammed);
                false
            }
        };

        self.emit_event(EngineEvent::TimerFired { success });
    }

    /// Read the appliance once and fold the result into the device state
    ///
    /// Returns `None` without touching the network when another read is
    /// already in flight.
    pub async fn poll(&self) -> Option<TriState> {
        if self.inner.poll_in_flight.swap(true, Ordering::AcqRel) {
            debug!("{}: read already in flight, skipping", self.inner.name);
            return None;
        }
        let _in_flight = InFlight(&self.inner.poll_in_flight);

        let result = self.inner.client.read_status().await;
        let epoch = self.inner.client.session_epoch();

        match result {
            Ok(enabled) => {
                self.note_success(epoch);
                if self.inner.state_logging {
                    info!(
                        "{}: protection is {}",
                        self.inner.name,
                        if enabled { "on" } else { "off" }
                    );
                }

                // A read that started before a pending write may still report
                // the old value; `current` takes it until the next tick, but
                // `target` keeps the request.
                let writes_pending = self.inner.pending_writes.load(Ordering::Acquire) > 0;
                let state = self.update_state(|state| {
                    state.current = TriState::from_enabled(enabled);
                    if !writes_pending {
                        state.target = enabled;
                    }
                });
                Some(state.current)
            }
            Err(e) => {
                if self.should_suppress(epoch) {
                    debug!(
                        "{}: ignoring read failure right after login: {}",
                        self.inner.name, e
                    );
                    self.emit_event(EngineEvent::GlitchSuppressed {
                        error: e.to_string(),
                    });
                    return Some(self.lock_state().current);
                }

                self.report_unreachable(&e);
                self.emit_event(EngineEvent::PollFailed {
                    error: e.to_string(),
                });
                Some(
                    self.update_state(|state| state.current = TriState::Jammed)
                        .current,
                )
            }
        }
    }

    fn note_success(&self, epoch: u64) {
        let mut debounce = self.lock_debounce();
        debounce.seen_epoch = epoch;
        debounce.allowance = 0;
    }

    // A new session epoch opens a window of `glitch_tolerance` suppressed failures
    fn should_suppress(&self, epoch: u64) -> bool {
        let mut debounce = self.lock_debounce();
        if epoch != debounce.seen_epoch {
            debounce.seen_epoch = epoch;
            debounce.allowance = self.inner.glitch_tolerance;
        }

        if debounce.allowance > 0 {
            debounce.allowance -= 1;
            true
        } else {
            false
        }
    }

    fn report_unreachable(&self, error: &crate::Error) {
        if self.inner.debug {
            warn!("{}: request failed: {}", self.inner.name, error);
        } else if !self.lock_state().current.is_jammed() {
            warn!("{}: appliance is offline or unreachable", self.inner.name);
        }
    }

    /// Run the engine until Ctrl-C
    ///
    /// Recovers any persisted auto-on timer, then polls on the configured
    /// interval.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires (or Ctrl-C when `None`)
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        if let Some(remaining) = self.inner.scheduler.recover(self.auto_on_action()).await {
            info!(
                "{}: resumed auto-on timer, {:?} remaining",
                self.inner.name, remaining
            );
        }

        self.emit_event(EngineEvent::Started {
            name: self.inner.name.clone(),
        });
        info!(
            "{}: polling {} client every {:?}",
            self.inner.name,
            self.inner.client.client_name(),
            self.inner.poll_interval
        );

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        };
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(self.inner.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    tokio::select! {
                        _ = self.poll() => {}
                        _ = &mut shutdown => break,
                    }
                }

                _ = &mut shutdown => break,
            }
        }

        info!("{}: shutdown signal received", self.inner.name);
        // Leave the persisted deadline in place for the next start
        self.inner.scheduler.suspend();
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_debounce(&self) -> MutexGuard<'_, Debounce> {
        self.inner.debounce.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Applies `f` and emits StateChanged if anything moved
    fn update_state(&self, f: impl FnOnce(&mut DeviceState)) -> DeviceState {
        let (before, after) = {
            let mut state = self.lock_state();
            let before = *state;
            f(&mut state);
            (before, *state)
        };

        if before != after {
            debug!(
                "{}: state {}/{} -> {}/{}",
                self.inner.name, before.current, before.target, after.current, after.target
            );
            self.emit_event(EngineEvent::StateChanged {
                current: after.current,
                target: after.target,
            });
        }

        after
    }

    fn emit_event(&self, event: EngineEvent) {
        if self.inner.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
