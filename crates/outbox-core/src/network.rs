//! Connectivity tracking with debounce and advisory reachability probes.
//!
//! The raw environment signal (browser-style online/offline events) is
//! optimistic: it can report online while the network path is unusable, and
//! it can flap. Two corrections are applied before anything observes the
//! state:
//!
//! - **Debounce**: a raw transition only becomes the reported state after it
//!   has held for the debounce window. The [`Debouncer`] is a pure state
//!   machine over timestamped events, so the time logic tests without real
//!   timers.
//! - **Probe veto**: a failed reachability probe shortly after a raw online
//!   transition holds the reported state offline, but only for a bounded
//!   grace period. Once the grace period expires the raw signal wins
//!   unconditionally, so a broken prober can never deadlock the queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::types::now_ms;

/// Tuning for debounce and probe corroboration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// How long a raw transition must hold before it is confirmed
    pub debounce_window: Duration,
    /// How long after a confirmed online transition a failed probe may hold
    /// the state offline
    pub probe_grace: Duration,
    /// Reported state before any signal arrives
    pub assume_online: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(300),
            probe_grace: Duration::from_secs(5),
            assume_online: true,
        }
    }
}

/// Debounces a stream of timestamped raw connectivity events.
///
/// A raw transition becomes confirmed once it has held for the window
/// without the opposite signal arriving. Pure: the caller supplies all
/// timestamps.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: i64,
    confirmed: bool,
    candidate: Option<Candidate>,
}

#[derive(Debug, Clone)]
struct Candidate {
    state: bool,
    since_ms: i64,
}

impl Debouncer {
    pub fn new(initial: bool, window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as i64,
            confirmed: initial,
            candidate: None,
        }
    }

    /// The current confirmed state
    pub fn state(&self) -> bool {
        self.confirmed
    }

    /// Feed a raw event. Returns `Some(new_state)` if this event confirms a
    /// transition, `None` otherwise.
    pub fn observe(&mut self, raw: bool, at_ms: i64) -> Option<bool> {
        if raw == self.confirmed {
            // Flap back to the confirmed state cancels any pending transition
            self.candidate = None;
            return None;
        }

        match &self.candidate {
            Some(c) if c.state == raw => {
                if at_ms - c.since_ms >= self.window_ms {
                    self.confirmed = raw;
                    self.candidate = None;
                    Some(raw)
                } else {
                    None
                }
            }
            _ => {
                if self.window_ms == 0 {
                    self.confirmed = raw;
                    self.candidate = None;
                    Some(raw)
                } else {
                    self.candidate = Some(Candidate {
                        state: raw,
                        since_ms: at_ms,
                    });
                    None
                }
            }
        }
    }

    /// Promote a pending candidate whose window has elapsed by `now_ms`.
    /// Returns `Some(new_state)` if a transition was confirmed.
    pub fn settle(&mut self, now_ms: i64) -> Option<bool> {
        if let Some(c) = &self.candidate {
            if now_ms - c.since_ms >= self.window_ms {
                self.confirmed = c.state;
                self.candidate = None;
                return Some(self.confirmed);
            }
        }
        None
    }
}

/// Handle identifying one subscription; pass back to `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct MonitorState {
    debouncer: Debouncer,
    /// When the current confirmed-online period began
    online_since_ms: Option<i64>,
    /// A probe failure is currently holding the state offline
    probe_vetoed: bool,
    /// Last state delivered to listeners
    reported: bool,
}

impl MonitorState {
    fn note_transition(&mut self, transition: Option<bool>, at_ms: i64) {
        if let Some(online) = transition {
            self.online_since_ms = if online { Some(at_ms) } else { None };
            // A confirmed transition starts a fresh corroboration cycle
            self.probe_vetoed = false;
        }
    }

    fn effective(&self, now_ms: i64, grace_ms: i64) -> bool {
        if !self.debouncer.state() {
            return false;
        }
        if self.probe_vetoed {
            if let Some(since) = self.online_since_ms {
                if now_ms - since < grace_ms {
                    return false;
                }
            }
            // Grace expired: the veto is advisory only, raw online wins
        }
        true
    }
}

/// Tracks online/offline status from environment signals, with debounced
/// transitions and multi-listener subscriptions.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: NetworkConfig,
    state: Mutex<MonitorState>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
}

impl NetworkMonitor {
    pub fn new(config: NetworkConfig) -> Self {
        let initial = config.assume_online;
        let debouncer = Debouncer::new(initial, config.debounce_window);
        Self {
            inner: Arc::new(MonitorInner {
                config,
                state: Mutex::new(MonitorState {
                    debouncer,
                    online_since_ms: if initial { Some(now_ms()) } else { None },
                    probe_vetoed: false,
                    reported: initial,
                }),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Current debounced connectivity snapshot
    pub fn is_online(&self) -> bool {
        self.is_online_at(now_ms())
    }

    /// Snapshot with an injected clock, for tests and replay
    pub fn is_online_at(&self, now_ms: i64) -> bool {
        let (effective, changed) = {
            let mut state = self.inner.state.lock();
            let transition = state.debouncer.settle(now_ms);
            state.note_transition(transition, now_ms);
            self.resolve(&mut state, now_ms)
        };
        if changed {
            self.notify(effective);
        }
        effective
    }

    /// Feed a raw environment connectivity signal (timestamped now)
    pub fn report_raw(&self, online: bool) {
        self.report_raw_at(online, now_ms());
    }

    /// Feed a raw signal with an explicit timestamp
    pub fn report_raw_at(&self, online: bool, at_ms: i64) {
        let (effective, changed) = {
            let mut state = self.inner.state.lock();
            let transition = state.debouncer.observe(online, at_ms);
            state.note_transition(transition, at_ms);
            self.resolve(&mut state, at_ms)
        };
        if changed {
            self.notify(effective);
        }
    }

    /// Feed a reachability probe outcome (timestamped now).
    ///
    /// Advisory only: a failure holds the state offline for at most the
    /// probe grace period after the last online transition.
    pub fn report_probe(&self, reachable: bool) {
        self.report_probe_at(reachable, now_ms());
    }

    /// Feed a probe outcome with an explicit timestamp
    pub fn report_probe_at(&self, reachable: bool, at_ms: i64) {
        let (effective, changed) = {
            let mut state = self.inner.state.lock();
            state.probe_vetoed = !reachable;
            self.resolve(&mut state, at_ms)
        };
        if changed {
            self.notify(effective);
        }
    }

    /// Register a listener for confirmed (debounced) transitions.
    ///
    /// The listener receives the new state. Multiple subscribers are
    /// supported; each `subscribe` returns a distinct id.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    /// Remove exactly one listener. Idempotent: unsubscribing an already
    /// removed id is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.listeners.lock().remove(&id.0);
    }

    /// Recompute the effective state and record whether it changed since the
    /// last delivery. Called with the state lock held.
    fn resolve(&self, state: &mut MonitorState, now_ms: i64) -> (bool, bool) {
        let grace_ms = self.inner.config.probe_grace.as_millis() as i64;
        let effective = state.effective(now_ms, grace_ms);
        let changed = effective != state.reported;
        state.reported = effective;
        (effective, changed)
    }

    fn notify(&self, online: bool) {
        debug!(online, "connectivity state changed");
        // Clone handles out of the lock so a listener may subscribe or
        // query the monitor without deadlocking
        let listeners: Vec<Listener> = self.inner.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(online);
        }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}
