//! Deterministic collaborators for tests.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `testing` feature.
use crate::clock::{Clock, IdGenerator};
use crate::session::{SessionEvent, SessionEventSink};
use crate::sync::ThreadSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A [`Clock`] that only moves when told to.
///
/// Clones share the same time.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<ThreadSafe<SystemTime>>,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: SystemTime) -> Self {
        ManualClock {
            now: Arc::new(ThreadSafe::new(now)),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.update(|now| *now += by);
    }

    /// Sets the clock to `now`.
    pub fn set(&self, now: SystemTime) {
        self.now.set(now);
    }
}

impl Default for ManualClock {
    /// A clock reading one billion seconds after the Unix epoch.
    fn default() -> Self {
        ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_000_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

/// An [`IdGenerator`] producing `"<prefix>-1"`, `"<prefix>-2"`, ...
///
/// Clones share the same counter.
#[derive(Clone, Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: Arc<AtomicU64>,
}

impl SequentialIdGenerator {
    /// Creates a generator whose ids start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        SequentialIdGenerator {
            prefix: prefix.into(),
            next: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        SequentialIdGenerator::new("id")
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{n}", self.prefix)
    }
}

/// A [`SessionEventSink`] that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: ThreadSafe<Vec<SessionEvent>>,
}

impl RecordingSink {
    /// Events received so far, oldest first.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.get()
    }
}

impl SessionEventSink for RecordingSink {
    fn on_event(&self, event: &SessionEvent) {
        self.events.update(|events| events.push(event.clone()));
    }
}
