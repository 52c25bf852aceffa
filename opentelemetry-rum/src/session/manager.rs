use crate::clock::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
use crate::session::{
    Session, SessionConfig, SessionEventKind, SessionEventPipeline, SessionStore,
};
use crate::sync::ThreadSafe;
use opentelemetry::{otel_debug, otel_info};
use rand::Rng;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Clone, Debug)]
struct CurrentSession {
    session: Session,
    sampled: bool,
}

/// Owns the current [`Session`] and rotates it when it expires.
///
/// [`SessionManager::get_session`] is the only operation that creates,
/// extends or replaces the session. It runs under a single lock, persists the
/// result and reports lifecycle transitions to the [`SessionEventPipeline`]
/// before returning, so transitions are observed in the order they happened.
/// [`SessionManager::peek_session`] reads the last result without waiting for
/// that lock.
///
/// A manager is meant to be built once at the application's composition
/// root and shared (behind an [`Arc`]) with the processors that stamp
/// telemetry.
pub struct SessionManager {
    sample_rate: f64,
    // Guards every transition of `current` and holds the active timeout.
    refresh: Mutex<Duration>,
    current: ThreadSafe<Option<CurrentSession>>,
    store: Option<SessionStore>,
    events: Arc<SessionEventPipeline>,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
}

impl SessionManager {
    /// Creates a [`SessionManagerBuilder`].
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    /// Returns the current session, creating or replacing it as needed.
    ///
    /// If no session exists, or the current one has expired, a new session is
    /// created; an expired session is first reported as ended and becomes the
    /// new session's `previous_id`. Otherwise the current session's expiry is
    /// pushed to `now + timeout`. Either way the result is persisted.
    pub fn get_session(&self) -> Session {
        self.refresh_current().session
    }

    /// Returns the current session without extending or replacing it.
    ///
    /// Returns `None` if no session has been created or restored yet. The
    /// result may already be superseded by a concurrent
    /// [`SessionManager::get_session`].
    pub fn peek_session(&self) -> Option<Session> {
        self.current.get().map(|current| current.session)
    }

    /// Returns the current session, only creating one if none exists.
    ///
    /// An existing session is returned as is, even if it has expired; this
    /// is the read used when stamping telemetry.
    pub fn current_session(&self) -> Session {
        self.current_state().session
    }

    /// Whether telemetry of the current session is kept.
    ///
    /// Decided once when a session is created or restored and kept for that
    /// session's lifetime.
    pub fn is_session_sampled(&self) -> bool {
        self.current_state().sampled
    }

    /// Sets the inactivity timeout, or restores the default of 30 minutes
    /// when `timeout` is `None`, then touches the session so it applies
    /// immediately.
    pub fn configure(&self, timeout: Option<Duration>) {
        {
            let mut current_timeout = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
            *current_timeout = timeout
                .unwrap_or(super::config::OTEL_RUM_SESSION_TIMEOUT_DEFAULT)
                .min(super::record::MAX_SESSION_TIMEOUT);
            otel_debug!(
                name: "SessionManager.Configured",
                timeout_in_secs = current_timeout.as_secs()
            );
        }
        self.get_session();
    }

    /// The pipeline this manager reports lifecycle transitions to.
    pub fn events(&self) -> &Arc<SessionEventPipeline> {
        &self.events
    }

    /// Commits any session write still waiting on the save interval.
    pub fn force_flush(&self) {
        if let Some(store) = &self.store {
            store.force_flush();
        }
    }

    fn current_state(&self) -> CurrentSession {
        match self.current.get() {
            Some(current) => current,
            None => self.refresh_current(),
        }
    }

    fn refresh_current(&self) -> CurrentSession {
        let timeout = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let (next, ended) = match self.current.get() {
            Some(current) if !current.session.is_expired_at(now) => {
                let next = CurrentSession {
                    session: current.session.touched(now, *timeout),
                    sampled: current.sampled,
                };
                (next, None)
            }
            previous => {
                let previous = previous.map(|current| current.session);
                let session = Session::new(
                    self.id_generator.new_id(),
                    previous.as_ref().map(|session| session.id().to_owned()),
                    now,
                    *timeout,
                );
                let next = CurrentSession {
                    sampled: self.sample(),
                    session,
                };
                otel_info!(
                    name: "SessionManager.SessionCreated",
                    session_id = next.session.id(),
                    previous_id = next.session.previous_id().unwrap_or_default(),
                    sampled = next.sampled
                );
                (next, Some(previous))
            }
        };

        self.current.set(Some(next.clone()));

        if let Some(store) = &self.store {
            match ended {
                Some(_) => store.save(&next.session),
                None => store.schedule_save(&next.session),
            }
        }

        if let Some(previous) = ended {
            if let Some(previous) = previous {
                self.events.add_event(&previous.ended(), SessionEventKind::End);
            }
            self.events.add_event(&next.session, SessionEventKind::Start);
        }

        drop(timeout);
        next
    }

    fn sample(&self) -> bool {
        if self.sample_rate <= 0.0 {
            false
        } else if self.sample_rate >= 1.0 {
            true
        } else {
            rand::rng().random::<f64>() < self.sample_rate
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sample_rate", &self.sample_rate)
            .field("current", &self.current)
            .field("store", &self.store)
            .finish()
    }
}

/// Builder for [`SessionManager`].
#[derive(Debug, Default)]
pub struct SessionManagerBuilder {
    config: Option<SessionConfig>,
    store: Option<SessionStore>,
    events: Option<Arc<SessionEventPipeline>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl SessionManagerBuilder {
    /// Uses `config` instead of [`SessionConfig::default`].
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Persists sessions to `store` and restores the last one from it.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Reports lifecycle transitions to `events` instead of a pipeline
    /// created from the config's queue size.
    pub fn with_event_pipeline(mut self, events: Arc<SessionEventPipeline>) -> Self {
        self.events = Some(events);
        self
    }

    /// Reads time from `clock` instead of the system clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Generates session ids with `id_generator` instead of random UUIDs.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Arc::new(id_generator));
        self
    }

    /// Builds the manager, restoring a persisted session if the store holds
    /// a complete one.
    ///
    /// A restored session keeps its own `previous_id` and emits no start
    /// event; it is rotated on the next access if it has expired meanwhile.
    pub fn build(self) -> SessionManager {
        let config = self.config.unwrap_or_default();
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(SessionEventPipeline::new(config.max_queue_size)));
        let manager = SessionManager {
            sample_rate: config.sample_rate,
            refresh: Mutex::new(config.session_timeout),
            current: ThreadSafe::new(None),
            store: self.store,
            events,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::default())),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(UuidIdGenerator::default())),
        };

        if let Some(session) = manager.store.as_ref().and_then(SessionStore::load) {
            otel_debug!(
                name: "SessionManager.SessionRestored",
                session_id = session.id()
            );
            let sampled = manager.sample();
            manager.current.set(Some(CurrentSession { session, sampled }));
        }
        manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, KeyValueStore};
    use crate::testing::{ManualClock, RecordingSink, SequentialIdGenerator};
    use std::thread;
    use std::time::UNIX_EPOCH;

    fn config(timeout: Duration, sample_rate: f64) -> SessionConfig {
        SessionConfig::builder()
            .with_session_timeout(timeout)
            .with_sample_rate(sample_rate)
            .with_max_queue_size(32)
            .build()
    }

    fn manager(clock: &ManualClock, timeout: Duration) -> SessionManager {
        SessionManager::builder()
            .with_config(config(timeout, 1.0))
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("session"))
            .build()
    }

    #[test]
    fn repeated_access_within_timeout_keeps_identity() {
        // Arrange
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::from_secs(60));

        // Act
        let mut sessions = Vec::new();
        for _ in 0..10 {
            sessions.push(manager.get_session());
            clock.advance(Duration::from_secs(5));
        }

        // Assert
        assert!(sessions.iter().all(|s| s.id() == "session-1"));
        assert!(sessions
            .windows(2)
            .all(|pair| pair[0].expire_time() <= pair[1].expire_time()));
        assert_eq!(
            sessions[9].expire_time(),
            sessions[9].start_time() + Duration::from_secs(45 + 60)
        );
        assert_eq!(manager.events().queued_len(), 1);
    }

    #[test]
    fn expired_session_is_chained_to_its_successor() {
        // Arrange
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::from_secs(60));
        let first = manager.get_session();

        // Act
        clock.advance(Duration::from_secs(60));
        let second = manager.get_session();

        // Assert
        assert_ne!(first.id(), second.id());
        assert_eq!(second.previous_id(), Some(first.id()));
        assert_eq!(second.start_time(), clock.now());

        let events = manager.events().queued_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].kind, SessionEventKind::End);
        assert_eq!(events[1].session.id(), first.id());
        assert_eq!(events[1].session.end_time(), Some(first.expire_time()));
        assert_eq!(events[1].session.duration(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn zero_timeout_rotates_on_every_access() {
        // Arrange
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::ZERO);

        // Act
        let mut sessions = Vec::new();
        for _ in 0..3 {
            sessions.push(manager.get_session());
            clock.advance(Duration::from_millis(1));
        }
        let sink = Arc::new(RecordingSink::default());
        manager.events().install(sink.clone());

        // Assert
        assert_eq!(sessions[0].previous_id(), None);
        assert_eq!(sessions[1].previous_id(), Some(sessions[0].id()));
        assert_eq!(sessions[2].previous_id(), Some(sessions[1].id()));
        assert_ne!(sessions[0].id(), sessions[1].id());
        assert_ne!(sessions[1].id(), sessions[2].id());

        let events = sink.events();
        let shape: Vec<(SessionEventKind, &str)> = events
            .iter()
            .map(|event| (event.kind, event.session.id()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (SessionEventKind::Start, "session-1"),
                (SessionEventKind::End, "session-1"),
                (SessionEventKind::Start, "session-2"),
                (SessionEventKind::End, "session-2"),
                (SessionEventKind::Start, "session-3"),
            ]
        );
        let times: Vec<_> = events
            .iter()
            .map(|event| match event.kind {
                SessionEventKind::Start => event.session.start_time(),
                SessionEventKind::End => event.session.end_time().unwrap(),
            })
            .collect();
        assert!(times.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn peek_never_creates_or_extends() {
        // Arrange
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::from_secs(60));
        assert_eq!(manager.peek_session(), None);
        let session = manager.get_session();

        // Act
        clock.advance(Duration::from_secs(120));
        let peeked = manager.peek_session();

        // Assert
        assert_eq!(peeked, Some(session));
        assert_eq!(manager.events().queued_len(), 1);
    }

    #[test]
    fn current_session_creates_only_when_missing() {
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::from_secs(60));

        let created = manager.current_session();
        clock.advance(Duration::from_secs(10));
        let existing = manager.current_session();

        assert_eq!(created, existing);
        assert_eq!(existing.expire_time(), created.expire_time());
    }

    #[test]
    fn configure_applies_new_timeout_immediately() {
        // Arrange
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::from_secs(60));
        let first = manager.get_session();
        clock.advance(Duration::from_secs(10));

        // Act
        manager.configure(Some(Duration::from_secs(600)));

        // Assert
        let session = manager.peek_session().unwrap();
        assert_eq!(session.id(), first.id());
        assert_eq!(session.timeout(), Duration::from_secs(600));
        assert_eq!(session.expire_time(), clock.now() + Duration::from_secs(600));
    }

    #[test]
    fn configure_without_timeout_restores_default() {
        let clock = ManualClock::default();
        let manager = manager(&clock, Duration::from_secs(60));

        manager.configure(None);

        let session = manager.peek_session().unwrap();
        assert_eq!(session.timeout(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn oversized_timeouts_do_not_overflow_expiry() {
        // Arrange
        let clock = ManualClock::default();
        let kv = InMemoryStore::new();
        let manager = SessionManager::builder()
            .with_config(config(Duration::from_secs(u64::MAX), 1.0))
            .with_store(SessionStore::new(Arc::new(kv.clone())))
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("session"))
            .build();

        // Act
        let created = manager.get_session();
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        manager.configure(Some(Duration::MAX));
        let touched = manager.get_session();

        // Assert
        assert_eq!(created.id(), touched.id());
        assert_eq!(touched.timeout(), crate::session::record::MAX_SESSION_TIMEOUT);
        assert_eq!(touched.expire_time(), clock.now() + touched.timeout());
        assert!(kv.get("otel-rum-session-id").is_some());
    }

    #[test]
    fn sessions_are_persisted_and_restored_without_chaining() {
        // Arrange
        let clock = ManualClock::default();
        let kv = InMemoryStore::new();
        let first_process = SessionManager::builder()
            .with_config(config(Duration::from_secs(60), 1.0))
            .with_store(SessionStore::new(Arc::new(kv.clone())))
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("first"))
            .build();
        let persisted = first_process.get_session();
        drop(first_process);

        // Act
        clock.advance(Duration::from_secs(30));
        let second_process = SessionManager::builder()
            .with_config(config(Duration::from_secs(60), 1.0))
            .with_store(SessionStore::new(Arc::new(kv)))
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("second"))
            .build();
        let restored_peek = second_process.peek_session();
        let restored = second_process.get_session();

        // Assert
        assert_eq!(restored_peek, Some(persisted.clone()));
        assert_eq!(restored.id(), persisted.id());
        assert_eq!(restored.previous_id(), None);
        assert_eq!(second_process.events().queued_len(), 0);
    }

    #[test]
    fn expired_restored_session_is_rotated_on_access() {
        // Arrange
        let clock = ManualClock::default();
        let kv = InMemoryStore::new();
        let store = SessionStore::new(Arc::new(kv.clone()));
        let stale = Session::new("stale", None, clock.now(), Duration::from_secs(60));
        store.save(&stale);
        clock.advance(Duration::from_secs(3_600));

        // Act
        let manager = SessionManager::builder()
            .with_config(config(Duration::from_secs(60), 1.0))
            .with_store(store)
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("session"))
            .build();
        let session = manager.get_session();

        // Assert
        assert_eq!(session.previous_id(), Some("stale"));
        let events = manager.events().queued_events();
        assert_eq!(events[0].kind, SessionEventKind::End);
        assert_eq!(events[0].session.id(), "stale");
        assert_eq!(
            kv.get(crate::session::store::SESSION_ID_KEY)
                .and_then(|v| v.as_text().map(str::to_owned)),
            Some(session.id().to_owned())
        );
    }

    #[test]
    fn sample_rate_bounds_are_deterministic() {
        let clock = ManualClock::default();
        let never = SessionManager::builder()
            .with_config(config(Duration::from_secs(60), 0.0))
            .with_clock(clock.clone())
            .build();
        let always = SessionManager::builder()
            .with_config(config(Duration::from_secs(60), 1.0))
            .with_clock(clock)
            .build();

        assert!(!never.is_session_sampled());
        assert!(always.is_session_sampled());
    }

    #[test]
    fn sampling_decision_is_stable_for_a_session() {
        // Arrange
        let clock = ManualClock::default();
        let manager = SessionManager::builder()
            .with_config(config(Duration::from_secs(60), 0.5))
            .with_clock(clock.clone())
            .build();
        let decision = manager.is_session_sampled();

        // Act & Assert
        for _ in 0..50 {
            clock.advance(Duration::from_secs(1));
            manager.get_session();
            assert_eq!(manager.is_session_sampled(), decision);
        }
    }

    #[test]
    fn concurrent_access_creates_a_single_session() {
        // Arrange
        let manager = Arc::new(
            SessionManager::builder()
                .with_config(config(Duration::from_secs(3_600), 1.0))
                .with_clock(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1)))
                .build(),
        );

        // Act
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|_| manager.get_session().id().to_owned())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let ids: Vec<String> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        // Assert
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(manager.events().queued_len(), 1);
    }
}
