use crate::session::Session;
use crate::storage::{KeyValueStore, StoredValue, WriteBatch};
use opentelemetry::{otel_debug, otel_warn};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) const SESSION_ID_KEY: &str = "otel-rum-session-id";
pub(crate) const SESSION_PREVIOUS_ID_KEY: &str = "otel-rum-session-previous-id";
pub(crate) const SESSION_START_TIME_KEY: &str = "otel-rum-session-start-time";
pub(crate) const SESSION_EXPIRE_TIME_KEY: &str = "otel-rum-session-expire-time";
pub(crate) const SESSION_TIMEOUT_KEY: &str = "otel-rum-session-timeout";

/// Default interval between scheduled saves.
pub(crate) const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Persists the most recent [`Session`] so that identity survives a process
/// restart within the session timeout.
///
/// [`SessionStore::save`] writes immediately. [`SessionStore::schedule_save`]
/// is meant for hot paths: the first call commits synchronously and starts a
/// background thread; later calls only replace the pending record, which the
/// thread commits once per save interval if it differs from the last one
/// written.
pub struct SessionStore {
    shared: Arc<Shared>,
    save_interval: Duration,
    worker: Mutex<Option<Worker>>,
}

struct Shared {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<SaveState>,
}

#[derive(Default)]
struct SaveState {
    pending: Option<Session>,
    last_saved: Option<Session>,
}

struct Worker {
    stop: SyncSender<()>,
    handle: JoinHandle<()>,
}

impl SessionStore {
    /// Creates a store writing to `store` with the default save interval.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SessionStore::builder(store).build()
    }

    /// Creates a [`SessionStoreBuilder`] writing to `store`.
    pub fn builder(store: Arc<dyn KeyValueStore>) -> SessionStoreBuilder {
        SessionStoreBuilder {
            store,
            save_interval: DEFAULT_SAVE_INTERVAL,
        }
    }

    /// Writes `session` now, superseding any pending scheduled save.
    pub fn save(&self, session: &Session) {
        let mut state = self.shared.lock_state();
        state.pending = None;
        self.shared.commit(&mut state, session.clone());
    }

    /// Records `session` for the next scheduled commit.
    ///
    /// When no save worker is running the record is committed immediately
    /// and a worker is started for subsequent calls.
    pub fn schedule_save(&self, session: &Session) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.lock_state().pending = Some(session.clone());
        if worker.is_none() {
            self.shared.commit_pending();
            *worker = self.spawn_worker();
        }
    }

    /// Commits the pending scheduled record, if any, without waiting for the
    /// next interval.
    pub fn force_flush(&self) {
        self.shared.commit_pending();
    }

    /// Reads the persisted session.
    ///
    /// Returns `None` unless the id, start time, expire time and timeout are
    /// all present with the expected types. A stored previous id of the wrong
    /// type also invalidates the record.
    pub fn load(&self) -> Option<Session> {
        let store = &self.shared.store;
        let id = store.get(SESSION_ID_KEY)?.as_text()?.to_owned();
        let start_time = store.get(SESSION_START_TIME_KEY)?.as_timestamp()?;
        let expire_time = store.get(SESSION_EXPIRE_TIME_KEY)?.as_timestamp()?;
        let timeout = store.get(SESSION_TIMEOUT_KEY)?.as_duration()?;
        let previous_id = match store.get(SESSION_PREVIOUS_ID_KEY) {
            Some(value) => Some(value.as_text()?.to_owned()),
            None => None,
        };

        let session = Session::restored(id, previous_id, start_time, expire_time, timeout);
        self.shared.lock_state().last_saved = Some(session.clone());
        Some(session)
    }

    /// Stops the save worker, discards any pending record and removes every
    /// persisted key.
    pub fn teardown(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut state = self.shared.lock_state();
            state.pending = None;
            state.last_saved = None;
        }
        if let Some(worker) = worker.take() {
            worker.stop();
        }

        let batch = WriteBatch::new()
            .remove(SESSION_ID_KEY)
            .remove(SESSION_PREVIOUS_ID_KEY)
            .remove(SESSION_START_TIME_KEY)
            .remove(SESSION_EXPIRE_TIME_KEY)
            .remove(SESSION_TIMEOUT_KEY);
        if let Err(err) = self.shared.store.apply(batch) {
            otel_warn!(
                name: "SessionStore.TeardownFailed",
                error = format!("{err}")
            );
        }
    }

    fn spawn_worker(&self) -> Option<Worker> {
        let (stop, stop_rx) = mpsc::sync_channel::<()>(1);
        let shared = Arc::clone(&self.shared);
        let interval = self.save_interval;
        let spawned = thread::Builder::new()
            .name("OpenTelemetry.Rum.SessionStore".to_string())
            .spawn(move || {
                otel_debug!(
                    name: "SessionStore.ThreadStarted",
                    interval_in_millisecs = interval.as_millis()
                );
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => shared.commit_pending(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                shared.commit_pending();
                otel_debug!(name: "SessionStore.ThreadExiting");
            });

        match spawned {
            Ok(handle) => Some(Worker { stop, handle }),
            Err(err) => {
                otel_warn!(
                    name: "SessionStore.ThreadSpawnFailed",
                    error = format!("{err}")
                );
                None
            }
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SaveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_pending(&self) {
        let mut state = self.lock_state();
        let Some(pending) = state.pending.take() else {
            return;
        };
        if state.last_saved.as_ref() == Some(&pending) {
            return;
        }
        self.commit(&mut state, pending);
    }

    fn commit(&self, state: &mut SaveState, session: Session) {
        let mut batch = WriteBatch::new()
            .set(SESSION_ID_KEY, session.id())
            .set(SESSION_START_TIME_KEY, session.start_time())
            .set(SESSION_EXPIRE_TIME_KEY, session.expire_time())
            .set(SESSION_TIMEOUT_KEY, StoredValue::Duration(session.timeout()));
        batch = match session.previous_id() {
            Some(previous_id) => batch.set(SESSION_PREVIOUS_ID_KEY, previous_id),
            None => batch.remove(SESSION_PREVIOUS_ID_KEY),
        };

        match self.store.apply(batch) {
            Ok(()) => state.last_saved = Some(session),
            Err(err) => {
                otel_warn!(
                    name: "SessionStore.SaveFailed",
                    session_id = session.id(),
                    error = format!("{err}")
                );
            }
        }
    }
}

impl Worker {
    fn stop(self) {
        let _ = self.stop.try_send(());
        drop(self.stop);
        if self.handle.join().is_err() {
            otel_warn!(name: "SessionStore.ThreadPanicked");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("store", &self.shared.store)
            .field("save_interval", &self.save_interval)
            .finish()
    }
}

/// Builder for [`SessionStore`].
#[derive(Debug)]
pub struct SessionStoreBuilder {
    store: Arc<dyn KeyValueStore>,
    save_interval: Duration,
}

impl SessionStoreBuilder {
    /// Sets the interval at which the save worker commits scheduled records.
    /// The default is 30 seconds.
    pub fn with_save_interval(mut self, save_interval: Duration) -> Self {
        self.save_interval = save_interval;
        self
    }

    /// Builds the [`SessionStore`].
    pub fn build(self) -> SessionStore {
        SessionStore {
            shared: Arc::new(Shared {
                store: self.store,
                state: Mutex::new(SaveState::default()),
            }),
            save_interval: self.save_interval,
            worker: Mutex::new(None),
        }
    }
}
