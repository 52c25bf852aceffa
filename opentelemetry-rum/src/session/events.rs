use crate::semconv;
use crate::session::Session;
use opentelemetry::logs::{LogRecord, Logger};
use opentelemetry::{otel_debug, otel_info};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::UNIX_EPOCH;

/// The kind of session lifecycle transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// A session was created.
    Start,
    /// An expired session was replaced.
    End,
}

/// A session lifecycle transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEvent {
    /// What happened.
    pub kind: SessionEventKind,
    /// The session it happened to. For [`SessionEventKind::End`] this is the
    /// terminal copy carrying [`Session::end_time`].
    pub session: Session,
}

/// Destination of session lifecycle events.
///
/// Sinks are invoked while the producing [`SessionManager`] holds its lock,
/// so they must not call back into
/// [`SessionManager::get_session`](super::SessionManager::get_session).
///
/// [`SessionManager`]: super::SessionManager
pub trait SessionEventSink: Send + Sync + fmt::Debug {
    /// Handles one event.
    fn on_event(&self, event: &SessionEvent);
}

enum PipelineState {
    Buffering(VecDeque<SessionEvent>),
    Installed(Arc<dyn SessionEventSink>),
}

/// Turns session transitions into events and delivers each one exactly once.
///
/// Until a sink is installed, events are held in a bounded FIFO queue. Once
/// the queue is full further events are dropped, keeping the earliest ones.
/// [`SessionEventPipeline::install`] drains the queue into the sink in order
/// and from then on forwards every event immediately.
pub struct SessionEventPipeline {
    max_queue_size: usize,
    state: Mutex<PipelineState>,
    last: Mutex<Option<(SessionEventKind, String)>>,
}

impl SessionEventPipeline {
    /// Creates a pipeline buffering at most `max_queue_size` events before
    /// a sink is installed.
    pub fn new(max_queue_size: usize) -> Self {
        SessionEventPipeline {
            max_queue_size,
            state: Mutex::new(PipelineState::Buffering(VecDeque::new())),
            last: Mutex::new(None),
        }
    }

    /// Records a lifecycle transition of `session`.
    ///
    /// A transition repeating the previous one (same kind, same session id)
    /// is ignored.
    pub fn add_event(&self, session: &Session, kind: SessionEventKind) {
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(&*last, Some((last_kind, last_id)) if *last_kind == kind && last_id == session.id())
            {
                otel_debug!(
                    name: "SessionEventPipeline.DuplicateEvent",
                    session_id = session.id()
                );
                return;
            }
            *last = Some((kind, session.id().to_owned()));
        }

        let event = SessionEvent {
            kind,
            session: session.clone(),
        };
        let mut state = self.lock_state();
        match &mut *state {
            PipelineState::Installed(sink) => sink.on_event(&event),
            PipelineState::Buffering(queue) => {
                if queue.len() < self.max_queue_size {
                    queue.push_back(event);
                } else {
                    otel_debug!(
                        name: "SessionEventPipeline.QueueFull",
                        session_id = session.id(),
                        max_queue_size = self.max_queue_size
                    );
                }
            }
        }
    }

    /// Installs `sink`, draining buffered events into it in insertion order.
    ///
    /// Only the first call has an effect; returns `false` for later calls.
    pub fn install(&self, sink: Arc<dyn SessionEventSink>) -> bool {
        let mut state = self.lock_state();
        let queue = match &mut *state {
            PipelineState::Installed(_) => {
                otel_debug!(name: "SessionEventPipeline.AlreadyInstalled");
                return false;
            }
            PipelineState::Buffering(queue) => std::mem::take(queue),
        };

        otel_info!(
            name: "SessionEventPipeline.Installed",
            queued_events = queue.len()
        );
        for event in &queue {
            sink.on_event(event);
        }
        *state = PipelineState::Installed(sink);
        true
    }

    /// Returns `true` once a sink has been installed.
    pub fn is_installed(&self) -> bool {
        matches!(&*self.lock_state(), PipelineState::Installed(_))
    }

    /// Number of events waiting for a sink.
    pub fn queued_len(&self) -> usize {
        match &*self.lock_state() {
            PipelineState::Buffering(queue) => queue.len(),
            PipelineState::Installed(_) => 0,
        }
    }

    /// Copies of the events waiting for a sink, oldest first.
    pub fn queued_events(&self) -> Vec<SessionEvent> {
        match &*self.lock_state() {
            PipelineState::Buffering(queue) => queue.iter().cloned().collect(),
            PipelineState::Installed(_) => Vec::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionEventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEventPipeline")
            .field("max_queue_size", &self.max_queue_size)
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// A [`SessionEventSink`] emitting each event as a log record.
///
/// Start events become `session.start` records timestamped with the start
/// time. End events become `session.end` records timestamped with the end
/// time and carrying `session.start_time` (nanoseconds since the Unix epoch)
/// and `session.duration` (seconds). End events without an end time are not
/// emitted.
pub struct LogEventSink<L: Logger> {
    logger: L,
}

impl<L: Logger> LogEventSink<L> {
    /// Creates a sink emitting through `logger`.
    pub fn new(logger: L) -> Self {
        LogEventSink { logger }
    }
}

impl<L> SessionEventSink for LogEventSink<L>
where
    L: Logger + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        let session = &event.session;
        let mut record = self.logger.create_log_record();
        match event.kind {
            SessionEventKind::Start => {
                record.set_event_name(semconv::SESSION_START_EVENT);
                record.set_timestamp(session.start_time());
            }
            SessionEventKind::End => {
                let (Some(end_time), Some(duration)) = (session.end_time(), session.duration())
                else {
                    otel_debug!(
                        name: "LogEventSink.EndWithoutEndTime",
                        session_id = session.id()
                    );
                    return;
                };
                let start_nanos = session
                    .start_time()
                    .duration_since(UNIX_EPOCH)
                    .map(|since| i64::try_from(since.as_nanos()).unwrap_or(i64::MAX))
                    .unwrap_or_default();
                record.set_event_name(semconv::SESSION_END_EVENT);
                record.set_timestamp(end_time);
                record.add_attribute(semconv::SESSION_START_TIME, start_nanos);
                record.add_attribute(semconv::SESSION_DURATION, duration.as_secs_f64());
            }
        }
        record.add_attribute(semconv::SESSION_ID, session.id().to_owned());
        if let Some(previous_id) = session.previous_id() {
            record.add_attribute(semconv::SESSION_PREVIOUS_ID, previous_id.to_owned());
        }
        self.logger.emit(record);
    }
}

impl<L: Logger> fmt::Debug for LogEventSink<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEventSink").finish()
    }
}
