use crate::clock::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
use crate::semconv;
use crate::view::{InstrumentedView, ViewInstrumentationState};
use opentelemetry::trace::{Span as _, SpanContext, SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{otel_debug, otel_error, otel_info, Context, KeyValue};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
struct ViewInfo {
    id: String,
    name: Cow<'static, str>,
    class: Cow<'static, str>,
}

impl ViewInfo {
    fn attributes(&self) -> [KeyValue; 2] {
        [
            KeyValue::new(semconv::VIEW_NAME, self.name.clone()),
            KeyValue::new(semconv::VIEW_CLASS, self.class.clone()),
        ]
    }
}

enum Command {
    LoadStart(ViewInfo, SystemTime),
    LoadEnd(ViewInfo, SystemTime),
    WillAppearStart(ViewInfo, SystemTime),
    WillAppearEnd {
        view: ViewInfo,
        time: SystemTime,
        open_is_appearing: bool,
    },
    DidAppearStart(ViewInfo, SystemTime),
    DidAppearEnd(ViewInfo, SystemTime),
    DidDisappear(ViewInfo, SystemTime),
    Released(String, SystemTime),
    Background(SystemTime),
    Foreground(SystemTime),
    LoadSpanContext(String, SyncSender<Option<SpanContext>>),
    Flush(SyncSender<()>),
    Shutdown(SystemTime, SyncSender<()>),
}

/// Builds span hierarchies from view lifecycle callbacks.
///
/// Each view instance gets two independent root spans:
///
/// * `view.load`, covering the load sequence, with the children
///   `viewDidLoad`, `viewWillAppear`, `viewIsAppearing` and `viewDidAppear`;
/// * `view.duration`, covering the time the view is visible. It starts at the
///   instant `view.load` ends.
///
/// Every callback captures its timestamp on the calling thread and hands the
/// span work to a dedicated worker thread, which owns all open spans. Spans
/// still open when the view disappears or the app is backgrounded are ended
/// early with an error status of `view_disappeared` or `app_backgrounded`.
pub struct ViewLifecycleOrchestrator {
    sender: Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
}

impl ViewLifecycleOrchestrator {
    /// Creates an orchestrator starting spans with `tracer`.
    pub fn new<T>(tracer: T) -> Self
    where
        T: Tracer + Send + 'static,
        T::Span: Send + Sync + 'static,
    {
        ViewLifecycleOrchestrator::builder(tracer).build()
    }

    /// Creates a [`ViewLifecycleOrchestratorBuilder`] starting spans with
    /// `tracer`.
    pub fn builder<T>(tracer: T) -> ViewLifecycleOrchestratorBuilder<T>
    where
        T: Tracer + Send + 'static,
        T::Span: Send + Sync + 'static,
    {
        ViewLifecycleOrchestratorBuilder {
            tracer,
            clock: None,
            id_generator: None,
        }
    }

    /// Starts `view.load` and its `viewDidLoad` child.
    pub fn on_view_did_load_start<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        let Some((info, state)) = self.prepare(view) else {
            return;
        };
        if state.load_span_created {
            return;
        }
        state.load_span_created = true;
        self.send(Command::LoadStart(info, self.clock.now()));
    }

    /// Ends `viewDidLoad`.
    pub fn on_view_did_load_end<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        if let Some((info, _)) = self.prepare(view) {
            self.send(Command::LoadEnd(info, self.clock.now()));
        }
    }

    /// Starts `viewWillAppear` under `view.load`.
    pub fn on_view_will_appear_start<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        let Some((info, state)) = self.prepare(view) else {
            return;
        };
        if state.will_appear_span_created {
            return;
        }
        state.will_appear_span_created = true;
        self.send(Command::WillAppearStart(info, self.clock.now()));
    }

    /// Ends `viewWillAppear` and starts `viewIsAppearing`, which stays open
    /// until the view has appeared.
    pub fn on_view_will_appear_end<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        let Some((info, state)) = self.prepare(view) else {
            return;
        };
        let open_is_appearing = !state.is_appearing_span_created;
        state.is_appearing_span_created = true;
        self.send(Command::WillAppearEnd {
            view: info,
            time: self.clock.now(),
            open_is_appearing,
        });
    }

    /// Starts `viewDidAppear` under `view.load`.
    pub fn on_view_did_appear_start<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        let Some((info, state)) = self.prepare(view) else {
            return;
        };
        if state.did_appear_span_created {
            return;
        }
        state.did_appear_span_created = true;
        self.send(Command::DidAppearStart(info, self.clock.now()));
    }

    /// Ends the load sequence and starts `view.duration`.
    ///
    /// `view.duration` is only started for a view whose `view.load` is open,
    /// or which already appeared since the app last came to the foreground.
    pub fn on_view_did_appear_end<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        if let Some((info, _)) = self.prepare(view) {
            self.send(Command::DidAppearEnd(info, self.clock.now()));
        }
    }

    /// Ends `view.duration` and ends any load span still open with the
    /// `view_disappeared` error status.
    pub fn on_view_did_disappear<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        if let Some((info, _)) = self.prepare(view) {
            self.send(Command::DidDisappear(info, self.clock.now()));
        }
    }

    /// Forgets a view that is being destroyed.
    ///
    /// Open spans are ended as [`ViewLifecycleOrchestrator::on_view_did_disappear`]
    /// ends them, and the view's instrumentation state is cleared. A view that
    /// is only hidden should report `on_view_did_disappear` instead, so that it
    /// gets a new `view.duration` span when it appears again.
    pub fn on_view_released<V: InstrumentedView + ?Sized>(&self, view: &mut V) {
        if let Some(state) = view.instrumentation_state().take() {
            self.send(Command::Released(
                state.identifier().to_owned(),
                self.clock.now(),
            ));
        }
    }

    /// Ends every open span: `view.duration` spans with an `Ok` status and
    /// load spans with the `app_backgrounded` error status.
    pub fn on_app_background(&self) {
        self.send(Command::Background(self.clock.now()));
    }

    /// Discards whatever is left from before the app was backgrounded.
    pub fn on_app_foreground(&self) {
        self.send(Command::Foreground(self.clock.now()));
    }

    /// Returns the context of the view's open `view.load` span, for parenting
    /// spans the application creates during the load sequence.
    pub fn load_span_context<V: InstrumentedView + ?Sized>(
        &self,
        view: &mut V,
    ) -> Option<SpanContext> {
        let id = view
            .instrumentation_state()
            .as_ref()?
            .identifier()
            .to_owned();
        let (reply, response) = mpsc::sync_channel(1);
        self.sender.send(Command::LoadSpanContext(id, reply)).ok()?;
        response.recv_timeout(DEFAULT_TIMEOUT).ok().flatten()
    }

    /// Waits until every callback reported so far has been applied.
    pub fn force_flush(&self) -> OTelSdkResult {
        let (reply, response) = mpsc::sync_channel(1);
        self.sender
            .send(Command::Flush(reply))
            .map_err(|_| OTelSdkError::AlreadyShutdown)?;
        response.recv_timeout(DEFAULT_TIMEOUT).map_err(|err| match err {
            RecvTimeoutError::Timeout => OTelSdkError::Timeout(DEFAULT_TIMEOUT),
            RecvTimeoutError::Disconnected => {
                OTelSdkError::InternalFailure("view lifecycle worker exited".into())
            }
        })
    }

    /// Ends every open span as [`ViewLifecycleOrchestrator::on_app_background`]
    /// does and stops the worker thread. Later callbacks are ignored.
    pub fn shutdown(&self) -> OTelSdkResult {
        self.shutdown_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Like [`ViewLifecycleOrchestrator::shutdown`], waiting at most `timeout`.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            otel_debug!(name: "ViewLifecycleOrchestrator.Shutdown.AlreadyShutdown");
            return Err(OTelSdkError::AlreadyShutdown);
        }
        let (reply, response) = mpsc::sync_channel(1);
        self.sender
            .send(Command::Shutdown(self.clock.now(), reply))
            .map_err(|_| OTelSdkError::AlreadyShutdown)?;
        match response.recv_timeout(timeout) {
            Ok(()) => {
                let handle = self
                    .handle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(handle) = handle {
                    handle.join().map_err(|_| {
                        OTelSdkError::InternalFailure("view lifecycle worker panicked".into())
                    })?;
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                otel_error!(name: "ViewLifecycleOrchestrator.Shutdown.Timeout");
                Err(OTelSdkError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(OTelSdkError::InternalFailure(
                "view lifecycle worker exited".into(),
            )),
        }
    }

    fn prepare<'v, V: InstrumentedView + ?Sized>(
        &self,
        view: &'v mut V,
    ) -> Option<(ViewInfo, &'v mut ViewInstrumentationState)> {
        if !view.should_capture() {
            return None;
        }
        let class = view.class_name();
        let name = view.custom_view_name().unwrap_or_else(|| class.clone());
        let state = view
            .instrumentation_state()
            .get_or_insert_with(|| ViewInstrumentationState::new(self.id_generator.new_id()));
        let info = ViewInfo {
            id: state.identifier().to_owned(),
            name,
            class,
        };
        Some((info, state))
    }

    fn send(&self, command: Command) {
        if self.sender.send(command).is_err() {
            otel_debug!(name: "ViewLifecycleOrchestrator.CallbackAfterShutdown");
        }
    }
}

impl Drop for ViewLifecycleOrchestrator {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::SeqCst) {
            let _ = self.shutdown();
        }
    }
}

impl fmt::Debug for ViewLifecycleOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewLifecycleOrchestrator")
            .field("is_shutdown", &self.is_shutdown)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Builder for [`ViewLifecycleOrchestrator`].
#[derive(Debug)]
pub struct ViewLifecycleOrchestratorBuilder<T> {
    tracer: T,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl<T> ViewLifecycleOrchestratorBuilder<T>
where
    T: Tracer + Send + 'static,
    T::Span: Send + Sync + 'static,
{
    /// Timestamps callbacks with `clock` instead of the system clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Generates view identifiers with `id_generator` instead of random
    /// UUIDs.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Arc::new(id_generator));
        self
    }

    /// Builds the orchestrator and starts its worker thread.
    pub fn build(self) -> ViewLifecycleOrchestrator {
        let (sender, receiver) = mpsc::channel::<Command>();
        let tracer = self.tracer;
        let spawned = thread::Builder::new()
            .name("OpenTelemetry.Rum.ViewLifecycle".to_string())
            .spawn(move || {
                otel_debug!(name: "ViewLifecycleOrchestrator.ThreadStarted");
                let mut spans = ViewSpans::new(tracer);
                for command in receiver {
                    if !spans.apply(command) {
                        break;
                    }
                }
                otel_debug!(name: "ViewLifecycleOrchestrator.ThreadExiting");
            });
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                otel_error!(
                    name: "ViewLifecycleOrchestrator.ThreadSpawnFailed",
                    error = format!("{err}")
                );
                None
            }
        };

        ViewLifecycleOrchestrator {
            sender,
            handle: Mutex::new(handle),
            is_shutdown: AtomicBool::new(false),
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock::default())),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(UuidIdGenerator::default())),
        }
    }
}

struct LoadPhase<S> {
    root: Context,
    children: HashMap<&'static str, S>,
}

/// Open spans, owned by the worker thread.
struct ViewSpans<T: Tracer> {
    tracer: T,
    load: HashMap<String, LoadPhase<T::Span>>,
    visible: HashMap<String, T::Span>,
    // Views that completed a load since the app last came to the foreground.
    // Cleared on background, foreground and shutdown, and per view on release.
    appeared: HashSet<String>,
}

impl<T> ViewSpans<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    fn new(tracer: T) -> Self {
        ViewSpans {
            tracer,
            load: HashMap::new(),
            visible: HashMap::new(),
            appeared: HashSet::new(),
        }
    }

    /// Returns `false` once the worker should stop.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::LoadStart(view, time) => self.start_load(&view, time),
            Command::LoadEnd(view, time) => {
                self.end_child(&view.id, semconv::SPAN_VIEW_DID_LOAD, time)
            }
            Command::WillAppearStart(view, time) => {
                self.start_child(&view, semconv::SPAN_VIEW_WILL_APPEAR, time)
            }
            Command::WillAppearEnd {
                view,
                time,
                open_is_appearing,
            } => {
                self.end_child(&view.id, semconv::SPAN_VIEW_WILL_APPEAR, time);
                if open_is_appearing {
                    self.start_child(&view, semconv::SPAN_VIEW_IS_APPEARING, time);
                }
            }
            Command::DidAppearStart(view, time) => {
                self.start_child(&view, semconv::SPAN_VIEW_DID_APPEAR, time)
            }
            Command::DidAppearEnd(view, time) => self.finish_load(&view, time),
            Command::DidDisappear(view, time) => self.disappeared(&view.id, time),
            Command::Released(id, time) => {
                self.disappeared(&id, time);
                self.appeared.remove(&id);
            }
            Command::Background(time) => {
                let (visible, loading) = self.close_all(time);
                otel_info!(
                    name: "ViewLifecycleOrchestrator.AppBackgrounded",
                    closed_visibility_spans = visible,
                    interrupted_load_spans = loading
                );
            }
            Command::Foreground(time) => {
                let (visible, loading) = self.close_all(time);
                if visible + loading > 0 {
                    otel_debug!(
                        name: "ViewLifecycleOrchestrator.ResidualSpansClosed",
                        closed_visibility_spans = visible,
                        interrupted_load_spans = loading
                    );
                }
            }
            Command::LoadSpanContext(id, reply) => {
                let context = self
                    .load
                    .get(&id)
                    .map(|phase| phase.root.span().span_context().clone());
                let _ = reply.send(context);
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown(time, reply) => {
                self.close_all(time);
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start_span(
        &self,
        view: &ViewInfo,
        name: &'static str,
        time: SystemTime,
        parent: &Context,
    ) -> T::Span {
        self.tracer
            .span_builder(name)
            .with_kind(SpanKind::Client)
            .with_start_time(time)
            .with_attributes(view.attributes())
            .start_with_context(&self.tracer, parent)
    }

    fn start_load(&mut self, view: &ViewInfo, time: SystemTime) {
        if self.load.contains_key(&view.id) {
            otel_debug!(
                name: "ViewLifecycleOrchestrator.LoadAlreadyStarted",
                view_id = view.id.as_str()
            );
            return;
        }
        let root = self.start_span(view, semconv::SPAN_VIEW_LOAD, time, &Context::new());
        self.load.insert(
            view.id.clone(),
            LoadPhase {
                root: Context::new().with_span(root),
                children: HashMap::new(),
            },
        );
        self.start_child(view, semconv::SPAN_VIEW_DID_LOAD, time);
    }

    fn start_child(&mut self, view: &ViewInfo, name: &'static str, time: SystemTime) {
        let Some(phase) = self.load.get(&view.id) else {
            otel_debug!(
                name: "ViewLifecycleOrchestrator.NoLoadSpan",
                view_id = view.id.as_str(),
                span_name = name
            );
            return;
        };
        if phase.children.contains_key(name) {
            return;
        }
        let span = self.start_span(view, name, time, &phase.root);
        if let Some(phase) = self.load.get_mut(&view.id) {
            phase.children.insert(name, span);
        }
    }

    fn end_child(&mut self, id: &str, name: &'static str, time: SystemTime) {
        let removed = self
            .load
            .get_mut(id)
            .and_then(|phase| phase.children.remove(name));
        if let Some(mut span) = removed {
            span.end_with_timestamp(time);
        }
    }

    fn finish_load(&mut self, view: &ViewInfo, time: SystemTime) {
        self.end_child(&view.id, semconv::SPAN_VIEW_IS_APPEARING, time);
        self.end_child(&view.id, semconv::SPAN_VIEW_DID_APPEAR, time);

        let loading = self.load.contains_key(&view.id);
        if loading || self.appeared.contains(&view.id) {
            if !self.visible.contains_key(&view.id) {
                let span =
                    self.start_span(view, semconv::SPAN_VIEW_DURATION, time, &Context::new());
                self.visible.insert(view.id.clone(), span);
            }
            self.appeared.insert(view.id.clone());
        }

        if let Some(phase) = self.load.remove(&view.id) {
            for (_, mut child) in phase.children {
                child.end_with_timestamp(time);
            }
            phase.root.span().end_with_timestamp(time);
        }
    }

    fn disappeared(&mut self, id: &str, time: SystemTime) {
        if let Some(mut span) = self.visible.remove(id) {
            span.end_with_timestamp(time);
        }
        if let Some(phase) = self.load.remove(id) {
            otel_debug!(
                name: "ViewLifecycleOrchestrator.LoadInterrupted",
                view_id = id,
                open_children = phase.children.len()
            );
            interrupt(phase, semconv::STATUS_VIEW_DISAPPEARED, time);
        }
    }

    fn close_all(&mut self, time: SystemTime) -> (usize, usize) {
        let visible = self.visible.len();
        for (_, mut span) in self.visible.drain() {
            span.set_status(Status::Ok);
            span.end_with_timestamp(time);
        }
        let loading = self.load.len();
        for (_, phase) in self.load.drain() {
            interrupt(phase, semconv::STATUS_APP_BACKGROUNDED, time);
        }
        self.appeared.clear();
        (visible, loading)
    }
}

fn interrupt<S>(phase: LoadPhase<S>, reason: &'static str, time: SystemTime)
where
    S: opentelemetry::trace::Span,
{
    for (_, mut child) in phase.children {
        child.set_status(Status::error(reason));
        child.end_with_timestamp(time);
    }
    let root = phase.root.span();
    root.set_status(Status::error(reason));
    root.end_with_timestamp(time);
}
