use std::borrow::Cow;

/// Per-view-instance instrumentation state.
///
/// Created the first time a lifecycle callback fires for a view and kept by
/// the view itself for its whole lifetime. The orchestrator only keeps spans
/// keyed by [`ViewInstrumentationState::identifier`], never a reference back
/// to the view.
///
/// Each flag is set once, by the first callback that creates the matching
/// span, so that re-entered callbacks do not create duplicates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewInstrumentationState {
    identifier: String,
    pub(crate) load_span_created: bool,
    pub(crate) will_appear_span_created: bool,
    pub(crate) is_appearing_span_created: bool,
    pub(crate) did_appear_span_created: bool,
}

impl ViewInstrumentationState {
    /// Creates state for a view identified by `identifier`.
    pub fn new(identifier: impl Into<String>) -> Self {
        ViewInstrumentationState {
            identifier: identifier.into(),
            load_span_created: false,
            will_appear_span_created: false,
            is_appearing_span_created: false,
            did_appear_span_created: false,
        }
    }

    /// Key joining this view's spans.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the `view.load` and `viewDidLoad` spans were created.
    pub fn load_span_created(&self) -> bool {
        self.load_span_created
    }

    /// Whether the `viewWillAppear` span was created.
    pub fn will_appear_span_created(&self) -> bool {
        self.will_appear_span_created
    }

    /// Whether the `viewIsAppearing` span was created.
    pub fn is_appearing_span_created(&self) -> bool {
        self.is_appearing_span_created
    }

    /// Whether the `viewDidAppear` span was created.
    pub fn did_appear_span_created(&self) -> bool {
        self.did_appear_span_created
    }
}

/// A view whose lifecycle is reported to a
/// [`ViewLifecycleOrchestrator`](super::ViewLifecycleOrchestrator).
///
/// Implemented by the host UI layer, typically on its view controller type,
/// which stores the instrumentation state in a field of its own.
pub trait InstrumentedView {
    /// The slot holding this view's instrumentation state.
    fn instrumentation_state(&mut self) -> &mut Option<ViewInstrumentationState>;

    /// Type name of the view, reported as `view.class`.
    fn class_name(&self) -> Cow<'static, str>;

    /// Name reported as `view.name` instead of the class name.
    fn custom_view_name(&self) -> Option<Cow<'static, str>> {
        None
    }

    /// Whether this view is instrumented at all.
    fn should_capture(&self) -> bool {
        true
    }
}
