//! Attribute keys, event names and span names emitted by this crate.
//!
//! Session keys follow the OpenTelemetry session semantic conventions:
//! <https://opentelemetry.io/docs/specs/semconv/general/session/>

/// Unique identifier of the current session.
pub const SESSION_ID: &str = "session.id";
/// Identifier of the session that preceded the current one.
pub const SESSION_PREVIOUS_ID: &str = "session.previous_id";
/// Start time of a finished session, in nanoseconds since the Unix epoch.
pub const SESSION_START_TIME: &str = "session.start_time";
/// Lifetime of a finished session, in seconds.
pub const SESSION_DURATION: &str = "session.duration";

/// Event emitted when a session starts.
pub const SESSION_START_EVENT: &str = "session.start";
/// Event emitted when an expired session is replaced.
pub const SESSION_END_EVENT: &str = "session.end";

/// Persistent identifier of the application user.
pub const USER_ID: &str = "user.id";

/// Human readable name of an instrumented view.
pub const VIEW_NAME: &str = "view.name";
/// Type name of an instrumented view.
pub const VIEW_CLASS: &str = "view.class";

/// Phase-root span covering a view's load sequence.
pub const SPAN_VIEW_LOAD: &str = "view.load";
/// Root span covering the time a view is visible.
pub const SPAN_VIEW_DURATION: &str = "view.duration";
/// Child span of [`SPAN_VIEW_LOAD`] for the `viewDidLoad` callback.
pub const SPAN_VIEW_DID_LOAD: &str = "viewDidLoad";
/// Child span of [`SPAN_VIEW_LOAD`] for the `viewWillAppear` callback.
pub const SPAN_VIEW_WILL_APPEAR: &str = "viewWillAppear";
/// Child span of [`SPAN_VIEW_LOAD`] covering the appearance animation.
pub const SPAN_VIEW_IS_APPEARING: &str = "viewIsAppearing";
/// Child span of [`SPAN_VIEW_LOAD`] for the `viewDidAppear` callback.
pub const SPAN_VIEW_DID_APPEAR: &str = "viewDidAppear";

/// Status description of spans cut short because the app was backgrounded.
pub const STATUS_APP_BACKGROUNDED: &str = "app_backgrounded";
/// Status description of spans cut short because the view went away.
pub const STATUS_VIEW_DISAPPEARED: &str = "view_disappeared";

/// Instrumentation scope of session lifecycle events.
pub const SCOPE_SESSION: &str = "opentelemetry-rum.session";
/// Instrumentation scope of view lifecycle spans.
pub const SCOPE_VIEW: &str = "opentelemetry-rum.view";
