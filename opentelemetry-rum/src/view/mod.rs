//! # Views
//!
//! Span instrumentation of view lifecycles. The host UI layer implements
//! [`InstrumentedView`] on its view type and reports lifecycle callbacks to a
//! [`ViewLifecycleOrchestrator`], which turns them into a `view.load` span
//! tree followed by a `view.duration` span.
//!
//! ```
//! use opentelemetry::trace::TracerProvider as _;
//! use opentelemetry_rum::semconv;
//! use opentelemetry_rum::view::{
//!     InstrumentedView, ViewInstrumentationState, ViewLifecycleOrchestrator,
//! };
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//! use std::borrow::Cow;
//!
//! #[derive(Default)]
//! struct SettingsScreen {
//!     instrumentation: Option<ViewInstrumentationState>,
//! }
//!
//! impl InstrumentedView for SettingsScreen {
//!     fn instrumentation_state(&mut self) -> &mut Option<ViewInstrumentationState> {
//!         &mut self.instrumentation
//!     }
//!
//!     fn class_name(&self) -> Cow<'static, str> {
//!         Cow::Borrowed("SettingsScreen")
//!     }
//! }
//!
//! let provider = SdkTracerProvider::builder().build();
//! let views = ViewLifecycleOrchestrator::new(provider.tracer(semconv::SCOPE_VIEW));
//!
//! let mut screen = SettingsScreen::default();
//! views.on_view_did_load_start(&mut screen);
//! views.on_view_did_load_end(&mut screen);
//! views.on_view_will_appear_start(&mut screen);
//! views.on_view_will_appear_end(&mut screen);
//! views.on_view_did_appear_start(&mut screen);
//! views.on_view_did_appear_end(&mut screen);
//! views.on_view_did_disappear(&mut screen);
//! views.shutdown().unwrap();
//! ```
mod orchestrator;
mod state;

pub use orchestrator::{ViewLifecycleOrchestrator, ViewLifecycleOrchestratorBuilder};
pub use state::{InstrumentedView, ViewInstrumentationState};
