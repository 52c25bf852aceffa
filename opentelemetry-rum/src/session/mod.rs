//! # Sessions
//!
//! A session groups the telemetry of one continuous period of application
//! usage. It expires after a configurable window of inactivity and is then
//! replaced by a new session that records its predecessor's id.
//!
//! * [`SessionManager`] owns the current [`Session`], rotates it on expiry and
//!   persists it through a [`SessionStore`].
//! * [`SessionEventPipeline`] turns every start and end transition into one
//!   [`SessionEvent`], buffering them until a [`SessionEventSink`] such as
//!   [`LogEventSink`] is installed.
//! * [`SessionSpanProcessor`] and [`SessionLogProcessor`] stamp the current
//!   session id on spans and log records; [`SessionSampler`] and
//!   [`SessionLogSampler`] drop telemetry of sessions that were not sampled.
//!
//! ```
//! use opentelemetry::logs::LoggerProvider as _;
//! use opentelemetry_rum::semconv;
//! use opentelemetry_rum::session::{
//!     LogEventSink, SessionLogProcessor, SessionManager, SessionSpanProcessor,
//! };
//! use opentelemetry_sdk::logs::SdkLoggerProvider;
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//! use std::sync::Arc;
//!
//! let sessions = Arc::new(SessionManager::builder().build());
//! let tracer_provider = SdkTracerProvider::builder()
//!     .with_span_processor(SessionSpanProcessor::new(sessions.clone()))
//!     .build();
//! let logger_provider = SdkLoggerProvider::builder()
//!     .with_log_processor(SessionLogProcessor::new(sessions.clone()))
//!     .build();
//!
//! // Session events raised before this point were queued and are emitted now.
//! sessions.events().install(Arc::new(LogEventSink::new(
//!     logger_provider.logger(semconv::SCOPE_SESSION),
//! )));
//! # drop(tracer_provider);
//! ```
mod config;
mod events;
mod manager;
mod processor;
mod record;
mod sampler;
pub(crate) mod store;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use events::{
    LogEventSink, SessionEvent, SessionEventKind, SessionEventPipeline, SessionEventSink,
};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use processor::{SessionLogProcessor, SessionSpanProcessor};
pub(crate) use processor::has_attribute;
pub use record::Session;
pub use sampler::{SessionLogSampler, SessionSampler};
pub use store::{SessionStore, SessionStoreBuilder};
