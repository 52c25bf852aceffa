//! Processors stamping session identity onto spans and log records.
use crate::semconv;
use crate::session::SessionManager;
use opentelemetry::logs::{AnyValue, LogRecord as _};
use opentelemetry::trace::Span as _;
use opentelemetry::{Context, InstrumentationScope, Key, KeyValue};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogProcessor, SdkLogRecord};
use opentelemetry_sdk::trace::{Span, SpanData, SpanProcessor};
use std::sync::Arc;
use std::time::Duration;

/// A [`SpanProcessor`] setting `session.id` and, when the session has one,
/// `session.previous_id` on every span as it starts.
///
/// The session is read with [`SessionManager::current_session`], which only
/// creates a session when none exists yet. Ending spans are not touched.
#[derive(Debug, Clone)]
pub struct SessionSpanProcessor {
    manager: Arc<SessionManager>,
}

impl SessionSpanProcessor {
    /// Creates a processor reading sessions from `manager`.
    pub fn new(manager: Arc<SessionManager>) -> Self {
        SessionSpanProcessor { manager }
    }
}

impl SpanProcessor for SessionSpanProcessor {
    fn on_start(&self, span: &mut Span, _cx: &Context) {
        let session = self.manager.current_session();
        span.set_attribute(KeyValue::new(semconv::SESSION_ID, session.id().to_owned()));
        if let Some(previous_id) = session.previous_id() {
            span.set_attribute(KeyValue::new(
                semconv::SESSION_PREVIOUS_ID,
                previous_id.to_owned(),
            ));
        }
    }

    fn on_end(&self, _span: SpanData) {}

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

/// A [`LogProcessor`] setting `session.id` and `session.previous_id` on log
/// records that do not carry a session yet.
///
/// A record that already has `session.id` is left untouched, so the
/// processor composes with callers that attach an explicit session.
/// Register it ahead of exporting processors: the logger provider hands the
/// same record to each processor in registration order.
#[derive(Debug, Clone)]
pub struct SessionLogProcessor {
    manager: Arc<SessionManager>,
}

impl SessionLogProcessor {
    /// Creates a processor reading sessions from `manager`.
    pub fn new(manager: Arc<SessionManager>) -> Self {
        SessionLogProcessor { manager }
    }
}

pub(crate) fn has_attribute(record: &SdkLogRecord, key: &'static str) -> bool {
    let key = Key::from_static_str(key);
    record.attributes_iter().any(|(k, _)| *k == key)
}

impl LogProcessor for SessionLogProcessor {
    fn emit(&self, data: &mut SdkLogRecord, _instrumentation: &InstrumentationScope) {
        if has_attribute(data, semconv::SESSION_ID) {
            return;
        }
        let session = self.manager.current_session();
        data.add_attribute(semconv::SESSION_ID, AnyValue::from(session.id().to_owned()));
        if let Some(previous_id) = session.previous_id() {
            if !has_attribute(data, semconv::SESSION_PREVIOUS_ID) {
                data.add_attribute(
                    semconv::SESSION_PREVIOUS_ID,
                    AnyValue::from(previous_id.to_owned()),
                );
            }
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}
