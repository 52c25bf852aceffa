//! Session-scoped sampling.
//!
//! Sampling is a single decision per session, made by the
//! [`SessionManager`] when the session starts. These adapters apply that
//! decision to spans and log records.
use crate::session::SessionManager;
use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
};
use opentelemetry::{otel_debug, Context, InstrumentationScope, KeyValue};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogProcessor, SdkLogRecord};
use opentelemetry_sdk::trace::ShouldSample;
use opentelemetry_sdk::Resource;
use std::sync::Arc;
use std::time::Duration;

/// A [`ShouldSample`] recording spans only while the current session is
/// sampled.
#[derive(Debug, Clone)]
pub struct SessionSampler {
    manager: Arc<SessionManager>,
}

impl SessionSampler {
    /// Creates a sampler reading decisions from `manager`.
    pub fn new(manager: Arc<SessionManager>) -> Self {
        SessionSampler { manager }
    }
}

impl ShouldSample for SessionSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let decision = if self.manager.is_session_sampled() {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        };
        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state: match parent_context {
                Some(ctx) => ctx.span().span_context().trace_state().clone(),
                None => TraceState::default(),
            },
        }
    }
}

/// A [`LogProcessor`] forwarding records to `delegate` only while the
/// current session is sampled.
#[derive(Debug)]
pub struct SessionLogSampler<P: LogProcessor> {
    manager: Arc<SessionManager>,
    delegate: P,
}

impl<P: LogProcessor> SessionLogSampler<P> {
    /// Wraps `delegate`, reading decisions from `manager`.
    pub fn new(manager: Arc<SessionManager>, delegate: P) -> Self {
        SessionLogSampler { manager, delegate }
    }
}

impl<P: LogProcessor> LogProcessor for SessionLogSampler<P> {
    fn emit(&self, data: &mut SdkLogRecord, instrumentation: &InstrumentationScope) {
        if self.manager.is_session_sampled() {
            self.delegate.emit(data, instrumentation);
        } else {
            otel_debug!(
                name: "SessionLogSampler.Dropped",
                event_name = data.event_name().unwrap_or_default()
            );
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.delegate.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.delegate.shutdown_with_timeout(timeout)
    }

    fn shutdown(&self) -> OTelSdkResult {
        self.delegate.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.delegate.set_resource(resource);
    }
}
