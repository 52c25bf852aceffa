/*
    Measures the cost the session processors add to span starts and log
    emits. Each processor reads the current session from the manager on
    every call.
*/

use criterion::{criterion_group, criterion_main, Criterion};
use opentelemetry::logs::{LogRecord as _, Logger, LoggerProvider};
use opentelemetry::trace::{Span as _, Tracer, TracerProvider};
use opentelemetry_rum::session::{
    SessionConfig, SessionLogProcessor, SessionLogSampler, SessionManager, SessionSampler,
    SessionSpanProcessor,
};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogProcessor, SdkLogRecord, SdkLoggerProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry::InstrumentationScope;
use std::sync::Arc;
use std::time::Duration;

// Run this benchmark with:
// cargo bench --bench session_processor

#[derive(Debug)]
struct NoopProcessor;

impl LogProcessor for NoopProcessor {
    fn emit(&self, _data: &mut SdkLogRecord, _scope: &InstrumentationScope) {}

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

fn session_manager() -> Arc<SessionManager> {
    let manager = SessionManager::builder()
        .with_config(
            SessionConfig::builder()
                .with_session_timeout(Duration::from_secs(30 * 60))
                .with_sample_rate(1.0)
                .build(),
        )
        .build();
    manager.get_session();
    Arc::new(manager)
}

fn criterion_benchmark(c: &mut Criterion) {
    span_start_without_session(c);
    span_start_with_session(c);
    log_emit_with_session(c);
    get_session_touch(c);
}

fn span_start_without_session(c: &mut Criterion) {
    let provider = SdkTracerProvider::builder().build();
    let tracer = provider.tracer("benchmark");

    c.bench_function("span_start_without_session", |b| {
        b.iter(|| {
            let mut span = tracer.start("span");
            span.end();
        });
    });
}

fn span_start_with_session(c: &mut Criterion) {
    let manager = session_manager();
    let provider = SdkTracerProvider::builder()
        .with_sampler(SessionSampler::new(manager.clone()))
        .with_span_processor(SessionSpanProcessor::new(manager))
        .build();
    let tracer = provider.tracer("benchmark");

    c.bench_function("span_start_with_session", |b| {
        b.iter(|| {
            let mut span = tracer.start("span");
            span.end();
        });
    });
}

fn log_emit_with_session(c: &mut Criterion) {
    let manager = session_manager();
    let provider = SdkLoggerProvider::builder()
        .with_log_processor(SessionLogProcessor::new(manager.clone()))
        .with_log_processor(SessionLogSampler::new(manager, NoopProcessor))
        .build();
    let logger = provider.logger("benchmark");

    c.bench_function("log_emit_with_session", |b| {
        b.iter(|| {
            let mut record = logger.create_log_record();
            record.set_event_name("CheckoutFailed");
            record.add_attribute("book_id", "12345");
            logger.emit(record);
        });
    });
}

fn get_session_touch(c: &mut Criterion) {
    let manager = session_manager();

    c.bench_function("get_session_touch", |b| {
        b.iter(|| manager.get_session());
    });
}

criterion_group!(benches, criterion_benchmark);

criterion_main!(benches);
