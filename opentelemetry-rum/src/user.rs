//! # Users
//!
//! A user id identifies one installation of the application across sessions
//! and process restarts. It is generated once, persisted, and stamped as
//! `user.id` on spans and log records by [`UidSpanProcessor`] and
//! [`UidLogProcessor`].
use crate::clock::{IdGenerator, UuidIdGenerator};
use crate::semconv;
use crate::session::has_attribute;
use crate::storage::{KeyValueStore, WriteBatch};
use crate::sync::ThreadSafe;
use opentelemetry::logs::{AnyValue, LogRecord as _};
use opentelemetry::trace::Span as _;
use opentelemetry::{otel_debug, otel_warn, Context, InstrumentationScope, KeyValue};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogProcessor, SdkLogRecord};
use opentelemetry_sdk::trace::{Span, SpanData, SpanProcessor};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const USER_ID_KEY: &str = "otel-rum-user-id";

/// Owns the persisted user id.
#[derive(Debug)]
pub struct UidManager {
    uid: ThreadSafe<String>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl UidManager {
    /// Creates a [`UidManagerBuilder`].
    pub fn builder() -> UidManagerBuilder {
        UidManagerBuilder::default()
    }

    /// The current user id.
    pub fn uid(&self) -> String {
        self.uid.get()
    }

    /// Replaces the user id, persisting the new value.
    pub fn set_uid(&self, uid: impl Into<String>) {
        let uid = uid.into();
        self.persist(&uid);
        self.uid.set(uid);
    }

    fn persist(&self, uid: &str) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.apply(WriteBatch::new().set(USER_ID_KEY, uid)) {
            otel_warn!(
                name: "UidManager.SaveFailed",
                error = format!("{err}")
            );
        }
    }
}

/// Builder for [`UidManager`].
#[derive(Debug, Default)]
pub struct UidManagerBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

impl UidManagerBuilder {
    /// Restores the user id from, and persists it to, `store`.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Generates a missing user id with `id_generator` instead of a random
    /// UUID.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Arc::new(id_generator));
        self
    }

    /// Builds the manager, restoring the persisted id or generating and
    /// persisting a new one.
    pub fn build(self) -> UidManager {
        let restored = self
            .store
            .as_ref()
            .and_then(|store| store.get(USER_ID_KEY))
            .and_then(|value| value.as_text().map(str::to_owned));

        match restored {
            Some(uid) => {
                otel_debug!(name: "UidManager.Restored", user_id = uid.as_str());
                UidManager {
                    uid: ThreadSafe::new(uid),
                    store: self.store,
                }
            }
            None => {
                let generator = self
                    .id_generator
                    .unwrap_or_else(|| Arc::new(UuidIdGenerator::default()));
                let uid = generator.new_id();
                let manager = UidManager {
                    uid: ThreadSafe::new(uid.clone()),
                    store: self.store,
                };
                manager.persist(&uid);
                manager
            }
        }
    }
}

/// A [`SpanProcessor`] setting `user.id` on every span as it starts.
#[derive(Debug, Clone)]
pub struct UidSpanProcessor {
    uid: Arc<UidManager>,
}

impl UidSpanProcessor {
    /// Creates a processor reading the id from `uid`.
    pub fn new(uid: Arc<UidManager>) -> Self {
        UidSpanProcessor { uid }
    }
}

impl SpanProcessor for UidSpanProcessor {
    fn on_start(&self, span: &mut Span, _cx: &Context) {
        span.set_attribute(KeyValue::new(semconv::USER_ID, self.uid.uid()));
    }

    fn on_end(&self, _span: SpanData) {}

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

/// A [`LogProcessor`] setting `user.id` on log records that lack one.
#[derive(Debug, Clone)]
pub struct UidLogProcessor {
    uid: Arc<UidManager>,
}

impl UidLogProcessor {
    /// Creates a processor reading the id from `uid`.
    pub fn new(uid: Arc<UidManager>) -> Self {
        UidLogProcessor { uid }
    }
}

impl LogProcessor for UidLogProcessor {
    fn emit(&self, data: &mut SdkLogRecord, _instrumentation: &InstrumentationScope) {
        if !has_attribute(data, semconv::USER_ID) {
            data.add_attribute(semconv::USER_ID, AnyValue::from(self.uid.uid()));
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}
