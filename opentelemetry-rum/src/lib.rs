//! # OpenTelemetry Real User Monitoring
//!
//! Client-side building blocks for instrumenting interactive applications
//! with OpenTelemetry:
//!
//! * [`session`] maintains a rotating session identity, reports its start
//!   and end as log events, and stamps `session.id` on every span and log
//!   record through SDK processors.
//! * [`view`] turns view lifecycle callbacks into a load span tree and a
//!   visibility span per view, ending them early when the view disappears
//!   or the app goes to the background.
//! * [`user`] keeps a persisted `user.id` and stamps it on telemetry.
//!
//! Identity survives restarts through a [`storage::KeyValueStore`]; this
//! crate ships an in-memory and a JSON file implementation.
//!
//! Components are constructed explicitly and shared behind [`std::sync::Arc`]
//! with the processors that read them. Nothing is registered globally.
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs` (enabled by default): emits this crate's own diagnostics
//!   through the `tracing` crate.
//! * `testing`: exposes deterministic clocks, id generators and sinks in
//!   [`testing`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

pub mod clock;
pub mod error;
pub mod semconv;
pub mod session;
pub mod storage;
pub(crate) mod sync;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
pub mod user;
pub mod view;

pub use clock::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
pub use error::StoreError;
pub use session::{Session, SessionConfig, SessionManager};
pub use user::UidManager;
pub use view::ViewLifecycleOrchestrator;
