//! Time and identifier sources.
//!
//! Session and view instrumentation never read the system clock or mint
//! identifiers directly; they go through [`Clock`] and [`IdGenerator`] so
//! that hosts (and tests) can substitute their own.
use std::fmt;
use std::time::SystemTime;

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// Default [`Clock`] reading [`SystemTime::now`].
#[derive(Clone, Debug, Default)]
pub struct SystemClock {
    _private: (),
}

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Interface for generating opaque unique identifiers for sessions, users
/// and view instances.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new unique identifier.
    fn new_id(&self) -> String;
}

/// Default [`IdGenerator`] implementation.
///
/// Generates random (version 4) UUIDs in their hyphenated form.
#[derive(Clone, Debug, Default)]
pub struct UuidIdGenerator {
    _private: (),
}

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().hyphenated().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_generator_produces_distinct_ids() {
        let generator = UuidIdGenerator::default();

        let ids: HashSet<String> = (0..100).map(|_| generator.new_id()).collect();

        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.len() == 36));
    }
}
