use std::time::{Duration, SystemTime};

/// Longest inactivity window a session honours. Larger timeouts are capped.
pub(crate) const MAX_SESSION_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// `SystemTime + Duration` panics on overflow; an unrepresentable expiry falls
// back to the capped window, then to `from` itself.
fn expiry(from: SystemTime, timeout: Duration) -> SystemTime {
    from.checked_add(timeout)
        .or_else(|| from.checked_add(MAX_SESSION_TIMEOUT))
        .unwrap_or(from)
}

/// One session: a bounded-lifetime identity grouping the telemetry of one
/// continuous period of application usage.
///
/// `Session` is a value. The [`SessionManager`](super::SessionManager) owns
/// the current one and hands out copies; extending a session's lifetime
/// produces a new value with the same `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    id: String,
    previous_id: Option<String>,
    start_time: SystemTime,
    expire_time: SystemTime,
    timeout: Duration,
    end_time: Option<SystemTime>,
}

impl Session {
    /// Creates a session starting at `start_time` that expires `timeout` later.
    pub fn new(
        id: impl Into<String>,
        previous_id: Option<String>,
        start_time: SystemTime,
        timeout: Duration,
    ) -> Self {
        Session {
            id: id.into(),
            previous_id,
            start_time,
            expire_time: expiry(start_time, timeout),
            timeout,
            end_time: None,
        }
    }

    /// Reassembles a session from its persisted fields.
    pub(crate) fn restored(
        id: String,
        previous_id: Option<String>,
        start_time: SystemTime,
        expire_time: SystemTime,
        timeout: Duration,
    ) -> Self {
        Session {
            id,
            previous_id,
            start_time,
            expire_time,
            timeout,
            end_time: None,
        }
    }

    /// Unique identifier of this session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identifier of the session this one replaced after it expired.
    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    /// When the session was created.
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// When the session expires unless it is touched again.
    pub fn expire_time(&self) -> SystemTime {
        self.expire_time
    }

    /// Inactivity window the session was created or last touched with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// When the session ended. Only set on the copy delivered with the
    /// session's end event.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// Returns `true` if the session has expired at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expire_time
    }

    /// Lifetime of an ended session.
    ///
    /// Returns `None` until [`Session::end_time`] is set.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .map(|end| end.duration_since(self.start_time).unwrap_or_default())
    }

    /// Returns the same session with its expiry moved to `now + timeout`.
    pub(crate) fn touched(&self, now: SystemTime, timeout: Duration) -> Self {
        Session {
            expire_time: expiry(now, timeout),
            timeout,
            ..self.clone()
        }
    }

    /// Returns the terminal copy of this session, ended at its expiry time.
    pub(crate) fn ended(&self) -> Self {
        Session {
            end_time: Some(self.expire_time),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, MAX_SESSION_TIMEOUT};
    use rstest::rstest;
    use std::time::{Duration, UNIX_EPOCH};

    #[rstest]
    #[case(0, false)]
    #[case(29, false)]
    #[case(30, true)]
    #[case(31, true)]
    fn expiry_is_inclusive(#[case] elapsed_secs: u64, #[case] expected: bool) {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let session = Session::new("a", None, start, Duration::from_secs(30));

        let expired = session.is_expired_at(start + Duration::from_secs(elapsed_secs));

        assert_eq!(expired, expected);
    }

    #[test]
    fn zero_timeout_is_expired_immediately() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let session = Session::new("a", None, start, Duration::ZERO);

        assert!(session.is_expired_at(start));
    }

    #[test]
    fn touch_keeps_identity_and_extends_expiry() {
        // Arrange
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let session = Session::new("a", Some("z".into()), start, Duration::from_secs(30));

        // Act
        let touched = session.touched(start + Duration::from_secs(10), Duration::from_secs(60));

        // Assert
        assert_eq!(touched.id(), "a");
        assert_eq!(touched.previous_id(), Some("z"));
        assert_eq!(touched.start_time(), start);
        assert_eq!(touched.expire_time(), start + Duration::from_secs(70));
        assert_eq!(touched.timeout(), Duration::from_secs(60));
        assert_eq!(touched.end_time(), None);
    }

    #[test]
    fn oversized_timeout_saturates_expiry() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let huge = Duration::from_secs(u64::MAX);

        let session = Session::new("a", None, start, huge);
        let touched = session.touched(start + Duration::from_secs(1), huge);

        assert!(session.expire_time() >= start + MAX_SESSION_TIMEOUT);
        assert!(!session.is_expired_at(start + Duration::from_secs(365 * 24 * 60 * 60)));
        assert!(touched.expire_time() >= session.expire_time());
    }

    #[test]
    fn duration_is_only_defined_once_ended() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let session = Session::new("a", None, start, Duration::from_secs(30))
            .touched(start + Duration::from_secs(15), Duration::from_secs(30));

        assert_eq!(session.duration(), None);

        let ended = session.ended();
        assert_eq!(ended.end_time(), Some(start + Duration::from_secs(45)));
        assert_eq!(ended.duration(), Some(Duration::from_secs(45)));
    }
}
