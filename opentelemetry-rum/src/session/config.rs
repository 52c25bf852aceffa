use super::record::MAX_SESSION_TIMEOUT;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Inactivity timeout after which a session is replaced, in seconds.
pub(crate) const OTEL_RUM_SESSION_TIMEOUT: &str = "OTEL_RUM_SESSION_TIMEOUT";
/// Default inactivity timeout: 30 minutes.
pub(crate) const OTEL_RUM_SESSION_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30 * 60);
/// Fraction of sessions whose telemetry is kept, between 0.0 and 1.0.
pub(crate) const OTEL_RUM_SESSION_SAMPLE_RATE: &str = "OTEL_RUM_SESSION_SAMPLE_RATE";
/// Default sample rate: keep every session.
pub(crate) const OTEL_RUM_SESSION_SAMPLE_RATE_DEFAULT: f64 = 1.0;
/// Number of session events buffered before an event sink is installed.
pub(crate) const OTEL_RUM_SESSION_EVENT_QUEUE_SIZE: &str = "OTEL_RUM_SESSION_EVENT_QUEUE_SIZE";
/// Default event queue capacity.
pub(crate) const OTEL_RUM_SESSION_EVENT_QUEUE_SIZE_DEFAULT: usize = 32;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity window after which the current session expires.
    pub(crate) session_timeout: Duration,

    /// Probability, between 0.0 and 1.0, that a new session is sampled.
    pub(crate) sample_rate: f64,

    /// Capacity of the event queue used until an event sink is installed.
    /// Events arriving when it is full are dropped.
    pub(crate) max_queue_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigBuilder::default().build()
    }
}

impl SessionConfig {
    /// Creates a [`SessionConfigBuilder`] seeded from the environment.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Inactivity window after which the current session expires.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Probability that a new session is sampled.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Capacity of the pre-install event queue.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }
}

/// A builder for creating [`SessionConfig`] instances.
#[derive(Debug)]
pub struct SessionConfigBuilder {
    session_timeout: Duration,
    sample_rate: f64,
    max_queue_size: usize,
}

impl Default for SessionConfigBuilder {
    /// Create a new [`SessionConfigBuilder`] initialized with default values.
    /// The values are overridden by environment variables if set.
    /// The supported environment variables are:
    /// * `OTEL_RUM_SESSION_TIMEOUT`
    /// * `OTEL_RUM_SESSION_SAMPLE_RATE`
    /// * `OTEL_RUM_SESSION_EVENT_QUEUE_SIZE`
    ///
    /// Note: Programmatic configuration overrides any value set via the environment variable.
    fn default() -> Self {
        SessionConfigBuilder {
            session_timeout: OTEL_RUM_SESSION_TIMEOUT_DEFAULT,
            sample_rate: OTEL_RUM_SESSION_SAMPLE_RATE_DEFAULT,
            max_queue_size: OTEL_RUM_SESSION_EVENT_QUEUE_SIZE_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl SessionConfigBuilder {
    /// Set the inactivity timeout for [`SessionConfigBuilder`].
    /// A session not accessed for this long is replaced by a new one.
    /// The default value is 30 minutes; values above 100 years are capped.
    pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout.min(MAX_SESSION_TIMEOUT);
        self
    }

    /// Set the sample rate for [`SessionConfigBuilder`].
    /// Values outside `0.0..=1.0` are clamped. The default value is 1.0.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = clamp_rate(sample_rate).unwrap_or(self.sample_rate);
        self
    }

    /// Set max_queue_size for [`SessionConfigBuilder`].
    /// It's the number of session events kept before an event sink is
    /// installed. The default value is 32.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Builds a [`SessionConfig`].
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            session_timeout: self.session_timeout,
            sample_rate: self.sample_rate,
            max_queue_size: self.max_queue_size,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(timeout) = env::var(OTEL_RUM_SESSION_TIMEOUT)
            .ok()
            .and_then(|timeout| u64::from_str(&timeout).ok())
        {
            self.session_timeout = Duration::from_secs(timeout).min(MAX_SESSION_TIMEOUT);
        }

        if let Some(sample_rate) = env::var(OTEL_RUM_SESSION_SAMPLE_RATE)
            .ok()
            .and_then(|rate| f64::from_str(&rate).ok())
            .and_then(clamp_rate)
        {
            self.sample_rate = sample_rate;
        }

        if let Some(max_queue_size) = env::var(OTEL_RUM_SESSION_EVENT_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        self
    }
}

fn clamp_rate(rate: f64) -> Option<f64> {
    if rate.is_nan() {
        None
    } else {
        Some(rate.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_const_values() {
        assert_eq!(OTEL_RUM_SESSION_TIMEOUT, "OTEL_RUM_SESSION_TIMEOUT");
        assert_eq!(OTEL_RUM_SESSION_TIMEOUT_DEFAULT.as_secs(), 1_800);
        assert_eq!(OTEL_RUM_SESSION_SAMPLE_RATE, "OTEL_RUM_SESSION_SAMPLE_RATE");
        assert_eq!(OTEL_RUM_SESSION_SAMPLE_RATE_DEFAULT, 1.0);
        assert_eq!(
            OTEL_RUM_SESSION_EVENT_QUEUE_SIZE,
            "OTEL_RUM_SESSION_EVENT_QUEUE_SIZE"
        );
        assert_eq!(OTEL_RUM_SESSION_EVENT_QUEUE_SIZE_DEFAULT, 32);
    }

    #[test]
    fn test_default_session_config_adheres_to_defaults() {
        let env_vars = vec![
            OTEL_RUM_SESSION_TIMEOUT,
            OTEL_RUM_SESSION_SAMPLE_RATE,
            OTEL_RUM_SESSION_EVENT_QUEUE_SIZE,
        ];

        let config = temp_env::with_vars_unset(env_vars, SessionConfig::default);

        assert_eq!(config.session_timeout, OTEL_RUM_SESSION_TIMEOUT_DEFAULT);
        assert_eq!(config.sample_rate, OTEL_RUM_SESSION_SAMPLE_RATE_DEFAULT);
        assert_eq!(
            config.max_queue_size,
            OTEL_RUM_SESSION_EVENT_QUEUE_SIZE_DEFAULT
        );
    }

    #[test]
    fn test_session_config_configurable_by_env_vars() {
        let env_vars = vec![
            (OTEL_RUM_SESSION_TIMEOUT, Some("60")),
            (OTEL_RUM_SESSION_SAMPLE_RATE, Some("0.25")),
            (OTEL_RUM_SESSION_EVENT_QUEUE_SIZE, Some("8")),
        ];

        let config = temp_env::with_vars(env_vars, SessionConfig::default);

        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.sample_rate, 0.25);
        assert_eq!(config.max_queue_size, 8);
    }

    #[test]
    fn test_code_based_config_overrides_env_vars() {
        let env_vars = vec![
            (OTEL_RUM_SESSION_TIMEOUT, Some("60")),
            (OTEL_RUM_SESSION_SAMPLE_RATE, Some("0.25")),
            (OTEL_RUM_SESSION_EVENT_QUEUE_SIZE, Some("8")),
        ];

        temp_env::with_vars(env_vars, || {
            let config = SessionConfig::builder()
                .with_session_timeout(Duration::from_secs(5))
                .with_sample_rate(0.5)
                .with_max_queue_size(2)
                .build();

            assert_eq!(config.session_timeout, Duration::from_secs(5));
            assert_eq!(config.sample_rate, 0.5);
            assert_eq!(config.max_queue_size, 2);
        });
    }

    #[test]
    fn test_oversized_timeouts_are_capped() {
        let env_vars = vec![
            (OTEL_RUM_SESSION_TIMEOUT, Some("18446744073709551615")),
            (OTEL_RUM_SESSION_SAMPLE_RATE, None),
            (OTEL_RUM_SESSION_EVENT_QUEUE_SIZE, None),
        ];

        let from_env = temp_env::with_vars(env_vars, SessionConfig::default);
        let from_code = SessionConfig::builder()
            .with_session_timeout(Duration::MAX)
            .with_sample_rate(1.0)
            .with_max_queue_size(32)
            .build();

        assert_eq!(from_env.session_timeout, MAX_SESSION_TIMEOUT);
        assert_eq!(from_code.session_timeout, MAX_SESSION_TIMEOUT);
    }

    #[test]
    fn test_invalid_env_values_fall_back_to_defaults() {
        let env_vars = vec![
            (OTEL_RUM_SESSION_TIMEOUT, Some("soon")),
            (OTEL_RUM_SESSION_SAMPLE_RATE, Some("NaN")),
            (OTEL_RUM_SESSION_EVENT_QUEUE_SIZE, Some("-1")),
        ];

        let config = temp_env::with_vars(env_vars, SessionConfig::default);

        assert_eq!(config.session_timeout, OTEL_RUM_SESSION_TIMEOUT_DEFAULT);
        assert_eq!(config.sample_rate, OTEL_RUM_SESSION_SAMPLE_RATE_DEFAULT);
        assert_eq!(
            config.max_queue_size,
            OTEL_RUM_SESSION_EVENT_QUEUE_SIZE_DEFAULT
        );
    }

    #[rstest]
    #[case("-0.5", 0.0)]
    #[case("0", 0.0)]
    #[case("0.75", 0.75)]
    #[case("1", 1.0)]
    #[case("7", 1.0)]
    fn test_sample_rate_env_var_is_clamped(#[case] value: &str, #[case] expected: f64) {
        let config = temp_env::with_var(OTEL_RUM_SESSION_SAMPLE_RATE, Some(value), || {
            SessionConfig::default()
        });

        assert_eq!(config.sample_rate, expected);
    }

    #[rstest]
    #[case(-3.0, 0.0)]
    #[case(0.3, 0.3)]
    #[case(2.0, 1.0)]
    fn test_sample_rate_builder_is_clamped(#[case] rate: f64, #[case] expected: f64) {
        let config = temp_env::with_var_unset(OTEL_RUM_SESSION_SAMPLE_RATE, || {
            SessionConfig::builder().with_sample_rate(rate).build()
        });

        assert_eq!(config.sample_rate, expected);
    }
}
