use crate::ThrottlerError;
use std::time::Duration;

/// Immutable settings of a [`Throttler`](crate::Throttler).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use window_throttle::ThrottlerConfig;
///
/// let config = ThrottlerConfig::new(100, Duration::from_secs(5))
///     .unwrap()
///     .with_propagate_cancellation(true);
///
/// assert_eq!(config.interval_ms(), 50);
/// assert!(config.uniform_pacing());
/// assert!(config.propagate_cancellation());
///
/// assert!(ThrottlerConfig::from_millis(0, 5000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlerConfig {
    request_limit: usize,
    period_ms: u64,
    uniform_pacing: bool,
    propagate_cancellation: bool,
}

impl ThrottlerConfig {
    /// Allows `request_limit` admissions per `period`.
    ///
    /// The period is kept at millisecond resolution, so anything below 1ms is rejected.
    pub fn new(request_limit: usize, period: Duration) -> Result<Self, ThrottlerError> {
        let period_ms = u64::try_from(period.as_millis()).map_err(|_| {
            ThrottlerError::InvalidConfiguration("period must fit in u64 milliseconds")
        })?;
        Self::from_millis(request_limit, period_ms)
    }

    /// Allows `request_limit` admissions per `period_ms` milliseconds.
    pub fn from_millis(request_limit: usize, period_ms: u64) -> Result<Self, ThrottlerError> {
        if request_limit == 0 {
            return Err(ThrottlerError::InvalidConfiguration(
                "request limit must be greater than 0",
            ));
        }
        if period_ms == 0 {
            return Err(ThrottlerError::InvalidConfiguration(
                "period must be at least 1ms",
            ));
        }

        Ok(Self {
            request_limit,
            period_ms,
            uniform_pacing: true,
            propagate_cancellation: false,
        })
    }

    /// Spread admissions evenly across the period instead of releasing them in a burst.
    pub fn with_uniform_pacing(mut self, uniform_pacing: bool) -> Self {
        self.uniform_pacing = uniform_pacing;
        self
    }

    /// Surface cancelled waits as [`ThrottlerError::Cancelled`] instead of
    /// [`Permission::Skipped`](crate::Permission::Skipped).
    pub fn with_propagate_cancellation(mut self, propagate_cancellation: bool) -> Self {
        self.propagate_cancellation = propagate_cancellation;
        self
    }

    /// Admissions allowed per period.
    pub fn request_limit(&self) -> usize {
        self.request_limit
    }

    /// Length of the window.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Length of the window in milliseconds.
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Spacing between paced admissions, `period_ms / request_limit` rounded down.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms())
    }

    /// [`ThrottlerConfig::interval`] in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        // usize always fits in u64 on supported targets
        self.period_ms / self.request_limit as u64
    }

    /// Whether uniform pacing was requested.
    pub fn uniform_pacing(&self) -> bool {
        self.uniform_pacing
    }

    /// Whether cancelled waits surface as errors.
    pub fn propagate_cancellation(&self) -> bool {
        self.propagate_cancellation
    }

    /// Whether the pacer actually runs. A zero interval leaves nothing to space out.
    pub(crate) fn paces(&self) -> bool {
        self.uniform_pacing && self.interval_ms() > 0
    }
}
