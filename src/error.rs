/// Errors returned by [`Throttler`](crate::Throttler) and [`MultiThrottler`](crate::MultiThrottler).
#[derive(Debug, thiserror::Error)]
pub enum ThrottlerError {
    /// The request limit or period can't describe a usable window.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// The wait was cancelled and the throttler propagates cancellation.
    #[error("wait for permission was cancelled")]
    Cancelled,

    /// The throttler was built outside of a tokio runtime.
    #[error("no tokio runtime to drive the throttler timers: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
