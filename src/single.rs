use crate::gate::{Acquire, Gate};
use crate::lifecycle::Lifecycle;
use crate::{ThrottlerConfig, ThrottlerError};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Result of a successful wait on a [`Throttler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Both gates were passed; the caller may proceed.
    Granted,

    /// The wait was cancelled and the throttler swallows cancellation. No permission was
    /// obtained, so the gated operation must be skipped.
    Skipped,
}

impl Permission {
    /// Whether the caller may perform the gated operation.
    pub fn is_granted(&self) -> bool {
        matches!(self, Permission::Granted)
    }
}

/// [`Throttler`] bounds how many operations may proceed within each period and, optionally,
/// spaces them evenly across it.
///
/// Two gates sit in front of every admission. The window gate holds `request_limit` permits
/// and is refilled to capacity every `period`. The pacer holds a single permit that is
/// released again every `period / request_limit`, so at most one admission passes per
/// interval even when the window still has room.
///
/// The pacer timer is armed on construction. The window timer is armed lazily by the first
/// admission or an explicit [`Throttler::start`], and both are disarmed by
/// [`Throttler::stop`] or when the throttler is dropped.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use window_throttle::{Throttler, ThrottlerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), window_throttle::ThrottlerError> {
///     // 10 requests per 200ms, one every 20ms
///     let config = ThrottlerConfig::from_millis(10, 200)?;
///     let throttler = Throttler::new(config)?;
///     let start = Instant::now();
///
///     for _ in 0..5 {
///         let permission = throttler.wait_for_permission_async(None).await?;
///         assert!(permission.is_granted());
///     }
///
///     // The first admission was immediate, the other four waited for the pacer.
///     assert!(start.elapsed() >= Duration::from_millis(75));
///     throttler.stop();
///     Ok(())
/// }
/// ```
pub struct Throttler {
    config: ThrottlerConfig,
    window: Arc<Gate>,
    pacer: Option<Arc<Gate>>,
    lifecycle: Lifecycle,
}

impl Throttler {
    /// Creates a throttler whose timers run on the current tokio runtime.
    ///
    /// Fails with [`ThrottlerError::NoRuntime`] outside of a runtime.
    pub fn new(config: ThrottlerConfig) -> Result<Self, ThrottlerError> {
        Ok(Self::with_handle(config, Handle::try_current()?))
    }

    /// Creates a throttler whose timers run on `runtime`.
    pub fn with_handle(config: ThrottlerConfig, runtime: Handle) -> Self {
        let window = Arc::new(Gate::new("window", config.request_limit()));
        let pacer = config.paces().then(|| Arc::new(Gate::new("pacer", 1)));
        let lifecycle = Lifecycle::new(runtime);
        if let Some(pacer) = &pacer {
            lifecycle.arm_pacer(pacer, config.interval());
        }

        Self {
            config,
            window,
            pacer,
            lifecycle,
        }
    }

    /// The settings this throttler was built with.
    pub fn config(&self) -> &ThrottlerConfig {
        &self.config
    }

    /// Whether the window timer is armed.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Admissions allowed per period.
    pub fn request_limit(&self) -> usize {
        self.config.request_limit()
    }

    /// Length of the window in milliseconds.
    pub fn period_ms(&self) -> u64 {
        self.config.period_ms()
    }

    /// Spacing between paced admissions in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.config.interval_ms()
    }

    /// Whether uniform pacing was requested.
    pub fn uniform_pacing(&self) -> bool {
        self.config.uniform_pacing()
    }

    /// Arms the timers ahead of the first admission. A no-op when already running.
    pub fn start(&self) {
        let pacer = self
            .pacer
            .as_ref()
            .map(|pacer| (pacer, self.config.interval()));
        self.lifecycle
            .start(&self.window, self.config.period(), pacer);
    }

    /// Disarms the timers and refills the window to full capacity.
    ///
    /// The next admission starts the throttler again, including one that was already waiting
    /// when the throttler stopped.
    pub fn stop(&self) {
        self.lifecycle.stop(&self.window, self.pacer.as_deref());
    }

    /// Waits for permission, blocking the current thread.
    ///
    /// Must not be called from within an async task; use
    /// [`Throttler::wait_for_permission_async`] there.
    pub fn wait_for_permission(
        &self,
        cancel: Option<CancellationToken>,
    ) -> Result<Permission, ThrottlerError> {
        futures::executor::block_on(self.wait_for_permission_async(cancel))
    }

    /// Waits for the pacer (when enabled) and then the window gate.
    ///
    /// When `cancel` fires, the gate being waited on is left untouched. The wait then returns
    /// [`Permission::Skipped`], or [`ThrottlerError::Cancelled`] if the throttler propagates
    /// cancellation. A pacer permit taken before the window wait was cancelled is not returned.
    pub async fn wait_for_permission_async(
        &self,
        cancel: Option<CancellationToken>,
    ) -> Result<Permission, ThrottlerError> {
        match self.admit(cancel.as_ref()).await {
            Ok(()) => Ok(Permission::Granted),
            Err(gate) => {
                tracing::debug!(
                    gate,
                    propagate = self.config.propagate_cancellation(),
                    "wait for permission cancelled"
                );
                if self.config.propagate_cancellation() {
                    Err(ThrottlerError::Cancelled)
                } else {
                    Ok(Permission::Skipped)
                }
            }
        }
    }

    /// Waits for permission and then runs `f`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use window_throttle::Throttler;
    ///
    /// async fn call_api() -> u32 { 42 }
    ///
    /// async fn throttled_call(throttler: Arc<Throttler>) -> u32 {
    ///     throttler.throttle(|| call_api()).await
    /// }
    /// ```
    pub async fn throttle<Fut, F, T>(&self, f: F) -> T
    where
        Fut: Future<Output = T>,
        F: FnOnce() -> Fut,
    {
        // Only a cancellation can fail an admission
        let _ = self.admit(None).await;
        f().await
    }

    /// Passes the pacer (when enabled) and then the window, returning the gate a cancelled
    /// wait gave up on.
    ///
    /// The throttler is started again after each gate, since a stop may have happened while
    /// this caller was queued.
    async fn admit(&self, cancel: Option<&CancellationToken>) -> Result<(), &'static str> {
        self.start();

        if let Some(pacer) = &self.pacer {
            if pacer.acquire(cancel).await == Acquire::Cancelled {
                return Err("pacer");
            }
            self.start();
        }
        if self.window.acquire(cancel).await == Acquire::Cancelled {
            return Err("window");
        }
        self.start();

        tracing::trace!(remaining = self.window.available(), "permission granted");
        Ok(())
    }

    #[cfg(test)]
    fn window_available(&self) -> usize {
        self.window.available()
    }

    #[cfg(test)]
    fn pacer_available(&self) -> Option<usize> {
        self.pacer.as_ref().map(|pacer| pacer.available())
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
