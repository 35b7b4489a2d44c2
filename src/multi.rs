use crate::{Permission, Throttler, ThrottlerConfig, ThrottlerError};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// [`MultiThrottler`] enables key-based throttling, where each key has its own [`Throttler`].
///
/// Every key shares the same [`ThrottlerConfig`] but gets an independent window and pacer,
/// for example to respect a per-tenant or per-endpoint quota.
///
/// # Examples
///
/// ```
/// use anyhow::Result;
/// use futures::future::join_all;
/// use std::sync::atomic::AtomicUsize;
/// use std::sync::atomic::Ordering::SeqCst;
/// use std::sync::Arc;
/// use window_throttle::{MultiThrottler, ThrottlerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let config = ThrottlerConfig::from_millis(2, 1000)?.with_uniform_pacing(false);
///     let throttler = Arc::new(MultiThrottler::new(config)?);
///     static COUNT: AtomicUsize = AtomicUsize::new(0);
///
///     // Two admissions per key fit in the first window
///     join_all((0..10).map(|key| {
///         let throttler = throttler.clone();
///         tokio::spawn(async move {
///             throttler
///                 .throttle(key % 5, || async {
///                     COUNT.fetch_add(1, SeqCst);
///                 })
///                 .await
///         })
///     }))
///     .await;
///
///     assert_eq!(COUNT.load(SeqCst), 10);
///     assert_eq!(throttler.len(), 5);
///     Ok(())
/// }
/// ```
pub struct MultiThrottler<K> {
    /// The configuration of each key's [`Throttler`]
    config: ThrottlerConfig,

    /// The runtime the per-key timers are spawned on
    runtime: Handle,

    /// The key-specific [`Throttler`]s
    ///
    /// Entries are reached through [`dashmap::DashMap::try_entry`], backing off while the
    /// shard is locked. The shard lock is only held long enough to clone the [`Arc`] out, never
    /// across a wait.
    throttlers: dashmap::DashMap<K, Arc<Throttler>>,
}

impl<K: Eq + Hash + Clone> MultiThrottler<K> {
    /// Creates a new [`MultiThrottler`] on the current tokio runtime.
    pub fn new(config: ThrottlerConfig) -> Result<Self, ThrottlerError> {
        Ok(Self {
            config,
            runtime: Handle::try_current()?,
            throttlers: dashmap::DashMap::new(),
        })
    }

    /// The settings every key's throttler is built with.
    pub fn config(&self) -> &ThrottlerConfig {
        &self.config
    }

    /// Number of keys with a live [`Throttler`].
    pub fn len(&self) -> usize {
        self.throttlers.len()
    }

    /// Whether no key has been throttled yet.
    pub fn is_empty(&self) -> bool {
        self.throttlers.is_empty()
    }

    /// Waits for permission from the throttler of `key`, creating it on first use.
    pub async fn wait_for_permission_async(
        &self,
        key: K,
        cancel: Option<CancellationToken>,
    ) -> Result<Permission, ThrottlerError> {
        let throttler = self.throttler(key).await;
        throttler.wait_for_permission_async(cancel).await
    }

    /// Throttles the execution of a function based on a key.
    /// Throttling is key-specific, so multiple keys can be throttled independently.
    pub async fn throttle<Fut, F, T>(&self, key: K, f: F) -> T
    where
        Fut: Future<Output = T>,
        F: FnOnce() -> Fut,
    {
        let throttler = self.throttler(key).await;
        throttler.throttle(f).await
    }

    /// Stops every key's throttler. Each restarts on its next admission.
    pub fn stop_all(&self) {
        for throttler in self.throttlers.iter() {
            throttler.stop();
        }
    }

    /// Drops the throttler of `key`, returning whether one existed.
    pub fn remove(&self, key: &K) -> bool {
        match self.throttlers.remove(key) {
            Some((_, throttler)) => {
                throttler.stop();
                true
            }
            None => false,
        }
    }

    async fn throttler(&self, key: K) -> Arc<Throttler> {
        let mut backoff = get_backoff();
        loop {
            if let Some(entry) = self.throttlers.try_entry(key.clone()) {
                let throttler = entry.or_insert_with(|| {
                    Arc::new(Throttler::with_handle(self.config, self.runtime.clone()))
                });
                return throttler.value().clone();
            }

            // The shard is locked by another caller
            let delay = backoff.next_backoff().unwrap_or(MAX_INTERVAL);
            tokio::time::sleep(delay).await
        }
    }
}

const MAX_INTERVAL: Duration = Duration::from_millis(100);

fn get_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::default()
        .with_initial_interval(Duration::from_millis(1))
        .with_max_interval(MAX_INTERVAL)
        .with_max_elapsed_time(None)
        .build()
}

impl<K: Eq + Hash> std::fmt::Debug for MultiThrottler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiThrottler")
            .field("config", &self.config)
            .field("keys", &self.throttlers.len())
            .finish()
    }
}
