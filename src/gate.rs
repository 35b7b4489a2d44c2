use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Outcome of waiting on a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    Taken,
    Cancelled,
}

/// A counting pool of permits that only a replenish event refills.
///
/// The window quota gate is a `Gate` with capacity `request_limit`; the interval pacer is a
/// `Gate` with capacity 1. Taking a permit forgets it, so the pool drains until the next
/// [`Gate::replenish`] tops it back up to capacity.
pub(crate) struct Gate {
    name: &'static str,
    capacity: usize,
    permits: Semaphore,

    /// Covers the read-then-release step of a replenish, never a wait.
    replenish_lock: Mutex<()>,
}

impl Gate {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            permits: Semaphore::new(capacity),
            replenish_lock: Mutex::new(()),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Takes one permit, waiting for a replenish if the pool is empty.
    ///
    /// A cancelled wait returns [`Acquire::Cancelled`] without touching the pool. Cancellation
    /// is checked first, so an already-cancelled token never takes a permit.
    pub async fn acquire(&self, cancel: Option<&CancellationToken>) -> Acquire {
        let Some(cancel) = cancel else {
            self.take().await;
            return Acquire::Taken;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Acquire::Cancelled,
            () = self.take() => Acquire::Taken,
        }
    }

    /// Dropping this future before it resolves leaves the pool untouched.
    async fn take(&self) {
        match self.permits.acquire().await {
            Ok(permit) => permit.forget(),
            // Gates are never closed
            Err(_) => {
                tracing::error!(gate = self.name, "gate semaphore was closed");
                panic!("{} gate semaphore was closed", self.name);
            }
        }
    }

    /// Restores the pool to capacity, returning how many permits were released.
    ///
    /// Concurrent acquires can only lower the count between the read and the release, so the
    /// pool never ends up above capacity.
    pub fn replenish(&self) -> usize {
        let _guard = self.replenish_lock.lock();
        let available = self.permits.available_permits();
        if available > self.capacity {
            tracing::error!(
                gate = self.name,
                available,
                capacity = self.capacity,
                "gate holds more permits than its capacity"
            );
            panic!(
                "{} gate holds {available} permits, capacity is {}",
                self.name, self.capacity
            );
        }

        let released = self.capacity - available;
        if released > 0 {
            self.permits.add_permits(released);
            tracing::trace!(gate = self.name, released, "replenished gate");
        }
        released
    }
}
