use crate::gate::Gate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns the timers that replenish the window gate and the pacer.
///
/// Start and stop are serialized by the `timers` lock; `running` mirrors whether the window
/// timer is armed so admissions can skip the lock once the throttler is up.
pub(crate) struct Lifecycle {
    runtime: Handle,
    running: AtomicBool,
    timers: Mutex<Timers>,
}

#[derive(Default)]
struct Timers {
    window: Option<JoinHandle<()>>,
    pacer: Option<JoinHandle<()>>,
}

impl Lifecycle {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            running: AtomicBool::new(false),
            timers: Mutex::new(Timers::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Arms the pacer timer on its own, leaving the window timer for the first admission.
    pub fn arm_pacer(&self, pacer: &Arc<Gate>, interval: Duration) {
        let mut timers = self.timers.lock();
        if timers.pacer.is_none() {
            timers.pacer = Some(self.spawn_replenisher(pacer.clone(), interval));
            tracing::debug!(?interval, "armed pacer timer");
        }
    }

    /// Arms whatever timers are missing. A no-op when already running.
    pub fn start(
        &self,
        window: &Arc<Gate>,
        period: Duration,
        pacer: Option<(&Arc<Gate>, Duration)>,
    ) {
        if self.is_running() {
            return;
        }

        let mut timers = self.timers.lock();
        if timers.window.is_none() {
            timers.window = Some(self.spawn_replenisher(window.clone(), period));
            tracing::debug!(?period, "armed window timer");
        }
        if let Some((pacer, interval)) = pacer {
            if timers.pacer.is_none() {
                timers.pacer = Some(self.spawn_replenisher(pacer.clone(), interval));
                tracing::debug!(?interval, "armed pacer timer");
            }
        }
        self.running.store(true, Ordering::Release);
    }

    /// Disarms both timers and refills both gates. Safe to call when never started.
    ///
    /// Refilling the pacer lets a caller already queued on it through; that caller re-arms the
    /// timers for whoever is queued behind it.
    pub fn stop(&self, window: &Gate, pacer: Option<&Gate>) {
        let mut timers = self.timers.lock();
        if let Some(timer) = timers.window.take() {
            timer.abort();
            tracing::debug!("disarmed window timer");
        }
        if let Some(timer) = timers.pacer.take() {
            timer.abort();
            tracing::debug!("disarmed pacer timer");
        }
        // Cleared before the refill so woken callers re-arm through the lock
        self.running.store(false, Ordering::Release);
        window.replenish();
        if let Some(pacer) = pacer {
            pacer.replenish();
        }
    }

    /// First tick lands one full `period` after arming.
    fn spawn_replenisher(&self, gate: Arc<Gate>, period: Duration) -> JoinHandle<()> {
        let first_tick = Instant::now() + period;
        self.runtime.spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                gate.replenish();
            }
        })
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        let timers = self.timers.get_mut();
        for timer in [timers.window.take(), timers.pacer.take()].into_iter().flatten() {
            timer.abort();
        }
    }
}
