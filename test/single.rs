#[cfg(test)]
mod tests {
    use anyhow::Result;
    use futures::future::join_all;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;
    use window_throttle::{Permission, Throttler, ThrottlerConfig, ThrottlerError};

    const TOLERABLE_TIME_AFTER_CANCELLING: Duration = Duration::from_secs(5);

    fn unpaced(limit: usize, period_ms: u64) -> Result<ThrottlerConfig> {
        Ok(ThrottlerConfig::from_millis(limit, period_ms)?.with_uniform_pacing(false))
    }

    #[tokio::test]
    async fn test_properties_follow_config() -> Result<()> {
        let throttler = Throttler::new(ThrottlerConfig::from_millis(100, 5000)?)?;

        assert_eq!(throttler.request_limit(), 100);
        assert_eq!(throttler.period_ms(), 5000);
        assert_eq!(throttler.interval_ms(), 50);
        assert!(throttler.uniform_pacing());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_stop_sets_is_running() -> Result<()> {
        let throttler = Throttler::new(ThrottlerConfig::from_millis(100, 5000)?)?;

        throttler.stop();
        assert!(!throttler.is_running());

        throttler.start();
        assert!(throttler.is_running());
        throttler.start();
        assert!(throttler.is_running());

        throttler.stop();
        assert!(!throttler.is_running());
        throttler.stop();
        assert!(!throttler.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_wait_starts_throttler() -> Result<()> {
        let throttler = Throttler::new(ThrottlerConfig::from_millis(100, 5000)?)?;
        assert!(!throttler.is_running());

        let permission = throttler.wait_for_permission_async(None).await?;
        assert_eq!(permission, Permission::Granted);
        assert!(throttler.is_running());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_wait_starts_throttler() -> Result<()> {
        let throttler = Arc::new(Throttler::new(ThrottlerConfig::from_millis(100, 5000)?)?);

        let permission = {
            let throttler = throttler.clone();
            tokio::task::spawn_blocking(move || throttler.wait_for_permission(None)).await??
        };

        assert_eq!(permission, Permission::Granted);
        assert!(throttler.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_paced_admissions_are_spread_across_window() -> Result<()> {
        // 10 per 500ms, one every 50ms
        let throttler = Throttler::new(ThrottlerConfig::from_millis(10, 500)?)?;
        let start = Instant::now();

        for _ in 0..10 {
            throttler.wait_for_permission_async(None).await?;
        }
        assert!(start.elapsed() >= Duration::from_millis(440));

        // The window is spent until it replenishes
        throttler.wait_for_permission_async(None).await?;
        assert!(start.elapsed() >= Duration::from_millis(490));
        Ok(())
    }

    #[tokio::test]
    async fn test_unpaced_window_bursts_then_blocks() -> Result<()> {
        let throttler = Throttler::new(unpaced(3, 300)?)?;
        let start = Instant::now();

        for _ in 0..3 {
            throttler.wait_for_permission_async(None).await?;
        }
        assert!(start.elapsed() < Duration::from_millis(100));

        throttler.wait_for_permission_async(None).await?;
        assert!(start.elapsed() >= Duration::from_millis(290));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_the_window() -> Result<()> {
        let throttler = Arc::new(Throttler::new(unpaced(5, 200)?)?);
        let start = Instant::now();

        let results = join_all((0..15).map(|_| {
            let throttler = throttler.clone();
            tokio::spawn(async move { throttler.wait_for_permission_async(None).await })
        }))
        .await;

        for result in results {
            assert_eq!(result??, Permission::Granted);
        }
        // 15 admissions need three windows, so two replenishes
        assert!(start.elapsed() >= Duration::from_millis(390));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_without_error() -> Result<()> {
        let throttler = Throttler::new(ThrottlerConfig::from_millis(1, 30_000)?)?;
        throttler.wait_for_permission_async(None).await?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let permission = tokio::time::timeout(
            TOLERABLE_TIME_AFTER_CANCELLING,
            throttler.wait_for_permission_async(Some(cancel)),
        )
        .await??;
        assert_eq!(permission, Permission::Skipped);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_wait_propagates_error() -> Result<()> {
        let config = ThrottlerConfig::from_millis(1, 30_000)?.with_propagate_cancellation(true);
        let throttler = Throttler::new(config)?;
        throttler.wait_for_permission_async(None).await?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = throttler.wait_for_permission_async(Some(cancel)).await;
        assert!(matches!(result, Err(ThrottlerError::Cancelled)));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_blocking_wait_returns_without_error() -> Result<()> {
        let throttler = Arc::new(Throttler::new(ThrottlerConfig::from_millis(1, 30_000)?)?);
        throttler.wait_for_permission_async(None).await?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let blocking = {
            let throttler = throttler.clone();
            tokio::task::spawn_blocking(move || throttler.wait_for_permission(Some(cancel)))
        };
        let permission = tokio::time::timeout(TOLERABLE_TIME_AFTER_CANCELLING, blocking).await???;
        assert_eq!(permission, Permission::Skipped);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_blocking_wait_propagates_error() -> Result<()> {
        let config = ThrottlerConfig::from_millis(1, 30_000)?.with_propagate_cancellation(true);
        let throttler = Arc::new(Throttler::new(config)?);
        throttler.wait_for_permission_async(None).await?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = {
            let throttler = throttler.clone();
            tokio::task::spawn_blocking(move || throttler.wait_for_permission(Some(cancel)))
                .await?
        };
        assert!(matches!(result, Err(ThrottlerError::Cancelled)));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_acts_as_deadline() -> Result<()> {
        let throttler = Throttler::new(unpaced(1, 30_000)?)?;
        throttler.wait_for_permission_async(None).await?;

        let cancel = CancellationToken::new();
        let deadline = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        let start = Instant::now();
        let permission = throttler.wait_for_permission_async(Some(cancel)).await?;
        assert_eq!(permission, Permission::Skipped);
        assert!(start.elapsed() >= Duration::from_millis(45));
        assert!(start.elapsed() < TOLERABLE_TIME_AFTER_CANCELLING);
        deadline.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelling_one_waiter_does_not_skip_another() -> Result<()> {
        let throttler = Arc::new(Throttler::new(unpaced(1, 300)?)?);
        throttler.wait_for_permission_async(None).await?;

        let cancel = CancellationToken::new();
        let cancelled = {
            let throttler = throttler.clone();
            let cancel = cancel.child_token();
            tokio::spawn(async move { throttler.wait_for_permission_async(Some(cancel)).await })
        };
        let patient = {
            let throttler = throttler.clone();
            tokio::spawn(async move { throttler.wait_for_permission_async(None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(cancelled.await??, Permission::Skipped);
        assert_eq!(patient.await??, Permission::Granted);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_refills_window_and_restarts() -> Result<()> {
        let throttler = Throttler::new(unpaced(2, 30_000)?)?;
        for _ in 0..2 {
            throttler.wait_for_permission_async(None).await?;
        }

        throttler.stop();
        assert!(!throttler.is_running());

        let start = Instant::now();
        for _ in 0..2 {
            throttler.wait_for_permission_async(None).await?;
        }
        assert!(throttler.is_running());
        assert!(start.elapsed() < Duration::from_millis(100));

        throttler.stop();
        throttler.start();
        assert!(throttler.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_admits_waiter_queued_on_pacer() -> Result<()> {
        // One every 100ms, window far away
        let throttler = Arc::new(Throttler::new(ThrottlerConfig::from_millis(100, 10_000)?)?);
        throttler.wait_for_permission_async(None).await?;

        let waiter = {
            let throttler = throttler.clone();
            tokio::spawn(async move { throttler.wait_for_permission_async(None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        throttler.stop();

        let permission = tokio::time::timeout(Duration::from_secs(2), waiter).await???;
        assert_eq!(permission, Permission::Granted);
        assert!(throttler.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_admits_every_queued_waiter() -> Result<()> {
        let throttler = Arc::new(Throttler::new(ThrottlerConfig::from_millis(100, 10_000)?)?);
        throttler.wait_for_permission_async(None).await?;

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let throttler = throttler.clone();
                tokio::spawn(async move { throttler.wait_for_permission_async(None).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        throttler.stop();

        let results =
            tokio::time::timeout(Duration::from_secs(2), join_all(waiters)).await?;
        for result in results {
            assert_eq!(result??, Permission::Granted);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_throttle_runs_function_after_permission() -> Result<()> {
        let throttler = Throttler::new(unpaced(1, 200)?)?;
        let start = Instant::now();

        async fn hello() -> &'static str {
            "hello"
        }

        assert_eq!(throttler.throttle(hello).await, "hello");
        assert_eq!(throttler.throttle(hello).await, "hello");
        assert!(start.elapsed() >= Duration::from_millis(190));
        Ok(())
    }

    #[test]
    fn test_new_requires_runtime() -> Result<()> {
        let result = Throttler::new(ThrottlerConfig::from_millis(10, 1000)?);
        assert!(matches!(result, Err(ThrottlerError::NoRuntime(_))));
        Ok(())
    }

    #[test]
    fn test_blocking_wait_from_plain_threads() -> Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        let config = ThrottlerConfig::from_millis(2, 200)?.with_uniform_pacing(false);
        let throttler = Arc::new(Throttler::with_handle(config, runtime.handle().clone()));
        let start = Instant::now();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let throttler = throttler.clone();
                std::thread::spawn(move || throttler.wait_for_permission(None))
            })
            .collect();

        for thread in threads {
            let permission = thread.join().expect("waiting thread panicked")?;
            assert_eq!(permission, Permission::Granted);
        }
        // Four admissions at two per window
        assert!(start.elapsed() >= Duration::from_millis(190));

        throttler.stop();
        Ok(())
    }
}
