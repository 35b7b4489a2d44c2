//! One blocking and one async caller sharing a throttler of 20 requests per 5 seconds.
//!
//! Run with `RUST_LOG=window_throttle=trace` to watch the gates replenish.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use window_throttle::{Throttler, ThrottlerConfig};

const REQUESTS: usize = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ThrottlerConfig::new(20, Duration::from_secs(5))?;
    let throttler = Arc::new(Throttler::new(config)?);

    let blocking = {
        let throttler = throttler.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let start = Instant::now();
            for i in 0..REQUESTS {
                throttler.wait_for_permission(None)?;
                std::thread::sleep(Duration::from_millis(100));
                println!("Sync - {i}");
            }
            println!("Sync done in {:.2} s", start.elapsed().as_secs_f64());
            Ok(())
        })
    };

    let start = Instant::now();
    for i in 0..REQUESTS {
        throttler.wait_for_permission_async(None).await?;
        println!("Async - {i}");
    }
    println!("Async done in {:.2} s", start.elapsed().as_secs_f64());

    blocking.await??;
    throttler.stop();
    Ok(())
}
