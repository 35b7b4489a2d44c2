//! Admission throttling over a fixed window, with optional uniform pacing
//!
//! * [`Throttler`], lets at most `request_limit` operations through per period, spaced evenly
//! * [`MultiThrottler`], a key-based throttler
//!
//! # Examples
//!
//! ```
//! use window_throttle::{Throttler, ThrottlerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), window_throttle::ThrottlerError> {
//!     // 100 requests every 5 seconds, one every 50ms
//!     let throttler = Throttler::new(ThrottlerConfig::from_millis(100, 5000)?)?;
//!
//!     // This completes instantly
//!     throttler.throttle(|| computation()).await;
//!
//!     // A cancelled wait is skipped instead of granted
//!     let cancel = CancellationToken::new();
//!     cancel.cancel();
//!     let permission = throttler.wait_for_permission_async(Some(cancel)).await?;
//!     assert!(!permission.is_granted());
//!
//!     throttler.stop();
//!     Ok(())
//! }
//!
//! async fn computation() { }
//! ```
pub use config::ThrottlerConfig;
pub use error::ThrottlerError;
pub use multi::MultiThrottler;
pub use single::{Permission, Throttler};
mod config;
mod error;
mod gate;
mod lifecycle;
mod multi;
mod single;
