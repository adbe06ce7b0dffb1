//! Rate limiter adapters.
//!
//! - `InMemoryRateLimiter` - fixed-window counters for a single node
//!
//! ## Usage
//!
//! ```ignore
//! use taskflow_realtime::adapters::rate_limiter::{InMemoryRateLimiter, RateLimitConfig};
//!
//! let limiter = InMemoryRateLimiter::new(RateLimitConfig::default());
//! let allowed = limiter.acquire(&RateLimitKey::source_ip("10.0.0.1")).await?.is_allowed();
//! ```

mod config;
mod in_memory;

pub use config::{RateLimitConfig, WindowLimit};
pub use in_memory::InMemoryRateLimiter;
