//! Rate limiter module

pub mod memory;
pub mod traits;

pub use memory::InMemoryRateLimiter;
pub use traits::RateLimiter;
