//! Short-lived response cache keyed by operation category and payload.

pub mod key;
pub mod sweeper;
pub mod ttl;

pub use key::CacheKey;
pub use sweeper::{CacheSweeper, CacheTask};
pub use ttl::{CacheConfig, TtlCache};
