//! Two-level response cache used by the caching interceptor: request bytes
//! are fingerprinted into a key, and the looked-up response is served from
//! L1 (fast, local) before falling through to L2 (larger, slower).

mod error;
mod eviction;
mod fingerprint;
mod tiered;
mod traits;

pub use error::{CacheError, CacheResult};
pub use eviction::{EvictingCache, EvictionPolicy};
pub use fingerprint::{fingerprint, fingerprint_hex};
pub use tiered::{TieredCache, TieredCacheConfig};
pub use traits::CacheStore;
