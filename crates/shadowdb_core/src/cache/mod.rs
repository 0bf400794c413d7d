//! Entity caching.
//!
//! [`RuntimeCache`] lives inside one context and remembers both found and
//! confirmed-absent entities. A [`SharedCache`] can be attached to carry
//! entries across contexts; it is bounded by TTL only.

mod runtime;
mod shared;

pub use runtime::{CacheLookup, CacheStats, RuntimeCache, DEFAULT_CACHE_TTL};
pub use shared::{MemorySharedCache, SharedCache};
