//! Provides a size constrained LRU Cache.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond the given
//! limits. Each [Group](crate::group::Group) keeps its values in such a cache, therefore the
//! limit is specified in bytes (the sum of the length of all keys and values) rather than in a
//! number of entries.
//!
//! The cache itself is not thread safe. It is up to the owner to serialize all accesses. The
//! group does so by wrapping it in a **Mutex** which is only held for the in-memory operation
//! itself.
//!
//! Provides a generic cache which can store all kinds of values for which the [ByteSize](ByteSize)
//! trait is implemented. Optionally, an [EvictionListener](EvictionListener) can be attached which
//! is notified once an entry is pushed out of the cache.
mod lru_cache;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionListener;
pub use lru_cache::LRUCache;
