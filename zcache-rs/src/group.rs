//! Provides groups which are named, independently sized cache namespaces.
//!
//! A [Group](Group) answers lookups from its local [LRUCache](crate::lru::LRUCache). On a miss it
//! first asks its [PeerPicker](crate::peers::PeerPicker) (if one was registered) for the owner of
//! the key. If another node owns the key, the value is fetched from there. Otherwise, or if the
//! remote node cannot be reached, the group invokes its [Loader](Loader) and caches the result.
//!
//! Note that a value which was fetched from a peer is not stored locally, as it is already cached
//! by the node which owns it. Also note that concurrent misses for the same key are not
//! coalesced: each of them invokes the loader and the last one to complete wins.
//!
//! # Example
//! ```
//! # use std::sync::Arc;
//! # use zcache::group::{Group, Loader, LoaderFn};
//! # #[tokio::main]
//! # async fn main() {
//! let loader: Arc<dyn Loader> = Arc::new(LoaderFn::new(|key: &str| match key {
//!     "Tom" => Ok(b"630".to_vec()),
//!     _ => Err(anyhow::anyhow!("{} not exist", key)),
//! }));
//! let group = Group::new("scores", 2 << 10, loader);
//!
//! assert_eq!(group.get("Tom").await.unwrap().to_string(), "630");
//! assert_eq!(group.get("Kate").await.unwrap_err().to_string(), "Kate not exist");
//! # }
//! ```
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Context;
use async_trait::async_trait;

use crate::byte_view::ByteView;
use crate::lru::{EvictionListener, LRUCache};
use crate::peers::{PeerGetter, PeerPicker};

/// Provides the authoritative data for a key once it isn't found in the cache.
///
/// Note that a loader most probably performs some kind of blocking I/O (e.g. querying a
/// database). It is never invoked while any lock of the group is held.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Loads the value for the given key.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts a plain function or closure into a [Loader](Loader).
///
/// The function is invoked directly on the task which serves the lookup. It therefore must not
/// block (e.g. by querying a database synchronously), as this would stall a tokio worker thread
/// or even the whole node on a current thread runtime. Loaders which perform blocking I/O should
/// use [BlockingLoaderFn](BlockingLoaderFn) instead.
pub struct LoaderFn<F> {
    function: F,
}

impl<F> LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    /// Wraps the given function.
    pub fn new(function: F) -> Self {
        LoaderFn { function }
    }
}

#[async_trait]
impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.function)(key)
    }
}

/// Adapts a blocking function or closure into a [Loader](Loader).
///
/// Each invocation is moved onto tokio's blocking thread pool via **spawn_blocking**, so that
/// e.g. synchronous database calls don't stall the tasks serving other requests.
///
/// # Example
/// ```
/// # use std::sync::Arc;
/// # use zcache::group::{BlockingLoaderFn, Group};
/// # #[tokio::main]
/// # async fn main() {
/// let group = Group::new(
///     "scores",
///     2 << 10,
///     Arc::new(BlockingLoaderFn::new(|key: &str| {
///         std::thread::sleep(std::time::Duration::from_millis(10));
///         Ok(key.as_bytes().to_vec())
///     })),
/// );
///
/// assert_eq!(group.get("Tom").await.unwrap().to_string(), "Tom");
/// # }
/// ```
pub struct BlockingLoaderFn<F> {
    function: Arc<F>,
}

impl<F> BlockingLoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
{
    /// Wraps the given blocking function.
    pub fn new(function: F) -> Self {
        BlockingLoaderFn {
            function: Arc::new(function),
        }
    }
}

#[async_trait]
impl<F> Loader for BlockingLoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let function = self.function.clone();
        let key = key.to_owned();

        tokio::task::spawn_blocking(move || (*function)(&key))
            .await
            .context("The blocking loader failed to complete")?
    }
}

/// Represents the errors which are reported by [Group::get](Group::get).
///
/// Note that errors of peers are never reported, as the group falls back to its loader in
/// this case.
#[derive(Debug)]
pub enum GroupError {
    /// Signals that an empty key was requested.
    EmptyKey,
    /// Contains the unmodified error reported by the loader.
    LoaderError(anyhow::Error),
}

impl Display for GroupError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            GroupError::EmptyKey => write!(f, "key is required"),
            GroupError::LoaderError(error) => write!(f, "{}", error),
        }
    }
}

impl Error for GroupError {}

/// Provides a snapshot of the metrics of a group's cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheStats {
    /// Contains the number of cached entries.
    pub entries: usize,
    /// Contains the number of bytes occupied by keys and values.
    pub allocated_memory: usize,
    /// Contains the memory limit of the cache (0 = unbounded).
    pub max_memory: usize,
    /// Contains the number of lookups.
    pub reads: usize,
    /// Contains the number of lookups which found a value.
    pub hits: usize,
    /// Contains the number of values which have been put into the cache.
    pub writes: usize,
    /// Contains the number of entries evicted due to memory pressure.
    pub evictions: usize,
    /// Contains the hit rate in percent.
    pub hit_rate: f32,
    /// Contains the memory utilization in percent (0 for an unbounded cache).
    pub memory_utilization: f32,
}

/// Represents a named cache namespace with its own loader and capacity.
///
/// Groups are most probably created via [GroupRegistry::new_group](crate::registry::GroupRegistry::new_group)
/// so that the [PeerPool](crate::pool::PeerPool) can resolve them by name.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    cache: Mutex<LRUCache<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
}

impl Group {
    /// Creates a new group which caches up to **max_memory** bytes (0 = unbounded) and uses the
    /// given loader to fetch missing values.
    pub fn new(name: impl Into<String>, max_memory: usize, loader: Arc<dyn Loader>) -> Self {
        Group {
            name: name.into(),
            loader,
            cache: Mutex::new(LRUCache::new(max_memory)),
            peers: OnceLock::new(),
        }
    }

    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers the peer picker which is consulted on each cache miss.
    ///
    /// # Panics
    /// Panics if a picker has already been registered for this group.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!(
                "register_peers was called more than once for group {}",
                self.name
            );
        }
    }

    /// Installs a listener which is notified once a value is evicted from this group's cache.
    ///
    /// Note that the listener is invoked while the lock of the cache is held. Therefore it must
    /// neither access this group (which would deadlock) nor panic, as a panic poisons the lock
    /// and makes every subsequent access of this group panic as well.
    pub fn set_eviction_listener(&self, listener: EvictionListener<ByteView>) {
        self.cache.lock().unwrap().set_eviction_listener(listener);
    }

    /// Returns the value for the given key.
    ///
    /// The value is either served from the local cache, fetched from the peer which owns the key
    /// or provided by the loader.
    ///
    /// # Errors
    /// Fails with **GroupError::EmptyKey** for an empty key and with **GroupError::LoaderError**
    /// if the loader failed.
    pub async fn get(&self, key: &str) -> Result<ByteView, GroupError> {
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }

        if let Some(value) = self.lookup(key) {
            log::debug!("[{}] Cache hit for {}", self.name, key);
            return Ok(value);
        }

        self.load(key).await
    }

    fn lookup(&self, key: &str) -> Option<ByteView> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    async fn load(&self, key: &str) -> Result<ByteView, GroupError> {
        if let Some(peers) = self.peers.get() {
            if let Some(peer) = peers.pick_peer(key) {
                match self.get_from_peer(peer.as_ref(), key).await {
                    Ok(value) => return Ok(value),
                    Err(error) => log::warn!(
                        "[{}] Failed to get {} from peer: {:#}. Loading it locally...",
                        self.name,
                        key,
                        error
                    ),
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> anyhow::Result<ByteView> {
        let data = peer.get(&self.name, key).await?;
        Ok(ByteView::from(data))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView, GroupError> {
        let data = self
            .loader
            .load(key)
            .await
            .map_err(GroupError::LoaderError)?;

        let value = ByteView::from(data);
        self.populate_cache(key, value.clone());

        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.cache.lock().unwrap().put(key.to_owned(), value);
    }

    /// Removes the cached value for the given key from the local cache.
    ///
    /// Note that this only affects this node. Peers which own the key keep their copy.
    pub fn remove(&self, key: &str) {
        self.cache.lock().unwrap().remove(key);
    }

    /// Removes all values from the local cache and resets its metrics.
    pub fn flush(&self) {
        self.cache.lock().unwrap().flush();
        log::info!("[{}] Cache has been flushed.", self.name);
    }

    /// Changes the memory limit of this group's cache (0 = unbounded).
    ///
    /// Shrinking the limit immediately evicts the least recently used entries.
    pub fn set_max_memory(&self, max_memory: usize) {
        self.cache.lock().unwrap().set_max_memory(max_memory);
    }

    /// Returns the current metrics of this group's cache.
    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock().unwrap();
        CacheStats {
            entries: cache.len(),
            allocated_memory: cache.allocated_memory(),
            max_memory: cache.max_memory(),
            reads: cache.reads(),
            hits: cache.hits(),
            writes: cache.writes(),
            evictions: cache.evictions(),
            hit_rate: cache.hit_rate(),
            memory_utilization: cache.memory_utilization(),
        }
    }
}
