//! zCache is an embeddable distributed cache which turns a set of ordinary service processes into
//! a shared, horizontally scalable read-through cache.
//!
//! # Introduction
//! Every participating node links this library and keeps a **size bounded LRU cache** per
//! [Group](group::Group). A group is a named cache namespace with its own capacity and its own
//! [Loader](group::Loader) which provides the authoritative data for a key.
//!
//! On a local cache miss, a group asks its [PeerPicker](peers::PeerPicker) which node owns the
//! requested key. Ownership is determined by a [consistent hash ring](hash_ring::HashRing) which
//! every node builds from the same list of peer addresses. If another node owns the key, the value
//! is fetched from that node via a tiny HTTP protocol (see [pool](pool)). If this node owns the key
//! or if the peer cannot be reached, the loader is invoked locally and its result is cached.
//!
//! There is no separate cache server process. Each node serves its peers directly using the
//! [PeerServer](server::PeerServer).
//!
//! # Features
//! * **Consistent hashing with virtual nodes** so that each key has exactly one owner in the
//!   cluster and adding a node only moves a fraction of the keys.
//! * **Byte bounded LRU caches** with eviction notifications and basic metrics.
//! * **100% Async/Await** - peer requests and the servers are built upon
//!   [tokio](https://tokio.rs/) and [hyper](https://hyper.rs/).
//! * **Reload-aware config facility** which re-reads **config/settings.yml** once it changes. The
//!   peer server relocates to a new address without a restart.
//!
//! # Modules
//! * **hash_ring**: maps keys onto nodes.
//! * **lru**: the size constrained cache which backs each group.
//! * **group** / **registry**: cache namespaces and the registry which resolves them by name.
//! * **pool** / **server**: the peer protocol (client and request handler) and its HTTP server.
//! * **api**: a small user facing HTTP front-end which exposes a single group.
//!
//! # Examples
//! A complete node can be found in **zcache-io**. A short example on how to set up the library
//! can be found here [Builder](builder::Builder).
#![deny(
    warnings,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod api;
pub mod builder;
pub mod byte_view;
pub mod config;
pub mod fmt;
pub mod group;
pub mod hash_ring;
pub mod lru;
pub mod peers;
pub mod platform;
pub mod pool;
pub mod registry;
pub mod server;
pub mod signals;

/// Contains the version of the zCache library.
pub const ZCACHE_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the zCache build being used.
pub const ZCACHE_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// library, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests build several platforms within one process, therefore this must only ever
    // happen once...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned handle as we are never
/// interested in joining these tasks.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate zcache;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}

#[cfg(test)]
mod testing {
    use hyper::{Client, StatusCode};

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }

    /// Performs a plain GET request against one of our local test servers.
    ///
    /// Returns the status code and the body of the response as string.
    pub async fn http_get(url: &str) -> (StatusCode, String) {
        let client = Client::new();
        let response = client.get(url.parse().unwrap()).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, String::from_utf8_lossy(&body).to_string())
    }
}
