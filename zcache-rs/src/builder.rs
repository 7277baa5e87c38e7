//! Provides a builder which can be used to setup and initialize a node.
//!
//! This creates the [Platform](crate::platform::Platform) along with its central components. As
//! some of them are optional (e.g. tests rarely want signal handlers), a builder permits to
//! selectively enable or disable them. A [GroupRegistry](crate::registry::GroupRegistry) is always
//! installed.
//!
//! # Example
//! Setting up a node with all features enabled:
//! ```no_run
//! # use std::sync::Arc;
//! # use zcache::builder::Builder;
//! # use zcache::group::LoaderFn;
//! # use zcache::pool::PeerPool;
//! # use zcache::registry::GroupRegistry;
//! # use zcache::server::PeerServer;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Create the groups of this node...
//!     let group = platform.require::<GroupRegistry>().new_group(
//!         "scores",
//!         2 << 10,
//!         Arc::new(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec()))),
//!     );
//!
//!     // Tell the node about its peers...
//!     let pool = PeerPool::install(&platform, "http://localhost:8001");
//!     pool.set(&["http://localhost:8001", "http://localhost:8002"]);
//!     group.register_peers(pool.clone());
//!
//!     // Start the main event loop of the peer server...
//!     PeerServer::install(&platform, pool, "0.0.0.0:8001").event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::platform::Platform;
use crate::registry::GroupRegistry;
use crate::{init_logging, ZCACHE_REVISION, ZCACHE_VERSION};

/// Initializes a node by creating and initializing all core components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
}

impl Builder {
    /// Creates a new builder with all optional components disabled.
    pub fn new() -> Self {
        Builder {
            setup_logging: false,
            enable_signals: false,
            setup_config: false,
        }
    }

    /// Enables all features.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// Using this, we properly initialize **simplelog** to log to stdout.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the platform once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs [config::Config](crate::config::Config) and loads the **settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables setting up a **Config** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) with all the enabled components
    /// being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. ZCACHE (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            ZCACHE_VERSION,
            ZCACHE_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            crate::config::install(platform.clone()).await;
        }

        let _ = GroupRegistry::install(&platform);

        platform
    }
}
