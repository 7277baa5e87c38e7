//! Contains the HTTP server which answers the requests of other nodes.
//!
//! Opens a server socket on the specified port (**server.port** in the config or the fallback
//! address given at installation) and binds it to the selected IP (**server.host** in the config
//! or 0.0.0.0). All requests below the base path of the [PeerPool](crate::pool::PeerPool) are
//! handed to [PeerPool::handle](crate::pool::PeerPool::handle), all others are answered with
//! **404**.
//!
//! Note that the server will periodically try to bind the socket to the selected address,
//! therefore a new instance can be started while the old one is still running and the port
//! will be handed through once the old instance shuts down. Also, this will listen to change
//! events of the config and will relocate to another port or host if changed.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! use zcache::builder::Builder;
//! use zcache::config::Config;
//! use zcache::pool::PeerPool;
//! use zcache::server::PeerServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Setup and create a platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Specify a minimal config so that we run on a different port than a
//!     // production instance.
//!     platform.require::<Config>().load_from_string("
//!         server:
//!             port: 1503
//!     ", None);
//!
//!     // Run the peer server...
//!     let pool = PeerPool::install(&platform, "http://localhost:1503");
//!     PeerServer::install(&platform, pool, "0.0.0.0:8001").event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};
use tokio::sync::broadcast::error::RecvError;

use crate::config::{ChangeNotifier, Config};
use crate::platform::Platform;
use crate::pool::{text_response, PeerPool};
use crate::spawn;

/// Specifies the interval in which a server checks if the platform is still running.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Specifies the interval in which a failed bind is retried.
const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Represents the server which serves the peer protocol of a node.
pub struct PeerServer {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    platform: Arc<Platform>,
    pool: Arc<PeerPool>,
    fallback_address: String,
}

impl PeerServer {
    /// Creates and installs a **PeerServer** into the given **Platform**.
    ///
    /// The **fallback_address** is used if no **server.port** is configured.
    ///
    /// Note that this will not technically start the server. This has to be done manually
    /// via [event_loop](PeerServer::event_loop) as it is most probably done in the main thread.
    pub fn install(
        platform: &Arc<Platform>,
        pool: Arc<PeerPool>,
        fallback_address: &str,
    ) -> Arc<Self> {
        let server = Arc::new(PeerServer {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            platform: platform.clone(),
            pool,
            fallback_address: fallback_address.to_owned(),
        });

        platform.register::<PeerServer>(server.clone());

        server
    }

    /// Determines if the server socket should keep listening for incoming connections.
    ///
    /// In contrast to **Platform::is_running** this is not used to control the shutdown of the
    /// server. Rather we toggle this flag to false if a config and therefore address change was
    /// detected. This way the current server stops and the **event_loop** binds to the new
    /// address.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the address the server socket is currently bound to.
    pub fn current_address(&self) -> Option<String> {
        self.current_address.lock().unwrap().clone()
    }

    /// Determines the server address based on the current configuration.
    fn address(&self) -> String {
        self.platform
            .find::<Config>()
            .and_then(|config| {
                let handle = config.current();
                let port = handle
                    .query("server.port")
                    .as_i64()
                    .filter(|port| port > &0 && port <= &(u16::MAX as i64))?;
                let host = handle.query("server.host").as_str().unwrap_or("0.0.0.0");

                Some(format!("{}:{}", host, port))
            })
            .unwrap_or_else(|| self.fallback_address.clone())
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the tests itself run in the main thread.
    pub fn fork(server: &Arc<PeerServer>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is bound.
    ///
    /// Just like **fork** this is intended to be used in test environments.
    pub async fn fork_and_await(server: &Arc<PeerServer>) {
        PeerServer::fork(server);

        while server.current_address().is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Tries to open a server socket on the specified address to serve incoming requests.
    ///
    /// Once the socket is bound, requests are served until either the platform is terminated
    /// or the configured address changes. In the latter case, the loop binds to the new address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported = Instant::now();

        while self.platform.is_running() {
            // If the server is started for the first time or if it has been restarted due to a
            // config change, we need to reload the address...
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            match bind(&address).await {
                Ok(builder) => {
                    log::info!("Opened peer server socket on {}...", &address);
                    *self.current_address.lock().unwrap() = Some(address.clone());
                    if let Err(error) = self.server_loop(builder).await {
                        log::error!("{:#}", error);
                    }
                    *self.current_address.lock().unwrap() = None;
                    log::info!("Closing peer server socket on {}.", &address);
                }
                Err(error) => {
                    // We retry every 500ms but only log every 5s to keep the log readable...
                    if last_bind_error_reported.elapsed().as_secs() > 5 {
                        log::error!("{:#}. Retrying every 500ms...", error);
                        last_bind_error_reported = Instant::now();
                    }
                    tokio::time::sleep(BIND_RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn server_loop(&self, builder: hyper::server::Builder<AddrIncoming>) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        let make_svc = make_service_fn(move |_conn| {
            let pool = pool.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let pool = pool.clone();
                    async move { Ok::<_, Infallible>(route(&pool, req).await) }
                }))
            }
        });

        builder
            .serve(make_svc)
            .with_graceful_shutdown(self.await_shutdown())
            .await
            .context("The peer server failed")
    }

    /// Completes once either the platform is terminated or the configured address changed.
    async fn await_shutdown(&self) {
        let mut notifier = self
            .platform
            .find::<Config>()
            .map(|config| config.notifier());

        while self.platform.is_running() {
            tokio::select! {
                _ = tokio::time::sleep(SHUTDOWN_CHECK_INTERVAL) => (),
                changed = await_change(&mut notifier) => {
                    if changed && self.address_changed() {
                        log::info!("Server address has changed. Restarting server socket...");

                        // Force the event_loop to re-evaluate the expected server address...
                        self.running.store(false, Ordering::Release);
                        return;
                    }
                }
            }
        }
    }

    fn address_changed(&self) -> bool {
        match &*self.current_address.lock().unwrap() {
            Some(current_address) => current_address != &self.address(),
            None => false,
        }
    }
}

async fn route(pool: &PeerPool, req: Request<Body>) -> Response<Body> {
    if req.uri().path().starts_with(pool.base_path()) {
        pool.handle(req).await
    } else {
        text_response(StatusCode::NOT_FOUND, "not found")
    }
}

/// Waits for the next config change.
///
/// Returns **false** if the config has been dropped (which happens once the platform is
/// terminated). Without any config, this never completes.
async fn await_change(notifier: &mut Option<ChangeNotifier>) -> bool {
    let receiver = match notifier.as_mut() {
        Some(receiver) => receiver,
        None => return std::future::pending().await,
    };

    if let Err(RecvError::Closed) = receiver.recv().await {
        *notifier = None;
        return false;
    }

    true
}

/// Resolves the given address and binds a server socket to it.
pub(crate) async fn bind(address: &str) -> anyhow::Result<hyper::server::Builder<AddrIncoming>> {
    let socket_address = tokio::net::lookup_host(address)
        .await
        .with_context(|| format!("Cannot resolve server address: {}", address))?
        .next()
        .with_context(|| format!("Cannot resolve server address: {}", address))?;

    hyper::Server::try_bind(&socket_address)
        .with_context(|| format!("Cannot open server address: {}", address))
}

/// Completes once the given platform has been terminated.
pub(crate) async fn await_termination(platform: &Platform) {
    while platform.is_running() {
        tokio::time::sleep(SHUTDOWN_CHECK_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::Config;
    use crate::group::{Group, LoaderFn};
    use crate::peers::PeerPicker;
    use crate::platform::Platform;
    use crate::pool::PeerPool;
    use crate::registry::GroupRegistry;
    use crate::server::PeerServer;
    use crate::testing::{http_get, test_async};
    use hyper::StatusCode;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const NODE_A: &str = "http://127.0.0.1:17811";
    const NODE_B: &str = "http://127.0.0.1:17812";

    struct Node {
        platform: Arc<Platform>,
        group: Arc<Group>,
        pool: Arc<PeerPool>,
        server: Arc<PeerServer>,
        loads: Arc<Mutex<HashMap<String, usize>>>,
    }

    async fn start_node(self_address: &str, bind_address: &str) -> Node {
        let platform = Builder::new().build().await;

        let loads = Arc::new(Mutex::new(HashMap::new()));
        let counts = loads.clone();
        let group = platform.require::<GroupRegistry>().new_group(
            "scores",
            2 << 10,
            Arc::new(LoaderFn::new(move |key: &str| {
                *counts.lock().unwrap().entry(key.to_owned()).or_insert(0) += 1;
                Ok(format!("value of {}", key).into_bytes())
            })),
        );

        let pool = PeerPool::install(&platform, self_address);
        pool.set(&[NODE_A, NODE_B]);
        group.register_peers(pool.clone());

        let server = PeerServer::install(&platform, pool.clone(), bind_address);
        PeerServer::fork_and_await(&server).await;

        Node {
            platform,
            group,
            pool,
            server,
            loads,
        }
    }

    async fn await_shutdown(server: &PeerServer) {
        let mut attempts = 0;
        while server.current_address().is_some() && attempts < 100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            attempts += 1;
        }
    }

    #[test]
    fn keys_are_fetched_from_their_owner() {
        test_async(async {
            let node_a = start_node(NODE_A, "127.0.0.1:17811").await;
            let node_b = start_node(NODE_B, "127.0.0.1:17812").await;

            // Find a key which is owned by B...
            let key = (0..100)
                .map(|index| format!("key-{}", index))
                .find(|key| node_a.pool.pick_peer(key).is_some())
                .unwrap();

            assert_eq!(
                node_a.group.get(&key).await.unwrap().to_string(),
                format!("value of {}", key)
            );
            assert_eq!(
                node_a.group.get(&key).await.unwrap().to_string(),
                format!("value of {}", key)
            );

            // A never loaded the key itself but asked B twice, which loaded it once and then
            // served it from its cache...
            assert_eq!(node_a.loads.lock().unwrap().contains_key(&key), false);
            assert_eq!(node_b.loads.lock().unwrap()[&key], 1);
            assert_eq!(node_b.group.stats().hits, 1);

            node_a.platform.terminate();
            node_b.platform.terminate();
            await_shutdown(&node_a.server).await;
            await_shutdown(&node_b.server).await;
            assert_eq!(node_a.server.current_address().is_none(), true);
            assert_eq!(node_b.server.current_address().is_none(), true);
        });
    }

    #[test]
    fn invalid_requests_are_rejected() {
        test_async(async {
            let node = start_node("http://127.0.0.1:17813", "127.0.0.1:17813").await;

            assert_eq!(
                http_get("http://127.0.0.1:17813/favicon.ico").await.0,
                StatusCode::NOT_FOUND
            );
            assert_eq!(
                http_get("http://127.0.0.1:17813/_zCache/scores").await.0,
                StatusCode::BAD_REQUEST
            );
            assert_eq!(
                http_get("http://127.0.0.1:17813/_zCache/unknown/Tom").await,
                (StatusCode::NOT_FOUND, "no such group: unknown".to_owned())
            );
            assert_eq!(
                http_get("http://127.0.0.1:17813/_zCache/scores/").await,
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "key is required".to_owned()
                )
            );

            node.platform.terminate();
            await_shutdown(&node.server).await;
        });
    }

    #[test]
    fn server_relocates_once_the_config_changes() {
        test_async(async {
            let platform = Builder::new().enable_config().build().await;
            platform
                .require::<Config>()
                .load_from_string(
                    "
server:
    host: 127.0.0.1
    port: 17821
",
                    None,
                )
                .unwrap();

            let pool = PeerPool::install(&platform, "http://127.0.0.1:17821");
            let server = PeerServer::install(&platform, pool, "127.0.0.1:17829");
            PeerServer::fork_and_await(&server).await;
            assert_eq!(server.current_address().unwrap(), "127.0.0.1:17821");

            platform
                .require::<Config>()
                .load_from_string(
                    "
server:
    host: 127.0.0.1
    port: 17822
",
                    None,
                )
                .unwrap();

            let mut attempts = 0;
            while server.current_address().as_deref() != Some("127.0.0.1:17822") && attempts < 100
            {
                tokio::time::sleep(Duration::from_millis(50)).await;
                attempts += 1;
            }
            assert_eq!(server.current_address().unwrap(), "127.0.0.1:17822");
            assert_eq!(
                http_get("http://127.0.0.1:17822/_zCache/unknown/Tom").await.0,
                StatusCode::NOT_FOUND
            );

            platform.terminate();
            await_shutdown(&server).await;
        });
    }
}
