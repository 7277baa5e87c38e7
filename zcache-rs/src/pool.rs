//! Provides the HTTP based peer protocol which connects the nodes of a cluster.
//!
//! A [PeerPool](PeerPool) plays two roles. As [PeerPicker](crate::peers::PeerPicker) it knows all
//! peers of the cluster and uses a [HashRing](crate::hash_ring::HashRing) to determine which of
//! them owns a key. For each remote peer it keeps an [HttpGetter](HttpGetter) which fetches values
//! from there. On the other hand, [PeerPool::handle](PeerPool::handle) answers the requests of
//! other nodes by looking up the requested group in the local
//! [GroupRegistry](crate::registry::GroupRegistry).
//!
//! # Protocol
//! A value is requested via **GET {base_path}{group}/{key}** where both, the group name and the
//! key are percent-encoded. The default base path is **/_zCache/**. Responses are:
//! * **200** with **Content-Type: application/octet-stream** and the raw value as body
//! * **400** if the path doesn't consist of a group and a key
//! * **404** if the group is unknown
//! * **500** with the error message as body if the group failed to provide the value
//!
//! # Membership
//! The list of peers is replaced as a whole via [PeerPool::set](PeerPool::set). Internally the
//! ring and the getters are kept as immutable snapshot in an **ArcSwap**. Therefore picking a peer
//! is lock free and a concurrent update is either fully visible or not at all.
//!
//! # Example
//! ```
//! # use std::sync::Arc;
//! # use zcache::peers::PeerPicker;
//! # use zcache::pool::PeerPool;
//! # use zcache::registry::GroupRegistry;
//! let pool = PeerPool::new("http://localhost:8001", Arc::new(GroupRegistry::new()));
//!
//! // Without any peers, each key has to be loaded locally...
//! assert_eq!(pool.pick_peer("Tom").is_none(), true);
//!
//! // The same applies if this node is the only one around...
//! pool.set(&["http://localhost:8001"]);
//! assert_eq!(pool.pick_peer("Tom").is_none(), true);
//! ```
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::HeaderValue;
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use urlencoding::{decode, encode};

use crate::config::Config;
use crate::hash_ring::HashRing;
use crate::peers::{PeerGetter, PeerPicker};
use crate::platform::Platform;
use crate::registry::GroupRegistry;

/// Contains the path prefix under which the peer protocol is served by default.
pub const DEFAULT_BASE_PATH: &str = "/_zCache/";

/// Contains the number of positions each peer occupies on the hash ring by default.
pub const DEFAULT_REPLICAS: usize = 50;

type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

fn new_http_client() -> HttpClient {
    Client::builder().build::<_, Body>(HttpsConnector::new())
}

/// Fetches values from a single remote peer via HTTP.
pub struct HttpGetter {
    base_url: String,
    client: HttpClient,
}

impl HttpGetter {
    /// Creates a getter for the given base URL.
    ///
    /// The base URL is the address of the peer followed by the base path, e.g.
    /// **http://localhost:8002/_zCache/**.
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpGetter {
            base_url: base_url.into(),
            client: new_http_client(),
        }
    }

    /// Returns the base URL used by this getter.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        let url = format!("{}{}/{}", self.base_url, encode(group), encode(key));
        let uri = Uri::from_str(&url).with_context(|| format!("Invalid peer URL: {}", url))?;

        let response = self
            .client
            .get(uri)
            .await
            .with_context(|| format!("Failed to request {}", url))?;

        if response.status() != StatusCode::OK {
            return Err(anyhow::anyhow!("server returned: {}", response.status()));
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .context("Failed to read the response body")?;

        Ok(body.to_vec())
    }
}

struct Peers {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

/// Knows all peers of the cluster and serves the peer protocol for the local node.
pub struct PeerPool {
    self_address: String,
    base_path: String,
    replicas: usize,
    registry: Arc<GroupRegistry>,
    client: HttpClient,
    peers: ArcSwap<Peers>,
}

impl PeerPool {
    /// Creates a new pool for the node reachable via **self_address** which uses the default base
    /// path and the default number of replicas.
    ///
    /// The address has to be exactly the same string as used for this node in
    /// [set](PeerPool::set) as this is how the pool recognizes keys it owns itself.
    pub fn new(self_address: &str, registry: Arc<GroupRegistry>) -> Self {
        PeerPool::with_options(self_address, DEFAULT_BASE_PATH, DEFAULT_REPLICAS, registry)
    }

    /// Creates a new pool with a custom base path and number of replicas.
    ///
    /// # Panics
    /// Panics if the base path doesn't start and end with a **/**.
    pub fn with_options(
        self_address: &str,
        base_path: &str,
        replicas: usize,
        registry: Arc<GroupRegistry>,
    ) -> Self {
        if !base_path.starts_with('/') || !base_path.ends_with('/') {
            panic!(
                "The base path of a peer pool must start and end with '/' but was: {}",
                base_path
            );
        }

        PeerPool {
            self_address: self_address.to_owned(),
            base_path: base_path.to_owned(),
            replicas,
            registry,
            client: new_http_client(),
            peers: ArcSwap::from_pointee(Peers {
                ring: HashRing::new(replicas),
                getters: HashMap::new(),
            }),
        }
    }

    /// Creates and installs a pool into the given platform.
    ///
    /// The base path and the number of replicas are read from **zcache.base_path** and
    /// **zcache.replicas** if a config is present. Groups are resolved via the
    /// [GroupRegistry](crate::registry::GroupRegistry) of the platform.
    pub fn install(platform: &Arc<Platform>, self_address: &str) -> Arc<Self> {
        let (base_path, replicas) = match platform.find::<Config>() {
            Some(config) => {
                let handle = config.current();
                (
                    handle
                        .query("zcache.base_path")
                        .as_str()
                        .unwrap_or(DEFAULT_BASE_PATH)
                        .to_owned(),
                    handle
                        .query("zcache.replicas")
                        .as_i64()
                        .filter(|replicas| *replicas > 0)
                        .map(|replicas| replicas as usize)
                        .unwrap_or(DEFAULT_REPLICAS),
                )
            }
            None => (DEFAULT_BASE_PATH.to_owned(), DEFAULT_REPLICAS),
        };

        let pool = Arc::new(PeerPool::with_options(
            self_address,
            &base_path,
            replicas,
            platform.require::<GroupRegistry>(),
        ));
        platform.register::<PeerPool>(pool.clone());

        pool
    }

    /// Returns the address of the local node.
    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Returns the path prefix under which the peer protocol is served.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Replaces the list of known peers.
    ///
    /// The local node should be part of the list, otherwise it never considers itself the owner
    /// of any key.
    pub fn set<S: AsRef<str>>(&self, peers: &[S]) {
        let mut ring = HashRing::new(self.replicas);
        ring.add(peers);

        let getters = peers
            .iter()
            .map(|peer| {
                let peer = peer.as_ref();
                let getter = HttpGetter {
                    base_url: format!("{}{}", peer, self.base_path),
                    client: self.client.clone(),
                };
                (peer.to_owned(), Arc::new(getter))
            })
            .collect();

        self.peers.store(Arc::new(Peers { ring, getters }));
        log::info!(
            "[Server {}] Now using {} peer(s)...",
            self.self_address,
            peers.len()
        );
    }

    /// Lists all currently known peers in alphabetical order.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.load().getters.keys().cloned().collect();
        peers.sort();

        peers
    }

    /// Handles a request of another node.
    ///
    /// # Panics
    /// Panics if the path of the request doesn't start with the base path of this pool. Use
    /// [PeerServer](crate::server::PeerServer) to only route matching requests here.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().to_owned();
        let remainder = match path.strip_prefix(self.base_path.as_str()) {
            Some(remainder) => remainder,
            None => panic!("PeerPool serving unexpected path: {}", path),
        };

        log::info!("[Server {}] {} {}", self.self_address, req.method(), path);

        let (group_name, key) = match remainder
            .split_once('/')
            .and_then(|(group_name, key)| Some((decode(group_name).ok()?, decode(key).ok()?)))
        {
            Some(group_and_key) => group_and_key,
            None => return text_response(StatusCode::BAD_REQUEST, "bad request"),
        };

        let group = match self.registry.get_group(&group_name) {
            Some(group) => group,
            None => {
                return text_response(
                    StatusCode::NOT_FOUND,
                    format!("no such group: {}", group_name),
                )
            }
        };

        match group.get(&key).await {
            Ok(value) => {
                let mut response = Response::new(Body::from(value.byte_slice()));
                let _ = response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
            Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        }
    }
}

impl PeerPicker for PeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peers = self.peers.load();
        let owner = peers.ring.get(key);
        if owner.is_empty() || owner == self.self_address {
            return None;
        }

        log::debug!("[Server {}] Pick peer {}", self.self_address, owner);
        let getter: Arc<dyn PeerGetter> = peers.getters.get(owner)?.clone();

        Some(getter)
    }
}

/// Creates a plain text response with the given status.
pub(crate) fn text_response(status: StatusCode, text: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(text.into()));
    *response.status_mut() = status;

    response
}
