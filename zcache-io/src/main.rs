use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use zcache::builder::Builder;
use zcache::config::{Config, Handle};
use zcache::group::LoaderFn;
use zcache::pool::PeerPool;
use zcache::registry::{configured_max_memory, GroupRegistry};
use zcache::server::PeerServer;

/// Used if no **zcache.peers** are configured.
const DEFAULT_PEERS: [&str; 3] = [
    "http://localhost:8001",
    "http://localhost:8002",
    "http://localhost:8003",
];

#[derive(Parser, Debug)]
#[command(name = "zcache-io")]
#[command(about = "Runs a zCache node which serves the demo scores group")]
struct Args {
    /// Port of the peer server (unless server.port is configured).
    #[arg(long, default_value_t = 8001)]
    port: u16,

    /// Also start the API front-end (api.host / api.port, 0.0.0.0:9999 by default).
    #[arg(long)]
    api: bool,
}

/// Provides a tiny and slow "database" which is fronted by the cache.
fn demo_database() -> HashMap<&'static str, &'static str> {
    [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
        .into_iter()
        .collect()
}

/// Determines the address of the API front-end from **api.host** and **api.port**.
///
/// Ports outside of 1..=65535 are ignored in favor of the default port 9999.
fn api_address(handle: &Handle) -> String {
    format!(
        "{}:{}",
        handle.query("api.host").as_str().unwrap_or("0.0.0.0"),
        handle
            .query("api.port")
            .as_i64()
            .filter(|port| port > &0 && port <= &(u16::MAX as i64))
            .unwrap_or(9999)
    )
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;
    let config = platform.require::<Config>();

    // Setup the demo group...
    let database = demo_database();
    let group = platform.require::<GroupRegistry>().new_group(
        "scores",
        configured_max_memory(&config, "scores", 2 << 10),
        Arc::new(LoaderFn::new(move |key: &str| {
            log::info!("[SlowDB] search key {}", key);
            database
                .get(key)
                .map(|value| value.as_bytes().to_vec())
                .ok_or_else(|| anyhow::anyhow!("{} not exist", key))
        })),
    );

    // Join the cluster...
    let (self_address, peers, api_address) = {
        let handle = config.current();
        let self_address = handle
            .query("zcache.self")
            .as_str()
            .map(|address| address.to_owned())
            .unwrap_or_else(|| format!("http://localhost:{}", args.port));
        let mut peers = handle.query_strings("zcache.peers");
        if peers.is_empty() {
            peers = DEFAULT_PEERS.iter().map(|peer| peer.to_string()).collect();
        }
        let api_address = api_address(&handle);

        (self_address, peers, api_address)
    };

    let pool = PeerPool::install(&platform, &self_address);
    pool.set(&peers);
    group.register_peers(pool.clone());

    if args.api {
        let api_platform = platform.clone();
        zcache::spawn!(async move {
            if let Err(error) = zcache::api::serve(api_platform, group, &api_address).await {
                log::error!("{:#}", error);
            }
        });
    }

    PeerServer::install(&platform, pool, &format!("0.0.0.0:{}", args.port))
        .event_loop()
        .await;
}
