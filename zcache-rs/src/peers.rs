//! Defines the capabilities a [Group](crate::group::Group) requires to talk to other nodes.
//!
//! A group only knows about a [PeerPicker](PeerPicker) which selects the owner of a key and a
//! [PeerGetter](PeerGetter) which fetches a value from this owner. The HTTP based implementation
//! of both is provided by [PeerPool](crate::pool::PeerPool).
use std::sync::Arc;

use async_trait::async_trait;

/// Selects the node which owns a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter for the remote node which owns the given key.
    ///
    /// Returns **None** if no peers are known or if the key is owned by the local node, as
    /// such keys have to be loaded locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from a remote node.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetches the value of the given key in the given group from the remote node.
    async fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}
