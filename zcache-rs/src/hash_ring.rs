//! Provides a consistent hash ring which assigns keys to nodes.
//!
//! Each node is placed onto a circular numeric space several times (once per **replica**, also
//! known as *virtual node*). To determine the owner of a key, the key is hashed and the first
//! position on the ring which is greater or equal to this hash is selected. If the hash is larger
//! than all positions, we wrap around to the first position.
//!
//! As the ring is a pure function of the registered nodes and the hash function, all nodes of a
//! cluster which build their ring from the same list of peers agree on the owner of each key
//! without ever talking to each other.
//!
//! # Example
//! ```
//! # use zcache::hash_ring::HashRing;
//! let mut ring = HashRing::new(50);
//! ring.add(&["http://node-a:8001", "http://node-b:8001"]);
//!
//! let owner = ring.get("Tom");
//! assert_eq!(owner.is_empty(), false);
//!
//! // The very same key is always assigned to the very same node...
//! assert_eq!(ring.get("Tom"), owner);
//! ```
use std::collections::HashMap;

/// Describes the hash function used to place nodes and keys onto the ring.
///
/// Note that non-capturing closures can be passed in as well.
pub type HashFn = fn(&[u8]) -> u32;

/// Maps keys onto a set of nodes by using consistent hashing.
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    positions: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a new and empty ring which places each node **replicas** times onto the ring.
    ///
    /// The ring uses CRC32 (IEEE) as hash function, which is fast and distributes well
    /// enough for our purposes.
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash(replicas, crc32fast::hash)
    }

    /// Creates a new and empty ring which uses the given hash function.
    ///
    /// # Example
    /// ```
    /// # use zcache::hash_ring::HashRing;
    /// // Using a hash function which simply parses the given number makes the
    /// // ring layout predictable...
    /// let mut ring = HashRing::with_hash(3, |data| {
    ///     std::str::from_utf8(data).ok().and_then(|str| str.parse().ok()).unwrap_or(0)
    /// });
    ///
    /// // This places "2" on 2, 12, 22, "4" on 4, 14, 24 and so on...
    /// ring.add(&["6", "4", "2"]);
    /// assert_eq!(ring.get("23"), "4");
    /// ```
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            hash,
            replicas,
            positions: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Adds the given nodes to the ring.
    ///
    /// For each replica, the node is placed at the hash of **"{replica}{node}"**. Adding a node
    /// which is already present is permitted and simply places additional positions for the
    /// same owner.
    pub fn add<S: AsRef<str>>(&mut self, nodes: &[S]) {
        for node in nodes {
            let node = node.as_ref();
            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", replica, node).as_bytes());
                self.positions.push(position);
                let _ = self.owners.insert(position, node.to_owned());
            }
        }

        self.positions.sort_unstable();
    }

    /// Returns the node which owns the given key.
    ///
    /// Returns an empty string if no nodes have been added yet.
    pub fn get(&self, key: &str) -> &str {
        if self.positions.is_empty() {
            return "";
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.positions.partition_point(|position| *position < hash);
        let position = self.positions[index % self.positions.len()];

        self.owners
            .get(&position)
            .map(|owner| owner.as_str())
            .unwrap_or("")
    }

    /// Determines if no nodes have been added yet.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the number of positions (virtual nodes) placed on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of replicas used per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}
