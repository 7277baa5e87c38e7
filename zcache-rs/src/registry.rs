//! Provides the registry which resolves groups by their name.
//!
//! There is one registry per [Platform](crate::platform::Platform). It is installed by the
//! [Builder](crate::builder::Builder) and can be obtained via `platform.require::<GroupRegistry>()`.
//! The [PeerPool](crate::pool::PeerPool) uses it to resolve the group named in an incoming
//! peer request.
//!
//! Lookups only acquire a read lock, therefore concurrent requests never contend on the
//! registry. Creating a group briefly excludes all readers.
//!
//! # Example
//! ```
//! # use std::sync::Arc;
//! # use zcache::group::LoaderFn;
//! # use zcache::registry::GroupRegistry;
//! let registry = GroupRegistry::new();
//! let group = registry.new_group(
//!     "scores",
//!     2 << 10,
//!     Arc::new(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec()))),
//! );
//!
//! assert_eq!(registry.get_group("scores").unwrap().name(), group.name());
//! assert_eq!(registry.get_group("unknown").is_none(), true);
//! ```
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use yaml_rust::Yaml;

use tokio::sync::broadcast::error::RecvError;

use crate::config::{ChangeNotifier, Config};
use crate::fmt::{format_size, parse_size};
use crate::group::{Group, Loader};
use crate::platform::Platform;

/// Keeps all groups of a node by their name.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    /// Creates a new and empty registry.
    pub fn new() -> Self {
        GroupRegistry {
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Creates and installs a new registry into the given platform.
    ///
    /// If a [Config](crate::config::Config) is present, the memory limits of all groups are
    /// updated once the config changes (see [apply_config](GroupRegistry::apply_config)).
    ///
    /// Note that this is called by the [Builder](crate::builder::Builder).
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let registry = Arc::new(GroupRegistry::new());
        platform.register::<GroupRegistry>(registry.clone());

        if let Some(config) = platform.find::<Config>() {
            run_config_listener(platform.clone(), registry.clone(), config.notifier());
        }

        registry
    }

    /// Applies the memory limits configured in **groups.<name>.max_memory** to all known groups.
    ///
    /// Groups without a (valid) configured limit keep their current one.
    pub fn apply_config(&self, config: &Config) {
        let groups: Vec<Arc<Group>> = self.groups.read().unwrap().values().cloned().collect();
        for group in groups {
            let current = group.stats().max_memory;
            let configured = configured_max_memory(config, group.name(), current);
            if configured != current {
                log::info!(
                    "Changing the max memory of group {} to {}...",
                    group.name(),
                    format_size(configured)
                );
                group.set_max_memory(configured);
            }
        }
    }

    /// Creates a new group and registers it under the given name.
    ///
    /// A group which has previously been registered with the same name is replaced.
    pub fn new_group(
        &self,
        name: &str,
        max_memory: usize,
        loader: Arc<dyn Loader>,
    ) -> Arc<Group> {
        let group = Arc::new(Group::new(name, max_memory, loader));

        let mut groups = self.groups.write().unwrap();
        if groups.insert(name.to_owned(), group.clone()).is_some() {
            log::warn!("Replacing the already existing group {}...", name);
        } else {
            log::info!("Created group {}...", name);
        }

        group
    }

    /// Returns the group with the given name.
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Lists the names of all known groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().unwrap().keys().cloned().collect();
        names.sort();

        names
    }
}

fn run_config_listener(
    platform: Arc<Platform>,
    registry: Arc<GroupRegistry>,
    mut notifier: ChangeNotifier,
) {
    crate::spawn!(async move {
        loop {
            if let Err(RecvError::Closed) = notifier.recv().await {
                return;
            }

            match platform.find::<Config>() {
                Some(config) => registry.apply_config(&config),
                None => return,
            }
        }
    });
}

/// Determines the memory limit of the given group as specified in the system config.
///
/// The limit is read from **groups.<name>.max_memory** and may either be a plain number of
/// bytes or a size expression like **64m** (see [parse_size](crate::fmt::parse_size)). If no or an
/// invalid value is present, the given fallback is used.
pub fn configured_max_memory(config: &Config, name: &str, fallback: usize) -> usize {
    let handle = config.current();
    match handle.config()["groups"][name]["max_memory"] {
        Yaml::Integer(value) if value >= 0 => value as usize,
        Yaml::String(ref value) => match parse_size(value) {
            Ok(size) => size,
            Err(error) => {
                log::error!(
                    "Invalid max_memory for group {}: {}. Using {} bytes.",
                    name,
                    error,
                    fallback
                );
                fallback
            }
        },
        _ => fallback,
    }
}
