//! Provides a tiny DI like container which acts as the composition root of a node.
//!
//! The platform is more or less a simple map which keeps all central components (the
//! [GroupRegistry](crate::registry::GroupRegistry), the [Config](crate::config::Config), the
//! [PeerPool](crate::pool::PeerPool) and the servers) as **Arc<T>** around. Also this keeps the
//! central **is_running** flag which is toggled to *false* once
//! [Platform::terminate](Platform::terminate) is invoked. All server loops watch this flag and
//! shut down gracefully once it is cleared.
//!
//! Note that once the shutdown is initiated, the internal map is cleared. Therefore code which
//! might run after [Platform::terminate](Platform::terminate) should use
//! [Platform::find](Platform::find) and gracefully handle the **None** case, whereas during
//! startup [Platform::require](Platform::require) is the way to go.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use zcache::platform::Platform;
//! # use zcache::registry::GroupRegistry;
//! let platform = Platform::new();
//!
//! // Registers the group registry of this node...
//! platform.register::<GroupRegistry>(Arc::new(GroupRegistry::new()));
//!
//! // ...which can then be resolved by each component which has to look up groups.
//! assert_eq!(platform.require::<GroupRegistry>().names().is_empty(), true);
//!
//! // Once terminated, all components are released and the platform is no longer running...
//! platform.terminate();
//! assert_eq!(platform.find::<GroupRegistry>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Provides a container to keep all central components in a single place.
pub struct Platform {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new and running platform instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    /// Registers a component.
    ///
    /// A component which has previously been registered for the same type is replaced.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .services
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered component.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let services = self.services.lock().unwrap();
        services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolves a previously registered component.
    ///
    /// # Panics
    /// Panics if the requested component isn't available or if the platform is already
    /// shutting down.
    ///
    /// ```should_panic
    /// # use zcache::platform::Platform;
    /// # use zcache::config::Config;
    /// let platform = Platform::new();
    ///
    /// // No config has been installed, therefore this will panic...
    /// platform.require::<Config>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            );
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "A required component ({}) was not available in the platform registry!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running or if [Platform::terminate](Platform::terminate)
    /// has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This releases all components and toggles the [is_running()](Platform::is_running) flag
    /// to **false** so that all servers shut down.
    pub fn terminate(&self) {
        self.services.lock().unwrap().clear();
        self.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use crate::platform::Platform;
    use std::sync::Arc;

    struct Counter {
        value: i32,
    }

    #[test]
    fn components_can_be_replaced() {
        let platform = Platform::new();
        platform.register(Arc::new(Counter { value: 1 }));
        platform.register(Arc::new(Counter { value: 2 }));

        assert_eq!(platform.require::<Counter>().value, 2);
    }

    #[test]
    #[should_panic]
    fn requiring_after_termination_panics() {
        let platform = Platform::new();
        platform.register(Arc::new(Counter { value: 1 }));
        platform.terminate();

        let _ = platform.require::<Counter>();
    }
}
