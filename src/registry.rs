use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::endpoint::Endpoint;

/// The name-keyed endpoint table.
///
/// Registration happens only during the load phase, under the write lock;
/// dispatch takes the read lock. Registration must strictly precede
/// serving; there is no hot-reload.
#[derive(Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<FxHashMap<String, Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        EndpointRegistry::default()
    }

    /// Register an endpoint under its name. A later registration with the
    /// same name replaces the earlier one (last-loaded wins).
    pub fn register(&self, endpoint: Endpoint) {
        let name = endpoint.name().to_string();
        let mut endpoints = self.endpoints.write();

        if endpoints.insert(name.clone(), endpoint).is_some() {
            warn!(endpoint = %name, "replaced an existing endpoint registration");
        } else {
            info!(endpoint = %name, total = endpoints.len(), "endpoint registered");
        }
    }

    /// Run `f` against the endpoint registered under `name`, if any.
    pub fn with<R>(&self, name: &str, f: impl FnOnce(&Endpoint) -> R) -> Option<R> {
        self.endpoints.read().get(name).map(f)
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}
