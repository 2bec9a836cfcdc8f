//! Registry of bound action methods
//!
//! Methods are looked up by name from any task; the map is sharded so
//! concurrent lookups do not contend.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, info};

use super::error::ActResult;
use crate::config_error;
use crate::action::ActionMethod;

pub struct MethodRegistry {
    methods: DashMap<String, Arc<ActionMethod>>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
        }
    }

    /// Get a method by name
    pub fn get(&self, name: &str) -> Option<Arc<ActionMethod>> {
        self.methods.get(name).map(|entry| entry.value().clone())
    }

    /// Register a method. Names are unique for the registry's lifetime.
    pub fn insert(&self, method: ActionMethod) -> ActResult<Arc<ActionMethod>> {
        match self.methods.entry(method.name().to_string()) {
            Entry::Occupied(entry) => {
                Err(config_error!("Method name already exists: {}", entry.key()))
            }
            Entry::Vacant(entry) => {
                debug!("Registering method: {}", entry.key());
                let method = Arc::new(method);
                entry.insert(method.clone());
                Ok(method)
            }
        }
    }

    /// Remove a method
    pub fn remove(&self, name: &str) -> Option<Arc<ActionMethod>> {
        debug!("Removing method: {}", name);
        self.methods.remove(name).map(|(_, method)| method)
    }

    /// Bulk removal, used when the owner shuts down
    pub fn clear(&self) {
        info!("Clearing {} methods", self.methods.len());
        self.methods.clear();
    }

    /// Get registry counts for monitoring
    pub fn get_stats(&self) -> MethodStats {
        MethodStats {
            method_count: self.methods.len(),
            cached_count: self
                .methods
                .iter()
                .filter(|entry| entry.value().is_cached())
                .count(),
        }
    }
}

/// Statistics about registry contents
#[derive(Debug, Clone)]
pub struct MethodStats {
    pub method_count: usize,
    pub cached_count: usize,
}
