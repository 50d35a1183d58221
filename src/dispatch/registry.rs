//! Adapter Registry
//!
//! Scheme to adapter table. Built once through [`RegistryBuilder`] and frozen;
//! there is no way to register an adapter after [`RegistryBuilder::build`].

use crate::adapters::ServiceAdapter;
use crate::locator::Scheme;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable scheme to adapter table
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Scheme, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Adapter owning `scheme`, if one was registered
    pub fn get(&self, scheme: Scheme) -> Option<&Arc<dyn ServiceAdapter>> {
        self.adapters.get(&scheme)
    }

    pub fn contains(&self, scheme: Scheme) -> bool {
        self.adapters.contains_key(&scheme)
    }

    /// Registered schemes in a stable order
    pub fn schemes(&self) -> Vec<Scheme> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Collects adapters before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    adapters: BTreeMap<Scheme, Arc<dyn ServiceAdapter>>,
}

impl RegistryBuilder {
    /// Register an adapter under the scheme it reports; a later registration
    /// for the same scheme replaces the earlier one
    pub fn register(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        let scheme = adapter.scheme();
        if self.adapters.insert(scheme, adapter).is_some() {
            tracing::warn!("Adapter for scheme {} registered twice, keeping the last one", scheme);
        }
        self
    }

    pub fn build(self) -> AdapterRegistry {
        tracing::debug!("Adapter registry frozen with {} schemes", self.adapters.len());
        AdapterRegistry {
            adapters: self.adapters,
        }
    }
}
