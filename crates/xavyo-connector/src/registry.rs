//! Connector lifecycle management.
//!
//! [`ConnectorManager`] owns the process-wide cache of live connectors keyed
//! by resource. Construction is single-flight per resource: concurrent first
//! accesses to the same resource share one initialization, and callers for
//! other resources are never blocked by it.

use dashmap::DashMap;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::config::{build_override, ConnConfProperty, ConnInstance};
use crate::error::{ConnectorError, ConnectorResult};
use crate::facade::ConnectorFacade;
use crate::resource::ExternalResource;
use crate::traits::{Connector, ConnectorFactory};
use crate::types::ConnectorCapability;

/// A live, shareable connector.
pub type BoxedConnector = Arc<dyn Connector>;

type ConnectorCell = Arc<OnceCell<BoxedConnector>>;

/// Source of the resources known at startup.
pub trait ResourceProvider: Send + Sync {
    /// All resources to load.
    fn resources(&self) -> Vec<ExternalResource>;
}

impl ResourceProvider for Vec<ExternalResource> {
    fn resources(&self) -> Vec<ExternalResource> {
        self.clone()
    }
}

/// Builds, caches, overrides, registers and disposes live connectors.
#[derive(Default)]
pub struct ConnectorManager {
    factories: DashMap<String, Arc<dyn ConnectorFactory>>,
    connectors: DashMap<String, ConnectorCell>,
}

impl ConnectorManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for a bundle name, replacing any previous one.
    pub fn register_factory(&self, factory: Arc<dyn ConnectorFactory>) {
        let bundle = factory.bundle_name().to_string();
        debug!(bundle = %bundle, "Registering connector factory");
        self.factories.insert(bundle, factory);
    }

    /// Build a new live connector for an instance. The result is not cached.
    #[instrument(skip(self, instance), fields(bundle = %instance.bundle_name))]
    pub async fn create_connector(&self, instance: &ConnInstance) -> ConnectorResult<BoxedConnector> {
        let factory = self
            .factories
            .get(&instance.bundle_name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| ConnectorError::BundleNotFound {
                bundle: instance.bundle_name.clone(),
            })?;

        let bundle = factory.create(instance).await?;
        let connector = ConnectorFacade::new(instance.clone(), bundle);
        connector.validate()?;
        Ok(Arc::new(connector))
    }

    /// Merge per-resource overrides onto a base instance; pure.
    pub fn build_override(
        &self,
        base: &ConnInstance,
        conf_override: &[ConnConfProperty],
        capabilities_override: Option<&BTreeSet<ConnectorCapability>>,
    ) -> ConnInstance {
        build_override(base, conf_override, capabilities_override)
    }

    /// Live connector for a resource, created and cached on first access.
    ///
    /// If the resource is unregistered while its connector is being
    /// created, the new connector is disposed and the call fails with
    /// `ConnectorNotFound`, unless a replacement was registered meanwhile.
    pub async fn get_connector(&self, resource: &ExternalResource) -> ConnectorResult<BoxedConnector> {
        // Clone the cell out so the map shard lock is not held across await.
        let cell = self
            .connectors
            .entry(resource.key.clone())
            .or_default()
            .value()
            .clone();

        let connector = cell
            .get_or_try_init(|| async {
                let instance = resource.effective_conn_instance()?;
                info!(resource = %resource.key, "Creating connector on first access");
                self.create_connector(&instance).await
            })
            .await?;

        // The cell may have been unregistered or replaced while initializing.
        let attached = self
            .connectors
            .get(&resource.key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &cell));
        if !attached {
            warn!(resource = %resource.key, "Connector was unregistered while being created");
            if let Err(e) = connector.dispose().await {
                warn!(resource = %resource.key, error = %e, "Failed to dispose detached connector");
            }
            return self
                .read_connector(&resource.key)
                .ok_or_else(|| ConnectorError::ConnectorNotFound {
                    resource: resource.key.clone(),
                });
        }
        Ok(Arc::clone(connector))
    }

    /// Live connector for a resource, if one exists. Never creates.
    pub fn read_connector(&self, resource_key: &str) -> Option<BoxedConnector> {
        self.connectors
            .get(resource_key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Build and register a connector for a resource, disposing any
    /// connector previously registered for it.
    #[instrument(skip(self, resource), fields(resource = %resource.key))]
    pub async fn register_connector(&self, resource: &ExternalResource) -> ConnectorResult<()> {
        let instance = resource.effective_conn_instance()?;
        let connector = self.create_connector(&instance).await?;

        let previous = self.connectors.insert(
            resource.key.clone(),
            Arc::new(OnceCell::new_with(Some(connector))),
        );
        if let Some(old) = previous.and_then(|cell| cell.get().cloned()) {
            debug!("Disposing replaced connector");
            if let Err(e) = old.dispose().await {
                warn!(error = %e, "Failed to dispose replaced connector");
            }
        }
        info!("Connector registered");
        Ok(())
    }

    /// Remove and dispose the connector of a resource.
    #[instrument(skip(self))]
    pub async fn unregister_connector(&self, resource_key: &str) -> ConnectorResult<()> {
        let (_, cell) = self.connectors.remove(resource_key).ok_or_else(|| {
            ConnectorError::ConnectorNotFound {
                resource: resource_key.to_string(),
            }
        })?;
        if let Some(connector) = cell.get() {
            connector.dispose().await?;
        }
        info!("Connector unregistered");
        Ok(())
    }

    /// Register connectors for every resource of the provider.
    ///
    /// Per-resource failures are logged and skipped. Returns the number of
    /// connectors loaded.
    pub async fn load(&self, provider: &dyn ResourceProvider) -> usize {
        let mut loaded = 0;
        for resource in provider.resources() {
            match self.register_connector(&resource).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(
                    resource = %resource.key,
                    error = %e,
                    "Could not load connector for resource"
                ),
            }
        }
        info!(loaded, "Connectors loaded");
        loaded
    }

    /// Dispose and remove every live connector.
    pub async fn unload(&self) {
        let keys: Vec<String> = self.connectors.iter().map(|e| e.key().clone()).collect();
        let live: Vec<BoxedConnector> = keys
            .iter()
            .filter_map(|key| self.connectors.remove(key))
            .filter_map(|(_, cell)| cell.get().cloned())
            .collect();

        let results = join_all(live.iter().map(|c| c.dispose())).await;
        for e in results.into_iter().filter_map(Result::err) {
            warn!(error = %e, "Failed to dispose connector during unload");
        }
        info!(count = live.len(), "Connectors unloaded");
    }

    /// Number of resources with a cached connector.
    pub fn len(&self) -> usize {
        self.connectors
            .iter()
            .filter(|e| e.value().initialized())
            .count()
    }

    /// Whether no connector is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorManager")
            .field("factories", &self.factories.len())
            .field("connectors", &self.connectors.len())
            .finish()
    }
}
