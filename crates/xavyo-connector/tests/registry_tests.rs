//! Integration tests for the connector lifecycle manager.
//!
//! Covers lazy creation, single-flight construction under concurrent first
//! access, overrides, registration replacement and bulk load/unload.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use xavyo_connector::prelude::*;

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    disposed: AtomicUsize,
}

struct CountingBundle {
    counters: Arc<Counters>,
}

#[async_trait::async_trait]
impl ConnectorBundle for CountingBundle {
    async fn test(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        self.counters.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingFactory {
    counters: Arc<Counters>,
    delay: Duration,
}

#[async_trait::async_trait]
impl ConnectorFactory for CountingFactory {
    fn bundle_name(&self) -> &str {
        "counting"
    }

    async fn create(&self, _instance: &ConnInstance) -> ConnectorResult<Arc<dyn ConnectorBundle>> {
        tokio::time::sleep(self.delay).await;
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingBundle {
            counters: Arc::clone(&self.counters),
        }))
    }
}

fn manager_with_counters(delay: Duration) -> (Arc<ConnectorManager>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let manager = Arc::new(ConnectorManager::new());
    manager.register_factory(Arc::new(CountingFactory {
        counters: Arc::clone(&counters),
        delay,
    }));
    (manager, counters)
}

fn resource(key: &str) -> ExternalResource {
    ExternalResource::new(
        key,
        ConnInstance::new("counting", "Counting")
            .with_property(ConnConfProperty::new("host", vec![json!("localhost")]).required())
            .with_capabilities([ConnectorCapability::Create, ConnectorCapability::Update]),
    )
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[tokio::test]
async fn test_get_connector_creates_once_and_caches() {
    let (manager, counters) = manager_with_counters(Duration::ZERO);
    let resource = resource("resource-ldap");

    assert!(manager.read_connector("resource-ldap").is_none());

    let first = manager.get_connector(&resource).await.unwrap();
    let second = manager.get_connector(&resource).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert!(manager.read_connector("resource-ldap").is_some());
    assert_eq!(manager.len(), 1);
}

#[tokio::test]
async fn test_concurrent_first_access_is_single_flight() {
    let (manager, counters) = manager_with_counters(Duration::from_millis(50));
    let resource = Arc::new(resource("resource-ldap"));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        let resource = Arc::clone(&resource);
        tasks.spawn(async move { manager.get_connector(&resource).await });
    }

    let mut connectors = Vec::new();
    while let Some(result) = tasks.join_next().await {
        connectors.push(result.unwrap().unwrap());
    }

    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert!(connectors.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test]
async fn test_unrelated_resources_get_distinct_connectors() {
    let (manager, counters) = manager_with_counters(Duration::from_millis(10));

    let resource_a = resource("resource-a");
    let resource_b = resource("resource-b");
    let (a, b) = tokio::join!(
        manager.get_connector(&resource_a),
        manager.get_connector(&resource_b),
    );

    assert!(!Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(counters.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_bundle_fails() {
    let manager = ConnectorManager::new();
    let err = manager
        .get_connector(&resource("resource-ldap"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConnectorError::BundleNotFound { .. }));
    assert!(manager.read_connector("resource-ldap").is_none());
}

#[tokio::test]
async fn test_invalid_instance_is_rejected() {
    let (manager, _) = manager_with_counters(Duration::ZERO);
    let invalid = ExternalResource::new(
        "resource-bad",
        ConnInstance::new("counting", "Counting")
            .with_property(ConnConfProperty::new("host", vec![]).required()),
    );
    let err = manager.get_connector(&invalid).await.err().unwrap();
    assert!(err.is_configuration_error());
}

// =============================================================================
// Override Tests
// =============================================================================

#[tokio::test]
async fn test_connector_uses_resource_overrides() {
    let (manager, _) = manager_with_counters(Duration::ZERO);
    let resource = resource("resource-ldap")
        .with_conf_override(ConnConfProperty::new("host", vec![json!("ldap.internal")]))
        .with_capabilities_override([ConnectorCapability::Search]);

    let connector = manager.get_connector(&resource).await.unwrap();
    let instance = connector.conn_instance();

    assert_eq!(
        instance.property("host").unwrap().values,
        vec![json!("ldap.internal")]
    );
    assert!(instance.has_capability(ConnectorCapability::Search));
    assert!(!instance.has_capability(ConnectorCapability::Create));

    // the base instance carried by the resource is untouched
    let base = resource.conn_instance.as_ref().unwrap();
    assert_eq!(base.property("host").unwrap().values, vec![json!("localhost")]);
}

#[test]
fn test_build_override_is_pure() {
    let manager = ConnectorManager::new();
    let base = ConnInstance::new("counting", "Counting")
        .with_capabilities([ConnectorCapability::Create]);
    let merged = manager.build_override(
        &base,
        &[ConnConfProperty::new("port", vec![json!(636)])],
        None,
    );
    assert!(base.property("port").is_none());
    assert!(merged.property("port").is_some());
    assert_eq!(merged.capabilities, base.capabilities);
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_register_replaces_and_disposes_previous() {
    let (manager, counters) = manager_with_counters(Duration::ZERO);
    let resource = resource("resource-ldap");

    let first = manager.get_connector(&resource).await.unwrap();
    manager.register_connector(&resource).await.unwrap();
    let second = manager.get_connector(&resource).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unregister_disposes() {
    let (manager, counters) = manager_with_counters(Duration::ZERO);
    manager.register_connector(&resource("resource-ldap")).await.unwrap();

    manager.unregister_connector("resource-ldap").await.unwrap();

    assert!(manager.read_connector("resource-ldap").is_none());
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);

    let err = manager
        .unregister_connector("resource-ldap")
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::ConnectorNotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_unregister_during_creation_disposes_late_connector() {
    let (manager, counters) = manager_with_counters(Duration::from_millis(50));
    let resource = resource("resource-ldap");

    let pending = tokio::spawn({
        let manager = Arc::clone(&manager);
        let resource = resource.clone();
        async move { manager.get_connector(&resource).await }
    });

    // let the lookup reserve its cell and start building
    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.unregister_connector("resource-ldap").await.unwrap();

    let err = pending.await.unwrap().err().unwrap();
    assert!(matches!(err, ConnectorError::ConnectorNotFound { .. }));
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
    assert!(manager.read_connector("resource-ldap").is_none());
}

#[tokio::test]
async fn test_load_and_unload() {
    let (manager, counters) = manager_with_counters(Duration::ZERO);
    let mut orphan = resource("resource-orphan");
    orphan.conn_instance = None;
    let resources = vec![resource("resource-a"), resource("resource-b"), orphan];

    let loaded = manager.load(&resources).await;

    assert_eq!(loaded, 2);
    assert_eq!(manager.len(), 2);

    manager.unload().await;

    assert!(manager.is_empty());
    assert_eq!(counters.disposed.load(Ordering::SeqCst), 2);
}
