//! Connector Framework traits
//!
//! Two layers:
//!
//! - [`ConnectorBundle`] is the native SPI a concrete adapter (LDAP, REST,
//!   database, ...) implements. Every operation defaults to
//!   [`ConnectorError::UnsupportedOperation`].
//! - [`Connector`] is the uniform contract the provisioning core talks to.
//!   [`crate::facade::ConnectorFacade`] implements it on top of a bundle.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ConnInstance;
use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{
    Attribute, AttributeSet, ConnectorObject, Filter, GuardedString, OperationOptions,
    PropagationOutcome, SearchResultMetadata, SyncDelta, SyncDeltaType, SyncToken, Uid,
};
use crate::schema::ObjectClassInfo;

/// Receives search hits one at a time.
///
/// Returning `false` stops the search; results delivered so far are valid.
pub trait ResultsHandler: Send {
    /// Handle one object. Return `false` to stop.
    fn handle(&mut self, object: ConnectorObject) -> bool;
}

impl<F> ResultsHandler for F
where
    F: FnMut(ConnectorObject) -> bool + Send,
{
    fn handle(&mut self, object: ConnectorObject) -> bool {
        self(object)
    }
}

/// Receives change-feed deltas one at a time.
///
/// Returning `false` stops the feed.
pub trait SyncResultsHandler: Send {
    /// Handle one delta. Return `false` to stop.
    fn handle(&mut self, delta: SyncDelta) -> bool;
}

impl<F> SyncResultsHandler for F
where
    F: FnMut(SyncDelta) -> bool + Send,
{
    fn handle(&mut self, delta: SyncDelta) -> bool {
        self(delta)
    }
}

/// Builds the filter used by a filtered reconciliation.
pub trait ReconFilterBuilder: Send + Sync {
    /// Build the search filter.
    fn build(&self) -> Filter;
}

/// Adapts a search handler into reconciliation deltas.
///
/// Every hit becomes a create-or-update delta with an empty token.
struct ReconciliationHandler<'a> {
    inner: &'a mut dyn SyncResultsHandler,
}

impl ResultsHandler for ReconciliationHandler<'_> {
    fn handle(&mut self, object: ConnectorObject) -> bool {
        self.inner.handle(SyncDelta::upsert(
            SyncToken::empty(),
            SyncDeltaType::CreateOrUpdate,
            object,
        ))
    }
}

/// Native SPI of a connector bundle.
#[async_trait]
pub trait ConnectorBundle: Send + Sync {
    /// Pass-through authentication.
    async fn authenticate(
        &self,
        object_class: &str,
        username: &str,
        password: &GuardedString,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        let _ = (object_class, username, password, options);
        Err(ConnectorError::unsupported("authenticate"))
    }

    /// Create an object.
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        let _ = (object_class, attributes, options);
        Err(ConnectorError::unsupported("create"))
    }

    /// Replace the given attributes on an object.
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        let _ = (object_class, uid, attributes, options);
        Err(ConnectorError::unsupported("update"))
    }

    /// Delete an object.
    async fn delete(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        let _ = (object_class, uid, options);
        Err(ConnectorError::unsupported("delete"))
    }

    /// Stream matching objects to `handler`, honouring paging options.
    async fn search(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchResultMetadata> {
        let _ = (object_class, filter, handler, options);
        Err(ConnectorError::unsupported("search"))
    }

    /// Stream changes after `token` to `handler`.
    async fn sync(
        &self,
        object_class: &str,
        token: &SyncToken,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        let _ = (object_class, token, handler, options);
        Err(ConnectorError::unsupported("sync"))
    }

    /// Stream pushed changes to `handler`.
    async fn livesync(
        &self,
        object_class: &str,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        let _ = (object_class, handler, options);
        Err(ConnectorError::unsupported("livesync"))
    }

    /// Current position of the change log.
    async fn latest_sync_token(&self, object_class: &str) -> ConnectorResult<SyncToken> {
        let _ = object_class;
        Err(ConnectorError::unsupported("latest_sync_token"))
    }

    /// Discover the object classes of the resource.
    async fn schema(&self) -> ConnectorResult<Vec<ObjectClassInfo>> {
        Err(ConnectorError::unsupported("schema"))
    }

    /// Check connectivity. Contacts the backend.
    async fn test(&self) -> ConnectorResult<()>;

    /// Check the bundle configuration locally.
    fn validate_configuration(&self) -> ConnectorResult<()> {
        Ok(())
    }

    /// Release backend resources.
    async fn dispose(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Uniform contract for one live binding to one resource.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The effective instance configuration this connector runs with.
    fn conn_instance(&self) -> &ConnInstance;

    /// Pass-through authentication; `None` when authentication is not a
    /// declared capability.
    async fn authenticate(
        &self,
        username: &str,
        password: &GuardedString,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<Uid>>;

    /// Create an object.
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<PropagationOutcome<Option<Uid>>>;

    /// Update an object.
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<PropagationOutcome<Option<Uid>>>;

    /// Delete an object.
    async fn delete(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<PropagationOutcome<()>>;

    /// Streaming search. The handler may stop the search early; that is not
    /// an error.
    async fn search(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchResultMetadata>;

    /// Reconcile every object of the class.
    async fn full_reconciliation(
        &self,
        object_class: &str,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        self.filtered_reconciliation(object_class, None, handler, options)
            .await
    }

    /// Reconcile the objects matched by the builder's filter.
    ///
    /// Without native change tracking every search hit is reported as a
    /// create-or-update delta with an empty token.
    async fn filtered_reconciliation(
        &self,
        object_class: &str,
        filter_builder: Option<&dyn ReconFilterBuilder>,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        let filter = filter_builder.map(|builder| builder.build());
        let mut adapter = ReconciliationHandler { inner: handler };
        self.search(object_class, filter.as_ref(), &mut adapter, options)
            .await?;
        Ok(())
    }

    /// Native incremental change feed after `token`.
    async fn sync(
        &self,
        object_class: &str,
        token: &SyncToken,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;

    /// Push-style change feed.
    async fn livesync(
        &self,
        object_class: &str,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;

    /// Current change-log position; `None` without the sync capability.
    async fn latest_sync_token(&self, object_class: &str) -> ConnectorResult<Option<SyncToken>>;

    /// Read the object whose connObjectKey attribute matches.
    async fn get_object(
        &self,
        object_class: &str,
        conn_object_key: &Attribute,
        ignore_case: bool,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>>;

    /// Discover object classes and attributes.
    async fn object_class_info(&self) -> ConnectorResult<Vec<ObjectClassInfo>>;

    /// Check connectivity; backend errors propagate.
    async fn test(&self) -> ConnectorResult<()>;

    /// Local consistency check; never contacts the backend.
    fn validate(&self) -> ConnectorResult<()>;

    /// Release backend resources. Safe to call more than once.
    async fn dispose(&self) -> ConnectorResult<()>;
}

/// Builds bundles for one bundle name.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Bundle name this factory serves.
    fn bundle_name(&self) -> &str;

    /// Build a bundle for the given instance configuration.
    async fn create(&self, instance: &ConnInstance) -> ConnectorResult<Arc<dyn ConnectorBundle>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Uid;

    #[test]
    fn test_closure_results_handler_stops() {
        let mut seen = Vec::new();
        let mut handler = |object: ConnectorObject| {
            seen.push(object.name.clone());
            seen.len() < 2
        };
        let make = |n: &str| {
            ConnectorObject::new("__ACCOUNT__", Uid::from_value(n), AttributeSet::new())
        };

        assert!(ResultsHandler::handle(&mut handler, make("a")));
        assert!(!ResultsHandler::handle(&mut handler, make("b")));
        drop(handler);
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_reconciliation_handler_emits_create_or_update() {
        let mut deltas = Vec::new();
        let mut sink = |delta: SyncDelta| {
            deltas.push(delta);
            true
        };
        {
            let mut adapter = ReconciliationHandler { inner: &mut sink };
            let object =
                ConnectorObject::new("__ACCOUNT__", Uid::from_value("1"), AttributeSet::new());
            assert!(adapter.handle(object));
        }
        drop(sink);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta_type, SyncDeltaType::CreateOrUpdate);
        assert!(deltas[0].token.is_empty());
        assert!(deltas[0].object.is_some());
    }
}
