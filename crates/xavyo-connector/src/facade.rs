//! Connector facade
//!
//! Implements the uniform [`Connector`] contract on top of a native
//! [`ConnectorBundle`]. The facade:
//!
//! - skips operations whose capability the instance does not declare and
//!   reports them as not attempted,
//! - bounds every backend call by the instance's request timeout,
//! - pages through search results when the caller does not page itself,
//! - makes disposal idempotent.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ConnInstance;
use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{
    Attribute, AttributeSet, AttributeValue, ConnectorObject, Filter, GuardedString,
    OperationOptions, PropagationOutcome, SearchResultMetadata, SyncToken, Uid,
    ACCOUNT_OBJECT_CLASS,
};
use crate::schema::ObjectClassInfo;
use crate::traits::{Connector, ConnectorBundle, ResultsHandler, SyncResultsHandler};
use crate::types::ConnectorCapability;

/// Page size used when the caller does not request paging.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Forwards hits and remembers whether the handler asked to stop.
struct TrackingHandler<'a> {
    inner: &'a mut dyn ResultsHandler,
    stopped: bool,
}

impl ResultsHandler for TrackingHandler<'_> {
    fn handle(&mut self, object: ConnectorObject) -> bool {
        let keep_going = self.inner.handle(object);
        if !keep_going {
            self.stopped = true;
        }
        keep_going
    }
}

/// A live connector: one bundle bound to one effective instance.
pub struct ConnectorFacade {
    instance: ConnInstance,
    bundle: Arc<dyn ConnectorBundle>,
    disposed: AtomicBool,
}

impl ConnectorFacade {
    /// Bind a bundle to its effective instance configuration.
    pub fn new(instance: ConnInstance, bundle: Arc<dyn ConnectorBundle>) -> Self {
        Self {
            instance,
            bundle,
            disposed: AtomicBool::new(false),
        }
    }

    /// Whether [`Connector::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn capable(&self, capability: ConnectorCapability, operation: &str) -> bool {
        if self.instance.has_capability(capability) {
            return true;
        }
        let declared: Vec<&str> = self
            .instance
            .capabilities
            .iter()
            .map(ConnectorCapability::as_str)
            .collect();
        info!(
            connector = %self.instance.display_name,
            operation,
            capabilities = ?declared,
            "Operation was attempted, although the connector lacks the capability. No action."
        );
        false
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> ConnectorResult<T>
    where
        F: Future<Output = ConnectorResult<T>> + Send,
    {
        let result = match self.instance.conn_request_timeout {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        connector = %self.instance.display_name,
                        operation,
                        timeout_secs = secs,
                        "Connector request timed out"
                    );
                    Err(ConnectorError::RequestTimeout { timeout_secs: secs })
                }
            },
            None => call.await,
        };

        if let Err(e) = &result {
            error!(
                connector = %self.instance.display_name,
                operation,
                error = %e,
                "Connector operation failed"
            );
        }
        result
    }

    async fn search_all_pages(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchResultMetadata> {
        let mut tracking = TrackingHandler {
            inner: handler,
            stopped: false,
        };
        let mut page_options = options.clone().with_page_size(DEFAULT_PAGE_SIZE);

        loop {
            let mut metadata = self
                .bounded(
                    "search",
                    self.bundle
                        .search(object_class, filter, &mut tracking, &page_options),
                )
                .await?;

            if tracking.stopped {
                metadata.all_results_returned = false;
                return Ok(metadata);
            }
            match metadata.paged_results_cookie.take() {
                Some(cookie) => {
                    debug!(object_class, "Fetching next search page");
                    page_options.paged_results_cookie = Some(cookie);
                }
                None => {
                    metadata.all_results_returned = true;
                    return Ok(metadata);
                }
            }
        }
    }
}

impl std::fmt::Debug for ConnectorFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorFacade")
            .field("instance", &self.instance.redacted())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[async_trait]
impl Connector for ConnectorFacade {
    fn conn_instance(&self) -> &ConnInstance {
        &self.instance
    }

    #[instrument(skip(self, password, options), fields(connector = %self.instance.display_name))]
    async fn authenticate(
        &self,
        username: &str,
        password: &GuardedString,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<Uid>> {
        if !self.capable(ConnectorCapability::Authenticate, "authenticate") {
            return Ok(None);
        }
        self.bounded(
            "authenticate",
            self.bundle
                .authenticate(ACCOUNT_OBJECT_CLASS, username, password, options),
        )
        .await
        .map(Some)
    }

    #[instrument(skip(self, attributes, options), fields(connector = %self.instance.display_name))]
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<PropagationOutcome<Option<Uid>>> {
        if !self.capable(ConnectorCapability::Create, "create") {
            return Ok(PropagationOutcome::not_attempted(None));
        }
        let uid = self
            .bounded(
                "create",
                self.bundle.create(object_class, attributes, options),
            )
            .await?;
        debug!(uid = %uid, "Object created");
        Ok(PropagationOutcome::attempted(Some(uid)))
    }

    #[instrument(skip(self, attributes, options), fields(connector = %self.instance.display_name, uid = %uid))]
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
        options: &OperationOptions,
    ) -> ConnectorResult<PropagationOutcome<Option<Uid>>> {
        if !self.capable(ConnectorCapability::Update, "update") {
            return Ok(PropagationOutcome::not_attempted(None));
        }
        let updated = self
            .bounded(
                "update",
                self.bundle.update(object_class, uid, attributes, options),
            )
            .await?;
        Ok(PropagationOutcome::attempted(Some(updated)))
    }

    #[instrument(skip(self, options), fields(connector = %self.instance.display_name, uid = %uid))]
    async fn delete(
        &self,
        object_class: &str,
        uid: &Uid,
        options: &OperationOptions,
    ) -> ConnectorResult<PropagationOutcome<()>> {
        if !self.capable(ConnectorCapability::Delete, "delete") {
            return Ok(PropagationOutcome::not_attempted(()));
        }
        self.bounded("delete", self.bundle.delete(object_class, uid, options))
            .await?;
        Ok(PropagationOutcome::attempted(()))
    }

    async fn search(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchResultMetadata> {
        if !self.capable(ConnectorCapability::Search, "search") {
            return Ok(SearchResultMetadata::default());
        }
        if options.is_paged() {
            return self
                .bounded(
                    "search",
                    self.bundle.search(object_class, filter, handler, options),
                )
                .await;
        }
        self.search_all_pages(object_class, filter, handler, options)
            .await
    }

    async fn sync(
        &self,
        object_class: &str,
        token: &SyncToken,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        if !self.capable(ConnectorCapability::Sync, "sync") {
            return Ok(());
        }
        self.bounded(
            "sync",
            self.bundle.sync(object_class, token, handler, options),
        )
        .await
    }

    async fn livesync(
        &self,
        object_class: &str,
        handler: &mut dyn SyncResultsHandler,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        if !self.capable(ConnectorCapability::LiveSync, "livesync") {
            return Ok(());
        }
        self.bounded(
            "livesync",
            self.bundle.livesync(object_class, handler, options),
        )
        .await
    }

    async fn latest_sync_token(&self, object_class: &str) -> ConnectorResult<Option<SyncToken>> {
        if !self.capable(ConnectorCapability::Sync, "latest_sync_token") {
            return Ok(None);
        }
        self.bounded(
            "latest_sync_token",
            self.bundle.latest_sync_token(object_class),
        )
        .await
        .map(Some)
    }

    async fn get_object(
        &self,
        object_class: &str,
        conn_object_key: &Attribute,
        ignore_case: bool,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        let Some(value) = conn_object_key
            .values
            .first()
            .and_then(AttributeValue::to_text)
        else {
            return Ok(None);
        };
        let filter = if ignore_case {
            Filter::eq_ignore_case(conn_object_key.name.clone(), value)
        } else {
            Filter::eq(conn_object_key.name.clone(), value)
        };

        let mut found = None;
        let mut first_hit = |object: ConnectorObject| {
            found = Some(object);
            false
        };
        self.search(object_class, Some(&filter), &mut first_hit, options)
            .await?;
        Ok(found)
    }

    async fn object_class_info(&self) -> ConnectorResult<Vec<ObjectClassInfo>> {
        self.bounded("schema", self.bundle.schema()).await
    }

    async fn test(&self) -> ConnectorResult<()> {
        self.bounded("test", self.bundle.test()).await
    }

    fn validate(&self) -> ConnectorResult<()> {
        self.instance.validate()?;
        self.bundle.validate_configuration()
    }

    async fn dispose(&self) -> ConnectorResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!(connector = %self.instance.display_name, "Connector already disposed");
            return Ok(());
        }
        info!(connector = %self.instance.display_name, "Disposing connector");
        self.bundle.dispose().await
    }
}
