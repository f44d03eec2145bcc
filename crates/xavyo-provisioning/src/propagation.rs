//! Propagation executor.
//!
//! Consumes a purged propagation ledger: every affected resource's
//! attributes are computed first, so configuration errors abort before any
//! backend is contacted, then each resource runs on its own task. One
//! resource failing or hanging never affects the others; the outcome is a
//! per-resource status list.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};
use xavyo_connector::error::ConnectorError;
use xavyo_connector::operation::{GuardedString, OperationOptions, Uid};
use xavyo_connector::registry::ConnectorManager;
use xavyo_connector::resource::ExternalResource;
use xavyo_connector::types::ResourceOperation;

use crate::any::{AnyRecord, LinkedAccount};
use crate::audit::{AuditEntry, AuditEventType, AuditLoggerName, AuditOutcome, AuditSink};
use crate::config::ProvisioningConfig;
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::ledger::{LinkedAccountKey, PropagationByResource};
use crate::mapping_manager::{MappingManager, OutboundAttributes};

/// Outcome of one resource's propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    /// The backend accepted the operation.
    Success,
    /// The backend was not contacted.
    NotAttempted,
    /// The backend failed, or the operation timed out.
    Failure,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Success => "SUCCESS",
            ExecStatus::NotAttempted => "NOT_ATTEMPTED",
            ExecStatus::Failure => "FAILURE",
        }
    }
}

/// Per-resource propagation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationStatus {
    pub resource: String,
    pub operation: ResourceOperation,
    pub status: ExecStatus,
    /// Identifier on the resource: returned by the backend, or computed.
    pub external_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl PropagationStatus {
    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

/// Caller-supplied inputs for one propagation.
#[derive(Debug, Clone, Default)]
pub struct PropagationRequest {
    /// Clear password to send, overriding the record's own.
    pub clear_password: Option<GuardedString>,
    /// Send the password on update. Creates always send it when known.
    pub include_password: bool,
    /// Account status to send as `__ENABLE__`.
    pub enabled: Option<bool>,
    /// Actor recorded in audit entries.
    pub who: String,
}

impl PropagationRequest {
    pub fn new(who: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: GuardedString) -> Self {
        self.clear_password = Some(password);
        self.include_password = true;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// One prepared resource operation.
struct PlannedTask {
    resource: ExternalResource,
    any_type: String,
    object_class: String,
    operation: ResourceOperation,
    outbound: OutboundAttributes,
    /// Identifier the backend currently knows the object by.
    uid: String,
}

/// A resource whose attributes could not be computed. It is reported
/// without contacting the backend.
struct Rejected {
    status: PropagationStatus,
    priority: i32,
    any_type: String,
}

impl Rejected {
    /// Configuration errors abort the whole propagation; anything else only
    /// fails this resource.
    fn from_planning_error(
        resource: &ExternalResource,
        any_type: &str,
        operation: ResourceOperation,
        external_key: &str,
        error: ProvisioningError,
    ) -> ProvisioningResult<Self> {
        if error.is_configuration_error() {
            return Err(error);
        }
        warn!(
            resource = %resource.key,
            operation = %operation,
            error = %error,
            "Could not compute outbound attributes"
        );
        Ok(Self {
            status: PropagationStatus {
                resource: resource.key.clone(),
                operation,
                status: ExecStatus::Failure,
                external_key: external_key.to_string(),
                failure_reason: Some(error.to_string()),
            },
            priority: resource.propagation_priority.unwrap_or(0),
            any_type: any_type.to_string(),
        })
    }
}

/// Runs ledgers against resources through live connectors.
pub struct PropagationExecutor {
    connectors: Arc<ConnectorManager>,
    mapping: Arc<MappingManager>,
    config: ProvisioningConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl PropagationExecutor {
    pub fn new(
        connectors: Arc<ConnectorManager>,
        mapping: Arc<MappingManager>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            connectors,
            mapping,
            config,
            audit: None,
        }
    }

    /// Record one audit entry per resource outcome.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Propagate `any` to every resource of `ledger`.
    ///
    /// Fails only for configuration errors, before any backend is
    /// contacted. A resource whose attributes cannot be resolved is reported
    /// as failed without being contacted. Outcomes are reported per
    /// resource, ordered by descending resource priority then resource key.
    ///
    /// Missing mandatory attributes only hold back creates; updates and
    /// deletes still reach the backend.
    #[instrument(skip_all, fields(any = %any.describe()))]
    pub async fn execute(
        &self,
        any: &AnyRecord,
        mut ledger: PropagationByResource<String>,
        resources: &[ExternalResource],
        request: &PropagationRequest,
    ) -> ProvisioningResult<Vec<PropagationStatus>> {
        ledger.purge();

        let mut plan = Vec::new();
        let mut rejected = Vec::new();
        for (resource_key, operation) in ledger.as_map() {
            let resource = find_resource(resources, &resource_key)?;
            let provision = resource.provision(&any.any_type).ok_or_else(|| {
                ProvisioningError::ProvisionNotFound {
                    resource: resource.key.clone(),
                    any_type: any.any_type.clone(),
                }
            })?;

            let include_password =
                request.include_password || operation == ResourceOperation::Create;
            let old_key = match operation {
                ResourceOperation::Update => ledger.old_conn_object_key(&resource_key),
                _ => None,
            };
            let outbound = match self.mapping.build_outbound_attributes(
                any,
                request.clear_password.as_ref(),
                include_password,
                request.enabled,
                provision,
            ) {
                Ok(outbound) => outbound,
                Err(e) => {
                    rejected.push(Rejected::from_planning_error(
                        resource,
                        &any.any_type,
                        operation,
                        old_key.unwrap_or_default(),
                        e,
                    )?);
                    continue;
                }
            };

            let uid = old_key
                .map(str::to_string)
                .unwrap_or_else(|| outbound.external_key.clone());

            plan.push(PlannedTask {
                resource: resource.clone(),
                any_type: any.any_type.clone(),
                object_class: provision.object_class.clone(),
                operation,
                outbound,
                uid,
            });
        }

        Ok(self.run(plan, rejected, request).await)
    }

    /// Propagate `user`'s linked accounts listed in `ledger`.
    ///
    /// Deleted accounts no longer held by the user are addressed by the key
    /// recorded in the ledger.
    #[instrument(skip_all, fields(user = %user.describe()))]
    pub async fn execute_linked_accounts(
        &self,
        user: &AnyRecord,
        accounts: &[LinkedAccount],
        mut ledger: PropagationByResource<LinkedAccountKey>,
        resources: &[ExternalResource],
        request: &PropagationRequest,
    ) -> ProvisioningResult<Vec<PropagationStatus>> {
        ledger.purge();

        let mut plan = Vec::new();
        let mut rejected = Vec::new();
        for (key, operation) in ledger.as_map() {
            let resource = find_resource(resources, &key.resource)?;
            let provision = resource.provision(&user.any_type).ok_or_else(|| {
                ProvisioningError::ProvisionNotFound {
                    resource: resource.key.clone(),
                    any_type: user.any_type.clone(),
                }
            })?;

            let account = accounts
                .iter()
                .find(|a| {
                    a.resource == key.resource
                        && a.conn_object_key_value == key.conn_object_key_value
                })
                .cloned()
                .unwrap_or_else(|| {
                    LinkedAccount::new("", &key.resource, &key.conn_object_key_value)
                });

            let include_password =
                request.include_password || operation == ResourceOperation::Create;
            let outbound = match self.mapping.build_linked_account_attributes(
                user,
                &account,
                request.clear_password.as_ref(),
                include_password,
                provision,
            ) {
                Ok(outbound) => outbound,
                Err(e) => {
                    rejected.push(Rejected::from_planning_error(
                        resource,
                        &user.any_type,
                        operation,
                        &key.conn_object_key_value,
                        e,
                    )?);
                    continue;
                }
            };

            plan.push(PlannedTask {
                resource: resource.clone(),
                any_type: user.any_type.clone(),
                object_class: provision.object_class.clone(),
                operation,
                uid: outbound.external_key.clone(),
                outbound,
            });
        }

        Ok(self.run(plan, rejected, request).await)
    }

    async fn run(
        &self,
        plan: Vec<PlannedTask>,
        rejected: Vec<Rejected>,
        request: &PropagationRequest,
    ) -> Vec<PropagationStatus> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_propagations.max(1)));
        let timeout = self.config.propagation_timeout();

        let mut handles = Vec::with_capacity(plan.len());
        let mut meta = Vec::with_capacity(plan.len());
        for task in plan {
            meta.push((
                task.resource.key.clone(),
                task.resource.propagation_priority.unwrap_or(0),
                task.operation,
                task.outbound.external_key.clone(),
                task.any_type.clone(),
            ));

            let connectors = Arc::clone(&self.connectors);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                // Hold the permit until the resource is done.
                let _permit = semaphore.acquire_owned().await;
                match tokio::time::timeout(timeout, propagate(&connectors, &task)).await {
                    Ok(status) => status,
                    Err(_) => {
                        let err = ConnectorError::RequestTimeout {
                            timeout_secs: timeout.as_secs(),
                        };
                        warn!(resource = %task.resource.key, error = %err, "Propagation timed out");
                        failure(&task, &err)
                    }
                }
            }));
        }

        let mut statuses = Vec::with_capacity(handles.len());
        for (handle, (resource, priority, operation, external_key, any_type)) in
            handles.into_iter().zip(meta)
        {
            let status = match handle.await {
                Ok(status) => status,
                Err(e) => {
                    error!(resource = %resource, error = %e, "Propagation worker failed");
                    PropagationStatus {
                        resource,
                        operation,
                        status: ExecStatus::Failure,
                        external_key,
                        failure_reason: Some(e.to_string()),
                    }
                }
            };
            self.record_audit(&status, &any_type, request).await;
            statuses.push((priority, status));
        }

        for rejected in rejected {
            self.record_audit(&rejected.status, &rejected.any_type, request)
                .await;
            statuses.push((rejected.priority, rejected.status));
        }

        statuses.sort_by(|(pa, a), (pb, b)| pb.cmp(pa).then_with(|| a.resource.cmp(&b.resource)));
        let statuses: Vec<PropagationStatus> = statuses.into_iter().map(|(_, s)| s).collect();

        info!(
            resources = statuses.len(),
            failed = statuses.iter().filter(|s| s.status == ExecStatus::Failure).count(),
            "Propagation finished"
        );
        statuses
    }

    async fn record_audit(&self, status: &PropagationStatus, any_type: &str, request: &PropagationRequest) {
        let Some(sink) = &self.audit else {
            return;
        };
        let outcome = if status.status == ExecStatus::Failure {
            AuditOutcome::Failure
        } else {
            AuditOutcome::Success
        };
        let logger = AuditLoggerName::new(AuditEventType::Propagation, outcome)
            .with_category(any_type)
            .with_subcategory(status.resource.clone())
            .with_event(status.operation.as_str().to_ascii_lowercase());
        let output = serde_json::to_value(status).unwrap_or_default();
        sink.record(&AuditEntry::new(request.who.clone(), logger).with_output(&output))
            .await;
    }
}

impl std::fmt::Debug for PropagationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationExecutor")
            .field("connectors", &self.connectors)
            .field("config", &self.config)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

fn find_resource<'a>(
    resources: &'a [ExternalResource],
    key: &str,
) -> ProvisioningResult<&'a ExternalResource> {
    resources
        .iter()
        .find(|r| r.key == key)
        .ok_or_else(|| ProvisioningError::ResourceNotFound {
            resource: key.to_string(),
        })
}

async fn propagate(connectors: &ConnectorManager, task: &PlannedTask) -> PropagationStatus {
    let resource = &task.resource.key;

    if task.operation == ResourceOperation::Create && !task.outbound.is_complete() {
        debug!(
            resource = %resource,
            missing = ?task.outbound.mandatory_missing,
            "Mandatory attributes missing, not propagating"
        );
        return PropagationStatus {
            resource: resource.clone(),
            operation: task.operation,
            status: ExecStatus::NotAttempted,
            external_key: task.outbound.external_key.clone(),
            failure_reason: Some(format!(
                "mandatory attributes without value: {}",
                task.outbound.mandatory_missing.join(", ")
            )),
        };
    }

    let connector = match connectors.get_connector(&task.resource).await {
        Ok(connector) => connector,
        Err(e) => return failure(task, &e),
    };

    let options = OperationOptions::new();
    let uid = Uid::from_value(task.uid.clone());
    let attributes = task.outbound.attributes.clone();

    let result = match task.operation {
        ResourceOperation::Create => connector
            .create(&task.object_class, attributes, &options)
            .await
            .map(|o| (o.value, o.propagation_attempted)),
        ResourceOperation::Update => connector
            .update(&task.object_class, &uid, attributes, &options)
            .await
            .map(|o| (o.value, o.propagation_attempted)),
        ResourceOperation::Delete => connector
            .delete(&task.object_class, &uid, &options)
            .await
            .map(|o| (None, o.propagation_attempted)),
    };

    match result {
        Ok((_, false)) => PropagationStatus {
            resource: resource.clone(),
            operation: task.operation,
            status: ExecStatus::NotAttempted,
            external_key: task.outbound.external_key.clone(),
            failure_reason: None,
        },
        Ok((returned, true)) => {
            debug!(resource = %resource, operation = %task.operation, "Propagation succeeded");
            PropagationStatus {
                resource: resource.clone(),
                operation: task.operation,
                status: ExecStatus::Success,
                external_key: returned
                    .map(|uid| uid.value().to_string())
                    .unwrap_or_else(|| task.outbound.external_key.clone()),
                failure_reason: None,
            }
        }
        Err(e) => {
            error!(resource = %resource, operation = %task.operation, error = %e, "Propagation failed");
            failure(task, &e)
        }
    }
}

fn failure(task: &PlannedTask, error: &ConnectorError) -> PropagationStatus {
    PropagationStatus {
        resource: task.resource.key.clone(),
        operation: task.operation,
        status: ExecStatus::Failure,
        external_key: task.outbound.external_key.clone(),
        failure_reason: Some(error.to_string()),
    }
}
