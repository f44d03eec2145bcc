//! # Provisioning Core
//!
//! Mapping, propagation bookkeeping and audit for xavyo provisioning.
//!
//! This crate provides:
//! - Mapping expression parsing (`groups[admins].level`, `[staff].badge`, ...)
//! - Outbound attribute computation and inbound (pull) application
//! - The per-operation propagation ledger with conflict purging
//! - A propagation executor reporting per-resource outcomes
//! - Workflow result wrappers and masked audit entries
//! - The process-wide entitlement registry
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ Policy (caller)│────►│ PropagationBy-   │────►│ Propagation      │
//! │                │     │ Resource (purge) │     │ Executor         │
//! └────────────────┘     └──────────────────┘     └────────┬─────────┘
//!                                                          │
//!                         ┌──────────────────┐             │
//!                         │  Mapping Manager │◄────────────┤ per resource
//!                         │  (IntAttrName)   │             │
//!                         └──────────────────┘             ▼
//!                                                 ┌──────────────────┐
//!                                                 │ ConnectorManager │
//!                                                 │   (connector)    │
//!                                                 └────────┬─────────┘
//!                                                          │
//!                                                 ┌────────▼─────────┐
//!                                                 │   Audit sink     │
//!                                                 └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_provisioning::{PropagationByResource, PropagationExecutor, PropagationRequest};
//! use xavyo_connector::types::ResourceOperation;
//!
//! let mut ledger = PropagationByResource::new();
//! ledger.add(ResourceOperation::Create, "resource-ldap".to_string());
//!
//! let statuses = executor
//!     .execute(&user, ledger, &resources, &PropagationRequest::new("admin"))
//!     .await?;
//! for status in statuses {
//!     println!("{}: {}", status.resource, status.status.as_str());
//! }
//! ```

pub mod any;
pub mod audit;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod intattr;
pub mod ledger;
pub mod logging;
pub mod mapping_manager;
pub mod propagation;
pub mod pull;
pub mod workflow;

// Re-exports for convenience
pub use any::{AnyDirectory, AnyRecord, InMemoryAnyDirectory, LinkedAccount, Membership};
pub use audit::{
    mask_sensitive, AuditEntry, AuditEventType, AuditLoggerName, AuditOutcome, AuditSink,
    MemoryAuditSink, TracingAuditSink, MASKED,
};
pub use config::{ConfigError, ProvisioningConfig};
pub use entitlements::{AnyEntitlement, EntitlementRegistry};
pub use error::{ProvisioningError, ProvisioningResult};
pub use intattr::{
    Addressing, AttrTarget, IntAttrName, IntAttrNameParser, SchemaRegistry, SchemaType,
    StaticSchemaRegistry,
};
pub use ledger::{LinkedAccountKey, PropagationByResource};
pub use mapping_manager::{MappingManager, OutboundAttributes};
pub use propagation::{
    ExecStatus, PropagationExecutor, PropagationRequest, PropagationStatus,
};
pub use pull::{PullApplier, PulledChange};
pub use workflow::{UserWorkflowResult, WorkflowResult};
