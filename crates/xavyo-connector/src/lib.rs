//! # Connector Framework
//!
//! Uniform access to external identity stores for the provisioning core.
//!
//! ## Architecture
//!
//! - [`ConnectorBundle`](traits::ConnectorBundle) - native SPI implemented
//!   by concrete adapters (LDAP, REST, database, ...)
//! - [`Connector`](traits::Connector) - uniform contract: CRUD, search,
//!   reconciliation, sync, schema discovery, test/validate/dispose
//! - [`ConnectorFacade`](facade::ConnectorFacade) - capability gating,
//!   request timeouts and paging on top of a bundle
//! - [`ConnectorManager`](registry::ConnectorManager) - per-resource cache
//!   of live connectors with single-flight creation
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_connector::prelude::*;
//!
//! let manager = ConnectorManager::new();
//! manager.register_factory(Arc::new(LdapFactory::default()));
//!
//! let connector = manager.get_connector(&resource).await?;
//! let outcome = connector
//!     .create("__ACCOUNT__", attrs, &OperationOptions::new())
//!     .await?;
//! if !outcome.propagation_attempted {
//!     // the instance lacks the CREATE capability
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe identifiers
//! - [`types`] - Capabilities, any-type kinds, resource operations
//! - [`error`] - Error types with transient/permanent classification
//! - [`operation`] - UIDs, typed attribute values, filters, sync deltas
//! - [`config`] - Connector instance configuration and overrides
//! - [`mapping`] - Mapping items and validated mappings
//! - [`resource`] - External resources and provisions
//! - [`transform`] - Mapping item transformer pipeline
//! - [`schema`] - Object class discovery types
//! - [`traits`] - Bundle SPI and uniform connector contract
//! - [`facade`] - Connector implementation over a bundle
//! - [`registry`] - Connector lifecycle management

pub mod config;
pub mod error;
pub mod facade;
pub mod ids;
pub mod mapping;
pub mod operation;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod traits;
pub mod transform;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use xavyo_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::ConnectorId;

    // Types and enums
    pub use crate::types::{AnyTypeKind, ConnectorCapability, ResourceOperation};

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Traits
    pub use crate::traits::{
        Connector, ConnectorBundle, ConnectorFactory, ReconFilterBuilder, ResultsHandler,
        SyncResultsHandler,
    };

    // Operations
    pub use crate::operation::{
        Attribute, AttributeSet, AttributeValue, ConnectorObject, Filter, GuardedBytes,
        GuardedString, OperationOptions, PropagationOutcome, SearchResultMetadata, SyncDelta,
        SyncDeltaType, SyncToken, Uid,
    };

    // Configuration
    pub use crate::config::{build_override, ConnConfProperty, ConnInstance, ConnPoolConf};

    // Resources and mapping
    pub use crate::mapping::{Mapping, MappingItem, MappingPurpose, Transform};
    pub use crate::resource::{ExternalResource, Provision};

    // Schema
    pub use crate::schema::{AttributeInfo, ObjectClassInfo};

    // Lifecycle
    pub use crate::facade::ConnectorFacade;
    pub use crate::registry::{BoxedConnector, ConnectorManager, ResourceProvider};

    // Transform engine
    pub use crate::transform::{ItemTransformer, TransformEngine, TransformerRegistry};
}

// Re-export async_trait for bundle implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _id = ConnectorId::new();
        let _cap = ConnectorCapability::Create;
        let _kind = AnyTypeKind::User;
        let _uid = Uid::from_value("42");
        let _attrs = AttributeSet::new().with("uid", "jdoe");
        let _filter = Filter::eq("mail", "jdoe@example.com");
        let _manager = ConnectorManager::new();
    }
}
