//! External resources and their provisions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::{build_override, ConnConfProperty, ConnInstance};
use crate::error::{ConnectorError, ConnectorResult};
use crate::mapping::Mapping;
use crate::types::{AnyTypeKind, ConnectorCapability};

/// Binding of one any-type to an object class and mapping on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provision {
    /// Any-type name (e.g. "USER", "PRINTER").
    pub any_type: String,
    /// Kind of the any-type.
    pub any_type_kind: AnyTypeKind,
    /// Object class on the resource (e.g. `__ACCOUNT__`).
    pub object_class: String,
    /// Attribute mapping; a provision without mapping propagates nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mapping>,
}

impl Provision {
    /// Create a provision without mapping.
    pub fn new(
        any_type: impl Into<String>,
        any_type_kind: AnyTypeKind,
        object_class: impl Into<String>,
    ) -> Self {
        Self {
            any_type: any_type.into(),
            any_type_kind,
            object_class: object_class.into(),
            mapping: None,
        }
    }

    /// Set the mapping.
    #[must_use]
    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }
}

/// An external identity store reached through one connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalResource {
    /// Resource name; unique across the deployment.
    pub key: String,
    /// Base connector instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_instance: Option<ConnInstance>,
    /// Per-resource configuration property overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conf_override: Vec<ConnConfProperty>,
    /// Per-resource capability override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities_override: Option<BTreeSet<ConnectorCapability>>,
    /// Provisions by any-type.
    #[serde(default)]
    pub provisions: Vec<Provision>,
    /// Higher values propagate first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_priority: Option<i32>,
}

impl ExternalResource {
    /// Create a resource bound to a connector instance.
    pub fn new(key: impl Into<String>, conn_instance: ConnInstance) -> Self {
        Self {
            key: key.into(),
            conn_instance: Some(conn_instance),
            conf_override: Vec::new(),
            capabilities_override: None,
            provisions: Vec::new(),
            propagation_priority: None,
        }
    }

    /// Add a provision.
    #[must_use]
    pub fn with_provision(mut self, provision: Provision) -> Self {
        self.provisions.push(provision);
        self
    }

    /// Add a configuration property override.
    #[must_use]
    pub fn with_conf_override(mut self, property: ConnConfProperty) -> Self {
        self.conf_override.push(property);
        self
    }

    /// Set the capability override.
    #[must_use]
    pub fn with_capabilities_override(
        mut self,
        capabilities: impl IntoIterator<Item = ConnectorCapability>,
    ) -> Self {
        self.capabilities_override = Some(capabilities.into_iter().collect());
        self
    }

    /// Set the propagation priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.propagation_priority = Some(priority);
        self
    }

    /// Provision for an any-type, if declared.
    pub fn provision(&self, any_type: &str) -> Option<&Provision> {
        self.provisions.iter().find(|p| p.any_type == any_type)
    }

    /// Connector instance to use for this resource, with overrides applied.
    pub fn effective_conn_instance(&self) -> ConnectorResult<ConnInstance> {
        let base = self.conn_instance.as_ref().ok_or_else(|| {
            ConnectorError::invalid_configuration(format!(
                "resource '{}' has no connector instance",
                self.key
            ))
        })?;
        Ok(build_override(
            base,
            &self.conf_override,
            self.capabilities_override.as_ref(),
        ))
    }
}
