//! Provisioning error types.

use thiserror::Error;
use xavyo_connector::error::ConnectorError;

use crate::config::ConfigError;

/// Errors raised by mapping resolution, propagation and pull.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// A mapping expression matched none of the grammar forms.
    #[error("Malformed mapping expression '{expression}'")]
    MalformedExpression { expression: String },

    /// The provision has no connObjectKey mapping item.
    #[error("No connObjectKey mapping for '{any_type}'")]
    MissingConnObjectKeyMapping { any_type: String },

    /// The connObjectKey expression resolved to no value.
    #[error("Could not resolve '{expression}' on {entity}")]
    UnresolvableAttribute { expression: String, entity: String },

    /// The resource has no provision for the any-type.
    #[error("No provision for '{any_type}' on resource '{resource}'")]
    ProvisionNotFound { resource: String, any_type: String },

    /// A ledger references a resource that is not known.
    #[error("Resource not found: {resource}")]
    ResourceNotFound { resource: String },

    /// The mapping definition is inconsistent.
    #[error("Invalid mapping: {message}")]
    InvalidMapping { message: String },

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProvisioningError {
    /// Create a malformed expression error.
    pub fn malformed(expression: impl Into<String>) -> Self {
        Self::MalformedExpression {
            expression: expression.into(),
        }
    }

    /// Create an invalid mapping error.
    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        Self::InvalidMapping {
            message: message.into(),
        }
    }

    /// Whether this error is detected locally and must abort before any
    /// backend is contacted.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::MalformedExpression { .. }
            | Self::MissingConnObjectKeyMapping { .. }
            | Self::ProvisionNotFound { .. }
            | Self::ResourceNotFound { .. }
            | Self::InvalidMapping { .. }
            | Self::Config(_) => true,
            Self::UnresolvableAttribute { .. } => false,
            Self::Connector(e) => e.is_configuration_error(),
        }
    }

    /// Get the error code for logging and status reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedExpression { .. } => "MALFORMED_EXPRESSION",
            Self::MissingConnObjectKeyMapping { .. } => "MISSING_CONN_OBJECT_KEY_MAPPING",
            Self::UnresolvableAttribute { .. } => "UNRESOLVABLE_ATTRIBUTE",
            Self::ProvisionNotFound { .. } => "PROVISION_NOT_FOUND",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::InvalidMapping { .. } => "INVALID_MAPPING",
            Self::Connector(e) => e.error_code(),
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Result type for provisioning operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
