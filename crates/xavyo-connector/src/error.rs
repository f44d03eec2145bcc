//! Connector Framework error types
//!
//! Error definitions with transient/permanent classification so that the
//! propagation executor can decide its retry policy per resource.

use thiserror::Error;

/// Error that can occur during connector operations or connector lifecycle
/// management.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the external resource.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A backend request did not complete within the configured timeout.
    #[error("request timeout after {timeout_secs} seconds")]
    RequestTimeout { timeout_secs: u64 },

    /// The backend rejected or failed the operation. `message` carries the
    /// backend's own message verbatim.
    #[error("connector operation failed: {message}")]
    ConnectorOperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Authentication errors (permanent)
    /// Pass-through authentication against the resource was rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration errors (permanent)
    /// Connector instance configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// No factory is registered for the requested bundle.
    #[error("connector bundle not found: {bundle}")]
    BundleNotFound { bundle: String },

    /// No live connector is registered for the resource.
    #[error("connector not found for resource: {resource}")]
    ConnectorNotFound { resource: String },

    /// The bundle does not implement the requested operation.
    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    /// A mapping definition violates its structural rules.
    #[error("invalid mapping: {message}")]
    InvalidMapping { message: String },

    /// A transformer stage failed for an attribute.
    #[error("transformation failed for attribute '{attribute}': {message}")]
    TransformationFailed { attribute: String, message: String },

    // Object errors (permanent)
    /// Object already exists on the resource (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Object not found on the resource (update/delete target missing).
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Object class is not known to the resource.
    #[error("object class '{object_class}' not found in schema")]
    ObjectClassNotFound { object_class: String },

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the operation may be retried.
    ///
    /// Transient errors are caused by temporary conditions that may resolve
    /// themselves, such as an unreachable resource or an expired request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. } | ConnectorError::RequestTimeout { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this error comes from local configuration rather than from
    /// the backend. Such errors are surfaced before any network call.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ConnectorError::InvalidConfiguration { .. }
                | ConnectorError::InvalidMapping { .. }
                | ConnectorError::BundleNotFound { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            ConnectorError::ConnectorOperationFailed { .. } => "CONNECTOR_OPERATION_FAILED",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::BundleNotFound { .. } => "BUNDLE_NOT_FOUND",
            ConnectorError::ConnectorNotFound { .. } => "CONNECTOR_NOT_FOUND",
            ConnectorError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::InvalidMapping { .. } => "INVALID_MAPPING",
            ConnectorError::TransformationFailed { .. } => "TRANSFORMATION_FAILED",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ObjectClassNotFound { .. } => "OBJECT_CLASS_NOT_FOUND",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connector operation failed error carrying the backend message.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectorOperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connector operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectorOperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid mapping error.
    pub fn invalid_mapping(message: impl Into<String>) -> Self {
        ConnectorError::InvalidMapping {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        ConnectorError::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient_errors = vec![
            ConnectorError::connection_failed("test"),
            ConnectorError::RequestTimeout { timeout_secs: 30 },
        ];

        for err in transient_errors {
            assert!(
                err.is_transient(),
                "Expected {} to be transient",
                err.error_code()
            );
            assert!(!err.is_permanent());
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent_errors = vec![
            ConnectorError::AuthenticationFailed,
            ConnectorError::operation_failed("backend said no"),
            ConnectorError::invalid_configuration("test"),
            ConnectorError::unsupported("sync"),
            ConnectorError::ObjectAlreadyExists {
                identifier: "test".to_string(),
            },
        ];

        for err in permanent_errors {
            assert!(
                err.is_permanent(),
                "Expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_configuration_errors() {
        assert!(ConnectorError::invalid_mapping("dup key").is_configuration_error());
        assert!(ConnectorError::BundleNotFound {
            bundle: "ldap".to_string()
        }
        .is_configuration_error());
        assert!(!ConnectorError::operation_failed("x").is_configuration_error());
    }

    #[test]
    fn test_operation_failed_keeps_backend_message() {
        let err = ConnectorError::operation_failed("LDAP: error code 68 - Entry Already Exists");
        assert_eq!(
            err.to_string(),
            "connector operation failed: LDAP: error code 68 - Entry Already Exists"
        );
        assert_eq!(err.error_code(), "CONNECTOR_OPERATION_FAILED");
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "underlying error");
        let err = ConnectorError::connection_failed_with_source("failed", source_err);

        assert!(err.is_transient());
        if let ConnectorError::ConnectionFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected ConnectionFailed variant");
        }
    }
}
