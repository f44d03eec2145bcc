//! Connector Framework type definitions
//!
//! Enums shared by the connector layer and the provisioning core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An operation a connector instance may be allowed to perform.
///
/// A connector instance declares the set of capabilities it supports; an
/// operation outside that set is never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorCapability {
    /// Pass-through authentication.
    Authenticate,
    /// Object creation.
    Create,
    /// Object update.
    Update,
    /// Object update via attribute deltas.
    UpdateDelta,
    /// Object deletion.
    Delete,
    /// Object search.
    Search,
    /// Incremental change-log synchronization.
    Sync,
    /// Push-style change feed.
    LiveSync,
}

impl ConnectorCapability {
    /// Get all capabilities.
    #[must_use]
    pub fn all() -> &'static [ConnectorCapability] {
        &[
            ConnectorCapability::Authenticate,
            ConnectorCapability::Create,
            ConnectorCapability::Update,
            ConnectorCapability::UpdateDelta,
            ConnectorCapability::Delete,
            ConnectorCapability::Search,
            ConnectorCapability::Sync,
            ConnectorCapability::LiveSync,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorCapability::Authenticate => "AUTHENTICATE",
            ConnectorCapability::Create => "CREATE",
            ConnectorCapability::Update => "UPDATE",
            ConnectorCapability::UpdateDelta => "UPDATE_DELTA",
            ConnectorCapability::Delete => "DELETE",
            ConnectorCapability::Search => "SEARCH",
            ConnectorCapability::Sync => "SYNC",
            ConnectorCapability::LiveSync => "LIVE_SYNC",
        }
    }
}

impl fmt::Display for ConnectorCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectorCapability {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectorCapability::all()
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ParseEnumError::new("connector capability", s))
    }
}

/// Kind of internal identity record an any-type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnyTypeKind {
    /// A user.
    User,
    /// A group.
    Group,
    /// Any other typed object (printer, device, ...).
    AnyObject,
}

impl AnyTypeKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AnyTypeKind::User => "USER",
            AnyTypeKind::Group => "GROUP",
            AnyTypeKind::AnyObject => "ANY_OBJECT",
        }
    }
}

impl fmt::Display for AnyTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnyTypeKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(AnyTypeKind::User),
            "GROUP" => Ok(AnyTypeKind::Group),
            "ANY_OBJECT" => Ok(AnyTypeKind::AnyObject),
            _ => Err(ParseEnumError::new("any type kind", s)),
        }
    }
}

/// A propagation operation against one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceOperation {
    /// Create the external object.
    Create,
    /// Update the external object.
    Update,
    /// Delete the external object.
    Delete,
}

impl ResourceOperation {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOperation::Create => "CREATE",
            ResourceOperation::Update => "UPDATE",
            ResourceOperation::Delete => "DELETE",
        }
    }

    /// Capability a connector must declare to perform this operation.
    #[must_use]
    pub fn required_capability(&self) -> ConnectorCapability {
        match self {
            ResourceOperation::Create => ConnectorCapability::Create,
            ResourceOperation::Update => ConnectorCapability::Update,
            ResourceOperation::Delete => ConnectorCapability::Delete,
        }
    }
}

impl fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceOperation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(ResourceOperation::Create),
            "UPDATE" => Ok(ResourceOperation::Update),
            "DELETE" => Ok(ResourceOperation::Delete),
            _ => Err(ParseEnumError::new("resource operation", s)),
        }
    }
}

/// Error parsing one of the enums in this module from a string.
#[derive(Debug, Clone)]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}
