//! Connector Framework configuration types
//!
//! A [`ConnInstance`] is the configuration one live connector is built from:
//! the bundle to load, its configuration properties, the capabilities it is
//! allowed to exercise, pooling, and the per-request timeout. Resources may
//! override properties and capabilities without touching the shared base.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};
use crate::ids::ConnectorId;
use crate::operation::REDACTED;
use crate::types::ConnectorCapability;

/// Schema of one configuration property, as declared by the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnConfPropSchema {
    /// Property name.
    pub name: String,
    /// Declared value type, as named by the bundle (e.g. "java.lang.String").
    #[serde(default = "default_type_name")]
    pub type_name: String,
    /// Whether the property must have a value.
    #[serde(default)]
    pub required: bool,
    /// Whether the value is a secret.
    #[serde(default)]
    pub confidential: bool,
}

fn default_type_name() -> String {
    "string".to_string()
}

/// One configuration property with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnConfProperty {
    /// Property schema.
    pub schema: ConnConfPropSchema,
    /// Property values.
    #[serde(default)]
    pub values: Vec<Value>,
}

impl ConnConfProperty {
    /// Create an optional, non-confidential property.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            schema: ConnConfPropSchema {
                name: name.into(),
                type_name: default_type_name(),
                required: false,
                confidential: false,
            },
            values,
        }
    }

    /// Mark the property as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.schema.required = true;
        self
    }

    /// Mark the property as confidential.
    #[must_use]
    pub fn confidential(mut self) -> Self {
        self.schema.confidential = true;
        self
    }

    /// Property name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Whether the property has at least one non-empty value.
    pub fn has_value(&self) -> bool {
        self.values.iter().any(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
    }
}

/// Connection pool settings for bundles that pool backend connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnPoolConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_objects: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_idle: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_evictable_idle_time_ms: Option<u64>,
}

/// Configuration of a connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnInstance {
    /// Instance identifier.
    pub key: ConnectorId,
    /// Name of the bundle implementing the connector.
    pub bundle_name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Configuration properties.
    #[serde(default)]
    pub conf: Vec<ConnConfProperty>,
    /// Operations this instance is allowed to perform.
    #[serde(default)]
    pub capabilities: BTreeSet<ConnectorCapability>,
    /// Optional pooling configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_conf: Option<ConnPoolConf>,
    /// Upper bound in seconds for every backend request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_request_timeout: Option<u64>,
}

impl ConnInstance {
    /// Create an instance of the given bundle with no properties and no
    /// capabilities.
    pub fn new(bundle_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: ConnectorId::new(),
            bundle_name: bundle_name.into(),
            display_name: display_name.into(),
            conf: Vec::new(),
            capabilities: BTreeSet::new(),
            pool_conf: None,
            conn_request_timeout: None,
        }
    }

    /// Add a configuration property.
    #[must_use]
    pub fn with_property(mut self, property: ConnConfProperty) -> Self {
        self.conf.push(property);
        self
    }

    /// Replace the capability set.
    #[must_use]
    pub fn with_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = ConnectorCapability>,
    ) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// Set the per-request timeout in seconds.
    #[must_use]
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.conn_request_timeout = Some(secs);
        self
    }

    /// Set pooling configuration.
    #[must_use]
    pub fn with_pool_conf(mut self, pool_conf: ConnPoolConf) -> Self {
        self.pool_conf = Some(pool_conf);
        self
    }

    /// Look up a configuration property by name.
    pub fn property(&self, name: &str) -> Option<&ConnConfProperty> {
        self.conf.iter().find(|p| p.name() == name)
    }

    /// Whether the instance declares a capability.
    pub fn has_capability(&self, capability: ConnectorCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Per-request timeout as Duration.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.conn_request_timeout.map(Duration::from_secs)
    }

    /// Local consistency check. Never contacts the backend.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.bundle_name.trim().is_empty() {
            return Err(ConnectorError::invalid_configuration(
                "bundle name is required",
            ));
        }

        let missing: Vec<&str> = self
            .conf
            .iter()
            .filter(|p| p.schema.required && !p.has_value())
            .map(ConnConfProperty::name)
            .collect();
        if !missing.is_empty() {
            return Err(ConnectorError::invalid_configuration(format!(
                "required configuration properties without value: {}",
                missing.join(", ")
            )));
        }

        if self.conn_request_timeout == Some(0) {
            return Err(ConnectorError::invalid_configuration(
                "connector request timeout must be positive",
            ));
        }

        Ok(())
    }

    /// Create a redacted version of this instance (for logging/display).
    ///
    /// Values of confidential properties are replaced with a placeholder.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for property in copy.conf.iter_mut().filter(|p| p.schema.confidential) {
            property.values = property
                .values
                .iter()
                .map(|_| Value::String(REDACTED.to_string()))
                .collect();
        }
        copy
    }
}

/// Merge a base instance with per-resource overrides into a new instance.
///
/// Override properties replace base properties of the same name; unknown
/// names are appended. A capability override replaces the whole set. The
/// base instance is never modified.
#[must_use]
pub fn build_override(
    base: &ConnInstance,
    conf_override: &[ConnConfProperty],
    capabilities_override: Option<&BTreeSet<ConnectorCapability>>,
) -> ConnInstance {
    let mut instance = base.clone();

    for property in conf_override {
        match instance
            .conf
            .iter_mut()
            .find(|p| p.name() == property.name())
        {
            Some(existing) => existing.values = property.values.clone(),
            None => instance.conf.push(property.clone()),
        }
    }

    if let Some(capabilities) = capabilities_override {
        instance.capabilities = capabilities.clone();
    }

    instance
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ldap_instance() -> ConnInstance {
        ConnInstance::new("net.tirasa.connid.bundles.ldap", "LDAP")
            .with_property(ConnConfProperty::new("host", vec![json!("ldap.example.com")]).required())
            .with_property(ConnConfProperty::new("port", vec![json!(389)]))
            .with_property(ConnConfProperty::new("credentials", vec![json!("secret")]).confidential())
            .with_capabilities([ConnectorCapability::Create, ConnectorCapability::Search])
    }

    #[test]
    fn test_validate_ok() {
        assert!(ldap_instance().validate().is_ok());
    }

    #[test]
    fn test_validate_missing_required_property() {
        let instance = ConnInstance::new("bundle", "x")
            .with_property(ConnConfProperty::new("host", vec![json!("")]).required());
        let err = instance.validate().unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let instance = ldap_instance().with_request_timeout(0);
        assert!(instance.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_confidential_values() {
        let redacted = ldap_instance().redacted();
        assert_eq!(
            redacted.property("credentials").unwrap().values,
            vec![json!(REDACTED)]
        );
        assert_eq!(
            redacted.property("host").unwrap().values,
            vec![json!("ldap.example.com")]
        );
    }

    #[test]
    fn test_build_override_does_not_mutate_base() {
        let base = ldap_instance();
        let snapshot = base.clone();
        let overrides = vec![
            ConnConfProperty::new("port", vec![json!(636)]),
            ConnConfProperty::new("ssl", vec![json!(true)]),
        ];
        let caps: BTreeSet<_> = [ConnectorCapability::Search].into_iter().collect();

        let merged = build_override(&base, &overrides, Some(&caps));

        assert_eq!(base, snapshot);
        assert_eq!(merged.property("port").unwrap().values, vec![json!(636)]);
        assert_eq!(merged.property("ssl").unwrap().values, vec![json!(true)]);
        assert_eq!(
            merged.property("host").unwrap().values,
            vec![json!("ldap.example.com")]
        );
        assert!(!merged.has_capability(ConnectorCapability::Create));
        assert!(merged.has_capability(ConnectorCapability::Search));
        assert_eq!(merged.key, base.key);
    }

    #[test]
    fn test_build_override_without_capabilities_keeps_base() {
        let base = ldap_instance();
        let merged = build_override(&base, &[], None);
        assert_eq!(merged.capabilities, base.capabilities);
    }

    #[test]
    fn test_deserialize_instance() {
        let instance: ConnInstance = serde_json::from_value(json!({
            "key": "6d5ddb4f-6a4b-4ac5-8c8e-a1a0c5a3f1e2",
            "bundle_name": "csvdir",
            "capabilities": ["CREATE", "SEARCH"],
            "conn_request_timeout": 10
        }))
        .unwrap();
        assert!(instance.has_capability(ConnectorCapability::Search));
        assert_eq!(instance.request_timeout(), Some(Duration::from_secs(10)));
    }
}
