//! Attribute mapping types for provisioning.
//!
//! A [`Mapping`] is the ordered list of items that tells the provisioning
//! core how internal attributes map onto one external object class. At most
//! one item is the connObjectKey (the external key) and at most one carries
//! the password; no item may be both.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};

/// Directions in which a mapping item is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingPurpose {
    /// Outbound only.
    Propagation,
    /// Inbound only.
    Pull,
    /// Both directions.
    #[default]
    Both,
    /// Disabled.
    None,
}

impl MappingPurpose {
    /// Whether the item is used when propagating outward.
    pub fn includes_propagation(&self) -> bool {
        matches!(self, MappingPurpose::Propagation | MappingPurpose::Both)
    }

    /// Whether the item is used when pulling inward.
    pub fn includes_pull(&self) -> bool {
        matches!(self, MappingPurpose::Pull | MappingPurpose::Both)
    }
}

/// Transformation to apply to attribute values, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Convert to lowercase.
    Lowercase,
    /// Convert to uppercase.
    Uppercase,
    /// Trim whitespace.
    Trim,
    /// Replace occurrences.
    Replace {
        /// Pattern to find.
        from: String,
        /// Replacement value.
        to: String,
    },
    /// Substring extraction.
    Substring {
        /// Start index (0-based, in characters).
        start: usize,
        /// Optional end index.
        #[serde(skip_serializing_if = "Option::is_none")]
        end: Option<usize>,
    },
    /// Apply regex and keep a capture group.
    Regex {
        /// Regular expression pattern.
        pattern: String,
        /// Capture group to use (0 for whole match).
        #[serde(default)]
        group: usize,
    },
    /// Use a default when there is no value or the value is empty.
    Default {
        /// Default value to use.
        value: String,
    },
    /// Prepend a fixed text.
    Prefix {
        /// Text to prepend.
        value: String,
    },
    /// Append a fixed text.
    Suffix {
        /// Text to append.
        value: String,
    },
    /// Delegate to a transformer registered under `name`.
    Custom {
        /// Registered transformer name.
        name: String,
    },
}

/// One row of a resource mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingItem {
    /// Internal attribute expression (e.g. `username`, `groups[admins].level`).
    pub int_attr_name: String,

    /// Attribute name on the external resource.
    pub ext_attr_name: String,

    /// Directions in which the item applies.
    #[serde(default)]
    pub purpose: MappingPurpose,

    /// Literal boolean deciding whether a value is mandatory.
    #[serde(default = "default_mandatory_condition")]
    pub mandatory_condition: String,

    /// Whether this item yields the external key.
    #[serde(default)]
    pub conn_object_key: bool,

    /// Whether this item carries the password.
    #[serde(default)]
    pub password: bool,

    /// Ordered transformation pipeline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<Transform>,
}

fn default_mandatory_condition() -> String {
    "false".to_string()
}

impl MappingItem {
    /// Create a non-mandatory item used in both directions.
    pub fn new(int_attr_name: impl Into<String>, ext_attr_name: impl Into<String>) -> Self {
        Self {
            int_attr_name: int_attr_name.into(),
            ext_attr_name: ext_attr_name.into(),
            purpose: MappingPurpose::Both,
            mandatory_condition: default_mandatory_condition(),
            conn_object_key: false,
            password: false,
            transformers: Vec::new(),
        }
    }

    /// Designate the item as the connObjectKey.
    #[must_use]
    pub fn as_conn_object_key(mut self) -> Self {
        self.conn_object_key = true;
        self
    }

    /// Designate the item as the password carrier.
    #[must_use]
    pub fn as_password(mut self) -> Self {
        self.password = true;
        self
    }

    /// Set the purpose.
    #[must_use]
    pub fn with_purpose(mut self, purpose: MappingPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    /// Set the mandatory condition.
    #[must_use]
    pub fn with_mandatory_condition(mut self, condition: impl Into<String>) -> Self {
        self.mandatory_condition = condition.into();
        self
    }

    /// Append a transformation stage.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transformers.push(transform);
        self
    }

    /// Evaluate the mandatory condition.
    ///
    /// Only the literals `true` and `false` are accepted.
    pub fn is_mandatory(&self) -> ConnectorResult<bool> {
        match self.mandatory_condition.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(ConnectorError::invalid_mapping(format!(
                "unsupported mandatory condition '{other}' on item '{}'",
                self.ext_attr_name
            ))),
        }
    }
}

/// Validated, ordered list of mapping items for one provision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MappingItem>", into = "Vec<MappingItem>")]
pub struct Mapping {
    items: Vec<MappingItem>,
}

impl Mapping {
    /// Build a mapping, rejecting structurally invalid item sets.
    pub fn new(items: Vec<MappingItem>) -> ConnectorResult<Self> {
        if let Some(item) = items.iter().find(|i| i.conn_object_key && i.password) {
            return Err(ConnectorError::invalid_mapping(format!(
                "item '{}' cannot be both connObjectKey and password",
                item.ext_attr_name
            )));
        }
        if items.iter().filter(|i| i.conn_object_key).count() > 1 {
            return Err(ConnectorError::invalid_mapping(
                "more than one connObjectKey item",
            ));
        }
        if items.iter().filter(|i| i.password).count() > 1 {
            return Err(ConnectorError::invalid_mapping("more than one password item"));
        }
        for item in &items {
            item.is_mandatory()?;
        }

        Ok(Self { items })
    }

    /// All items, in declaration order.
    pub fn items(&self) -> &[MappingItem] {
        &self.items
    }

    /// The item designated as connObjectKey, if any.
    pub fn conn_object_key_item(&self) -> Option<&MappingItem> {
        self.items.iter().find(|i| i.conn_object_key)
    }

    /// The item designated as password, if any.
    pub fn password_item(&self) -> Option<&MappingItem> {
        self.items.iter().find(|i| i.password)
    }

    /// Items used when propagating outward.
    pub fn propagation_items(&self) -> impl Iterator<Item = &MappingItem> {
        self.items
            .iter()
            .filter(|i| i.purpose.includes_propagation())
    }

    /// Items used when pulling inward.
    pub fn pull_items(&self) -> impl Iterator<Item = &MappingItem> {
        self.items.iter().filter(|i| i.purpose.includes_pull())
    }
}

impl TryFrom<Vec<MappingItem>> for Mapping {
    type Error = ConnectorError;

    fn try_from(items: Vec<MappingItem>) -> Result<Self, Self::Error> {
        Mapping::new(items)
    }
}

impl From<Mapping> for Vec<MappingItem> {
    fn from(mapping: Mapping) -> Self {
        mapping.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_accessors() {
        let mapping = Mapping::new(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("password", "__PASSWORD__").as_password(),
            MappingItem::new("email", "mail").with_purpose(MappingPurpose::Pull),
            MappingItem::new("fullname", "cn").with_purpose(MappingPurpose::None),
        ])
        .unwrap();

        assert_eq!(mapping.conn_object_key_item().unwrap().ext_attr_name, "uid");
        assert_eq!(
            mapping.password_item().unwrap().ext_attr_name,
            "__PASSWORD__"
        );
        assert_eq!(mapping.propagation_items().count(), 2);
        assert_eq!(mapping.pull_items().count(), 3);
    }

    #[test]
    fn test_item_cannot_be_key_and_password() {
        let err = Mapping::new(vec![MappingItem::new("username", "uid")
            .as_conn_object_key()
            .as_password()])
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_MAPPING");
    }

    #[test]
    fn test_duplicate_conn_object_key_rejected() {
        let result = Mapping::new(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("email", "mail").as_conn_object_key(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_password_rejected() {
        let result = Mapping::new(vec![
            MappingItem::new("password", "userPassword").as_password(),
            MappingItem::new("password", "__PASSWORD__").as_password(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mandatory_condition_literals() {
        let item = MappingItem::new("email", "mail");
        assert!(!item.is_mandatory().unwrap());
        assert!(item
            .clone()
            .with_mandatory_condition(" TRUE ")
            .is_mandatory()
            .unwrap());
        assert!(item
            .with_mandatory_condition("user.active")
            .is_mandatory()
            .is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"[
            {"int_attr_name": "username", "ext_attr_name": "uid", "conn_object_key": true},
            {"int_attr_name": "email", "ext_attr_name": "mail", "conn_object_key": true}
        ]"#;
        assert!(serde_json::from_str::<Mapping>(json).is_err());

        let json = r#"[
            {"int_attr_name": "username", "ext_attr_name": "uid", "conn_object_key": true,
             "transformers": [{"type": "lowercase"}]}
        ]"#;
        let mapping: Mapping = serde_json::from_str(json).unwrap();
        let item = mapping.conn_object_key_item().unwrap();
        assert_eq!(item.purpose, MappingPurpose::Both);
        assert_eq!(item.mandatory_condition, "false");
        assert_eq!(item.transformers, vec![Transform::Lowercase]);
    }
}
