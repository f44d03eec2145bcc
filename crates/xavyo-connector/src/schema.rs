//! Connector Framework schema types
//!
//! Object classes and attributes as discovered on an external resource.

use serde::{Deserialize, Serialize};

/// Data type of an attribute on the external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDataType {
    #[default]
    String,
    Boolean,
    Long,
    Double,
    Binary,
    GuardedString,
    GuardedBytes,
}

/// One attribute of an object class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    /// Attribute name.
    pub name: String,
    /// Value type.
    #[serde(default)]
    pub data_type: AttributeDataType,
    /// Whether the attribute must be supplied on create.
    #[serde(default)]
    pub required: bool,
    /// Whether the attribute may hold several values.
    #[serde(default)]
    pub multi_valued: bool,
    /// Whether the attribute is returned by default on reads.
    #[serde(default = "default_true")]
    pub returned_by_default: bool,
}

fn default_true() -> bool {
    true
}

impl AttributeInfo {
    /// Create a single-valued, optional string attribute.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: AttributeDataType::String,
            required: false,
            multi_valued: false,
            returned_by_default: true,
        }
    }

    /// Set the data type.
    #[must_use]
    pub fn with_type(mut self, data_type: AttributeDataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Mark the attribute as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the attribute as multi-valued.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }
}

/// An object class together with its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClassInfo {
    /// Object class name (e.g. `__ACCOUNT__`, `__GROUP__`).
    pub object_class: String,
    /// Attributes of the class.
    pub attributes: Vec<AttributeInfo>,
}

impl ObjectClassInfo {
    /// Create an object class with no attributes.
    pub fn new(object_class: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Get an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Names of the attributes that must be supplied on create.
    pub fn required_attributes(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_class_info() {
        let info = ObjectClassInfo::new("__ACCOUNT__")
            .with_attribute(AttributeInfo::new("uid").required())
            .with_attribute(AttributeInfo::new("memberOf").multi_valued())
            .with_attribute(
                AttributeInfo::new("__PASSWORD__").with_type(AttributeDataType::GuardedString),
            );

        assert_eq!(info.required_attributes(), vec!["uid"]);
        assert!(info.attribute("memberOf").unwrap().multi_valued);
        assert!(info.attribute("missing").is_none());
    }

    #[test]
    fn test_attribute_info_deserialize_defaults() {
        let attr: AttributeInfo = serde_json::from_str(r#"{"name":"cn"}"#).unwrap();
        assert_eq!(attr.data_type, AttributeDataType::String);
        assert!(attr.returned_by_default);
        assert!(!attr.required);
    }
}
