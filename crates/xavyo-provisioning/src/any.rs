//! Internal identity records.
//!
//! [`AnyRecord`] is the provisioning core's view of a user, group or any
//! object: built-in fields, plain/derived/virtual attributes, group
//! memberships and any-object relationships. Persistence is owned by the
//! caller; related records reached by name are looked up through an
//! [`AnyDirectory`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use xavyo_connector::operation::{AttributeValue, GuardedString};
use xavyo_connector::types::AnyTypeKind;

/// Attribute values keyed by schema name.
pub type AttrMap = BTreeMap<String, Vec<AttributeValue>>;

/// Built-in field holding the record key.
pub const KEY_FIELD: &str = "key";

/// Built-in field holding a user's username.
pub const USERNAME_FIELD: &str = "username";

/// Built-in field holding a group's or any object's name.
pub const NAME_FIELD: &str = "name";

/// A user's membership in a group, with membership-scoped attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plain_attrs: AttrMap,
}

/// An internal identity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyRecord {
    pub key: String,

    pub kind: AnyTypeKind,

    /// Concrete any-type name ("USER", "GROUP", "PRINTER", ...).
    pub any_type: String,

    /// Built-in fields other than the key.
    #[serde(flatten)]
    pub fields: BTreeMap<String, AttributeValue>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plain_attrs: AttrMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived_attrs: AttrMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub virtual_attrs: AttrMap,

    /// Group memberships keyed by group name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub memberships: BTreeMap<String, Membership>,

    /// Names of related any objects.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub relationships: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<GuardedString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_answer: Option<GuardedString>,

    #[serde(default)]
    pub suspended: bool,
}

impl AnyRecord {
    /// Create an empty record of the given kind and any-type.
    pub fn new(key: impl Into<String>, kind: AnyTypeKind, any_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            any_type: any_type.into(),
            fields: BTreeMap::new(),
            plain_attrs: AttrMap::new(),
            derived_attrs: AttrMap::new(),
            virtual_attrs: AttrMap::new(),
            memberships: BTreeMap::new(),
            relationships: BTreeSet::new(),
            password: None,
            security_answer: None,
            suspended: false,
        }
    }

    /// Create a user record.
    pub fn user(key: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(key, AnyTypeKind::User, AnyTypeKind::User.as_str())
            .with_field(USERNAME_FIELD, AttributeValue::String(username.into()))
    }

    /// Create a group record.
    pub fn group(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(key, AnyTypeKind::Group, AnyTypeKind::Group.as_str())
            .with_field(NAME_FIELD, AttributeValue::String(name.into()))
    }

    /// Create an any object record of a concrete any-type.
    pub fn any_object(
        key: impl Into<String>,
        any_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(key, AnyTypeKind::AnyObject, any_type)
            .with_field(NAME_FIELD, AttributeValue::String(name.into()))
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_plain_attr(mut self, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.plain_attrs.insert(name.into(), values);
        self
    }

    #[must_use]
    pub fn with_derived_attr(
        mut self,
        name: impl Into<String>,
        values: Vec<AttributeValue>,
    ) -> Self {
        self.derived_attrs.insert(name.into(), values);
        self
    }

    #[must_use]
    pub fn with_virtual_attr(
        mut self,
        name: impl Into<String>,
        values: Vec<AttributeValue>,
    ) -> Self {
        self.virtual_attrs.insert(name.into(), values);
        self
    }

    #[must_use]
    pub fn with_membership(mut self, group: impl Into<String>, membership: Membership) -> Self {
        self.memberships.insert(group.into(), membership);
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, any_object: impl Into<String>) -> Self {
        self.relationships.insert(any_object.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: GuardedString) -> Self {
        self.password = Some(password);
        self
    }

    #[must_use]
    pub fn with_security_answer(mut self, answer: GuardedString) -> Self {
        self.security_answer = Some(answer);
        self
    }

    /// Value of a built-in field; the key is always present.
    pub fn field(&self, name: &str) -> Option<AttributeValue> {
        if name == KEY_FIELD {
            return Some(AttributeValue::String(self.key.clone()));
        }
        self.fields.get(name).cloned()
    }

    /// The user's username, when set.
    pub fn username(&self) -> Option<&str> {
        self.fields.get(USERNAME_FIELD).and_then(AttributeValue::as_str)
    }

    /// The group's or any object's name, when set.
    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME_FIELD).and_then(AttributeValue::as_str)
    }

    /// Whether this record is a member of the named group.
    pub fn is_member_of(&self, group: &str) -> bool {
        self.memberships.contains_key(group)
    }

    /// Short description for log and error messages.
    pub fn describe(&self) -> String {
        format!("{} {}", self.any_type, self.key)
    }
}

/// A secondary external identity owned by a user on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub key: String,

    pub resource: String,

    /// The account's identifier on the resource.
    pub conn_object_key_value: String,

    /// Overrides the owner's username when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Overrides the owner's password when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<GuardedString>,

    /// Overrides the owner's suspension status when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,

    /// Overrides the owner's plain attributes by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plain_attrs: AttrMap,
}

impl LinkedAccount {
    pub fn new(
        key: impl Into<String>,
        resource: impl Into<String>,
        conn_object_key_value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            resource: resource.into(),
            conn_object_key_value: conn_object_key_value.into(),
            username: None,
            password: None,
            suspended: None,
            plain_attrs: AttrMap::new(),
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: GuardedString) -> Self {
        self.password = Some(password);
        self
    }

    #[must_use]
    pub fn with_suspended(mut self, suspended: bool) -> Self {
        self.suspended = Some(suspended);
        self
    }

    #[must_use]
    pub fn with_plain_attr(mut self, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.plain_attrs.insert(name.into(), values);
        self
    }

    /// The owner record as seen through this account's overrides.
    pub fn overlay(&self, owner: &AnyRecord) -> AnyRecord {
        let mut record = owner.clone();
        if let Some(username) = &self.username {
            record
                .fields
                .insert(USERNAME_FIELD.to_string(), username.clone().into());
        }
        if let Some(password) = &self.password {
            record.password = Some(password.clone());
        }
        if let Some(suspended) = self.suspended {
            record.suspended = suspended;
        }
        for (name, values) in &self.plain_attrs {
            record.plain_attrs.insert(name.clone(), values.clone());
        }
        record
    }
}

/// Lookup of related records reached by name from a mapping expression.
pub trait AnyDirectory: Send + Sync {
    /// Group with the given name.
    fn find_group(&self, name: &str) -> Option<AnyRecord>;

    /// Any object with the given name.
    fn find_any_object(&self, name: &str) -> Option<AnyRecord>;
}

/// Directory backed by in-process maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnyDirectory {
    groups: BTreeMap<String, AnyRecord>,
    any_objects: BTreeMap<String, AnyRecord>,
}

impl InMemoryAnyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group, indexed by its name field.
    #[must_use]
    pub fn with_group(mut self, group: AnyRecord) -> Self {
        let name = group.name().unwrap_or(&group.key).to_string();
        self.groups.insert(name, group);
        self
    }

    /// Add an any object, indexed by its name field.
    #[must_use]
    pub fn with_any_object(mut self, any_object: AnyRecord) -> Self {
        let name = any_object.name().unwrap_or(&any_object.key).to_string();
        self.any_objects.insert(name, any_object);
        self
    }
}

impl AnyDirectory for InMemoryAnyDirectory {
    fn find_group(&self, name: &str) -> Option<AnyRecord> {
        self.groups.get(name).cloned()
    }

    fn find_any_object(&self, name: &str) -> Option<AnyRecord> {
        self.any_objects.get(name).cloned()
    }
}
