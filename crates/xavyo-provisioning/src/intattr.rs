//! Mapping expression parsing.
//!
//! A mapping item's internal attribute name is a small expression that
//! addresses a value on an internal record:
//!
//! | Form | Addressing | Resulting kind |
//! |------|------------|----------------|
//! | `attr` | the provision's own record | provision kind |
//! | `groups[NAME].attr` | a group the record belongs to | GROUP |
//! | `anyObjects[NAME].attr` | a related any object | ANY_OBJECT |
//! | `[NAME].attr` | the user's membership in group NAME | USER |
//!
//! Whether `attr` denotes a built-in field or a schema is decided by a
//! [`SchemaRegistry`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use xavyo_connector::types::{AnyTypeKind, ParseEnumError};

use crate::error::{ProvisioningError, ProvisioningResult};

static OWN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));
static ENCLOSING_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^groups\[([A-Za-z0-9_]+)\]\.([A-Za-z0-9_]+)$").expect("valid regex")
});
static RELATED_ANY_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^anyObjects\[([A-Za-z0-9_]+)\]\.([A-Za-z0-9_]+)$").expect("valid regex")
});
static MEMBERSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([A-Za-z0-9_]+)\]\.([A-Za-z0-9_]+)$").expect("valid regex")
});

/// Kind of schema an attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    Plain,
    Derived,
    Virtual,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Plain => "PLAIN",
            SchemaType::Derived => "DERIVED",
            SchemaType::Virtual => "VIRTUAL",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(SchemaType::Plain),
            "DERIVED" => Ok(SchemaType::Derived),
            "VIRTUAL" => Ok(SchemaType::Virtual),
            _ => Err(ParseEnumError::new("schema type", s)),
        }
    }
}

/// Where the addressed value lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "name", rename_all = "snake_case")]
pub enum Addressing {
    /// The provision's own record.
    Own,
    /// A group, by name, that the record is a member of.
    EnclosingGroup(String),
    /// A related any object, by name.
    RelatedAnyObject(String),
    /// The record's membership in the named group.
    MembershipOfGroup(String),
}

/// What is addressed on the target record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum AttrTarget {
    /// A built-in record field.
    Field { name: String },
    /// A schema attribute.
    Schema { schema_type: SchemaType, name: String },
}

/// A parsed mapping expression. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntAttrName {
    any_type_kind: AnyTypeKind,
    addressing: Addressing,
    target: AttrTarget,
}

impl IntAttrName {
    /// Kind of the record the value is read from.
    pub fn any_type_kind(&self) -> AnyTypeKind {
        self.any_type_kind
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    pub fn target(&self) -> &AttrTarget {
        &self.target
    }

    /// Built-in field name, if a field is addressed.
    pub fn field(&self) -> Option<&str> {
        match &self.target {
            AttrTarget::Field { name } => Some(name),
            AttrTarget::Schema { .. } => None,
        }
    }

    /// Schema name, if a schema is addressed.
    pub fn schema_name(&self) -> Option<&str> {
        match &self.target {
            AttrTarget::Schema { name, .. } => Some(name),
            AttrTarget::Field { .. } => None,
        }
    }

    /// Schema type, if a schema is addressed.
    pub fn schema_type(&self) -> Option<SchemaType> {
        match &self.target {
            AttrTarget::Schema { schema_type, .. } => Some(*schema_type),
            AttrTarget::Field { .. } => None,
        }
    }

    pub fn enclosing_group(&self) -> Option<&str> {
        match &self.addressing {
            Addressing::EnclosingGroup(name) => Some(name),
            _ => None,
        }
    }

    pub fn related_any_object(&self) -> Option<&str> {
        match &self.addressing {
            Addressing::RelatedAnyObject(name) => Some(name),
            _ => None,
        }
    }

    pub fn membership_of_group(&self) -> Option<&str> {
        match &self.addressing {
            Addressing::MembershipOfGroup(name) => Some(name),
            _ => None,
        }
    }

    /// The addressed field or schema name.
    pub fn attribute(&self) -> &str {
        match &self.target {
            AttrTarget::Field { name } | AttrTarget::Schema { name, .. } => name,
        }
    }
}

/// Renders back to expression form.
impl fmt::Display for IntAttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attr = self.attribute();
        match &self.addressing {
            Addressing::Own => write!(f, "{attr}"),
            Addressing::EnclosingGroup(group) => write!(f, "groups[{group}].{attr}"),
            Addressing::RelatedAnyObject(name) => write!(f, "anyObjects[{name}].{attr}"),
            Addressing::MembershipOfGroup(group) => write!(f, "[{group}].{attr}"),
        }
    }
}

/// Knowledge of built-in fields and declared schemas.
pub trait SchemaRegistry: Send + Sync {
    /// Whether `name` is a built-in field of records of `kind`.
    fn is_field(&self, kind: AnyTypeKind, name: &str) -> bool;

    /// Type of a declared schema, or `None` if undeclared.
    fn schema_type(&self, name: &str) -> Option<SchemaType>;
}

/// Statically declared schema registry.
#[derive(Debug, Clone)]
pub struct StaticSchemaRegistry {
    fields: BTreeMap<AnyTypeKind, BTreeSet<String>>,
    schemas: BTreeMap<String, SchemaType>,
}

impl Default for StaticSchemaRegistry {
    /// Standard built-in fields per kind and no declared schemas.
    fn default() -> Self {
        let mut fields: BTreeMap<AnyTypeKind, BTreeSet<String>> = BTreeMap::new();
        for (kind, names) in [
            (AnyTypeKind::User, &["key", "username"][..]),
            (AnyTypeKind::Group, &["key", "name", "userOwner", "groupOwner"][..]),
            (AnyTypeKind::AnyObject, &["key", "name"][..]),
        ] {
            fields.insert(kind, names.iter().map(|n| n.to_string()).collect());
        }
        Self {
            fields,
            schemas: BTreeMap::new(),
        }
    }
}

impl StaticSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an additional built-in field for a kind.
    #[must_use]
    pub fn with_field(mut self, kind: AnyTypeKind, name: impl Into<String>) -> Self {
        self.fields.entry(kind).or_default().insert(name.into());
        self
    }

    /// Declare a schema.
    #[must_use]
    pub fn with_schema(mut self, name: impl Into<String>, schema_type: SchemaType) -> Self {
        self.schemas.insert(name.into(), schema_type);
        self
    }
}

impl SchemaRegistry for StaticSchemaRegistry {
    fn is_field(&self, kind: AnyTypeKind, name: &str) -> bool {
        self.fields
            .get(&kind)
            .is_some_and(|names| names.contains(name))
    }

    fn schema_type(&self, name: &str) -> Option<SchemaType> {
        self.schemas.get(name).copied()
    }
}

/// Parses mapping expressions against a schema registry. Stateless.
#[derive(Clone)]
pub struct IntAttrNameParser {
    schemas: Arc<dyn SchemaRegistry>,
}

impl IntAttrNameParser {
    pub fn new(schemas: Arc<dyn SchemaRegistry>) -> Self {
        Self { schemas }
    }

    /// Parse `expression` for a provision of kind `kind`.
    pub fn parse(&self, expression: &str, kind: AnyTypeKind) -> ProvisioningResult<IntAttrName> {
        let (any_type_kind, addressing, attr) = if !expression.contains('.') {
            if !OWN.is_match(expression) {
                return Err(ProvisioningError::malformed(expression));
            }
            (kind, Addressing::Own, expression)
        } else if let Some(caps) = ENCLOSING_GROUP.captures(expression) {
            (
                AnyTypeKind::Group,
                Addressing::EnclosingGroup(caps[1].to_string()),
                capture(expression, &caps, 2),
            )
        } else if let Some(caps) = RELATED_ANY_OBJECT.captures(expression) {
            (
                AnyTypeKind::AnyObject,
                Addressing::RelatedAnyObject(caps[1].to_string()),
                capture(expression, &caps, 2),
            )
        } else if let Some(caps) = MEMBERSHIP.captures(expression) {
            (
                AnyTypeKind::User,
                Addressing::MembershipOfGroup(caps[1].to_string()),
                capture(expression, &caps, 2),
            )
        } else {
            return Err(ProvisioningError::malformed(expression));
        };

        let target = if self.schemas.is_field(any_type_kind, attr) {
            AttrTarget::Field {
                name: attr.to_string(),
            }
        } else {
            AttrTarget::Schema {
                schema_type: self.schemas.schema_type(attr).unwrap_or(SchemaType::Plain),
                name: attr.to_string(),
            }
        };

        Ok(IntAttrName {
            any_type_kind,
            addressing,
            target,
        })
    }
}

fn capture<'a>(expression: &'a str, caps: &regex::Captures<'a>, index: usize) -> &'a str {
    caps.get(index).map_or(expression, |m| m.as_str())
}

impl Default for IntAttrNameParser {
    fn default() -> Self {
        Self::new(Arc::new(StaticSchemaRegistry::default()))
    }
}

impl fmt::Debug for IntAttrNameParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntAttrNameParser").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> IntAttrNameParser {
        IntAttrNameParser::new(Arc::new(
            StaticSchemaRegistry::new()
                .with_schema("fullname", SchemaType::Derived)
                .with_schema("avatar", SchemaType::Virtual),
        ))
    }

    #[test]
    fn test_own_field() {
        let parsed = parser().parse("username", AnyTypeKind::User).unwrap();
        assert_eq!(parsed.any_type_kind(), AnyTypeKind::User);
        assert_eq!(parsed.field(), Some("username"));
        assert_eq!(parsed.schema_name(), None);
        assert_eq!(parsed.addressing(), &Addressing::Own);
    }

    #[test]
    fn test_given_name_depends_on_field_registry() {
        let plain = parser().parse("givenName", AnyTypeKind::User).unwrap();
        assert_eq!(plain.field(), None);
        assert_eq!(plain.schema_name(), Some("givenName"));
        assert_eq!(plain.schema_type(), Some(SchemaType::Plain));

        let with_field = IntAttrNameParser::new(Arc::new(
            StaticSchemaRegistry::new().with_field(AnyTypeKind::User, "givenName"),
        ));
        let field = with_field.parse("givenName", AnyTypeKind::User).unwrap();
        assert_eq!(field.field(), Some("givenName"));
        assert_eq!(field.schema_name(), None);
    }

    #[test]
    fn test_declared_schema_types() {
        let derived = parser().parse("fullname", AnyTypeKind::User).unwrap();
        assert_eq!(derived.schema_type(), Some(SchemaType::Derived));
        let virtual_attr = parser().parse("avatar", AnyTypeKind::User).unwrap();
        assert_eq!(virtual_attr.schema_type(), Some(SchemaType::Virtual));
    }

    #[test]
    fn test_enclosing_group() {
        let parsed = parser().parse("groups[admins].level", AnyTypeKind::User).unwrap();
        assert_eq!(parsed.any_type_kind(), AnyTypeKind::Group);
        assert_eq!(parsed.enclosing_group(), Some("admins"));
        assert_eq!(parsed.schema_name(), Some("level"));
        assert_eq!(parsed.related_any_object(), None);
        assert_eq!(parsed.membership_of_group(), None);
    }

    #[test]
    fn test_group_field_uses_group_registry() {
        let parsed = parser().parse("groups[admins].name", AnyTypeKind::User).unwrap();
        assert_eq!(parsed.field(), Some("name"));
    }

    #[test]
    fn test_related_any_object() {
        let parsed = parser()
            .parse("anyObjects[hp01].location", AnyTypeKind::User)
            .unwrap();
        assert_eq!(parsed.any_type_kind(), AnyTypeKind::AnyObject);
        assert_eq!(parsed.related_any_object(), Some("hp01"));
        assert_eq!(parsed.attribute(), "location");
    }

    #[test]
    fn test_membership_of_group() {
        let parsed = parser().parse("[staff].badge", AnyTypeKind::Group).unwrap();
        assert_eq!(parsed.any_type_kind(), AnyTypeKind::User);
        assert_eq!(parsed.membership_of_group(), Some("staff"));
        assert_eq!(parsed.schema_name(), Some("badge"));
    }

    #[test]
    fn test_malformed_expressions() {
        for expression in [
            "not a valid expr!",
            "",
            "groups[admins]",
            "groups[adm ins].level",
            "roles[admins].level",
            "groups[admins].level.extra",
            "[].badge",
            "anyObjects[hp01].",
        ] {
            let err = parser().parse(expression, AnyTypeKind::User).unwrap_err();
            assert!(
                matches!(err, ProvisioningError::MalformedExpression { .. }),
                "{expression} should be malformed"
            );
        }
    }

    #[test]
    fn test_display_round_trip() {
        let parser = parser();
        for expression in [
            "username",
            "mail",
            "groups[admins].level",
            "anyObjects[hp01].location",
            "[staff].badge",
        ] {
            let parsed = parser.parse(expression, AnyTypeKind::User).unwrap();
            assert_eq!(parsed.to_string(), expression);
            let reparsed = parser.parse(&parsed.to_string(), AnyTypeKind::User).unwrap();
            assert_eq!(reparsed, parsed);
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = parser();
        let a = parser.parse("groups[admins].level", AnyTypeKind::User).unwrap();
        let b = parser.parse("groups[admins].level", AnyTypeKind::User).unwrap();
        assert_eq!(a, b);
    }
}
