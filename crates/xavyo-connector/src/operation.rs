//! Connector Framework operation types
//!
//! Types that cross the connector boundary: UIDs, typed attribute values,
//! attribute sets, filters, operation options, search and sync results.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroize;

/// Operational attribute carrying the external object's naming value.
pub const NAME: &str = "__NAME__";
/// Operational attribute carrying the backend-assigned identifier.
pub const UID: &str = "__UID__";
/// Operational attribute carrying the account password.
pub const PASSWORD: &str = "__PASSWORD__";
/// Operational attribute carrying the account enablement flag.
pub const ENABLE: &str = "__ENABLE__";

/// Object class of user accounts.
pub const ACCOUNT_OBJECT_CLASS: &str = "__ACCOUNT__";
/// Object class of groups.
pub const GROUP_OBJECT_CLASS: &str = "__GROUP__";

/// Placeholder emitted wherever a guarded value would otherwise be rendered.
pub const REDACTED: &str = "***REDACTED***";

/// Unique identifier for an object on an external resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    /// The attribute name used as the identifier (e.g., "__UID__", "dn").
    attribute_name: String,
    /// The actual value of the identifier.
    value: String,
}

impl Uid {
    /// Create a new UID with the given attribute name and value.
    pub fn new(attribute_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }

    /// Create a UID using the operational `__UID__` attribute name.
    pub fn from_value(value: impl Into<String>) -> Self {
        Self::new(UID, value)
    }

    /// Get the attribute name.
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Get the value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute_name, self.value)
    }
}

/// A secret string whose memory is wiped on drop.
///
/// `Debug`, `Display` and serialization never reveal the secret; only
/// [`GuardedString::expose`] does.
#[derive(Clone, PartialEq, Eq)]
pub struct GuardedString(String);

impl GuardedString {
    /// Wrap a clear-text secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the clear-text secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for GuardedString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for GuardedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GuardedString").field(&REDACTED).finish()
    }
}

impl Serialize for GuardedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for GuardedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(GuardedString)
    }
}

/// Secret bytes whose memory is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct GuardedBytes(Vec<u8>);

impl GuardedBytes {
    /// Wrap secret bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    /// Access the secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for GuardedBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for GuardedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GuardedBytes").field(&REDACTED).finish()
    }
}

impl Serialize for GuardedBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for GuardedBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<u8>::deserialize(deserializer).map(GuardedBytes)
    }
}

/// One value of an attribute.
///
/// The set of variants is closed: every value crossing the connector
/// boundary is one of these, and secrets are always one of the guarded
/// variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Text value.
    String(String),
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Long(i64),
    /// Floating-point value.
    Double(f64),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Secret text.
    GuardedString(GuardedString),
    /// Secret bytes.
    GuardedBytes(GuardedBytes),
}

impl AttributeValue {
    /// Get as a string slice if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            AttributeValue::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this value carries a secret.
    pub fn is_guarded(&self) -> bool {
        matches!(
            self,
            AttributeValue::GuardedString(_) | AttributeValue::GuardedBytes(_)
        )
    }

    /// Render the value as text for transformation or key computation.
    ///
    /// Returns `None` for guarded and binary values, which have no safe
    /// textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Boolean(b) => Some(b.to_string()),
            AttributeValue::Long(i) => Some(i.to_string()),
            AttributeValue::Double(d) => Some(d.to_string()),
            AttributeValue::Binary(_)
            | AttributeValue::GuardedString(_)
            | AttributeValue::GuardedBytes(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Long(i) => write!(f, "{i}"),
            AttributeValue::Double(d) => write!(f, "{d}"),
            AttributeValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            AttributeValue::GuardedString(_) | AttributeValue::GuardedBytes(_) => {
                write!(f, "{REDACTED}")
            }
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Long(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Double(f)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<GuardedString> for AttributeValue {
    fn from(g: GuardedString) -> Self {
        AttributeValue::GuardedString(g)
    }
}

/// A named, multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name on the external resource.
    pub name: String,
    /// Ordered values; may be empty.
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    /// Create an attribute from a name and its values.
    pub fn new(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Create a single-valued attribute.
    pub fn single(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::new(name, vec![value.into()])
    }
}

/// A set of attributes keyed by name.
///
/// A name appears at most once; setting an attribute replaces any previous
/// values under that name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(flatten)]
    attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single-valued attribute, replacing previous values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), vec![value.into()]);
    }

    /// Set all values of an attribute, replacing previous values.
    pub fn set_values(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        self.attributes.insert(name.into(), values);
    }

    /// Set a single-valued attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set all values of an attribute using builder pattern.
    #[must_use]
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        self.set_values(name, values);
        self
    }

    /// Get all values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Get the first value of an attribute.
    pub fn get_single(&self, name: &str) -> Option<&AttributeValue> {
        self.get(name).and_then(|values| values.first())
    }

    /// Get the first value of an attribute as text.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get_single(name).and_then(AttributeValue::as_str)
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.attributes.remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<AttributeValue>)> {
        self.attributes.iter()
    }

    /// Convert into a list of attributes.
    pub fn into_attributes(self) -> Vec<Attribute> {
        self.attributes
            .into_iter()
            .map(|(name, values)| Attribute { name, values })
            .collect()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().map(|a| (a.name, a.values)).collect(),
        }
    }
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match objects where attribute equals value, ignoring case.
    EqualsIgnoreCase { attribute: String, value: String },

    /// Match objects where attribute contains value (substring).
    Contains { attribute: String, value: String },

    /// Match objects where attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Match objects where attribute ends with value.
    EndsWith { attribute: String, value: String },

    /// Match objects where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a case-insensitive equals filter.
    pub fn eq_ignore_case(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::EqualsIgnoreCase {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a contains filter.
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    #[must_use]
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Combine this filter with another using OR.
    #[must_use]
    pub fn or_with(self, other: Filter) -> Self {
        match self {
            Filter::Or { mut filters } => {
                filters.push(other);
                Filter::Or { filters }
            }
            _ => Filter::Or {
                filters: vec![self, other],
            },
        }
    }

    /// Evaluate this filter against an object.
    ///
    /// Used by in-process bundles that cannot push filters down to a
    /// backend. Comparison is on the textual form of each value.
    pub fn matches(&self, object: &ConnectorObject) -> bool {
        let texts = |attribute: &str| -> Vec<String> {
            if attribute == UID {
                return vec![object.uid.value().to_string()];
            }
            if attribute == NAME {
                return vec![object.name.clone()];
            }
            object
                .attributes
                .get(attribute)
                .unwrap_or_default()
                .iter()
                .filter_map(AttributeValue::to_text)
                .collect()
        };

        match self {
            Filter::Equals { attribute, value } => texts(attribute).iter().any(|v| v == value),
            Filter::EqualsIgnoreCase { attribute, value } => texts(attribute)
                .iter()
                .any(|v| v.to_lowercase() == value.to_lowercase()),
            Filter::Contains { attribute, value } => {
                texts(attribute).iter().any(|v| v.contains(value.as_str()))
            }
            Filter::StartsWith { attribute, value } => texts(attribute)
                .iter()
                .any(|v| v.starts_with(value.as_str())),
            Filter::EndsWith { attribute, value } => {
                texts(attribute).iter().any(|v| v.ends_with(value.as_str()))
            }
            Filter::Present { attribute } => {
                attribute == UID || attribute == NAME || object.attributes.has(attribute)
            }
            Filter::And { filters } => filters.iter().all(|f| f.matches(object)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(object)),
            Filter::Not { filter } => !filter.matches(object),
        }
    }
}

/// Options passed alongside connector operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Attributes to return; `None` means the backend default set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,

    /// Page size for paged searches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Opaque cookie returned by the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged_results_cookie: Option<String>,

    /// Offset for offset-based paging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged_results_offset: Option<u32>,

    /// Attribute to sort by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
}

impl OperationOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict returned attributes.
    #[must_use]
    pub fn with_attributes_to_get(mut self, names: Vec<String>) -> Self {
        self.attributes_to_get = Some(names);
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the paged results cookie.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.paged_results_cookie = Some(cookie.into());
        self
    }

    /// Set the sort attribute.
    #[must_use]
    pub fn sorted_by(mut self, attribute: impl Into<String>) -> Self {
        self.sort_by = Some(attribute.into());
        self
    }

    /// Whether the caller already drives paging.
    pub fn is_paged(&self) -> bool {
        self.page_size.is_some() || self.paged_results_cookie.is_some()
    }
}

/// Metadata returned at the end of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultMetadata {
    /// Cookie for the next page, if more results are available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paged_results_cookie: Option<String>,

    /// Remaining results, when the backend knows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_paged_results: Option<i64>,

    /// False when the handler stopped the search early.
    pub all_results_returned: bool,
}

impl SearchResultMetadata {
    /// Metadata for a search that returned everything.
    pub fn complete() -> Self {
        Self {
            paged_results_cookie: None,
            remaining_paged_results: None,
            all_results_returned: true,
        }
    }

    /// Set the next-page cookie.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.paged_results_cookie = Some(cookie.into());
        self
    }
}

/// An object as read from an external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    /// Object class on the resource.
    pub object_class: String,
    /// Backend identifier.
    pub uid: Uid,
    /// Naming value (`__NAME__`).
    pub name: String,
    /// All other returned attributes.
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    /// Create an object; the name defaults to the UID value.
    pub fn new(object_class: impl Into<String>, uid: Uid, attributes: AttributeSet) -> Self {
        let name = uid.value().to_string();
        Self {
            object_class: object_class.into(),
            uid,
            name,
            attributes,
        }
    }

    /// Set the naming value.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Look up an attribute by name, including the operational ones.
    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        match name {
            UID => Some(Attribute::single(UID, self.uid.value())),
            NAME => Some(Attribute::single(NAME, self.name.as_str())),
            _ => self
                .attributes
                .get(name)
                .map(|values| Attribute::new(name, values.to_vec())),
        }
    }
}

/// Opaque position in a resource's change log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(Option<String>);

impl SyncToken {
    /// A token carrying a backend position.
    pub fn new(value: impl Into<String>) -> Self {
        Self(Some(value.into()))
    }

    /// The empty token, used when no change tracking exists.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Whether this token carries no position.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// The backend position, if any.
    pub fn value(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Type of change reported by a sync feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDeltaType {
    /// A new object was created.
    Create,
    /// An existing object was updated.
    Update,
    /// The object exists; whether it is new is unknown.
    CreateOrUpdate,
    /// An object was deleted.
    Delete,
}

impl fmt::Display for SyncDeltaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDeltaType::Create => write!(f, "CREATE"),
            SyncDeltaType::Update => write!(f, "UPDATE"),
            SyncDeltaType::CreateOrUpdate => write!(f, "CREATE_OR_UPDATE"),
            SyncDeltaType::Delete => write!(f, "DELETE"),
        }
    }
}

/// One change reported by sync, live sync, or simulated reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDelta {
    /// Position of this change in the feed.
    pub token: SyncToken,
    /// Change type.
    pub delta_type: SyncDeltaType,
    /// Object class of the changed object.
    pub object_class: String,
    /// Identifier of the changed object.
    pub uid: Uid,
    /// Identifier before a rename, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_uid: Option<Uid>,
    /// Current state of the object; absent for deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ConnectorObject>,
}

impl SyncDelta {
    /// Delta for an object that exists on the resource.
    pub fn upsert(token: SyncToken, delta_type: SyncDeltaType, object: ConnectorObject) -> Self {
        Self {
            token,
            delta_type,
            object_class: object.object_class.clone(),
            uid: object.uid.clone(),
            previous_uid: None,
            object: Some(object),
        }
    }

    /// Delta for a deleted object.
    pub fn deleted(token: SyncToken, object_class: impl Into<String>, uid: Uid) -> Self {
        Self {
            token,
            delta_type: SyncDeltaType::Delete,
            object_class: object_class.into(),
            uid,
            previous_uid: None,
            object: None,
        }
    }
}

/// Result of a write operation together with whether the backend was
/// actually contacted.
///
/// Capability-limited connectors skip some operations; callers must branch
/// on `propagation_attempted` rather than assume success implies contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOutcome<T> {
    /// Operation result.
    pub value: T,
    /// True when the backend was contacted.
    pub propagation_attempted: bool,
}

impl<T> PropagationOutcome<T> {
    /// Outcome of an operation that reached the backend.
    pub fn attempted(value: T) -> Self {
        Self {
            value,
            propagation_attempted: true,
        }
    }

    /// Outcome of an operation that was skipped locally.
    pub fn not_attempted(value: T) -> Self {
        Self {
            value,
            propagation_attempted: false,
        }
    }
}
