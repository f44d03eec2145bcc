//! Mapping manager.
//!
//! Computes external keys and outbound attribute sets from internal
//! records, and applies pulled attribute values back onto them. Pure: no
//! backend is contacted and no shared state is mutated.

use std::sync::Arc;
use tracing::{debug, warn};
use xavyo_connector::mapping::{Mapping, MappingItem};
use xavyo_connector::operation::{
    Attribute, AttributeSet, AttributeValue, GuardedString, ENABLE, NAME, PASSWORD,
};
use xavyo_connector::resource::Provision;
use xavyo_connector::transform::TransformEngine;

use crate::any::{AnyDirectory, AnyRecord, LinkedAccount, KEY_FIELD};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::intattr::{Addressing, AttrTarget, IntAttrName, IntAttrNameParser, SchemaType};

/// Result of [`MappingManager::build_outbound_attributes`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundAttributes {
    /// The record's identifier on the resource.
    pub external_key: String,

    /// Attributes to send, keyed by external name.
    pub attributes: AttributeSet,

    /// External names of mandatory items that resolved to no value.
    pub mandatory_missing: Vec<String>,
}

impl OutboundAttributes {
    /// Whether every mandatory item has a value.
    pub fn is_complete(&self) -> bool {
        self.mandatory_missing.is_empty()
    }
}

/// Translates between internal records and resource attribute sets.
#[derive(Clone)]
pub struct MappingManager {
    parser: IntAttrNameParser,
    transforms: TransformEngine,
    directory: Arc<dyn AnyDirectory>,
}

impl MappingManager {
    pub fn new(
        parser: IntAttrNameParser,
        transforms: TransformEngine,
        directory: Arc<dyn AnyDirectory>,
    ) -> Self {
        Self {
            parser,
            transforms,
            directory,
        }
    }

    pub fn parser(&self) -> &IntAttrNameParser {
        &self.parser
    }

    pub fn transforms(&self) -> &TransformEngine {
        &self.transforms
    }

    /// The record's identifier on the resource, from the provision's
    /// connObjectKey item.
    pub fn conn_object_key_value(
        &self,
        entity: &AnyRecord,
        provision: &Provision,
    ) -> ProvisioningResult<String> {
        let item = mapping_of(provision)?
            .conn_object_key_item()
            .ok_or_else(|| missing_key_mapping(provision))?;

        let values = self.resolve_item_values(provision, item, entity)?;
        let values = self.transforms.before_propagation(item, values)?;

        values
            .iter()
            .find_map(AttributeValue::to_text)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProvisioningError::UnresolvableAttribute {
                expression: item.int_attr_name.clone(),
                entity: entity.describe(),
            })
    }

    /// Parse the item's expression and resolve it on `entity`.
    pub fn resolve_item_values(
        &self,
        provision: &Provision,
        item: &MappingItem,
        entity: &AnyRecord,
    ) -> ProvisioningResult<Vec<AttributeValue>> {
        let int_attr_name = self
            .parser
            .parse(&item.int_attr_name, provision.any_type_kind)?;
        Ok(self.resolve_internal_values(provision, item, &int_attr_name, entity))
    }

    /// Values addressed by a parsed expression. Absent fields, schemas,
    /// memberships and relationships resolve to an empty list.
    pub fn resolve_internal_values(
        &self,
        provision: &Provision,
        item: &MappingItem,
        int_attr_name: &IntAttrName,
        entity: &AnyRecord,
    ) -> Vec<AttributeValue> {
        let values = match int_attr_name.addressing() {
            Addressing::Own => read_target(entity, int_attr_name.target()),
            Addressing::EnclosingGroup(group) => {
                if !entity.is_member_of(group) {
                    debug!(
                        entity = %entity.describe(),
                        group = %group,
                        "Not a member of addressed group"
                    );
                    return Vec::new();
                }
                match self.directory.find_group(group) {
                    Some(record) => read_target(&record, int_attr_name.target()),
                    None => {
                        warn!(group = %group, "Membership refers to an unknown group");
                        Vec::new()
                    }
                }
            }
            Addressing::RelatedAnyObject(name) => {
                if !entity.relationships.contains(name) {
                    return Vec::new();
                }
                match self.directory.find_any_object(name) {
                    Some(record) => read_target(&record, int_attr_name.target()),
                    None => {
                        warn!(any_object = %name, "Relationship refers to an unknown any object");
                        Vec::new()
                    }
                }
            }
            Addressing::MembershipOfGroup(group) => match int_attr_name.target() {
                AttrTarget::Schema { name, .. } => entity
                    .memberships
                    .get(group)
                    .and_then(|m| m.plain_attrs.get(name))
                    .cloned()
                    .unwrap_or_default(),
                AttrTarget::Field { .. } => Vec::new(),
            },
        };

        debug!(
            any_type = %provision.any_type,
            int_attr_name = %int_attr_name,
            ext_attr_name = %item.ext_attr_name,
            count = values.len(),
            "Resolved internal values"
        );
        values
    }

    /// Build the attribute set to propagate for `entity`.
    ///
    /// The password item is only filled when `include_password` is set and
    /// a clear password is available (explicit, or the record's own).
    pub fn build_outbound_attributes(
        &self,
        entity: &AnyRecord,
        clear_password: Option<&GuardedString>,
        include_password: bool,
        enabled: Option<bool>,
        provision: &Provision,
    ) -> ProvisioningResult<OutboundAttributes> {
        let mapping = mapping_of(provision)?;
        let external_key = self.conn_object_key_value(entity, provision)?;
        let password = clear_password.or(entity.password.as_ref());

        self.build(
            mapping,
            entity,
            external_key,
            password,
            include_password,
            enabled,
            provision,
        )
    }

    /// Build the attribute set to propagate for one of `user`'s linked
    /// accounts. Account overrides win over the owner's values, and the
    /// account's own identifier is the external key.
    pub fn build_linked_account_attributes(
        &self,
        user: &AnyRecord,
        account: &LinkedAccount,
        clear_password: Option<&GuardedString>,
        include_password: bool,
        provision: &Provision,
    ) -> ProvisioningResult<OutboundAttributes> {
        let mapping = mapping_of(provision)?;
        if mapping.conn_object_key_item().is_none() {
            return Err(missing_key_mapping(provision));
        }

        let record = account.overlay(user);
        let password = clear_password.or(record.password.as_ref());

        self.build(
            mapping,
            &record,
            account.conn_object_key_value.clone(),
            password,
            include_password,
            Some(!record.suspended),
            provision,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        mapping: &Mapping,
        entity: &AnyRecord,
        external_key: String,
        password: Option<&GuardedString>,
        include_password: bool,
        enabled: Option<bool>,
        provision: &Provision,
    ) -> ProvisioningResult<OutboundAttributes> {
        let mut attributes = AttributeSet::new();
        let mut mandatory_missing = Vec::new();

        for item in mapping.propagation_items() {
            if item.password || item.ext_attr_name == PASSWORD {
                if !include_password {
                    debug!("Password not propagated");
                    continue;
                }
                match password {
                    Some(secret) => {
                        attributes.set(PASSWORD, AttributeValue::GuardedString(secret.clone()));
                    }
                    None if item.is_mandatory()? => mandatory_missing.push(PASSWORD.to_string()),
                    None => {}
                }
                continue;
            }

            if item.conn_object_key {
                attributes.set(item.ext_attr_name.clone(), external_key.clone());
                continue;
            }

            let values = self.resolve_item_values(provision, item, entity)?;
            let values = self.transforms.before_propagation(item, values)?;

            if values.is_empty() {
                if item.is_mandatory()? {
                    mandatory_missing.push(item.ext_attr_name.clone());
                }
                continue;
            }
            attributes.set_values(item.ext_attr_name.clone(), values);
        }

        if !attributes.has(NAME) {
            attributes.set(NAME, external_key.clone());
        }
        if let Some(enabled) = enabled {
            attributes.set(ENABLE, enabled);
        }

        debug!(
            any_type = %provision.any_type,
            external_key = %external_key,
            attributes = attributes.len(),
            "Built outbound attributes"
        );

        Ok(OutboundAttributes {
            external_key,
            attributes,
            mandatory_missing,
        })
    }

    /// Set the field or schema addressed by `item` on `target` from pulled
    /// values, replacing what was there. Returns whether anything changed.
    ///
    /// Propagation-only items, the record key and derived schemas are never
    /// written. The password item sets the record's guarded password.
    pub fn apply_inbound_attribute(
        &self,
        item: &MappingItem,
        attribute: &Attribute,
        target: &mut AnyRecord,
    ) -> ProvisioningResult<bool> {
        if !item.purpose.includes_pull() {
            return Ok(false);
        }

        let values = self.transforms.before_pull(item, attribute.values.clone())?;

        if item.password || attribute.name == PASSWORD {
            let password = values.into_iter().find_map(|value| match value {
                AttributeValue::GuardedString(secret) => Some(secret),
                AttributeValue::String(clear) => Some(GuardedString::new(clear)),
                _ => None,
            });
            return Ok(match password {
                Some(password) => {
                    target.password = Some(password);
                    true
                }
                None => false,
            });
        }

        let int_attr_name = self.parser.parse(&item.int_attr_name, target.kind)?;
        let applied = match (int_attr_name.addressing(), int_attr_name.target()) {
            (Addressing::Own, AttrTarget::Field { name }) => {
                if name == KEY_FIELD {
                    debug!(key = %target.key, "Inbound value for record key ignored");
                    false
                } else {
                    match values.into_iter().next() {
                        Some(value) => target.fields.insert(name.clone(), value),
                        None => target.fields.remove(name),
                    };
                    true
                }
            }
            (Addressing::Own, AttrTarget::Schema { schema_type, name }) => match schema_type {
                SchemaType::Plain => {
                    target.plain_attrs.insert(name.clone(), values);
                    true
                }
                SchemaType::Virtual => {
                    target.virtual_attrs.insert(name.clone(), values);
                    true
                }
                SchemaType::Derived => false,
            },
            (Addressing::MembershipOfGroup(group), AttrTarget::Schema { name, .. }) => {
                match target.memberships.get_mut(group) {
                    Some(membership) => {
                        membership.plain_attrs.insert(name.clone(), values);
                        true
                    }
                    None => false,
                }
            }
            _ => {
                debug!(
                    int_attr_name = %int_attr_name,
                    "Inbound value for a related record ignored"
                );
                false
            }
        };
        Ok(applied)
    }
}

impl std::fmt::Debug for MappingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingManager")
            .field("parser", &self.parser)
            .field("transforms", &self.transforms)
            .finish_non_exhaustive()
    }
}

fn mapping_of(provision: &Provision) -> ProvisioningResult<&Mapping> {
    provision
        .mapping
        .as_ref()
        .ok_or_else(|| missing_key_mapping(provision))
}

fn missing_key_mapping(provision: &Provision) -> ProvisioningError {
    ProvisioningError::MissingConnObjectKeyMapping {
        any_type: provision.any_type.clone(),
    }
}

fn read_target(record: &AnyRecord, target: &AttrTarget) -> Vec<AttributeValue> {
    match target {
        AttrTarget::Field { name } => record.field(name).into_iter().collect(),
        AttrTarget::Schema { schema_type, name } => {
            let attrs = match schema_type {
                SchemaType::Plain => &record.plain_attrs,
                SchemaType::Derived => &record.derived_attrs,
                SchemaType::Virtual => &record.virtual_attrs,
            };
            attrs.get(name).cloned().unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::any::{InMemoryAnyDirectory, Membership};
    use crate::intattr::StaticSchemaRegistry;
    use xavyo_connector::mapping::{MappingPurpose, Transform};
    use xavyo_connector::types::AnyTypeKind;

    fn manager() -> MappingManager {
        let schemas = StaticSchemaRegistry::new()
            .with_schema("fullname", SchemaType::Derived)
            .with_schema("photo", SchemaType::Virtual);
        let directory = InMemoryAnyDirectory::new()
            .with_group(
                AnyRecord::group("g1", "admins").with_plain_attr("level", vec!["3".into()]),
            )
            .with_any_object(
                AnyRecord::any_object("p1", "PRINTER", "hp01")
                    .with_plain_attr("location", vec!["floor2".into()]),
            );
        MappingManager::new(
            IntAttrNameParser::new(Arc::new(schemas)),
            TransformEngine::new(),
            Arc::new(directory),
        )
    }

    fn provision(items: Vec<MappingItem>) -> Provision {
        Provision::new("USER", AnyTypeKind::User, "__ACCOUNT__")
            .with_mapping(Mapping::new(items).unwrap())
    }

    fn item(provision: &Provision, ext: &str) -> MappingItem {
        provision
            .mapping
            .as_ref()
            .unwrap()
            .items()
            .iter()
            .find(|i| i.ext_attr_name == ext)
            .unwrap()
            .clone()
    }

    #[test]
    fn test_conn_object_key_value() {
        let provision = provision(vec![MappingItem::new("username", "uid").as_conn_object_key()]);
        let key = manager()
            .conn_object_key_value(&AnyRecord::user("u1", "jdoe"), &provision)
            .unwrap();
        assert_eq!(key, "jdoe");
    }

    #[test]
    fn test_conn_object_key_missing_mapping() {
        let provision = provision(vec![MappingItem::new("username", "uid")]);
        let err = manager()
            .conn_object_key_value(&AnyRecord::user("u1", "jdoe"), &provision)
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::MissingConnObjectKeyMapping { .. }));

        let unmapped = Provision::new("USER", AnyTypeKind::User, "__ACCOUNT__");
        let err = manager()
            .conn_object_key_value(&AnyRecord::user("u1", "jdoe"), &unmapped)
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_conn_object_key_unresolvable() {
        let provision = provision(vec![MappingItem::new("employeeId", "uid").as_conn_object_key()]);
        let err = manager()
            .conn_object_key_value(&AnyRecord::user("u1", "jdoe"), &provision)
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::UnresolvableAttribute { .. }));
    }

    #[test]
    fn test_resolution_absence_is_empty() {
        let provision = provision(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("mail", "mail"),
            MappingItem::new("groups[admins].level", "level"),
            MappingItem::new("anyObjects[hp01].location", "location"),
        ]);
        let manager = manager();
        let user = AnyRecord::user("u1", "jdoe");

        for ext in ["mail", "level", "location"] {
            let values = manager
                .resolve_item_values(&provision, &item(&provision, ext), &user)
                .unwrap();
            assert!(values.is_empty(), "{ext} should resolve to nothing");
        }
    }

    #[test]
    fn test_resolve_related_records() {
        let provision = provision(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("groups[admins].level", "level"),
            MappingItem::new("anyObjects[hp01].location", "location"),
            MappingItem::new("[admins].badge", "badge"),
            MappingItem::new("fullname", "cn"),
        ]);
        let manager = manager();
        let user = AnyRecord::user("u1", "jdoe")
            .with_membership(
                "admins",
                Membership {
                    plain_attrs: [("badge".to_string(), vec!["B-7".into()])].into(),
                },
            )
            .with_relationship("hp01")
            .with_derived_attr("fullname", vec!["John Doe".into()]);

        let resolve = |ext: &str| {
            manager
                .resolve_item_values(&provision, &item(&provision, ext), &user)
                .unwrap()
        };
        assert_eq!(resolve("level"), vec![AttributeValue::from("3")]);
        assert_eq!(resolve("location"), vec![AttributeValue::from("floor2")]);
        assert_eq!(resolve("badge"), vec![AttributeValue::from("B-7")]);
        assert_eq!(resolve("cn"), vec![AttributeValue::from("John Doe")]);
    }

    #[test]
    fn test_build_outbound_jdoe() {
        let provision = provision(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("password", "__PASSWORD__").as_password(),
        ]);
        let user = AnyRecord::user("u1", "jdoe");

        let outbound = manager()
            .build_outbound_attributes(
                &user,
                Some(&GuardedString::new("s3cret")),
                false,
                None,
                &provision,
            )
            .unwrap();

        assert_eq!(outbound.external_key, "jdoe");
        assert_eq!(outbound.attributes.get_string("uid"), Some("jdoe"));
        assert_eq!(outbound.attributes.get_string(NAME), Some("jdoe"));
        assert!(!outbound.attributes.has(PASSWORD));
        assert!(!outbound.attributes.has(ENABLE));
        assert!(outbound.is_complete());
    }

    #[test]
    fn test_build_outbound_with_password_and_enable() {
        let provision = provision(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("password", "userPassword").as_password(),
        ]);
        let user = AnyRecord::user("u1", "jdoe");

        let outbound = manager()
            .build_outbound_attributes(
                &user,
                Some(&GuardedString::new("s3cret")),
                true,
                Some(false),
                &provision,
            )
            .unwrap();

        let password = outbound.attributes.get_single(PASSWORD).unwrap();
        assert!(password.is_guarded());
        assert!(!outbound.attributes.has("userPassword"));
        assert_eq!(
            outbound.attributes.get_single(ENABLE),
            Some(&AttributeValue::Boolean(false))
        );
    }

    #[test]
    fn test_build_outbound_runs_pipeline_and_reports_mandatory() {
        let provision = provision(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("mail", "mail")
                .with_transform(Transform::Trim)
                .with_transform(Transform::Lowercase),
            MappingItem::new("surname", "sn").with_mandatory_condition("true"),
            MappingItem::new("nickname", "nick").with_purpose(MappingPurpose::Pull),
        ]);
        let user = AnyRecord::user("u1", "jdoe")
            .with_plain_attr("mail", vec!["  JDoe@Example.COM ".into()])
            .with_plain_attr("nickname", vec!["jd".into()]);

        let outbound = manager()
            .build_outbound_attributes(&user, None, true, None, &provision)
            .unwrap();

        assert_eq!(outbound.attributes.get_string("mail"), Some("jdoe@example.com"));
        assert!(!outbound.attributes.has("nick"));
        assert!(!outbound.attributes.has("sn"));
        assert_eq!(outbound.mandatory_missing, vec!["sn".to_string()]);
        assert!(!outbound.is_complete());
    }

    #[test]
    fn test_build_linked_account_attributes() {
        let provision = provision(vec![
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("title", "title"),
        ]);
        let user = AnyRecord::user("u1", "jdoe").with_plain_attr("title", vec!["Engineer".into()]);
        let account = LinkedAccount::new("la1", "resource-ldap", "jdoe-admin")
            .with_suspended(true)
            .with_plain_attr("title", vec!["Administrator".into()]);

        let outbound = manager()
            .build_linked_account_attributes(&user, &account, None, false, &provision)
            .unwrap();

        assert_eq!(outbound.external_key, "jdoe-admin");
        assert_eq!(outbound.attributes.get_string("uid"), Some("jdoe-admin"));
        assert_eq!(outbound.attributes.get_string(NAME), Some("jdoe-admin"));
        assert_eq!(outbound.attributes.get_string("title"), Some("Administrator"));
        assert_eq!(
            outbound.attributes.get_single(ENABLE),
            Some(&AttributeValue::Boolean(false))
        );
    }

    #[test]
    fn test_apply_inbound_attribute() {
        let provision = provision(vec![
            MappingItem::new("key", "entryUUID"),
            MappingItem::new("username", "uid").as_conn_object_key(),
            MappingItem::new("mail", "mail"),
            MappingItem::new("fullname", "cn"),
            MappingItem::new("photo", "jpegPhoto"),
            MappingItem::new("title", "title").with_purpose(MappingPurpose::Propagation),
            MappingItem::new("password", "__PASSWORD__").as_password(),
        ]);
        let manager = manager();
        let mut user = AnyRecord::user("u1", "jdoe").with_plain_attr("mail", vec!["old@x".into()]);

        let apply = |manager: &MappingManager, user: &mut AnyRecord, ext: &str, attr: Attribute| {
            manager
                .apply_inbound_attribute(&item(&provision, ext), &attr, user)
                .unwrap()
        };

        assert!(!apply(&manager, &mut user, "entryUUID", Attribute::single("entryUUID", "zzz")));
        assert_eq!(user.key, "u1");

        assert!(apply(&manager, &mut user, "uid", Attribute::single("uid", "john")));
        assert_eq!(user.username(), Some("john"));

        assert!(apply(
            &manager,
            &mut user,
            "mail",
            Attribute::new("mail", vec!["a@x".into(), "b@x".into()])
        ));
        assert_eq!(user.plain_attrs["mail"].len(), 2);

        assert!(!apply(&manager, &mut user, "cn", Attribute::single("cn", "John")));
        assert!(user.derived_attrs.is_empty());

        assert!(apply(&manager, &mut user, "jpegPhoto", Attribute::single("jpegPhoto", vec![1u8, 2])));
        assert!(user.virtual_attrs.contains_key("photo"));

        assert!(!apply(&manager, &mut user, "title", Attribute::single("title", "CEO")));
        assert!(!user.plain_attrs.contains_key("title"));

        assert!(apply(
            &manager,
            &mut user,
            "__PASSWORD__",
            Attribute::single(PASSWORD, GuardedString::new("pulled"))
        ));
        assert_eq!(user.password.as_ref().unwrap().expose(), "pulled");
        assert!(!user.plain_attrs.contains_key("password"));
    }
}
