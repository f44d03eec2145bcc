//! Entitlement registry.
//!
//! Process-wide set of known permission strings. Created once by the
//! composition root and shared through an `Arc`; any-type lifecycle events
//! add and remove the per-type entitlements while readers keep querying.

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Per-any-type actions that have an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnyEntitlement {
    Search,
    Create,
    Read,
    Update,
    Delete,
}

impl AnyEntitlement {
    pub fn all() -> &'static [AnyEntitlement] {
        &[
            AnyEntitlement::Search,
            AnyEntitlement::Create,
            AnyEntitlement::Read,
            AnyEntitlement::Update,
            AnyEntitlement::Delete,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnyEntitlement::Search => "SEARCH",
            AnyEntitlement::Create => "CREATE",
            AnyEntitlement::Read => "READ",
            AnyEntitlement::Update => "UPDATE",
            AnyEntitlement::Delete => "DELETE",
        }
    }

    /// Entitlement string for an any-type, e.g. `PRINTER_CREATE`.
    pub fn for_any_type(&self, any_type: &str) -> String {
        format!("{}_{}", any_type.to_ascii_uppercase(), self.as_str())
    }
}

impl fmt::Display for AnyEntitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concurrent set of known entitlements.
#[derive(Debug, Default)]
pub struct EntitlementRegistry {
    values: DashSet<String>,
}

impl EntitlementRegistry {
    /// Create a registry seeded with static entitlements.
    pub fn new<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = DashSet::new();
        for value in initial {
            values.insert(value.into());
        }
        Self { values }
    }

    /// Add one entitlement. Returns whether it was new.
    pub fn add(&self, entitlement: impl Into<String>) -> bool {
        self.values.insert(entitlement.into())
    }

    /// Remove one entitlement. Returns whether it was present.
    pub fn remove(&self, entitlement: &str) -> bool {
        self.values.remove(entitlement).is_some()
    }

    /// Add the entitlements of a new any-type.
    pub fn add_for(&self, any_type: &str) {
        for action in AnyEntitlement::all() {
            self.values.insert(action.for_any_type(any_type));
        }
        debug!(any_type = %any_type, "Added any-type entitlements");
    }

    /// Remove the entitlements of a deleted any-type.
    pub fn remove_for(&self, any_type: &str) {
        for action in AnyEntitlement::all() {
            self.values.remove(&action.for_any_type(any_type));
        }
        debug!(any_type = %any_type, "Removed any-type entitlements");
    }

    pub fn contains(&self, entitlement: &str) -> bool {
        self.values.contains(entitlement)
    }

    /// Sorted snapshot of all entitlements.
    pub fn values(&self) -> Vec<String> {
        let mut values: Vec<String> = self.values.iter().map(|v| v.key().clone()).collect();
        values.sort();
        values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_seed_and_any_type_lifecycle() {
        let registry = EntitlementRegistry::new(["ANONYMOUS", "MUST_CHANGE_PASSWORD"]);
        assert_eq!(registry.len(), 2);

        registry.add_for("printer");
        assert!(registry.contains("PRINTER_CREATE"));
        assert!(registry.contains("PRINTER_SEARCH"));
        assert_eq!(registry.len(), 7);

        registry.remove_for("PRINTER");
        assert!(!registry.contains("PRINTER_READ"));
        assert_eq!(
            registry.values(),
            vec!["ANONYMOUS".to_string(), "MUST_CHANGE_PASSWORD".to_string()]
        );
    }

    #[test]
    fn test_add_remove_single() {
        let registry = EntitlementRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.add("AUDIT_LIST"));
        assert!(!registry.add("AUDIT_LIST"));
        assert!(registry.remove("AUDIT_LIST"));
        assert!(!registry.remove("AUDIT_LIST"));
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let registry = Arc::new(EntitlementRegistry::new(["ANONYMOUS"]));
        let mut tasks = tokio::task::JoinSet::new();

        for i in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.spawn(async move {
                let any_type = format!("TYPE{i}");
                registry.add_for(&any_type);
                tokio::task::yield_now().await;
                assert!(registry.contains("ANONYMOUS"));
                if i % 2 == 0 {
                    registry.remove_for(&any_type);
                }
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap();
        }

        assert_eq!(registry.len(), 1 + 4 * AnyEntitlement::all().len());
        assert!(registry.contains("TYPE1_DELETE"));
        assert!(!registry.contains("TYPE2_DELETE"));
    }
}
