//! Attribute Transformation Engine.
//!
//! Runs the ordered transformer pipeline of a mapping item. Built-in
//! [`Transform`] stages rewrite text values; `Custom` stages delegate to an
//! [`ItemTransformer`] looked up in a [`TransformerRegistry`]. Each stage
//! receives the previous stage's output.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConnectorError, ConnectorResult};
use crate::mapping::{MappingItem, Transform};
use crate::operation::AttributeValue;

/// Custom per-item value transformer.
///
/// Both hooks default to the identity.
pub trait ItemTransformer: Send + Sync {
    /// Transform values about to be sent to a resource.
    fn before_propagation(
        &self,
        item: &MappingItem,
        values: Vec<AttributeValue>,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        let _ = item;
        Ok(values)
    }

    /// Transform values read from a resource before they are applied.
    fn before_pull(
        &self,
        item: &MappingItem,
        values: Vec<AttributeValue>,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        let _ = item;
        Ok(values)
    }
}

/// Named custom transformers, shared across threads.
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: DashMap<String, Arc<dyn ItemTransformer>>,
}

impl TransformerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer, replacing any previous one with that name.
    pub fn register(&self, name: impl Into<String>, transformer: Arc<dyn ItemTransformer>) {
        let name = name.into();
        debug!(transformer = %name, "Registering item transformer");
        self.transformers.insert(name, transformer);
    }

    /// Remove a transformer.
    pub fn unregister(&self, name: &str) -> bool {
        self.transformers.remove(name).is_some()
    }

    /// Look up a transformer.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ItemTransformer>> {
        self.transformers.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Number of registered transformers.
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    /// Whether no transformer is registered.
    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.transformers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("TransformerRegistry")
            .field("transformers", &names)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Propagation,
    Pull,
}

/// Transformation engine for mapping item pipelines.
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    registry: Arc<TransformerRegistry>,
}

impl TransformEngine {
    /// Create an engine with an empty custom transformer registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine resolving custom stages through `registry`.
    #[must_use]
    pub fn with_registry(registry: Arc<TransformerRegistry>) -> Self {
        Self { registry }
    }

    /// The custom transformer registry.
    pub fn registry(&self) -> &Arc<TransformerRegistry> {
        &self.registry
    }

    /// Run the item's pipeline on values about to be propagated.
    pub fn before_propagation(
        &self,
        item: &MappingItem,
        values: Vec<AttributeValue>,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        self.run(item, values, Direction::Propagation)
    }

    /// Run the item's pipeline on values pulled from a resource.
    pub fn before_pull(
        &self,
        item: &MappingItem,
        values: Vec<AttributeValue>,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        self.run(item, values, Direction::Pull)
    }

    fn run(
        &self,
        item: &MappingItem,
        mut values: Vec<AttributeValue>,
        direction: Direction,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        for transform in &item.transformers {
            values = match transform {
                Transform::Custom { name } => {
                    let transformer = self.registry.get(name).ok_or_else(|| {
                        ConnectorError::invalid_mapping(format!(
                            "unknown transformer '{name}' on item '{}'",
                            item.ext_attr_name
                        ))
                    })?;
                    match direction {
                        Direction::Propagation => transformer.before_propagation(item, values)?,
                        Direction::Pull => transformer.before_pull(item, values)?,
                    }
                }
                Transform::Default { value } if values.is_empty() => {
                    vec![AttributeValue::String(value.clone())]
                }
                builtin => values
                    .into_iter()
                    .map(|v| match v {
                        AttributeValue::String(s) => self
                            .apply_transform(builtin, &s)
                            .map(AttributeValue::String)
                            .map_err(|message| ConnectorError::TransformationFailed {
                                attribute: item.ext_attr_name.clone(),
                                message,
                            }),
                        other => Ok(other),
                    })
                    .collect::<ConnectorResult<Vec<_>>>()?,
            };
        }
        Ok(values)
    }

    /// Apply a built-in transformation to a text value.
    pub fn apply_transform(&self, transform: &Transform, value: &str) -> Result<String, String> {
        match transform {
            Transform::Lowercase => Ok(value.to_lowercase()),
            Transform::Uppercase => Ok(value.to_uppercase()),
            Transform::Trim => Ok(value.trim().to_string()),
            Transform::Replace { from, to } => Ok(value.replace(from, to)),
            Transform::Substring { start, end } => {
                let chars: Vec<char> = value.chars().collect();
                let start = (*start).min(chars.len());
                let end = end.map_or(chars.len(), |e| e.min(chars.len())).max(start);
                Ok(chars[start..end].iter().collect())
            }
            Transform::Regex { pattern, group } => {
                let re = Regex::new(pattern).map_err(|e| format!("Invalid regex: {e}"))?;
                Ok(re
                    .captures(value)
                    .and_then(|caps| caps.get(*group))
                    .map_or(String::new(), |m| m.as_str().to_string()))
            }
            Transform::Default { value: default } => {
                if value.is_empty() {
                    Ok(default.clone())
                } else {
                    Ok(value.to_string())
                }
            }
            Transform::Prefix { value: prefix } => Ok(format!("{prefix}{value}")),
            Transform::Suffix { value: suffix } => Ok(format!("{value}{suffix}")),
            Transform::Custom { name } => Err(format!(
                "custom transformer '{name}' cannot be applied to a single value"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::GuardedString;

    fn strings(values: &[AttributeValue]) -> Vec<&str> {
        values.iter().filter_map(AttributeValue::as_str).collect()
    }

    #[test]
    fn test_transform_lowercase() {
        let engine = TransformEngine::new();
        let result = engine
            .apply_transform(&Transform::Lowercase, "HELLO WORLD")
            .unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_transform_substring() {
        let engine = TransformEngine::new();
        let result = engine
            .apply_transform(
                &Transform::Substring {
                    start: 0,
                    end: Some(5),
                },
                "hello world",
            )
            .unwrap();
        assert_eq!(result, "hello");

        let result = engine
            .apply_transform(&Transform::Substring { start: 6, end: None }, "hello world")
            .unwrap();
        assert_eq!(result, "world");
    }

    #[test]
    fn test_transform_regex() {
        let engine = TransformEngine::new();
        let result = engine
            .apply_transform(
                &Transform::Regex {
                    pattern: r"@(.+)$".to_string(),
                    group: 1,
                },
                "john@example.com",
            )
            .unwrap();
        assert_eq!(result, "example.com");

        assert!(engine
            .apply_transform(
                &Transform::Regex {
                    pattern: "(".to_string(),
                    group: 0
                },
                "x"
            )
            .is_err());
    }

    #[test]
    fn test_pipeline_runs_in_order() {
        let engine = TransformEngine::new();
        let item = MappingItem::new("username", "uid")
            .with_transform(Transform::Trim)
            .with_transform(Transform::Uppercase)
            .with_transform(Transform::Prefix {
                value: "u-".to_string(),
            });

        let out = engine
            .before_propagation(&item, vec!["  jdoe ".into()])
            .unwrap();
        assert_eq!(strings(&out), vec!["u-JDOE"]);
    }

    #[test]
    fn test_pipeline_default_on_empty_values() {
        let engine = TransformEngine::new();
        let item = MappingItem::new("title", "title").with_transform(Transform::Default {
            value: "n/a".to_string(),
        });
        let out = engine.before_propagation(&item, vec![]).unwrap();
        assert_eq!(strings(&out), vec!["n/a"]);
    }

    #[test]
    fn test_pipeline_leaves_guarded_values_untouched() {
        let engine = TransformEngine::new();
        let item = MappingItem::new("password", "__PASSWORD__").with_transform(Transform::Uppercase);
        let out = engine
            .before_propagation(&item, vec![GuardedString::new("secret").into()])
            .unwrap();
        match &out[0] {
            AttributeValue::GuardedString(g) => assert_eq!(g.expose(), "secret"),
            other => panic!("unexpected value {other:?}"),
        }
    }

    struct Reverse;

    impl ItemTransformer for Reverse {
        fn before_propagation(
            &self,
            _item: &MappingItem,
            values: Vec<AttributeValue>,
        ) -> ConnectorResult<Vec<AttributeValue>> {
            Ok(values.into_iter().rev().collect())
        }
    }

    #[test]
    fn test_custom_transformer_hooks() {
        let registry = Arc::new(TransformerRegistry::new());
        registry.register("reverse", Arc::new(Reverse));
        let engine = TransformEngine::with_registry(registry);

        let item = MappingItem::new("aliases", "mailAlias").with_transform(Transform::Custom {
            name: "reverse".to_string(),
        });
        let values = vec!["a".into(), "b".into()];

        let out = engine.before_propagation(&item, values.clone()).unwrap();
        assert_eq!(strings(&out), vec!["b", "a"]);

        // before_pull falls back to the identity
        let out = engine.before_pull(&item, values).unwrap();
        assert_eq!(strings(&out), vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_custom_transformer_is_configuration_error() {
        let engine = TransformEngine::new();
        let item = MappingItem::new("username", "uid").with_transform(Transform::Custom {
            name: "missing".to_string(),
        });
        let err = engine
            .before_propagation(&item, vec!["x".into()])
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_registry_unregister() {
        let registry = TransformerRegistry::new();
        registry.register("reverse", Arc::new(Reverse));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("reverse"));
        assert!(registry.is_empty());
    }
}
