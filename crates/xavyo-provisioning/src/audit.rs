//! Audit entries and sinks.
//!
//! An [`AuditEntry`] is an immutable record of who did what, with the
//! before/output/input payloads masked once at construction. Masking works
//! on an owned copy; the caller's values are never touched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::info;
use xavyo_connector::types::ParseEnumError;

/// Replacement for masked secrets.
pub const MASKED: &str = "<MASKED>";

const PASSWORD: &str = "password";
const SECURITY_ANSWERS: [&str; 2] = ["securityAnswer", "security_answer"];

/// Source of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Logic,
    Task,
    Report,
    Propagation,
    Pull,
    Push,
    Custom,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Logic => "LOGIC",
            AuditEventType::Task => "TASK",
            AuditEventType::Report => "REPORT",
            AuditEventType::Propagation => "PROPAGATION",
            AuditEventType::Pull => "PULL",
            AuditEventType::Push => "PUSH",
            AuditEventType::Custom => "CUSTOM",
        }
    }
}

impl FromStr for AuditEventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOGIC" => Ok(Self::Logic),
            "TASK" => Ok(Self::Task),
            "REPORT" => Ok(Self::Report),
            "PROPAGATION" => Ok(Self::Propagation),
            "PULL" => Ok(Self::Pull),
            "PUSH" => Ok(Self::Push),
            "CUSTOM" => Ok(Self::Custom),
            _ => Err(ParseEnumError::new("audit event type", s)),
        }
    }
}

/// Outcome of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failure => "FAILURE",
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            _ => Err(ParseEnumError::new("audit outcome", s)),
        }
    }
}

/// Identity of an audited event.
///
/// Renders as `[TYPE]:[category]:[subcategory]:[event]:[RESULT]`, with
/// empty brackets for absent parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditLoggerName {
    pub event_type: AuditEventType,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub event: Option<String>,
    pub result: AuditOutcome,
}

impl AuditLoggerName {
    pub fn new(event_type: AuditEventType, result: AuditOutcome) -> Self {
        Self {
            event_type,
            category: None,
            subcategory: None,
            event: None,
            result,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }
}

impl fmt::Display for AuditLoggerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_default();
        write!(
            f,
            "[{}]:[{}]:[{}]:[{}]:[{}]",
            self.event_type.as_str(),
            part(&self.category),
            part(&self.subcategory),
            part(&self.event),
            self.result.as_str()
        )
    }
}

/// Error parsing an [`AuditLoggerName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid audit logger name '{0}'")]
pub struct ParseLoggerNameError(String);

impl FromStr for AuditLoggerName {
    type Err = ParseLoggerNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseLoggerNameError(s.to_string());
        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;
        let parts: Vec<&str> = inner.split("]:[").collect();
        let [event_type, category, subcategory, event, result] = parts.as_slice() else {
            return Err(invalid());
        };
        let optional = |p: &str| (!p.is_empty()).then(|| p.to_string());
        Ok(Self {
            event_type: (*event_type).parse().map_err(|_| invalid())?,
            category: optional(*category),
            subcategory: optional(*subcategory),
            event: optional(*event),
            result: (*result).parse().map_err(|_| invalid())?,
        })
    }
}

/// Mask passwords and security answers in a copy of `value`.
///
/// Recognised shapes are objects with a top-level `username` (a user or a
/// create request) and objects whose `password` is an object with a
/// `value` (an update request). Arrays are masked element by element.
/// Other values are returned unchanged. Idempotent.
pub fn mask_sensitive(value: &Value) -> Value {
    let mut copy = value.clone();
    mask_in_place(&mut copy);
    copy
}

fn mask_in_place(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(mask_in_place),
        Value::Object(map) => {
            let is_record = map.contains_key("username")
                || map
                    .get(PASSWORD)
                    .is_some_and(|p| p.as_object().is_some_and(|o| o.contains_key("value")));
            if !is_record {
                return;
            }
            if let Some(password) = map.get_mut(PASSWORD) {
                match password {
                    Value::Object(patch) => {
                        if let Some(v) = patch.get_mut("value") {
                            mask_scalar(v);
                        }
                    }
                    other => mask_scalar(other),
                }
            }
            for name in SECURITY_ANSWERS {
                if let Some(answer) = map.get_mut(name) {
                    mask_scalar(answer);
                }
            }
        }
        _ => {}
    }
}

fn mask_scalar(value: &mut Value) {
    if !value.is_null() {
        *value = Value::String(MASKED.to_string());
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    who: String,
    logger: AuditLoggerName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    input: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    throwable: Option<String>,
    date: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry dated now.
    pub fn new(who: impl Into<String>, logger: AuditLoggerName) -> Self {
        Self {
            who: who.into(),
            logger,
            before: None,
            output: None,
            input: Vec::new(),
            throwable: None,
            date: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_before(mut self, before: &Value) -> Self {
        self.before = Some(mask_sensitive(before));
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: &Value) -> Self {
        self.output = Some(mask_sensitive(output));
        self
    }

    /// Append one input value; each is masked independently.
    #[must_use]
    pub fn with_input(mut self, input: &Value) -> Self {
        self.input.push(mask_sensitive(input));
        self
    }

    #[must_use]
    pub fn with_throwable(mut self, error: &dyn std::error::Error) -> Self {
        self.throwable = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn who(&self) -> &str {
        &self.who
    }

    pub fn logger(&self) -> &AuditLoggerName {
        &self.logger
    }

    pub fn before(&self) -> Option<&Value> {
        self.before.as_ref()
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn input(&self) -> &[Value] {
        &self.input
    }

    pub fn throwable(&self) -> Option<&str> {
        self.throwable.as_deref()
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

/// Receives audit entries for persistence.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry);
}

/// Writes audit entries to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) {
        let payload = serde_json::to_string(entry).unwrap_or_default();
        info!(
            target: "audit",
            logger = %entry.logger(),
            who = %entry.who(),
            entry = %payload,
            "Audit event"
        );
    }
}

/// Keeps audit entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: &AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}
