#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tm_runtime::{DecisionAction, DiagnosticLedger, IssueKind, RuntimePolicy};
use tm_types::{FieldPath, is_blank, json_type_name, render_text, strict_eq};

/// `(record, filter value) -> keep`.
pub type FilterPredicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("no filter configuration found for key: {key}")]
    MissingSpec { key: String },
    #[error("filter '{key}' has unsupported type: {kind}")]
    UnsupportedType { key: String, kind: String },
    #[error("custom filter '{key}' has no predicate")]
    MissingPredicate { key: String },
    #[error("filter '{key}' of type {kind} requires a field path")]
    MissingField { key: String, kind: FilterKind },
    #[error("filter configuration must be a JSON object, found {found}")]
    ConfigNotObject { found: &'static str },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Exact,
    Contains,
    ArrayContains,
    Custom,
}

impl FilterKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Contains => "contains",
            Self::ArrayContains => "array_contains",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "contains" => Ok(Self::Contains),
            "array_contains" => Ok(Self::ArrayContains),
            "custom" => Ok(Self::Custom),
            other => Err(other.to_owned()),
        }
    }
}

/// How one filter key is evaluated against records.
#[derive(Clone)]
pub enum FilterRule {
    Exact { field: FieldPath },
    Contains { field: FieldPath },
    ArrayContains { field: FieldPath },
    Custom { predicate: Option<FilterPredicate> },
    /// Declared with a type this engine does not know. Evaluates as a no-op.
    Unsupported { kind: String },
}

impl FilterRule {
    #[must_use]
    pub fn exact(field: impl Into<FieldPath>) -> Self {
        Self::Exact {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn contains(field: impl Into<FieldPath>) -> Self {
        Self::Contains {
            field: field.into(),
        }
    }

    #[must_use]
    pub fn array_contains(field: impl Into<FieldPath>) -> Self {
        Self::ArrayContains {
            field: field.into(),
        }
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            predicate: Some(Arc::new(predicate)),
        }
    }

    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Exact { .. } => FilterKind::Exact.as_str(),
            Self::Contains { .. } => FilterKind::Contains.as_str(),
            Self::ArrayContains { .. } => FilterKind::ArrayContains.as_str(),
            Self::Custom { .. } => FilterKind::Custom.as_str(),
            Self::Unsupported { kind } => kind,
        }
    }

    #[must_use]
    pub fn field(&self) -> Option<&FieldPath> {
        match self {
            Self::Exact { field } | Self::Contains { field } | Self::ArrayContains { field } => {
                Some(field)
            }
            Self::Custom { .. } | Self::Unsupported { .. } => None,
        }
    }

    fn from_raw(key: &str, raw: RawFilterSpec) -> Result<Self, FilterError> {
        let kind = match raw.kind.parse::<FilterKind>() {
            Ok(kind) => kind,
            Err(kind) => return Ok(Self::Unsupported { kind }),
        };
        if kind == FilterKind::Custom {
            return Ok(Self::Custom { predicate: None });
        }
        let field = raw
            .field
            .filter(|field| !field.is_empty())
            .ok_or_else(|| FilterError::MissingField {
                key: key.to_owned(),
                kind,
            })?;
        Ok(match kind {
            FilterKind::Exact => Self::Exact { field },
            FilterKind::Contains => Self::Contains { field },
            FilterKind::ArrayContains => Self::ArrayContains { field },
            FilterKind::Custom => Self::Custom { predicate: None },
        })
    }
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { field } => f.debug_struct("Exact").field("field", field).finish(),
            Self::Contains { field } => f.debug_struct("Contains").field("field", field).finish(),
            Self::ArrayContains { field } => f
                .debug_struct("ArrayContains")
                .field("field", field)
                .finish(),
            Self::Custom { predicate } => f
                .debug_struct("Custom")
                .field("predicate", &predicate.as_ref().map(|_| "<fn>"))
                .finish(),
            Self::Unsupported { kind } => {
                f.debug_struct("Unsupported").field("kind", kind).finish()
            }
        }
    }
}

/// Declarative form of a filter spec as stored in UI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFilterSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldPath>,
}

/// Filter key -> rule.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    rules: BTreeMap<String, FilterRule>,
}

impl FilterConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, rule: FilterRule) -> Self {
        self.insert(key, rule);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, rule: FilterRule) -> Option<FilterRule> {
        self.rules.insert(key.into(), rule)
    }

    /// Give a declared custom filter its predicate. Returns `false` when
    /// `key` is not configured as a custom filter.
    pub fn attach_predicate<F>(&mut self, key: &str, predicate: F) -> bool
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        match self.rules.get_mut(key) {
            Some(FilterRule::Custom { predicate: slot }) => {
                *slot = Some(Arc::new(predicate));
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FilterRule> {
        self.rules.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse `{ "<key>": { "type": "...", "field": "..." }, ... }`.
    ///
    /// Unknown types are kept as [`FilterRule::Unsupported`] so they surface
    /// as diagnostics at evaluation time; a missing `field` on a field-based
    /// type is a hard configuration error.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let Value::Object(entries) = value else {
            return Err(FilterError::ConfigNotObject {
                found: json_type_name(value),
            });
        };
        let mut config = Self::new();
        for (key, raw) in entries {
            let raw: RawFilterSpec = serde_json::from_value(raw.clone())?;
            config.insert(key.clone(), FilterRule::from_raw(key, raw)?);
        }
        Ok(config)
    }

    pub fn from_json_str(input: &str) -> Result<Self, FilterError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_json(&value)
    }
}

/// Currently chosen filter values, in the order they were set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct FilterSet {
    entries: Vec<(String, Value)>,
}

impl FilterSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key`, keeping its original position when it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Clear a selection back to "all".
    pub fn clear(&mut self, key: &str) {
        self.entries.retain(|(existing, _)| existing != key);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Entries with a non-blank value, in encounter order.
    pub fn active(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(_, value)| !is_blank(value))
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.active().next().is_none()
    }
}

impl From<Map<String, Value>> for FilterSet {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl From<FilterSet> for Map<String, Value> {
    fn from(set: FilterSet) -> Self {
        set.entries.into_iter().collect()
    }
}

/// Apply every active filter in `filters`, fail-soft.
///
/// Misconfiguration is logged and the offending filter is skipped; the
/// remaining filters still apply. An absent payload reaches this as an empty
/// slice via [`tm_types::as_records`] and filters to an empty result.
#[must_use]
pub fn apply_filters(records: &[Value], filters: &FilterSet, config: &FilterConfig) -> Vec<Value> {
    let mut ledger = DiagnosticLedger::new();
    apply_filters_with_policy(
        records,
        filters,
        config,
        &RuntimePolicy::lenient(),
        &mut ledger,
    )
    .unwrap_or_else(|_| records.to_vec())
}

/// Apply every active filter in `filters` as a conjunction.
///
/// Every misconfiguration is recorded in `ledger`; under a strict policy the
/// first one aborts with an error.
pub fn apply_filters_with_policy(
    records: &[Value],
    filters: &FilterSet,
    config: &FilterConfig,
    policy: &RuntimePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<Vec<Value>, FilterError> {
    let mut working: Vec<&Value> = records.iter().collect();

    for (key, value) in filters.active() {
        let Some(rule) = config.get(key) else {
            let action = policy.decide_misconfiguration(
                IssueKind::MissingFilterSpec,
                key,
                format!("no filter configuration found for key: {key}"),
                ledger,
            );
            if action == DecisionAction::Reject {
                return Err(FilterError::MissingSpec {
                    key: key.to_owned(),
                });
            }
            continue;
        };

        match rule {
            FilterRule::Exact { field } => {
                working.retain(|record| {
                    field
                        .resolve(record)
                        .is_some_and(|found| strict_eq(found, value))
                });
            }
            FilterRule::Contains { field } => {
                let needle = render_text(value).to_lowercase();
                working.retain(|record| match field.resolve(record) {
                    Some(Value::String(haystack)) => haystack.to_lowercase().contains(&needle),
                    _ => false,
                });
            }
            FilterRule::ArrayContains { field } => {
                working.retain(|record| match field.resolve(record) {
                    Some(Value::Array(items)) => items.iter().any(|item| strict_eq(item, value)),
                    _ => false,
                });
            }
            FilterRule::Custom {
                predicate: Some(predicate),
            } => {
                working.retain(|record| predicate(*record, value));
            }
            FilterRule::Custom { predicate: None } => {
                let action = policy.decide_misconfiguration(
                    IssueKind::MissingPredicate,
                    key,
                    format!("custom filter '{key}' has no predicate"),
                    ledger,
                );
                if action == DecisionAction::Reject {
                    return Err(FilterError::MissingPredicate {
                        key: key.to_owned(),
                    });
                }
            }
            FilterRule::Unsupported { kind } => {
                let action = policy.decide_misconfiguration(
                    IssueKind::UnsupportedFilterType,
                    key,
                    format!("unknown filter type: {kind}"),
                    ledger,
                );
                if action == DecisionAction::Reject {
                    return Err(FilterError::UnsupportedType {
                        key: key.to_owned(),
                        kind: kind.clone(),
                    });
                }
            }
        }
    }

    Ok(working.into_iter().cloned().collect())
}
