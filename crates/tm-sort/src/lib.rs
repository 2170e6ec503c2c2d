#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tm_runtime::{DecisionAction, DiagnosticLedger, IssueKind, RuntimePolicy};
use tm_types::{FieldPath, Priority, StatusScale, as_label, locale_cmp, parse_timestamp_ms};

/// Three-way record comparator supplied by a caller.
pub type Comparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SortError {
    #[error("unknown sort key: {key}")]
    UnknownSortKey { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    fn apply(self, order: Ordering) -> Ordering {
        match self {
            Self::Asc => order,
            Self::Desc => order.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Created,
    Updated,
    Name,
    Title,
    Priority,
    Status,
}

impl SortField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Name => "name",
            Self::Title => "title",
            Self::Priority => "priority",
            Self::Status => "status",
        }
    }

    /// Record field the built-in comparator reads.
    #[must_use]
    pub fn record_field(self) -> &'static str {
        match self {
            Self::Created => "created_at",
            Self::Updated => "updated_at",
            Self::Name => "name",
            Self::Title => "title",
            Self::Priority => "priority",
            Self::Status => "status",
        }
    }

    fn from_str_opt(input: &str) -> Option<Self> {
        match input {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "name" => Some(Self::Name),
            "title" => Some(Self::Title),
            "priority" => Some(Self::Priority),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// One of the built-in sort orders, e.g. `created_desc`. The wire string is
/// persisted in UI state, so it must round-trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortKey {
    pub const CREATED_DESC: Self = Self::new(SortField::Created, SortDirection::Desc);
    pub const CREATED_ASC: Self = Self::new(SortField::Created, SortDirection::Asc);
    pub const UPDATED_DESC: Self = Self::new(SortField::Updated, SortDirection::Desc);
    pub const UPDATED_ASC: Self = Self::new(SortField::Updated, SortDirection::Asc);
    pub const NAME_ASC: Self = Self::new(SortField::Name, SortDirection::Asc);
    pub const NAME_DESC: Self = Self::new(SortField::Name, SortDirection::Desc);
    pub const TITLE_ASC: Self = Self::new(SortField::Title, SortDirection::Asc);
    pub const TITLE_DESC: Self = Self::new(SortField::Title, SortDirection::Desc);
    pub const PRIORITY_DESC: Self = Self::new(SortField::Priority, SortDirection::Desc);
    pub const PRIORITY_ASC: Self = Self::new(SortField::Priority, SortDirection::Asc);
    pub const STATUS_DESC: Self = Self::new(SortField::Status, SortDirection::Desc);
    pub const STATUS_ASC: Self = Self::new(SortField::Status, SortDirection::Asc);

    pub const ALL: [Self; 12] = [
        Self::CREATED_DESC,
        Self::CREATED_ASC,
        Self::UPDATED_DESC,
        Self::UPDATED_ASC,
        Self::NAME_ASC,
        Self::NAME_DESC,
        Self::TITLE_ASC,
        Self::TITLE_DESC,
        Self::PRIORITY_DESC,
        Self::PRIORITY_ASC,
        Self::STATUS_DESC,
        Self::STATUS_ASC,
    ];

    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Human-facing label shown in sort dropdowns.
    #[must_use]
    pub fn label(self) -> &'static str {
        use SortDirection::{Asc, Desc};
        match (self.field, self.direction) {
            (SortField::Created, Desc) => "Created Date (Newest First)",
            (SortField::Created, Asc) => "Created Date (Oldest First)",
            (SortField::Updated, Desc) => "Updated Date (Newest First)",
            (SortField::Updated, Asc) => "Updated Date (Oldest First)",
            (SortField::Name, Asc) => "Name (A-Z)",
            (SortField::Name, Desc) => "Name (Z-A)",
            (SortField::Title, Asc) => "Title (A-Z)",
            (SortField::Title, Desc) => "Title (Z-A)",
            (SortField::Priority, Desc) => "Priority (Critical to Low)",
            (SortField::Priority, Asc) => "Priority (Low to Critical)",
            (SortField::Status, Desc) => "Status (High to Low)",
            (SortField::Status, Asc) => "Status (Low to High)",
        }
    }

    /// Compare two records under this key.
    #[must_use]
    pub fn compare(self, scale: StatusScale, left: &Value, right: &Value) -> Ordering {
        let path = FieldPath::new(self.field.record_field());
        let left = path.resolve(left);
        let right = path.resolve(right);
        match self.field {
            SortField::Created | SortField::Updated => compare_timestamps_missing_last(
                left.and_then(parse_timestamp_ms),
                right.and_then(parse_timestamp_ms),
                self.direction,
            ),
            SortField::Name | SortField::Title => self.direction.apply(locale_cmp(
                as_label(left).unwrap_or_default(),
                as_label(right).unwrap_or_default(),
            )),
            SortField::Priority => self.direction.apply(
                Priority::rank_of(as_label(left)).cmp(&Priority::rank_of(as_label(right))),
            ),
            SortField::Status => self.direction.apply(
                scale
                    .rank_of(as_label(left))
                    .cmp(&scale.rank_of(as_label(right))),
            ),
        }
    }
}

fn compare_timestamps_missing_last(
    left: Option<i64>,
    right: Option<i64>,
    direction: SortDirection,
) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(lhs), Some(rhs)) => direction.apply(lhs.cmp(&rhs)),
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.field.as_str(), self.direction.as_str())
    }
}

impl FromStr for SortKey {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SortError::UnknownSortKey { key: s.to_owned() };
        let (field, direction) = s.rsplit_once('_').ok_or_else(unknown)?;
        let field = SortField::from_str_opt(field).ok_or_else(unknown)?;
        let direction = match direction {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => return Err(unknown()),
        };
        Ok(Self::new(field, direction))
    }
}

impl TryFrom<String> for SortKey {
    type Error = SortError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SortKey> for String {
    fn from(value: SortKey) -> Self {
        value.to_string()
    }
}

/// Per-list sorting configuration: which status rank table applies and any
/// caller-supplied comparators, keyed by sort-key string.
#[derive(Clone)]
pub struct SortOptions {
    pub status_scale: StatusScale,
    custom: BTreeMap<String, Comparator>,
}

impl SortOptions {
    #[must_use]
    pub fn new(status_scale: StatusScale) -> Self {
        Self {
            status_scale,
            custom: BTreeMap::new(),
        }
    }

    /// Register a comparator. It takes precedence over any built-in key of
    /// the same name.
    #[must_use]
    pub fn with_comparator<F>(mut self, key: impl Into<String>, comparator: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        self.custom.insert(key.into(), Arc::new(comparator));
        self
    }

    #[must_use]
    pub fn comparator(&self, key: &str) -> Option<&Comparator> {
        self.custom.get(key)
    }
}

impl fmt::Debug for SortOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortOptions")
            .field("status_scale", &self.status_scale)
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Stable sort by a built-in key. The input is left untouched.
#[must_use]
pub fn sort_records(records: &[Value], key: SortKey, scale: StatusScale) -> Vec<Value> {
    let mut order: Vec<&Value> = records.iter().collect();
    order.sort_by(|left, right| key.compare(scale, left, right));
    order.into_iter().cloned().collect()
}

/// Sort by a sort-key string, fail-soft: an unrecognised key yields the
/// records in their original order. An absent payload reaches this as an
/// empty slice via [`tm_types::as_records`] and sorts to an empty result.
#[must_use]
pub fn apply_sorting(records: &[Value], sort_key: &str, options: &SortOptions) -> Vec<Value> {
    let mut ledger = DiagnosticLedger::new();
    apply_sorting_with_policy(
        records,
        sort_key,
        options,
        &RuntimePolicy::lenient(),
        &mut ledger,
    )
    .unwrap_or_else(|_| records.to_vec())
}

/// Resolution order: custom comparator registered under `sort_key`, then
/// the built-in enumeration, then identity. An empty key means "unsorted".
pub fn apply_sorting_with_policy(
    records: &[Value],
    sort_key: &str,
    options: &SortOptions,
    policy: &RuntimePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<Vec<Value>, SortError> {
    if let Some(comparator) = options.comparator(sort_key) {
        let mut order: Vec<&Value> = records.iter().collect();
        order.sort_by(|left, right| comparator(*left, *right));
        return Ok(order.into_iter().cloned().collect());
    }

    if sort_key.is_empty() {
        return Ok(records.to_vec());
    }

    match sort_key.parse::<SortKey>() {
        Ok(key) => Ok(sort_records(records, key, options.status_scale)),
        Err(err) => {
            let action = policy.decide_misconfiguration(
                IssueKind::UnknownSortKey,
                sort_key,
                err.to_string(),
                ledger,
            );
            if action == DecisionAction::Reject {
                return Err(err);
            }
            Ok(records.to_vec())
        }
    }
}
