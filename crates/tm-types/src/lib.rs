#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label {label:?} is not part of the {table} rank table")]
    UnknownLabel { table: &'static str, label: String },
}

// ── Field paths ────────────────────────────────────────────────────────

/// A dot-delimited path into a record, e.g. `test_suite.project.name`.
///
/// Resolution never fails: a missing record, an empty path or a missing
/// intermediate segment all resolve to `None`, the "undefined" marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.').map(str::to_owned).collect()
        };
        Self { raw, segments }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        if self.segments.is_empty() {
            return None;
        }
        let mut current = record;
        for segment in &self.segments {
            current = step_into(current, segment)?;
        }
        Some(current)
    }
}

fn step_into<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<FieldPath> for String {
    fn from(value: FieldPath) -> Self {
        value.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve `path` against an optional record.
#[must_use]
pub fn extract<'a>(record: Option<&'a Value>, path: &FieldPath) -> Option<&'a Value> {
    record.and_then(|record| path.resolve(record))
}

/// Convenience wrapper that parses `path` on every call.
#[must_use]
pub fn extract_str<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    FieldPath::new(path).resolve(record)
}

// ── Missingness and text rendering ─────────────────────────────────────

#[must_use]
pub fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// `null` and the empty string carry no selection.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Presence test used by flag-style filters: absent, `null`, `false`, `0`
/// and `""` all count as unset.
#[must_use]
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(v)) => *v,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Text form of a value: strings verbatim, scalars via their JSON text,
/// `null` as the empty string, containers as compact JSON.
#[must_use]
pub fn render_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Records held by a payload; anything other than an array is treated as
/// an empty collection.
#[must_use]
pub fn as_records(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Strict equality without coercion between types. Numbers compare by
/// value so `1` equals `1.0`.
#[must_use]
pub fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => left == right,
    }
}

#[must_use]
pub fn as_label(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

// ── Rank tables ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    /// Rank of an arbitrary label; unknown or absent labels rank 0.
    #[must_use]
    pub fn rank_of(label: Option<&str>) -> u8 {
        label.and_then(Self::from_label).map_or(0, Self::rank)
    }
}

impl FromStr for Priority {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| LabelError::UnknownLabel {
            table: "priority",
            label: s.to_owned(),
        })
    }
}

/// Lifecycle status of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl RunStatus {
    pub const ALL: [Self; 4] = [
        Self::NotStarted,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Completed => 4,
            Self::InProgress => 3,
            Self::NotStarted => 2,
            Self::Cancelled => 1,
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    #[must_use]
    pub fn rank_of(label: Option<&str>) -> u8 {
        label.and_then(Self::from_label).map_or(0, Self::rank)
    }
}

impl FromStr for RunStatus {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| LabelError::UnknownLabel {
            table: "run status",
            label: s.to_owned(),
        })
    }
}

/// Outcome of a single test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pass,
    Fail,
    Blocked,
    Skip,
    #[serde(rename = "Not Executed")]
    NotExecuted,
}

impl ExecutionStatus {
    pub const ALL: [Self; 5] = [
        Self::Pass,
        Self::Fail,
        Self::Blocked,
        Self::Skip,
        Self::NotExecuted,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Blocked => "Blocked",
            Self::Skip => "Skip",
            Self::NotExecuted => "Not Executed",
        }
    }

    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Pass => 4,
            Self::Fail => 3,
            Self::Blocked => 2,
            Self::Skip => 1,
            Self::NotExecuted => 0,
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }

    #[must_use]
    pub fn rank_of(label: Option<&str>) -> u8 {
        label.and_then(Self::from_label).map_or(0, Self::rank)
    }

    /// Case-insensitive bucketing used by the aggregator. Only the four
    /// executed outcomes are recognised; everything else is `NotExecuted`.
    #[must_use]
    pub fn classify(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return Self::NotExecuted;
        };
        match label.to_lowercase().as_str() {
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "blocked" => Self::Blocked,
            "skip" => Self::Skip,
            _ => Self::NotExecuted,
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| LabelError::UnknownLabel {
            table: "execution status",
            label: s.to_owned(),
        })
    }
}

/// Selects which status rank table applies to a collection. Run lifecycle
/// ranks and execution outcome ranks must never be mixed in one ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusScale {
    Run,
    Execution,
}

impl StatusScale {
    #[must_use]
    pub fn rank_of(self, label: Option<&str>) -> u8 {
        match self {
            Self::Run => RunStatus::rank_of(label),
            Self::Execution => ExecutionStatus::rank_of(label),
        }
    }
}

// ── Timestamps ─────────────────────────────────────────────────────────

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a timestamp field into Unix milliseconds.
///
/// Numbers are taken as Unix milliseconds. Strings are tried as RFC 3339,
/// then as offset-less date-times and plain dates, both read as UTC.
#[must_use]
pub fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(input: &str) -> Option<i64> {
    if input.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.timestamp_millis());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(input, format) {
            return Some(parsed.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

// ── Collation ──────────────────────────────────────────────────────────

/// Accent- and case-insensitive sort key: NFD decomposition with
/// combining marks dropped, then lowercased.
fn primary_key(input: &str) -> impl Iterator<Item = char> + '_ {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
}

/// Locale-style string comparison in the manner of a root-locale collator.
///
/// Base letters decide first (`É` sorts with `E`), then accents (unaccented
/// before accented), then case (lowercase before uppercase at the first
/// difference), then raw code points.
#[must_use]
pub fn locale_cmp(left: &str, right: &str) -> Ordering {
    let primary = primary_key(left).cmp(primary_key(right));
    if primary != Ordering::Equal {
        return primary;
    }

    let secondary = left
        .nfd()
        .flat_map(char::to_lowercase)
        .cmp(right.nfd().flat_map(char::to_lowercase));
    if secondary != Ordering::Equal {
        return secondary;
    }

    for (l, r) in left.nfd().zip(right.nfd()) {
        if l == r {
            continue;
        }
        match (l.is_lowercase(), r.is_lowercase()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
    }
    left.cmp(right)
}

// ── JSON type names ────────────────────────────────────────────────────

#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use serde_json::{Value, json};

    use super::{
        ExecutionStatus, FieldPath, Priority, RunStatus, StatusScale, as_records, extract,
        extract_str, is_blank, is_missing, is_truthy, json_type_name, locale_cmp, parse_timestamp_ms, render_text,
        strict_eq,
    };

    #[test]
    fn truthiness_treats_empty_scalars_as_unset() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&Value::Null)));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(is_truthy(Some(&json!(12))));
        assert!(is_truthy(Some(&json!("2024-01-01T00:00:00Z"))));
        assert!(is_truthy(Some(&json!([]))));
    }

    #[test]
    fn nested_path_resolves_through_objects() {
        let record = json!({"test_suite": {"project": {"name": "Checkout"}}});
        assert_eq!(
            extract_str(&record, "test_suite.project.name"),
            Some(&json!("Checkout"))
        );
    }

    #[test]
    fn missing_intermediate_segment_is_undefined() {
        let record = json!({"test_suite": null});
        assert_eq!(extract_str(&record, "test_suite.project.name"), None);
        assert_eq!(extract_str(&record, "nope.deeper"), None);
    }

    #[test]
    fn explicit_null_leaf_is_present() {
        let record = json!({"key_id": null});
        assert_eq!(extract_str(&record, "key_id"), Some(&Value::Null));
        assert!(is_missing(extract_str(&record, "key_id")));
    }

    #[test]
    fn absent_record_and_empty_path_are_undefined() {
        let path = FieldPath::new("status");
        assert_eq!(extract(None, &path), None);
        assert_eq!(extract_str(&json!({"status": "Pass"}), ""), None);
    }

    #[test]
    fn numeric_segment_indexes_arrays() {
        let record = json!({"tags": ["smoke", "regression"]});
        assert_eq!(extract_str(&record, "tags.1"), Some(&json!("regression")));
        assert_eq!(extract_str(&record, "tags.7"), None);
    }

    #[test]
    fn field_path_serde_is_plain_string() {
        let path: FieldPath = serde_json::from_value(json!("a.b")).expect("path");
        assert_eq!(path.segments(), ["a", "b"]);
        assert_eq!(serde_json::to_value(&path).expect("ser"), json!("a.b"));
    }

    #[test]
    fn priority_ranks_match_table() {
        assert_eq!(Priority::rank_of(Some("Critical")), 4);
        assert_eq!(Priority::rank_of(Some("High")), 3);
        assert_eq!(Priority::rank_of(Some("Medium")), 2);
        assert_eq!(Priority::rank_of(Some("Low")), 1);
        assert_eq!(Priority::rank_of(Some("high")), 0);
        assert_eq!(Priority::rank_of(None), 0);
    }

    #[test]
    fn status_scales_are_distinct() {
        assert_eq!(StatusScale::Run.rank_of(Some("Completed")), 4);
        assert_eq!(StatusScale::Run.rank_of(Some("Pass")), 0);
        assert_eq!(StatusScale::Execution.rank_of(Some("Pass")), 4);
        assert_eq!(StatusScale::Execution.rank_of(Some("Completed")), 0);
        assert_eq!(RunStatus::rank_of(Some("Cancelled")), 1);
        assert_eq!(ExecutionStatus::rank_of(Some("Not Executed")), 0);
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(ExecutionStatus::classify(Some("PASS")), ExecutionStatus::Pass);
        assert_eq!(ExecutionStatus::classify(Some("fail")), ExecutionStatus::Fail);
        assert_eq!(
            ExecutionStatus::classify(Some("Bogus")),
            ExecutionStatus::NotExecuted
        );
        assert_eq!(ExecutionStatus::classify(None), ExecutionStatus::NotExecuted);
    }

    #[test]
    fn labels_parse_and_reject() {
        assert_eq!("In Progress".parse::<RunStatus>(), Ok(RunStatus::InProgress));
        let err = "Done".parse::<RunStatus>().expect_err("unknown label");
        assert_eq!(
            err.to_string(),
            "label \"Done\" is not part of the run status rank table"
        );
    }

    #[test]
    fn timestamps_parse_common_backend_shapes() {
        let rfc = parse_timestamp_ms(&json!("2024-03-01T10:00:00Z")).expect("rfc3339");
        let nano = parse_timestamp_ms(&json!("2024-03-01T10:00:00.123456789Z")).expect("nanos");
        let naive = parse_timestamp_ms(&json!("2024-03-01 10:00:00")).expect("naive");
        let date = parse_timestamp_ms(&json!("2024-03-01")).expect("date");
        assert_eq!(rfc, naive);
        assert_eq!(nano - rfc, 123);
        assert!(date < rfc);
        assert_eq!(parse_timestamp_ms(&json!(1_700_000_000_000_i64)), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp_ms(&json!("not a date")), None);
        assert_eq!(parse_timestamp_ms(&Value::Null), None);
    }

    #[test]
    fn locale_cmp_folds_case_first() {
        let mut names = vec!["Charlie", "alice", "Bob"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, vec!["alice", "Bob", "Charlie"]);
        assert_eq!(locale_cmp("a", "A"), Ordering::Less);
        assert_eq!(locale_cmp("", "a"), Ordering::Less);
        assert_eq!(locale_cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn locale_cmp_sorts_accented_letters_with_their_base() {
        let mut names = vec!["Zoe", "Fred", "\u{c9}mile", "Ecole"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, vec!["Ecole", "\u{c9}mile", "Fred", "Zoe"]);

        assert_eq!(locale_cmp("e", "\u{e9}"), Ordering::Less);
        assert_eq!(locale_cmp("\u{e9}", "f"), Ordering::Less);
        assert_eq!(locale_cmp("\u{e9}", "\u{c9}"), Ordering::Less);
        // Precomposed and decomposed forms of the same text sort together.
        assert_eq!(locale_cmp("\u{e9}a", "e\u{301}b"), Ordering::Less);
    }

    #[test]
    fn json_type_names_cover_every_variant() {
        assert_eq!(json_type_name(&Value::Null), "null");
        assert_eq!(json_type_name(&json!(true)), "bool");
        assert_eq!(json_type_name(&json!(1.5)), "number");
        assert_eq!(json_type_name(&json!("x")), "string");
        assert_eq!(json_type_name(&json!([])), "array");
        assert_eq!(json_type_name(&json!({})), "object");
    }

    #[test]
    fn blank_and_text_rendering() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("")));
        assert!(!is_blank(&json!(0)));
        assert_eq!(render_text(&json!("x")), "x");
        assert_eq!(render_text(&json!(12)), "12");
        assert_eq!(render_text(&json!(true)), "true");
        assert_eq!(render_text(&Value::Null), "");
        assert_eq!(render_text(&json!(["a"])), "[\"a\"]");
    }

    #[test]
    fn as_records_fails_soft() {
        let payload = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(as_records(Some(&payload)).len(), 2);
        assert!(as_records(Some(&json!({"id": 1}))).is_empty());
        assert!(as_records(None).is_empty());
    }

    #[test]
    fn strict_eq_has_no_type_coercion() {
        assert!(strict_eq(&json!(1), &json!(1.0)));
        assert!(strict_eq(&json!("Pass"), &json!("Pass")));
        assert!(!strict_eq(&json!("1"), &json!(1)));
        assert!(!strict_eq(&json!("pass"), &json!("Pass")));
        assert!(!strict_eq(&Value::Null, &json!(false)));
    }
}
