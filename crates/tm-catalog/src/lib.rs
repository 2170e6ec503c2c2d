#![forbid(unsafe_code)]

//! Per-list view definitions: which filters a list offers, how they match,
//! which sort orders apply and which status rank table governs them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tm_filter::{FilterConfig, FilterRule};
use tm_sort::{SortKey, SortOptions};
use tm_types::{StatusScale, is_truthy};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown list kind: {0}")]
    UnknownList(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    TestRuns,
    TestCases,
    Projects,
    TestSuites,
    Repositories,
    Keys,
}

impl ListKind {
    pub const ALL: [Self; 6] = [
        Self::TestRuns,
        Self::TestCases,
        Self::Projects,
        Self::TestSuites,
        Self::Repositories,
        Self::Keys,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestRuns => "test_runs",
            Self::TestCases => "test_cases",
            Self::Projects => "projects",
            Self::TestSuites => "test_suites",
            Self::Repositories => "repositories",
            Self::Keys => "keys",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownList(s.to_owned()))
    }
}

// ── Filters ────────────────────────────────────────────────────────────

/// Flag filter over a presence field: `"true"` keeps records where the
/// field is set, any other value keeps the rest.
fn presence_rule(field: &'static str) -> FilterRule {
    FilterRule::custom(move |record, wanted| {
        let present = is_truthy(record.get(field));
        let want_present = matches!(wanted, Value::Bool(true))
            || matches!(wanted, Value::String(s) if s == "true");
        present == want_present
    })
}

#[must_use]
pub fn filter_config(kind: ListKind) -> FilterConfig {
    match kind {
        ListKind::TestRuns | ListKind::Projects => {
            FilterConfig::new().with("status", FilterRule::exact("status"))
        }
        ListKind::TestCases => FilterConfig::new()
            .with("status", FilterRule::exact("status"))
            .with("priority", FilterRule::exact("priority")),
        ListKind::Repositories => FilterConfig::new()
            .with("has_key", presence_rule("key_id"))
            .with("synced", presence_rule("synced_at")),
        ListKind::Keys => FilterConfig::new().with("key_type", FilterRule::exact("key_type")),
        ListKind::TestSuites => FilterConfig::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// One select box of a list's filter bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptionSet {
    pub key: &'static str,
    pub label: &'static str,
    pub all_label: &'static str,
    pub options: Vec<FilterOption>,
}

fn option_set(
    key: &'static str,
    label: &'static str,
    all_label: &'static str,
    options: &[(&'static str, &'static str)],
) -> FilterOptionSet {
    FilterOptionSet {
        key,
        label,
        all_label,
        options: options
            .iter()
            .map(|&(value, label)| FilterOption { value, label })
            .collect(),
    }
}

#[must_use]
pub fn filter_option_sets(kind: ListKind) -> Vec<FilterOptionSet> {
    match kind {
        ListKind::TestRuns => vec![option_set(
            "status",
            "Status",
            "All Statuses",
            &[
                ("Not Started", "Not Started"),
                ("In Progress", "In Progress"),
                ("Completed", "Completed"),
                ("Cancelled", "Cancelled"),
            ],
        )],
        ListKind::TestCases => vec![
            option_set(
                "status",
                "Status",
                "All Statuses",
                &[
                    ("Pass", "Pass"),
                    ("Fail", "Fail"),
                    ("Blocked", "Blocked"),
                    ("Skip", "Skip"),
                    ("Not Executed", "Not Executed"),
                ],
            ),
            option_set(
                "priority",
                "Priority",
                "All Priorities",
                &[("High", "High"), ("Medium", "Medium"), ("Low", "Low")],
            ),
        ],
        ListKind::Projects => vec![option_set(
            "status",
            "Status",
            "All Statuses",
            &[
                ("Active", "Active"),
                ("Inactive", "Inactive"),
                ("Completed", "Completed"),
            ],
        )],
        ListKind::Repositories => vec![
            option_set(
                "has_key",
                "Authentication",
                "All Types",
                &[("true", "Private (With Key)"), ("false", "Public (No Key)")],
            ),
            option_set(
                "synced",
                "Sync Status",
                "All Sync States",
                &[("true", "Synced"), ("false", "Not Synced")],
            ),
        ],
        ListKind::Keys => vec![option_set(
            "key_type",
            "Type",
            "All Types",
            &[("RSA", "RSA Key"), ("Username", "Username/Password")],
        )],
        ListKind::TestSuites => Vec::new(),
    }
}

// ── Sorting ────────────────────────────────────────────────────────────

const TEST_CASE_SORTS: [SortKey; 8] = [
    SortKey::CREATED_DESC,
    SortKey::CREATED_ASC,
    SortKey::TITLE_ASC,
    SortKey::TITLE_DESC,
    SortKey::PRIORITY_DESC,
    SortKey::PRIORITY_ASC,
    SortKey::STATUS_DESC,
    SortKey::STATUS_ASC,
];

const TEST_RUN_SORTS: [SortKey; 6] = [
    SortKey::CREATED_DESC,
    SortKey::CREATED_ASC,
    SortKey::NAME_ASC,
    SortKey::NAME_DESC,
    SortKey::STATUS_DESC,
    SortKey::STATUS_ASC,
];

const NAMED_SORTS: [SortKey; 4] = [
    SortKey::CREATED_DESC,
    SortKey::CREATED_ASC,
    SortKey::NAME_ASC,
    SortKey::NAME_DESC,
];

/// Sort orders offered by a list, in display order.
#[must_use]
pub fn sort_options(kind: ListKind) -> &'static [SortKey] {
    match kind {
        ListKind::TestCases => &TEST_CASE_SORTS,
        ListKind::TestRuns => &TEST_RUN_SORTS,
        ListKind::Projects | ListKind::TestSuites | ListKind::Repositories | ListKind::Keys => {
            &NAMED_SORTS
        }
    }
}

#[must_use]
pub fn status_scale(kind: ListKind) -> StatusScale {
    match kind {
        ListKind::TestRuns => StatusScale::Run,
        _ => StatusScale::Execution,
    }
}

/// Sorting configuration for a list, without custom comparators.
#[must_use]
pub fn sort_config(kind: ListKind) -> SortOptions {
    SortOptions::new(status_scale(kind))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tm_filter::{FilterSet, apply_filters};
    use tm_sort::SortKey;
    use tm_types::StatusScale;

    use super::{
        CatalogError, ListKind, filter_config, filter_option_sets, sort_config, sort_options,
        status_scale,
    };

    fn ids(records: &[serde_json::Value]) -> Vec<i64> {
        records
            .iter()
            .filter_map(|record| record["id"].as_i64())
            .collect()
    }

    #[test]
    fn list_kind_round_trips() {
        for kind in ListKind::ALL {
            assert_eq!(kind.as_str().parse::<ListKind>(), Ok(kind));
            assert_eq!(
                serde_json::to_value(kind).expect("ser"),
                json!(kind.as_str())
            );
        }
        assert_eq!(
            "widgets".parse::<ListKind>(),
            Err(CatalogError::UnknownList("widgets".to_owned()))
        );
    }

    #[test]
    fn every_option_set_has_a_filter_rule() {
        for kind in ListKind::ALL {
            let config = filter_config(kind);
            for set in filter_option_sets(kind) {
                assert!(
                    config.get(set.key).is_some(),
                    "{kind}: option set {} has no rule",
                    set.key
                );
            }
        }
        assert!(filter_config(ListKind::TestSuites).is_empty());
    }

    #[test]
    fn test_case_filters_match_status_and_priority() {
        let records = vec![
            json!({"id": 1, "status": "Pass", "priority": "High"}),
            json!({"id": 2, "status": "Fail", "priority": "High"}),
            json!({"id": 3, "status": "Pass", "priority": "Low"}),
        ];
        let filters = FilterSet::new().with("status", "Pass").with("priority", "High");
        let out = apply_filters(&records, &filters, &filter_config(ListKind::TestCases));
        assert_eq!(ids(&out), vec![1]);
    }

    #[test]
    fn repository_flags_split_on_presence() {
        let records = vec![
            json!({"id": 1, "key_id": 4, "synced_at": "2024-03-01T10:00:00Z"}),
            json!({"id": 2, "key_id": null, "synced_at": null}),
            json!({"id": 3}),
            json!({"id": 4, "key_id": 9, "synced_at": ""}),
        ];
        let config = filter_config(ListKind::Repositories);

        let private = apply_filters(&records, &FilterSet::new().with("has_key", "true"), &config);
        assert_eq!(ids(&private), vec![1, 4]);
        let public = apply_filters(&records, &FilterSet::new().with("has_key", "false"), &config);
        assert_eq!(ids(&public), vec![2, 3]);
        let synced = apply_filters(&records, &FilterSet::new().with("synced", true), &config);
        assert_eq!(ids(&synced), vec![1]);
        let unsynced = apply_filters(&records, &FilterSet::new().with("synced", "no"), &config);
        assert_eq!(ids(&unsynced), vec![2, 3, 4]);
    }

    #[test]
    fn sort_options_follow_display_order() {
        assert_eq!(sort_options(ListKind::TestCases).len(), 8);
        assert_eq!(sort_options(ListKind::TestCases)[2], SortKey::TITLE_ASC);
        assert_eq!(
            sort_options(ListKind::TestRuns).last(),
            Some(&SortKey::STATUS_ASC)
        );
        for kind in ListKind::ALL {
            assert_eq!(sort_options(kind)[0], SortKey::CREATED_DESC);
        }
        assert!(!sort_options(ListKind::Keys).contains(&SortKey::PRIORITY_DESC));
    }

    #[test]
    fn only_test_runs_use_run_scale() {
        assert_eq!(status_scale(ListKind::TestRuns), StatusScale::Run);
        assert_eq!(sort_config(ListKind::TestRuns).status_scale, StatusScale::Run);
        for kind in ListKind::ALL
            .into_iter()
            .filter(|kind| *kind != ListKind::TestRuns)
        {
            assert_eq!(status_scale(kind), StatusScale::Execution);
        }
    }

    #[test]
    fn option_sets_serialize_for_select_boxes() {
        let sets = filter_option_sets(ListKind::Keys);
        let value = serde_json::to_value(&sets).expect("serialize");
        assert_eq!(
            value,
            json!([{
                "key": "key_type",
                "label": "Type",
                "all_label": "All Types",
                "options": [
                    {"value": "RSA", "label": "RSA Key"},
                    {"value": "Username", "label": "Username/Password"}
                ]
            }])
        );
    }
}
