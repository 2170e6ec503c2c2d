#![forbid(unsafe_code)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tm_types::{ExecutionStatus, FieldPath, as_label, is_missing, render_text};

pub const DEFAULT_STATUS_FIELD: &str = "status";

/// Outcome counts over a set of execution records. `total` always equals the
/// sum of the five buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub blocked: usize,
    pub skip: usize,
    #[serde(rename = "notExecuted")]
    pub not_executed: usize,
}

impl ExecutionStats {
    #[must_use]
    pub fn count(&self, outcome: ExecutionStatus) -> usize {
        match outcome {
            ExecutionStatus::Pass => self.pass,
            ExecutionStatus::Fail => self.fail,
            ExecutionStatus::Blocked => self.blocked,
            ExecutionStatus::Skip => self.skip,
            ExecutionStatus::NotExecuted => self.not_executed,
        }
    }

    fn record(&mut self, outcome: ExecutionStatus) {
        self.total += 1;
        match outcome {
            ExecutionStatus::Pass => self.pass += 1,
            ExecutionStatus::Fail => self.fail += 1,
            ExecutionStatus::Blocked => self.blocked += 1,
            ExecutionStatus::Skip => self.skip += 1,
            ExecutionStatus::NotExecuted => self.not_executed += 1,
        }
    }

    /// Share of `outcome` in whole percent, rounded half up. Zero when
    /// there are no records.
    #[must_use]
    pub fn percent(&self, outcome: ExecutionStatus) -> u32 {
        rounded_percent(self.count(outcome), self.total)
    }

    #[must_use]
    pub fn pass_rate(&self) -> u32 {
        self.percent(ExecutionStatus::Pass)
    }

    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            pass: self.pass + other.pass,
            fail: self.fail + other.fail,
            blocked: self.blocked + other.blocked,
            skip: self.skip + other.skip,
            not_executed: self.not_executed + other.not_executed,
        }
    }

    #[must_use]
    pub fn bucket_sum(&self) -> usize {
        self.pass + self.fail + self.blocked + self.skip + self.not_executed
    }
}

fn rounded_percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let part = part as u64;
    let total = total as u64;
    ((200 * part + total) / (2 * total)) as u32
}

/// Bucket every record by the outcome stored under `status_field`.
#[must_use]
pub fn calculate_stats(records: &[Value], status_field: &str) -> ExecutionStats {
    let path = FieldPath::new(status_field);
    records.iter().fold(ExecutionStats::default(), |mut stats, record| {
        stats.record(ExecutionStatus::classify(as_label(path.resolve(record))));
        stats
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Text form of the group value; `None` gathers records without one.
    pub key: Option<String>,
    pub stats: ExecutionStats,
}

/// Per-group outcome counts. Groups appear in first-seen order and the
/// `None` group, if any, comes last.
#[must_use]
pub fn calculate_stats_by(
    records: &[Value],
    status_field: &str,
    group_path: &str,
) -> Vec<GroupStats> {
    let status_path = FieldPath::new(status_field);
    let group_path = FieldPath::new(group_path);

    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupStats> = Vec::new();
    let mut ungrouped: Option<ExecutionStats> = None;

    for record in records {
        let outcome = ExecutionStatus::classify(as_label(status_path.resolve(record)));
        let group_value = group_path.resolve(record);
        if is_missing(group_value) {
            ungrouped.get_or_insert_with(ExecutionStats::default).record(outcome);
            continue;
        }
        let key = group_value.map(render_text).unwrap_or_default();
        let slot = *slots.entry(key.clone()).or_insert_with(|| {
            groups.push(GroupStats {
                key: Some(key),
                stats: ExecutionStats::default(),
            });
            groups.len() - 1
        });
        groups[slot].stats.record(outcome);
    }

    if let Some(stats) = ungrouped {
        groups.push(GroupStats { key: None, stats });
    }
    groups
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tm_types::ExecutionStatus;

    use super::{ExecutionStats, calculate_stats, calculate_stats_by};

    fn statuses(labels: &[Value]) -> Vec<Value> {
        labels
            .iter()
            .map(|label| json!({"status": label}))
            .collect()
    }

    #[test]
    fn buckets_case_insensitively() {
        let records = statuses(&[
            json!("Pass"),
            json!("pass"),
            json!("FAIL"),
            json!("Blocked"),
            json!("Skip"),
            json!("Not Executed"),
            json!(null),
            json!(3),
        ]);
        let stats = calculate_stats(&records, "status");
        assert_eq!(
            stats,
            ExecutionStats {
                total: 8,
                pass: 2,
                fail: 1,
                blocked: 1,
                skip: 1,
                not_executed: 3,
            }
        );
        assert_eq!(stats.bucket_sum(), stats.total);
    }

    #[test]
    fn absent_status_field_counts_as_not_executed() {
        let records = vec![json!({"outcome": "Pass"}), json!({})];
        let stats = calculate_stats(&records, "status");
        assert_eq!(stats.not_executed, 2);
        let by_outcome = calculate_stats(&records, "outcome");
        assert_eq!(by_outcome.pass, 1);
        assert_eq!(by_outcome.not_executed, 1);
    }

    #[test]
    fn empty_input_has_zero_pass_rate() {
        let stats = calculate_stats(&[], "status");
        assert_eq!(stats, ExecutionStats::default());
        assert_eq!(stats.pass_rate(), 0);
        assert_eq!(stats.percent(ExecutionStatus::Fail), 0);
    }

    #[test]
    fn pass_rate_rounds_half_up() {
        let records = statuses(&[json!("Pass"), json!("Fail"), json!("Fail")]);
        assert_eq!(calculate_stats(&records, "status").pass_rate(), 33);

        let records = statuses(&[json!("Pass"), json!("Pass"), json!("Fail")]);
        assert_eq!(calculate_stats(&records, "status").pass_rate(), 67);

        let mut labels = vec![json!("Pass")];
        labels.extend(std::iter::repeat_n(json!("Fail"), 7));
        // 1/8 = 12.5%
        assert_eq!(calculate_stats(&statuses(&labels), "status").pass_rate(), 13);
    }

    #[test]
    fn serializes_not_executed_in_camel_case() {
        let stats = calculate_stats(&statuses(&[json!("Skip")]), "status");
        let value = serde_json::to_value(stats).expect("serialize");
        assert_eq!(
            value,
            json!({"total": 1, "pass": 0, "fail": 0, "blocked": 0, "skip": 1, "notExecuted": 0})
        );
    }

    #[test]
    fn merge_sums_every_bucket() {
        let left = calculate_stats(&statuses(&[json!("Pass"), json!("Fail")]), "status");
        let right = calculate_stats(&statuses(&[json!("Pass"), json!("zzz")]), "status");
        let merged = left.merge(right);
        assert_eq!(merged.total, 4);
        assert_eq!(merged.pass, 2);
        assert_eq!(merged.fail, 1);
        assert_eq!(merged.not_executed, 1);
    }

    #[test]
    fn grouped_stats_keep_first_seen_order_with_missing_last() {
        let records = vec![
            json!({"status": "Pass", "suite": {"name": "login"}}),
            json!({"status": "Fail"}),
            json!({"status": "Fail", "suite": {"name": "checkout"}}),
            json!({"status": "Pass", "suite": {"name": "login"}}),
            json!({"status": "Skip", "suite": {"name": null}}),
        ];
        let groups = calculate_stats_by(&records, "status", "suite.name");
        let keys: Vec<Option<&str>> = groups.iter().map(|group| group.key.as_deref()).collect();
        assert_eq!(keys, vec![Some("login"), Some("checkout"), None]);
        assert_eq!(groups[0].stats.pass, 2);
        assert_eq!(groups[1].stats.fail, 1);
        assert_eq!(groups[2].stats.total, 2);

        let merged = groups
            .iter()
            .fold(ExecutionStats::default(), |acc, group| acc.merge(group.stats));
        assert_eq!(merged, calculate_stats(&records, "status"));
    }

    #[test]
    fn grouped_stats_render_non_string_keys() {
        let records = vec![
            json!({"status": "Pass", "project_id": 7}),
            json!({"status": "Fail", "project_id": 7}),
            json!({"status": "Pass", "project_id": 9}),
        ];
        let groups = calculate_stats_by(&records, "status", "project_id");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.as_deref(), Some("7"));
        assert_eq!(groups[0].stats.total, 2);
        assert_eq!(groups[1].key.as_deref(), Some("9"));
    }
}
