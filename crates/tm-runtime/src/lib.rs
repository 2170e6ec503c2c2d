#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Misconfiguration is logged and the offending step becomes a no-op.
    Lenient,
    /// Misconfiguration is logged and the whole operation is rejected.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Skip,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingFilterSpec,
    UnsupportedFilterType,
    MissingPredicate,
    UnknownSortKey,
    MalformedInput,
}

impl IssueKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingFilterSpec => "missing_filter_spec",
            Self::UnsupportedFilterType => "unsupported_filter_type",
            Self::MissingPredicate => "missing_predicate",
            Self::UnknownSortKey => "unknown_sort_key",
            Self::MalformedInput => "malformed_input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub issue: ConfigIssue,
}

impl Diagnostic {
    #[must_use]
    pub fn render_plain(&self) -> String {
        format!(
            "[{}] {}::{:?} {}",
            self.issue.kind.as_str(),
            self.issue.subject,
            self.action,
            self.issue.detail
        )
    }
}

/// Caller-owned record of every misconfiguration decision taken while
/// evaluating a view.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLedger {
    records: Vec<Diagnostic>,
}

impl DiagnosticLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Diagnostic) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn count(&self, kind: IssueKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.issue.kind == kind)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
}

impl RuntimePolicy {
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            mode: RuntimeMode::Lenient,
        }
    }

    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
        }
    }

    /// Record a misconfiguration and decide whether evaluation continues.
    pub fn decide_misconfiguration(
        &self,
        kind: IssueKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
        ledger: &mut DiagnosticLedger,
    ) -> DecisionAction {
        let issue = ConfigIssue {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        };
        let action = match self.mode {
            RuntimeMode::Lenient => DecisionAction::Skip,
            RuntimeMode::Strict => DecisionAction::Reject,
        };

        tracing::warn!(
            issue = kind.as_str(),
            subject = %issue.subject,
            action = ?action,
            "{}",
            issue.detail
        );

        ledger.push(Diagnostic {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            action,
            issue,
        });
        action
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::lenient()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}
