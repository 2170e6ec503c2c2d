#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tm_catalog::{ListKind, status_scale};
use tm_filter::{FilterConfig, FilterError};
use tm_runtime::{DiagnosticLedger, RuntimeMode, RuntimePolicy};
use tm_sort::SortOptions;
use tm_stats::ExecutionStats;
use tm_types::StatusScale;
use tm_view::{Pagination, ViewDefinition, ViewPage, ViewQuery, run_view_with};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    /// Run every fixture under the strict policy regardless of its own mode.
    pub force_strict: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            force_strict: false,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fixture {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

/// One recorded scenario: a record set, a view definition (a catalogued
/// list or an inline filter config), a query and the expected outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewFixture {
    pub case_id: String,
    pub mode: RuntimeMode,
    #[serde(default)]
    pub list: Option<ListKind>,
    #[serde(default)]
    pub filter_config: Option<Value>,
    #[serde(default)]
    pub status_scale: Option<StatusScale>,
    #[serde(default)]
    pub status_field: Option<String>,
    pub records: Vec<Value>,
    #[serde(default)]
    pub query: ViewQuery,
    #[serde(default)]
    pub expected_ids: Option<Vec<Value>>,
    #[serde(default)]
    pub expected_stats: Option<ExecutionStats>,
    #[serde(default)]
    pub expected_pagination: Option<Pagination>,
    #[serde(default)]
    pub expected_diagnostics: Option<usize>,
    #[serde(default)]
    pub expected_error_contains: Option<String>,
}

impl ViewFixture {
    /// Resolve the view definition the fixture runs against.
    pub fn definition(&self) -> Result<ViewDefinition, HarnessError> {
        let mut definition = match (&self.list, &self.filter_config) {
            (Some(kind), None) => ViewDefinition::for_list(*kind),
            (list, Some(raw)) => {
                let scale = self
                    .status_scale
                    .or_else(|| list.map(status_scale))
                    .unwrap_or(StatusScale::Execution);
                ViewDefinition::new(FilterConfig::from_json(raw)?, SortOptions::new(scale))
            }
            (None, None) => {
                return Err(HarnessError::FixtureFormat(format!(
                    "{}: needs either `list` or `filter_config`",
                    self.case_id
                )));
            }
        };
        if let Some(scale) = self.status_scale {
            definition.sorting.status_scale = scale;
        }
        if let Some(field) = &self.status_field {
            definition.status_field.clone_from(field);
        }
        Ok(definition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub mode: RuntimeMode,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    pub diagnostics: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl HarnessReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }

    #[must_use]
    pub fn failures(&self) -> Vec<&CaseResult> {
        self.results
            .iter()
            .filter(|result| result.status == CaseStatus::Fail)
            .collect()
    }
}

pub fn run_fixture_suite(config: &HarnessConfig) -> Result<HarnessReport, HarnessError> {
    let fixtures = load_fixtures(&config.fixture_root)?;
    let results: Vec<CaseResult> = fixtures
        .iter()
        .map(|fixture| run_fixture(fixture, config.force_strict))
        .collect();
    let passed = results
        .iter()
        .filter(|result| result.status == CaseStatus::Pass)
        .count();

    Ok(HarnessReport {
        suite: "view_fixtures".to_owned(),
        fixture_count: results.len(),
        passed,
        failed: results.len() - passed,
        results,
    })
}

#[must_use]
pub fn run_fixture(fixture: &ViewFixture, force_strict: bool) -> CaseResult {
    let mode = if force_strict {
        RuntimeMode::Strict
    } else {
        fixture.mode
    };
    let policy = match mode {
        RuntimeMode::Lenient => RuntimePolicy::lenient(),
        RuntimeMode::Strict => RuntimePolicy::strict(),
    };

    let mut ledger = DiagnosticLedger::new();
    let mismatch = check_fixture(fixture, &policy, &mut ledger).err();
    if let Some(mismatch) = &mismatch {
        tracing::warn!(case_id = %fixture.case_id, mode = ?mode, "fixture mismatch: {mismatch}");
    }

    CaseResult {
        case_id: fixture.case_id.clone(),
        mode,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        diagnostics: ledger.len(),
    }
}

fn check_fixture(
    fixture: &ViewFixture,
    policy: &RuntimePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<(), String> {
    let definition = fixture
        .definition()
        .map_err(|err| format!("definition failed: {err}"))?;
    let outcome = run_view_with(&definition, &fixture.records, &fixture.query, policy, ledger);

    let page = match (outcome, &fixture.expected_error_contains) {
        (Err(err), Some(needle)) => {
            let message = err.to_string();
            return if message.contains(needle.as_str()) {
                Ok(())
            } else {
                Err(format!("expected error containing {needle:?}, got {message:?}"))
            };
        }
        (Err(err), None) => return Err(format!("unexpected error: {err}")),
        (Ok(_), Some(needle)) => {
            return Err(format!("expected error containing {needle:?}, view succeeded"));
        }
        (Ok(page), None) => page,
    };

    check_page(fixture, &page)?;

    if let Some(expected) = fixture.expected_diagnostics {
        if expected != ledger.len() {
            return Err(format!(
                "diagnostics mismatch: expected {expected}, got {}",
                ledger.len()
            ));
        }
    }
    Ok(())
}

fn check_page(fixture: &ViewFixture, page: &ViewPage) -> Result<(), String> {
    if let Some(expected) = &fixture.expected_ids {
        let actual: Vec<Value> = page
            .records
            .iter()
            .map(|record| record.get("id").cloned().unwrap_or(Value::Null))
            .collect();
        if &actual != expected {
            return Err(format!(
                "id mismatch: expected {}, got {}",
                Value::Array(expected.clone()),
                Value::Array(actual)
            ));
        }
    }
    if let Some(expected) = fixture.expected_stats.filter(|stats| stats != &page.stats) {
        return Err(format!(
            "stats mismatch: expected {expected:?}, got {:?}",
            page.stats
        ));
    }
    if let Some(expected) = fixture
        .expected_pagination
        .filter(|pagination| pagination != &page.pagination)
    {
        return Err(format!(
            "pagination mismatch: expected {expected:?}, got {:?}",
            page.pagination
        ));
    }
    Ok(())
}

pub fn load_fixtures(root: &Path) -> Result<Vec<ViewFixture>, HarnessError> {
    let mut fixtures = Vec::new();
    for path in list_fixture_files(root)? {
        fixtures.push(load_fixture(&path)?);
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

fn load_fixture(path: &Path) -> Result<ViewFixture, HarnessError> {
    let body = fs::read_to_string(path)?;
    serde_json::from_str(&body).map_err(|source| HarnessError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
