#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tm_catalog::{ListKind, filter_config, sort_config};
use tm_filter::{FilterConfig, FilterError, FilterSet, apply_filters_with_policy};
use tm_runtime::{DiagnosticLedger, RuntimePolicy};
use tm_sort::{SortError, SortOptions, apply_sorting_with_policy};
use tm_stats::{DEFAULT_STATUS_FIELD, ExecutionStats, calculate_stats};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Sort(#[from] SortError),
}

// ── Pagination ─────────────────────────────────────────────────────────

fn clamp_page(page: i64) -> i64 {
    page.max(1)
}

fn clamp_page_size(page_size: i64) -> i64 {
    if page_size < 1 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.min(MAX_PAGE_SIZE)
    }
}

/// Page metadata returned alongside a slice of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: usize,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Clamp the request and derive page counts. A page past the end is kept
    /// as requested and simply yields no records.
    #[must_use]
    pub fn calculate(page: i64, page_size: i64, total: usize) -> Self {
        let page = clamp_page(page);
        let page_size = clamp_page_size(page_size);
        let pages = total.div_ceil(usize::try_from(page_size).unwrap_or(1));
        let total_pages = i64::try_from(pages).unwrap_or(i64::MAX).max(1);
        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    #[must_use]
    pub fn offset_and_limit(&self) -> (usize, usize) {
        offset_and_limit(self.page, self.page_size)
    }
}

/// Record offset and page length for a request, clamped the same way as
/// [`Pagination::calculate`].
#[must_use]
pub fn offset_and_limit(page: i64, page_size: i64) -> (usize, usize) {
    let page = clamp_page(page);
    let page_size = clamp_page_size(page_size);
    let offset = (page - 1).saturating_mul(page_size);
    (
        usize::try_from(offset).unwrap_or(usize::MAX),
        usize::try_from(page_size).unwrap_or_default(),
    )
}

// ── Query and result ───────────────────────────────────────────────────

/// Everything a list view needs to render one page: the chosen filters, the
/// sort key string and the page request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewQuery {
    pub filters: FilterSet,
    pub sort: String,
    pub page: i64,
    pub page_size: i64,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            filters: FilterSet::new(),
            sort: String::new(),
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ViewQuery {
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.set(key, value);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: i64, page_size: i64) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewPage {
    pub records: Vec<Value>,
    pub pagination: Pagination,
    /// Outcome counts over every record that passed the filters, not just
    /// this page.
    pub stats: ExecutionStats,
}

/// Filter and sort configuration for one list.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    pub filters: FilterConfig,
    pub sorting: SortOptions,
    pub status_field: String,
}

impl ViewDefinition {
    #[must_use]
    pub fn new(filters: FilterConfig, sorting: SortOptions) -> Self {
        Self {
            filters,
            sorting,
            status_field: DEFAULT_STATUS_FIELD.to_owned(),
        }
    }

    #[must_use]
    pub fn for_list(kind: ListKind) -> Self {
        Self::new(filter_config(kind), sort_config(kind))
    }
}

/// Evaluate a query against one of the catalogued lists.
pub fn run_view(
    kind: ListKind,
    records: &[Value],
    query: &ViewQuery,
    policy: &RuntimePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<ViewPage, ViewError> {
    run_view_with(&ViewDefinition::for_list(kind), records, query, policy, ledger)
}

/// Filter, sort, count, then slice the requested page.
pub fn run_view_with(
    definition: &ViewDefinition,
    records: &[Value],
    query: &ViewQuery,
    policy: &RuntimePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<ViewPage, ViewError> {
    let filtered =
        apply_filters_with_policy(records, &query.filters, &definition.filters, policy, ledger)?;
    let sorted =
        apply_sorting_with_policy(&filtered, &query.sort, &definition.sorting, policy, ledger)?;
    let stats = calculate_stats(&sorted, &definition.status_field);
    let pagination = Pagination::calculate(query.page, query.page_size, sorted.len());
    let (offset, limit) = pagination.offset_and_limit();
    let records = sorted.into_iter().skip(offset).take(limit).collect();

    Ok(ViewPage {
        records,
        pagination,
        stats,
    })
}
