//! In-process fetcher over a fixed dataset.
//!
//! Applies filter and sort specs the way a server-side row endpoint would,
//! then slices the requested block. Backs the CLI and benches, and doubles as
//! a reference for what a remote endpoint has to return.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{FetchFuture, Fetcher};
use crate::error::{GridWindowError, Result};
use crate::runtime;
use crate::types::{
    BlockRequest, BlockResponse, FilterCondition, FilterOperator, FilterSpec, Row, SortDirection,
    SortKey,
};

/// Serves blocks out of a `Vec<Row>`.
#[derive(Clone)]
pub struct MemoryFetcher {
    rows: Arc<Vec<Row>>,
    latency: Duration,
    calls: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(rows),
            latency: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load rows from a JSON array of objects.
    ///
    /// # Errors
    /// Returns an error if the JSON is not an array of objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<Row> = serde_json::from_str(json)?;
        Ok(Self::new(rows))
    }

    /// Delay every response by `latency`, to mimic a network hop.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `fetch_block` calls so far, across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Unfiltered dataset size.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Answer a request synchronously.
    ///
    /// # Errors
    /// Returns [`GridWindowError::Fetch`] for filter types it does not know.
    pub fn query(&self, request: &BlockRequest) -> Result<BlockResponse> {
        query_rows(&self.rows, request)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch_block(&self, request: BlockRequest) -> FetchFuture {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        let rows = Arc::clone(&self.rows);
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                runtime::sleep(latency).await;
            }
            query_rows(&rows, &request)
        })
    }
}

fn query_rows(rows: &[Row], request: &BlockRequest) -> Result<BlockResponse> {
    let mut matched = Vec::new();
    for row in rows {
        if row_matches(row, &request.filter_spec)? {
            matched.push(row);
        }
    }
    if !request.sort_spec.is_empty() {
        matched.sort_by(|a, b| compare_rows(a, b, &request.sort_spec));
    }

    let total = u64::try_from(matched.len()).unwrap_or(u64::MAX);
    let start = usize::try_from(request.start_row)
        .unwrap_or(usize::MAX)
        .min(matched.len());
    let end = usize::try_from(request.end_row)
        .unwrap_or(usize::MAX)
        .clamp(start, matched.len());
    let block: Vec<Row> = matched
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|row| (*row).clone())
        .collect();

    Ok(BlockResponse {
        rows: block,
        total_rows: Some(total),
        last_row: (request.end_row >= total).then_some(total),
    })
}

fn row_matches(row: &Row, filter: &FilterSpec) -> Result<bool> {
    for (field, condition) in filter {
        if !condition_matches(row.get(field), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn condition_matches(value: Option<&Value>, condition: &FilterCondition) -> Result<bool> {
    let Some(op) = condition.operator() else {
        return Err(GridWindowError::Fetch(format!(
            "unsupported filter type `{}`",
            condition.kind
        )));
    };
    let target = &condition.value;
    let present = value.filter(|v| !v.is_null());

    let matched = match op {
        FilterOperator::Equals => present.is_some_and(|v| values_equal(v, target)),
        FilterOperator::NotEqual => !present.is_some_and(|v| values_equal(v, target)),
        FilterOperator::Contains => text_test(present, target, |hay, needle| hay.contains(needle)),
        FilterOperator::StartsWith => {
            text_test(present, target, |hay, needle| hay.starts_with(needle))
        }
        FilterOperator::EndsWith => text_test(present, target, |hay, needle| hay.ends_with(needle)),
        FilterOperator::GreaterThan => {
            present.is_some_and(|v| compare_values(Some(v), Some(target)) == Ordering::Greater)
        }
        FilterOperator::GreaterThanOrEqual => {
            present.is_some_and(|v| compare_values(Some(v), Some(target)) != Ordering::Less)
        }
        FilterOperator::LessThan => {
            present.is_some_and(|v| compare_values(Some(v), Some(target)) == Ordering::Less)
        }
        FilterOperator::LessThanOrEqual => {
            present.is_some_and(|v| compare_values(Some(v), Some(target)) != Ordering::Greater)
        }
        FilterOperator::Set => {
            let Some(candidates) = target.as_array() else {
                return Err(GridWindowError::Fetch(
                    "set filter expects an array value".into(),
                ));
            };
            present.is_some_and(|v| candidates.iter().any(|c| values_equal(v, c)))
        }
    };
    Ok(matched)
}

/// Case-insensitive text predicate; numbers and booleans compare by their
/// display form.
fn text_test(value: Option<&Value>, target: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match value {
        Some(v) => test(&display_text(v), &display_text(target)),
        None => false,
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(Some(a), Some(b)) == Ordering::Equal
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON values: missing/null, booleans, numbers, strings,
/// then arrays and objects by their serialized form.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ (Value::Array(_) | Value::Object(_))), Some(y))
            if type_rank(Some(x)) == type_rank(Some(y)) =>
        {
            x.to_string().cmp(&y.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_rows(a: &Row, b: &Row, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ord = compare_values(a.get(&key.field), b.get(&key.field));
        let ord = match key.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
