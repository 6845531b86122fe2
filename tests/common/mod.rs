//! Shared helpers for the data source integration tests.
//!
//! - `ControlledFetcher`: a fetcher whose responses are released by the test,
//!   block by block, so scheduling order can be asserted exactly
//! - `EventLog`: an observer that records every event
//! - `wait_until`: poll a condition while the runtime drives spawned fetches
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gridwindow::{
    is_placeholder, BlockRequest, BlockResponse, DataSourceConfig, FetchFuture, Fetcher,
    GridWindowError, ManualClock, Row, SourceEvent, Subscription, WindowedDataSource,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// Serves `total` synthetic rows. Each response waits for a permit on the
/// gate of its `start_row` unless the fetcher is in auto mode.
///
/// Row ids carry a tag derived from the request's sort and filter, so a test
/// can tell which query produced a row.
pub struct ControlledFetcher {
    total: u64,
    auto: AtomicBool,
    requests: Mutex<Vec<BlockRequest>>,
    gates: Mutex<HashMap<u64, Arc<Semaphore>>>,
    failing: Mutex<HashSet<u64>>,
    report_total: AtomicBool,
}

impl ControlledFetcher {
    /// Responses wait for [`release`](Self::release).
    pub fn gated(total: u64) -> Arc<Self> {
        Arc::new(Self::build(total, false))
    }

    /// Responses resolve as soon as the fetch task is polled.
    pub fn auto(total: u64) -> Arc<Self> {
        Arc::new(Self::build(total, true))
    }

    fn build(total: u64, auto: bool) -> Self {
        Self {
            total,
            auto: AtomicBool::new(auto),
            requests: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            report_total: AtomicBool::new(true),
        }
    }

    /// Leave `totalRows`/`lastRow` out of responses.
    pub fn without_total(self: Arc<Self>) -> Arc<Self> {
        self.report_total.store(false, Ordering::SeqCst);
        self
    }

    fn gate(&self, start_row: u64) -> Arc<Semaphore> {
        let mut gates = self.gates.lock().unwrap();
        Arc::clone(
            gates
                .entry(start_row)
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        )
    }

    /// Let one pending (or the next) fetch starting at `start_row` resolve.
    pub fn release(&self, start_row: u64) {
        self.gate(start_row).add_permits(1);
    }

    pub fn set_auto(&self, auto: bool) {
        self.auto.store(auto, Ordering::SeqCst);
    }

    pub fn fail(&self, start_row: u64) {
        self.failing.lock().unwrap().insert(start_row);
    }

    pub fn heal(&self, start_row: u64) {
        self.failing.lock().unwrap().remove(&start_row);
    }

    pub fn requests(&self) -> Vec<BlockRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// `start_row` of every request, in call order.
    pub fn starts(&self) -> Vec<u64> {
        self.requests().iter().map(|r| r.start_row).collect()
    }

    pub fn calls_for(&self, start_row: u64) -> usize {
        self.starts().iter().filter(|&&s| s == start_row).count()
    }

    fn respond(&self, request: &BlockRequest) -> gridwindow::Result<BlockResponse> {
        if self.failing.lock().unwrap().contains(&request.start_row) {
            return Err(GridWindowError::Fetch(format!(
                "backend unavailable for row {}",
                request.start_row
            )));
        }
        let tag = query_tag(request);
        let end = request.end_row.min(self.total);
        let rows = (request.start_row..end)
            .map(|row| {
                let Value::Object(map) = json!({
                    "id": format!("{tag}-{row}"),
                    "row": row,
                    "tag": tag,
                }) else {
                    panic!("object literal");
                };
                map
            })
            .collect();
        let report = self.report_total.load(Ordering::SeqCst);
        Ok(BlockResponse {
            rows,
            total_rows: report.then_some(self.total),
            last_row: None,
        })
    }
}

impl Fetcher for ControlledFetcher {
    fn fetch_block(&self, request: BlockRequest) -> FetchFuture {
        self.requests.lock().unwrap().push(request.clone());
        let gate = (!self.auto.load(Ordering::SeqCst)).then(|| self.gate(request.start_row));
        let response = self.respond(&request);
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.acquire_owned()
                    .await
                    .map_err(|e| GridWindowError::Other(e.to_string()))?
                    .forget();
            }
            response
        })
    }
}

/// `plain` for the default query, else `field:dir,...|field:type,...`.
pub fn query_tag(request: &BlockRequest) -> String {
    if request.sort_spec.is_empty() && request.filter_spec.is_empty() {
        return "plain".to_string();
    }
    let sort: Vec<String> = request
        .sort_spec
        .iter()
        .map(|key| {
            let dir = serde_json::to_value(key.direction).unwrap();
            format!("{}:{}", key.field, dir.as_str().unwrap())
        })
        .collect();
    let filter: Vec<String> = request
        .filter_spec
        .iter()
        .map(|(field, condition)| format!("{field}:{}={}", condition.kind, condition.value))
        .collect();
    format!("{}|{}", sort.join(","), filter.join(","))
}

/// Records every event delivered to its subscription.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SourceEvent>>>,
}

impl EventLog {
    pub fn attach(source: &WindowedDataSource) -> (Self, Subscription) {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        let subscription = source.subscribe(move |event: &SourceEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (log, subscription)
    }

    pub fn events(&self) -> Vec<SourceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(SourceEvent::kind).collect()
    }

    pub fn loaded_blocks(&self) -> Vec<u64> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                SourceEvent::BlockLoaded { block } => Some(*block),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

/// Poll `condition` until it holds, yielding to spawned tasks in between.
/// Panics after five seconds (of runtime time).
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for: {what}");
}

/// Give spawned tasks a chance to run without waiting on anything specific.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
}

pub fn config(block_size: u64, max_concurrent: usize) -> DataSourceConfig {
    DataSourceConfig::default()
        .with_block_size(block_size)
        .with_max_concurrent_requests(max_concurrent)
}

pub fn source_with_clock(
    fetcher: &Arc<ControlledFetcher>,
    config: DataSourceConfig,
    start_ms: u64,
) -> (WindowedDataSource, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_ms));
    let shared: Arc<ManualClock> = Arc::clone(&clock);
    let source = WindowedDataSource::with_clock(Arc::clone(fetcher), config, shared)
        .expect("valid config inside a runtime");
    (source, clock)
}

pub fn source(fetcher: &Arc<ControlledFetcher>, config: DataSourceConfig) -> WindowedDataSource {
    source_with_clock(fetcher, config, 0).0
}

pub fn tag_of(row: &Row) -> Option<&str> {
    row.get("tag").and_then(Value::as_str)
}

pub fn real_rows(rows: &[Row]) -> Vec<&Row> {
    rows.iter().filter(|row| !is_placeholder(row)).collect()
}
