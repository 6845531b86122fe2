//! The windowed data source.
//!
//! A [`WindowedDataSource`] answers row-range queries immediately from its
//! block cache, filling gaps with placeholder rows and fetching the missing
//! blocks in the background. The consumer learns about landed blocks through
//! [`subscribe`](WindowedDataSource::subscribe) and re-queries.
//!
//! All mutable state (cache, block states, scheduler, query, generation)
//! lives in one `SourceState` behind a single mutex. Fetch completions and
//! `get_rows` calls may race from different threads; both go through that
//! lock. Observers are called and tasks spawned only after it is released.
//!
//! Every fetch is tagged with the generation current at submission. `refresh`
//! and `destroy` bump the generation, so a result from an older query is
//! dropped on arrival instead of landing in the fresh cache.

mod observers;
mod range;

pub use observers::{Observer, Subscription};
pub use range::{block_of, block_rows, BlockSpan};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::cache::BlockCache;
use crate::clock::{Clock, SystemClock};
use crate::config::DataSourceConfig;
use crate::error::Result;
use crate::fetcher::{fetch_with_timeout, Fetcher};
use crate::runtime::Spawner;
use crate::scheduler::{RequestScheduler, Submission};
use crate::types::{
    placeholder_row, BlockRequest, BlockResponse, BlockState, FilterSpec, QueryState, Row,
    SortSpec, SourceEvent, SourceStats,
};

use observers::ObserverSet;
use range::starts_past_end;

/// Identity of one fetch: the same block in a newer generation is a
/// different fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TicketKey {
    generation: u64,
    block: u64,
}

#[derive(Debug)]
struct FetchTicket {
    key: TicketKey,
    request: BlockRequest,
}

struct SourceState {
    cache: BlockCache,
    /// Absent means `Idle`
    blocks: HashMap<u64, BlockState>,
    scheduler: RequestScheduler<TicketKey, FetchTicket>,
    query: QueryState,
    generation: u64,
    total_rows: Option<u64>,
    destroyed: bool,
}

impl SourceState {
    fn new(config: &DataSourceConfig) -> Self {
        Self {
            cache: BlockCache::new(config.cache_block_count, config.cache_timeout),
            blocks: HashMap::new(),
            scheduler: RequestScheduler::new(config.max_concurrent_requests),
            query: QueryState::default(),
            generation: 0,
            total_rows: None,
            destroyed: false,
        }
    }

    fn block_state(&self, block: u64) -> BlockState {
        self.blocks.get(&block).cloned().unwrap_or_default()
    }

    /// Copy the rows of `[lo, hi)` out of `block` if it is cached, dropping
    /// it from the cache (and resetting its state) if it has expired.
    fn cached_rows(
        &mut self,
        block: u64,
        lo: u64,
        hi: u64,
        block_size: u64,
        now: u64,
    ) -> Option<Vec<Row>> {
        let Some(entry) = self.cache.get(block, now) else {
            if matches!(self.blocks.get(&block), Some(BlockState::Loaded)) {
                self.blocks.remove(&block);
            }
            return None;
        };
        let base = block_rows(block, block_size).start;
        let rows = (lo..hi)
            .map(|row| {
                usize::try_from(row - base)
                    .ok()
                    .and_then(|offset| entry.rows.get(offset))
                    .cloned()
                    .unwrap_or_else(|| placeholder_row(row))
            })
            .collect();
        Some(rows)
    }

    /// Make sure `block` is cached, queued or loading. Tickets that may run
    /// right away are pushed onto `launch`.
    fn ensure_block(
        &mut self,
        block: u64,
        config: &DataSourceConfig,
        now: u64,
        launch: &mut Vec<FetchTicket>,
    ) {
        if starts_past_end(block, config.block_size, self.total_rows) {
            return;
        }
        if self.block_state(block).is_pending() || self.cache.contains_fresh(block, now) {
            return;
        }

        let rows = block_rows(block, config.block_size);
        let key = TicketKey {
            generation: self.generation,
            block,
        };
        let ticket = FetchTicket {
            key,
            request: BlockRequest {
                start_row: rows.start,
                end_row: rows.end,
                sort_spec: self.query.sort.clone(),
                filter_spec: self.query.filter.clone(),
            },
        };
        match self.scheduler.submit(key, ticket) {
            Submission::Run(ticket) => {
                debug!(block, generation = self.generation, "block fetch started");
                self.blocks.insert(block, BlockState::Loading);
                launch.push(ticket);
            }
            Submission::Queued => {
                trace!(block, queued = self.scheduler.queued(), "block fetch queued");
                self.blocks.insert(block, BlockState::Queued);
            }
            Submission::Duplicate => {}
        }
    }

    /// Reset blocks whose cache entries were dropped. A block with a refetch
    /// queued or running keeps its state.
    fn forget_cached(&mut self, dropped: &[u64]) {
        for block in dropped {
            if !self.block_state(*block).is_pending() {
                self.blocks.remove(block);
            }
        }
    }

    /// Mark a ticket handed back by the scheduler as running.
    fn promote(&mut self, ticket: &FetchTicket) {
        if ticket.key.generation == self.generation && !self.destroyed {
            debug!(block = ticket.key.block, "queued block fetch started");
            self.blocks.insert(ticket.key.block, BlockState::Loading);
        }
    }

    /// Drop the cache, block states and queue, and start a new generation.
    fn invalidate(&mut self) -> u64 {
        self.cache.clear();
        self.blocks.clear();
        let dropped = self.scheduler.clear_queue();
        self.total_rows = None;
        self.generation += 1;
        debug!(
            generation = self.generation,
            dropped_queued = dropped.len(),
            in_flight = self.scheduler.in_flight(),
            "data source invalidated"
        );
        self.generation
    }

    fn learn_total(&mut self, start_row: u64, response: &BlockResponse, requested: u64) {
        if let Some(last_row) = response.last_row {
            self.total_rows = Some(last_row);
        } else if let Some(total) = response.total_rows {
            self.total_rows = Some(total);
        } else {
            let received = u64::try_from(response.rows.len()).unwrap_or(u64::MAX);
            if received < requested {
                self.total_rows = Some(start_row.saturating_add(received));
            }
        }
    }

    /// Fold a finished fetch into the state. Returns the event to publish, or
    /// `None` if the result was stale.
    fn apply(
        &mut self,
        key: TicketKey,
        request: &BlockRequest,
        result: Result<BlockResponse>,
        block_size: u64,
        now: u64,
    ) -> Option<SourceEvent> {
        if self.destroyed || key.generation != self.generation {
            debug!(
                block = key.block,
                fetched_generation = key.generation,
                generation = self.generation,
                "discarding stale block result"
            );
            return None;
        }

        let block = key.block;
        match result {
            Ok(mut response) => {
                let expected = usize::try_from(block_size).unwrap_or(usize::MAX);
                if response.rows.len() > expected {
                    warn!(
                        block,
                        received = response.rows.len(),
                        expected,
                        "fetcher returned more rows than requested; truncating"
                    );
                    response.rows.truncate(expected);
                }
                self.learn_total(request.start_row, &response, request.len());
                self.blocks.insert(block, BlockState::Loaded);
                let evicted = self.cache.put(block, response.rows, now);
                if !evicted.is_empty() {
                    trace!(?evicted, "evicted blocks over capacity");
                }
                self.forget_cached(&evicted);
                debug!(block, total_rows = ?self.total_rows, "block loaded");
                Some(SourceEvent::BlockLoaded { block })
            }
            Err(error) => {
                warn!(block, %error, "block fetch failed");
                let error = Arc::new(error);
                self.blocks
                    .insert(block, BlockState::Failed(Arc::clone(&error)));
                Some(SourceEvent::BlockFailed { block, error })
            }
        }
    }
}

struct Inner {
    config: DataSourceConfig,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    spawner: Spawner,
    state: Mutex<SourceState>,
    observers: Arc<ObserverSet>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launch(self: &Arc<Self>, tickets: Vec<FetchTicket>) {
        for ticket in tickets {
            let inner = Arc::clone(self);
            self.spawner.spawn(Box::pin(async move {
                inner.run(ticket).await;
            }));
        }
    }

    async fn run(self: Arc<Self>, ticket: FetchTicket) {
        let FetchTicket { key, request } = ticket;
        let result =
            fetch_with_timeout(self.fetcher.as_ref(), request.clone(), self.config.fetch_timeout)
                .await;
        self.complete(key, &request, result);
    }

    fn complete(
        self: &Arc<Self>,
        key: TicketKey,
        request: &BlockRequest,
        result: Result<BlockResponse>,
    ) {
        let now = self.clock.now_ms();
        let (event, next) = {
            let mut state = self.lock();
            let next = state.scheduler.complete(&key).map(|(_, ticket)| ticket);
            if let Some(ticket) = &next {
                state.promote(ticket);
            }
            let event = state.apply(key, request, result, self.config.block_size, now);
            (event, next)
        };
        if let Some(ticket) = next {
            self.launch(vec![ticket]);
        }
        if let Some(event) = event {
            self.observers.notify(&event);
        }
    }
}

/// Serves a large remote row set through a small cache of fixed-size blocks.
///
/// Cloning is cheap and yields another handle to the same source.
///
/// ```rust,ignore
/// let source = WindowedDataSource::new(MemoryFetcher::new(rows), DataSourceConfig::default())?;
/// let sub = source.subscribe(|event: &SourceEvent| println!("{}", event.kind()));
/// let window = source.get_rows(0, 50); // placeholders until block 0 lands
/// ```
#[derive(Clone)]
pub struct WindowedDataSource {
    inner: Arc<Inner>,
}

impl WindowedDataSource {
    /// Build a source reading through `fetcher`.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or, on native targets, if
    /// called outside a Tokio runtime.
    pub fn new(fetcher: impl Fetcher + 'static, config: DataSourceConfig) -> Result<Self> {
        Self::with_clock(fetcher, config, Arc::new(SystemClock::new()))
    }

    /// Like [`new`](Self::new) with an explicit time source for cache expiry.
    ///
    /// # Errors
    /// Same as [`new`](Self::new).
    pub fn with_clock(
        fetcher: impl Fetcher + 'static,
        config: DataSourceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let spawner = Spawner::current()?;
        let state = SourceState::new(&config);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                fetcher: Arc::new(fetcher),
                clock,
                spawner,
                state: Mutex::new(state),
                observers: Arc::new(ObserverSet::default()),
            }),
        })
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.inner.config
    }

    /// Rows `[start_row, end_row)`, real where cached and placeholders
    /// elsewhere. Never blocks; missing blocks and the blocks either side of
    /// the range are queued for fetch.
    pub fn get_rows(&self, start_row: u64, end_row: u64) -> Vec<Row> {
        let Some(span) = BlockSpan::covering(start_row, end_row, self.inner.config.block_size)
        else {
            return Vec::new();
        };
        let config = &self.inner.config;
        let now = self.inner.clock.now_ms();
        let mut launch = Vec::new();
        let capacity = usize::try_from(end_row - start_row).unwrap_or(0);
        let mut rows = Vec::with_capacity(capacity);
        {
            let mut state = self.inner.lock();
            if state.destroyed {
                return (start_row..end_row).map(placeholder_row).collect();
            }
            for block in span.blocks() {
                let block_range = block_rows(block, config.block_size);
                let lo = start_row.max(block_range.start);
                let hi = end_row.min(block_range.end);
                if let Some(cached) = state.cached_rows(block, lo, hi, config.block_size, now) {
                    rows.extend(cached);
                } else {
                    rows.extend((lo..hi).map(placeholder_row));
                    state.ensure_block(block, config, now, &mut launch);
                }
            }
            if config.prefetch {
                for block in span.neighbours(config.block_size, state.total_rows) {
                    state.ensure_block(block, config, now, &mut launch);
                }
            }
        }
        self.inner.launch(launch);
        rows
    }

    /// One row, or its placeholder. Queues the owning block if it is absent;
    /// no prefetch.
    pub fn get_row(&self, row_index: u64) -> Row {
        let config = &self.inner.config;
        let block = block_of(row_index, config.block_size);
        let now = self.inner.clock.now_ms();
        let mut launch = Vec::new();
        let row = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return placeholder_row(row_index);
            }
            let cached = state.cached_rows(
                block,
                row_index,
                row_index.saturating_add(1),
                config.block_size,
                now,
            );
            match cached.and_then(|rows| rows.into_iter().next()) {
                Some(row) => row,
                None => {
                    state.ensure_block(block, config, now, &mut launch);
                    placeholder_row(row_index)
                }
            }
        };
        self.inner.launch(launch);
        row
    }

    /// Whether the row's block is cached and fresh and actually holds it.
    pub fn is_row_loaded(&self, row_index: u64) -> bool {
        let block_size = self.inner.config.block_size;
        let block = block_of(row_index, block_size);
        let now = self.inner.clock.now_ms();
        let state = self.inner.lock();
        let offset = row_index - block_rows(block, block_size).start;
        state.cache.peek(block, now).is_some_and(|entry| {
            usize::try_from(offset).is_ok_and(|offset| offset < entry.rows.len())
        })
    }

    /// Whether every block covering `[start_row, end_row)` is cached and
    /// fresh. Blocks known to lie past the end of the data count as loaded.
    pub fn is_range_loaded(&self, start_row: u64, end_row: u64) -> bool {
        let block_size = self.inner.config.block_size;
        let Some(span) = BlockSpan::covering(start_row, end_row, block_size) else {
            return true;
        };
        let now = self.inner.clock.now_ms();
        let state = self.inner.lock();
        span.blocks().all(|block| {
            starts_past_end(block, block_size, state.total_rows)
                || state.cache.contains_fresh(block, now)
        })
    }

    /// Fetch status of a block. A loaded block whose entry has expired or
    /// been evicted reports `Idle`.
    pub fn block_state(&self, block_index: u64) -> BlockState {
        let now = self.inner.clock.now_ms();
        let state = self.inner.lock();
        match state.block_state(block_index) {
            BlockState::Loaded if !state.cache.contains_fresh(block_index, now) => BlockState::Idle,
            other => other,
        }
    }

    /// Rows matching the current query, once any response has reported it.
    pub fn total_row_count(&self) -> Option<u64> {
        self.inner.lock().total_rows
    }

    pub fn sort_spec(&self) -> SortSpec {
        self.inner.lock().query.sort.clone()
    }

    pub fn filter_spec(&self) -> FilterSpec {
        self.inner.lock().query.filter.clone()
    }

    /// Replace the sort spec and refresh.
    pub fn set_sort_spec(&self, sort: SortSpec) {
        self.update_query(|query| query.sort = sort);
    }

    /// Replace the filter spec and refresh.
    pub fn set_filter_spec(&self, filter: FilterSpec) {
        self.update_query(|query| query.filter = filter);
    }

    fn update_query(&self, update: impl FnOnce(&mut QueryState)) {
        let generation = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            update(&mut state.query);
            state.invalidate()
        };
        self.inner
            .observers
            .notify(&SourceEvent::Refreshed { generation });
    }

    /// Drop all cached blocks and block states and start a new generation.
    /// Fetches already running finish, but their results are discarded.
    pub fn refresh(&self) {
        self.update_query(|_| {});
    }

    /// Re-queue every block whose last fetch failed. Returns how many blocks
    /// were re-queued.
    pub fn retry_failed(&self) -> usize {
        let config = &self.inner.config;
        let now = self.inner.clock.now_ms();
        let mut launch = Vec::new();
        let retried = {
            let mut state = self.inner.lock();
            if state.destroyed {
                return 0;
            }
            let mut failed: Vec<u64> = state
                .blocks
                .iter()
                .filter(|(_, block_state)| block_state.is_failed())
                .map(|(&block, _)| block)
                .collect();
            failed.sort_unstable();
            for &block in &failed {
                state.ensure_block(block, config, now, &mut launch);
            }
            failed.len()
        };
        if retried > 0 {
            debug!(retried, "retrying failed blocks");
        }
        self.inner.launch(launch);
        retried
    }

    /// Drop expired cache entries now rather than on their next read.
    /// Returns the number of blocks removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let expired = {
            let mut state = self.inner.lock();
            let expired = state.cache.purge_expired(now);
            state.forget_cached(&expired);
            expired
        };
        let count = expired.len();
        if count > 0 {
            self.inner
                .observers
                .notify(&SourceEvent::BlocksExpired { blocks: expired });
        }
        count
    }

    /// Register an observer for every later cache mutation, fetch completion
    /// and refresh.
    pub fn subscribe(&self, observer: impl Observer + 'static) -> Subscription {
        // Held across registration so `destroy` cannot clear the set in between.
        let state = self.inner.lock();
        if state.destroyed {
            return Subscription::inert();
        }
        self.inner.observers.subscribe(Arc::new(observer))
    }

    pub fn stats(&self) -> SourceStats {
        let state = self.inner.lock();
        let mut stats = SourceStats {
            cached_blocks: state.cache.len(),
            in_flight: state.scheduler.in_flight(),
            generation: state.generation,
            total_rows: state.total_rows,
            ..SourceStats::default()
        };
        for block_state in state.blocks.values() {
            match block_state {
                BlockState::Loading => stats.loading_blocks += 1,
                BlockState::Queued => stats.queued_blocks += 1,
                BlockState::Failed(_) => stats.failed_blocks += 1,
                BlockState::Idle | BlockState::Loaded => {}
            }
        }
        stats
    }

    /// Tear the source down: clear the cache, drop queued fetches and
    /// observers. Running fetches finish but their results are discarded.
    /// Later calls return placeholders and queue nothing.
    pub fn destroy(&self) {
        {
            let mut state = self.inner.lock();
            if state.destroyed {
                return;
            }
            state.invalidate();
            state.destroyed = true;
        }
        debug!("data source destroyed");
        self.inner.observers.notify(&SourceEvent::Destroyed);
        self.inner.observers.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }
}

impl std::fmt::Debug for WindowedDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedDataSource")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
