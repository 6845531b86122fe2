//! Cache capacity and expiry tests
//!
//! Time is driven by a `ManualClock`, so fetch timestamps and expiry are
//! exact.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

mod common;

use std::time::Duration;

use common::{config, source_with_clock, wait_until, ControlledFetcher, EventLog};
use gridwindow::{is_placeholder, SourceEvent};

#[tokio::test]
async fn test_oldest_block_evicted_over_capacity() {
    let fetcher = ControlledFetcher::auto(1_000);
    let (source, clock) = source_with_clock(
        &fetcher,
        config(100, 2)
            .with_cache_block_count(2)
            .with_prefetch(false),
        1_000,
    );

    for block in 0..3_u64 {
        let start = block * 100;
        source.get_rows(start, start + 100);
        wait_until("block loaded", || source.block_state(block).is_loaded()).await;
        clock.advance(10);
    }

    let stats = source.stats();
    assert_eq!(stats.cached_blocks, 2);
    assert_eq!(source.block_state(0).name(), "idle");
    assert!(source.block_state(1).is_loaded());
    assert!(source.block_state(2).is_loaded());

    let rows = source.get_rows(0, 100);
    assert!(rows.iter().all(is_placeholder));
    wait_until("block 0 fetched again", || fetcher.calls_for(0) == 2).await;
    wait_until("block 0 reloaded", || source.block_state(0).is_loaded()).await;

    // Reloading block 0 pushed out block 1, now the oldest.
    assert_eq!(source.block_state(1).name(), "idle");
    assert_eq!(source.stats().cached_blocks, 2);
}

#[tokio::test]
async fn test_fetch_time_tie_evicts_lowest_block() {
    let fetcher = ControlledFetcher::auto(1_000);
    let (source, _clock) = source_with_clock(
        &fetcher,
        config(100, 1)
            .with_cache_block_count(2)
            .with_prefetch(false),
        0,
    );
    let (log, _sub) = EventLog::attach(&source);

    for block in [5_u64, 6, 1] {
        source.get_rows(block * 100, block * 100 + 1);
        wait_until("block fetched", || fetcher.calls_for(block * 100) == 1).await;
        wait_until("block event", || log.loaded_blocks().contains(&block)).await;
    }

    // All three landed at t=0; the lowest index goes, even the newcomer.
    assert_eq!(source.block_state(1).name(), "idle");
    assert!(source.block_state(5).is_loaded());
    assert!(source.block_state(6).is_loaded());
    assert_eq!(log.loaded_blocks(), vec![5, 6, 1]);
}

#[tokio::test]
async fn test_expired_block_is_refetched() {
    let fetcher = ControlledFetcher::auto(1_000);
    let (source, clock) = source_with_clock(
        &fetcher,
        config(100, 2)
            .with_cache_timeout(Duration::from_millis(5_000))
            .with_prefetch(false),
        1_000,
    );

    source.get_rows(0, 100);
    wait_until("block 0 loaded", || source.is_range_loaded(0, 100)).await;
    assert_eq!(source.get_rows(0, 100)[0]["id"], "plain-0");

    clock.set(7_000);
    assert_eq!(source.block_state(0).name(), "idle");
    assert!(!source.is_row_loaded(0));

    let rows = source.get_rows(0, 100);
    assert!(rows.iter().all(is_placeholder));
    wait_until("refetch", || fetcher.calls_for(0) == 2).await;
    wait_until("block 0 loaded again", || source.is_range_loaded(0, 100)).await;
    assert_eq!(source.get_rows(0, 100)[0]["id"], "plain-0");
}

#[tokio::test]
async fn test_fresh_block_within_timeout_is_not_refetched() {
    let fetcher = ControlledFetcher::auto(1_000);
    let (source, clock) = source_with_clock(
        &fetcher,
        config(100, 2)
            .with_cache_timeout(Duration::from_millis(5_000))
            .with_prefetch(false),
        0,
    );

    source.get_rows(0, 100);
    wait_until("block 0 loaded", || source.is_range_loaded(0, 100)).await;

    clock.set(5_000);
    let rows = source.get_rows(0, 100);
    assert!(!rows.iter().any(is_placeholder));
    common::settle().await;
    assert_eq!(fetcher.calls_for(0), 1);
}

#[tokio::test]
async fn test_cache_never_exceeds_capacity_while_scrolling() {
    let fetcher = ControlledFetcher::auto(5_000);
    let (source, clock) =
        source_with_clock(&fetcher, config(100, 4).with_cache_block_count(3), 0);

    for step in 0..40_u64 {
        let start = step * 120;
        source.get_rows(start, start + 60);
        wait_until("window loaded", || source.is_range_loaded(start, start + 60)).await;
        clock.advance(1);
        assert!(source.stats().cached_blocks <= 3);
    }

    // Scroll back to the top: long gone from the cache.
    assert_eq!(source.block_state(0).name(), "idle");
    assert!(source.get_rows(0, 10).iter().all(is_placeholder));
}

#[tokio::test]
async fn test_purge_expired_drops_and_notifies() {
    let fetcher = ControlledFetcher::auto(1_000);
    let (source, clock) = source_with_clock(
        &fetcher,
        config(100, 4)
            .with_cache_timeout(Duration::from_millis(1_000))
            .with_prefetch(false),
        0,
    );
    let (log, _sub) = EventLog::attach(&source);

    source.get_rows(0, 200);
    wait_until("blocks 0-1", || source.is_range_loaded(0, 200)).await;
    clock.set(10);
    source.get_rows(200, 300);
    wait_until("block 2", || source.is_range_loaded(200, 300)).await;

    clock.set(1_005);
    assert_eq!(source.purge_expired(), 2);
    assert_eq!(source.stats().cached_blocks, 1);
    assert_eq!(source.block_state(0).name(), "idle");
    assert!(source.block_state(2).is_loaded());

    let expired: Vec<Vec<u64>> = log
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SourceEvent::BlocksExpired { blocks } => Some(blocks),
            _ => None,
        })
        .collect();
    assert_eq!(expired, vec![vec![0, 1]]);

    // Nothing left to purge: no count, no event.
    let before = log.len();
    assert_eq!(source.purge_expired(), 0);
    assert_eq!(log.len(), before);
}

#[tokio::test]
async fn test_row_and_range_loaded() {
    let fetcher = ControlledFetcher::auto(1_000);
    let (source, _clock) = source_with_clock(&fetcher, config(100, 2).with_prefetch(false), 0);

    assert!(!source.is_row_loaded(5));
    assert!(source.is_range_loaded(40, 40));

    source.get_rows(0, 50);
    wait_until("block 0", || source.is_row_loaded(5)).await;

    assert!(source.is_row_loaded(99));
    assert!(!source.is_row_loaded(100));
    assert!(source.is_range_loaded(0, 100));
    assert!(!source.is_range_loaded(50, 150));
}

#[tokio::test]
async fn test_purge_keeps_refetch_of_expired_block() {
    let fetcher = ControlledFetcher::gated(1_000);
    let (source, clock) = source_with_clock(
        &fetcher,
        config(100, 4).with_cache_timeout(Duration::from_millis(1_000)),
        0,
    );

    source.get_rows(0, 100);
    fetcher.release(0);
    fetcher.release(100);
    wait_until("blocks 0-1", || {
        source.block_state(0).is_loaded() && source.block_state(1).is_loaded()
    })
    .await;

    // Block 1 is expired but still cached when the prefetch picks it up.
    clock.set(2_000);
    source.get_rows(200, 250);
    assert_eq!(source.block_state(1).name(), "loading");

    assert_eq!(source.purge_expired(), 2);
    assert_eq!(source.block_state(0).name(), "idle");
    assert_eq!(source.block_state(1).name(), "loading");
    let stats = source.stats();
    assert_eq!(stats.loading_blocks, stats.in_flight);
    assert_eq!(stats.in_flight, 3);

    fetcher.release(100);
    wait_until("block 1 reloaded", || source.block_state(1).is_loaded()).await;
    assert!(!source.get_rows(100, 200).iter().any(is_placeholder));
    assert_eq!(fetcher.calls_for(100), 2);
}

#[tokio::test]
async fn test_eviction_keeps_refetch_of_expired_block() {
    let fetcher = ControlledFetcher::gated(1_000);
    let (source, clock) = source_with_clock(
        &fetcher,
        config(100, 4)
            .with_cache_block_count(2)
            .with_cache_timeout(Duration::from_millis(1_000)),
        0,
    );

    source.get_rows(0, 50);
    fetcher.release(0);
    fetcher.release(100);
    wait_until("blocks 0-1", || {
        source.block_state(0).is_loaded() && source.block_state(1).is_loaded()
    })
    .await;

    clock.set(2_000);
    source.get_rows(200, 250);
    assert_eq!(source.block_state(1).name(), "loading");

    // Blocks 2 and 3 land and push out both stale entries.
    fetcher.release(200);
    fetcher.release(300);
    wait_until("blocks 2-3", || {
        source.block_state(2).is_loaded() && source.block_state(3).is_loaded()
    })
    .await;
    assert_eq!(source.block_state(0).name(), "idle");
    assert_eq!(source.block_state(1).name(), "loading");
    let stats = source.stats();
    assert_eq!(stats.cached_blocks, 2);
    assert_eq!(stats.loading_blocks, 1);
    assert_eq!(stats.in_flight, 1);

    clock.advance(1);
    fetcher.release(100);
    wait_until("block 1 reloaded", || source.block_state(1).is_loaded()).await;
    let stats = source.stats();
    assert_eq!(stats.loading_blocks, 0);
    assert_eq!(stats.in_flight, 0);
}
