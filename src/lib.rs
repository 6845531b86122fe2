//! gridwindow - windowed remote data source for virtual grids
//!
//! Serves a row set of any size to a consumer that only ever looks at a small
//! window of it:
//! - Fixed-size blocks fetched through a pluggable async [`Fetcher`]
//! - Bounded block cache with time-based expiry
//! - At most N concurrent fetches, the rest queued FIFO
//! - Prefetch of the blocks either side of each window
//! - Sort/filter changes invalidate everything; stale responses are dropped
//!
//! # Usage (Rust)
//!
//! ```rust,ignore
//! let source = WindowedDataSource::new(fetcher, DataSourceConfig::default())?;
//! let _sub = source.subscribe(|event: &SourceEvent| redraw(event));
//! let rows = source.get_rows(0, 60); // never blocks
//! ```
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { GridDataSource } from 'gridwindow';
//! await init();
//! const source = new GridDataSource(async (req) => api.rows(req), { blockSize: 100 });
//! source.subscribe(() => grid.redraw());
//! const rows = source.getRows(0, 60);
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod runtime;
pub mod scheduler;
pub mod source;
pub mod types;
pub mod wasm;

use wasm_bindgen::prelude::*;

pub use cache::{BlockCache, CacheEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DataSourceConfig;
pub use error::{GridWindowError, Result};
pub use fetcher::{FetchFuture, Fetcher, FnFetcher, MemoryFetcher};
pub use scheduler::{RequestScheduler, Submission};
pub use source::{Observer, Subscription, WindowedDataSource};
pub use types::*;
pub use wasm::GridDataSource;

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
