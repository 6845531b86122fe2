//! The remote read a data source is built around.
//!
//! A [`Fetcher`] turns one [`BlockRequest`] into a future of
//! [`BlockResponse`]. The data source owns no transport: HTTP clients, JS
//! callbacks and in-process datasets all plug in here.

mod memory;

pub use memory::MemoryFetcher;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::duration_ms;
use crate::error::{GridWindowError, Result};
use crate::runtime::{self, BoxFuture, MaybeSend, MaybeSync};
use crate::types::{BlockRequest, BlockResponse};

/// Future returned by [`Fetcher::fetch_block`].
pub type FetchFuture = BoxFuture<'static, Result<BlockResponse>>;

/// Reads one block of rows from the remote source.
pub trait Fetcher: MaybeSend + MaybeSync {
    fn fetch_block(&self, request: BlockRequest) -> FetchFuture;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch_block(&self, request: BlockRequest) -> FetchFuture {
        (**self).fetch_block(request)
    }
}

/// Adapts an async closure into a [`Fetcher`].
///
/// ```rust,ignore
/// let fetcher = FnFetcher::new(|request: BlockRequest| async move {
///     client.load(request.start_row, request.end_row).await
/// });
/// ```
pub struct FnFetcher<F> {
    f: F,
}

impl<F> FnFetcher<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(BlockRequest) -> Fut + MaybeSend + MaybeSync,
    Fut: Future<Output = Result<BlockResponse>> + MaybeSend + 'static,
{
    fn fetch_block(&self, request: BlockRequest) -> FetchFuture {
        Box::pin((self.f)(request))
    }
}

/// Call the fetcher, turning an overrun of `limit` into
/// [`GridWindowError::Timeout`].
pub(crate) async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: BlockRequest,
    limit: Duration,
) -> Result<BlockResponse> {
    let (start_row, end_row) = (request.start_row, request.end_row);
    runtime::with_timeout(fetcher.fetch_block(request), limit)
        .await
        .unwrap_or_else(|| {
            Err(GridWindowError::Timeout {
                start_row,
                end_row,
                after_ms: duration_ms(limit),
            })
        })
}
