//! Platform glue: task spawning, timers and thread-safety bounds.
//!
//! Native builds run block fetches on the Tokio runtime that was current when
//! the data source was built. `wasm32` builds run them on the browser event
//! loop, where futures and JS callbacks are `!Send`; `MaybeSend`/`MaybeSync`
//! collapse to no bounds there.

use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures_util::future::{self, Either};

use crate::error::Result;

#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + ?Sized> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSend for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSync: Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Sync + ?Sized> MaybeSync for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSync for T {}

/// Boxed future; `Send` on native targets only.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxFuture<'a, T> = future::BoxFuture<'a, T>;
#[cfg(target_arch = "wasm32")]
pub type BoxFuture<'a, T> = future::LocalBoxFuture<'a, T>;

/// Detached task launcher bound to one runtime.
pub(crate) struct Spawner {
    #[cfg(not(target_arch = "wasm32"))]
    handle: tokio::runtime::Handle,
}

impl Spawner {
    /// Capture the runtime the caller is running on.
    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(|handle| Self { handle })
            .map_err(|_| crate::error::GridWindowError::NoRuntime)
    }

    #[cfg(target_arch = "wasm32")]
    #[allow(clippy::unnecessary_wraps)]
    pub(crate) fn current() -> Result<Self> {
        Ok(Self {})
    }

    pub(crate) fn spawn(&self, task: BoxFuture<'static, ()>) {
        #[cfg(not(target_arch = "wasm32"))]
        self.handle.spawn(task);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(task);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Resolve after `duration` using `setTimeout`. Never resolves outside a window.
#[cfg(target_arch = "wasm32")]
pub(crate) async fn sleep(duration: Duration) {
    let ms = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        if let Some(window) = web_sys::window() {
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

/// Run `fut` to completion unless `limit` elapses first.
pub(crate) async fn with_timeout<F: Future>(fut: F, limit: Duration) -> Option<F::Output> {
    let fut = pin!(fut);
    let timer = pin!(sleep(limit));
    match future::select(fut, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}
