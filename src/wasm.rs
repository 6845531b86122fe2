//! JavaScript bindings.
//!
//! `GridDataSource` wraps a [`WindowedDataSource`](crate::WindowedDataSource)
//! whose fetcher is a JS function `(request) => response | Promise<response>`.
//! Requests and responses cross the boundary as plain JSON-compatible objects
//! in the camelCase shape of [`BlockRequest`](crate::BlockRequest) and
//! [`BlockResponse`](crate::BlockResponse). Row indices are `u32` on this
//! side so they stay plain JS numbers.

use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use serde::Serialize;

#[cfg(target_arch = "wasm32")]
use crate::{
    BlockRequest, BlockResponse, DataSourceConfig, FetchFuture, Fetcher, FilterSpec,
    GridWindowError, SortSpec, SourceEvent, Subscription, WindowedDataSource,
};

/// Windowed data source exported to JavaScript
#[wasm_bindgen]
pub struct GridDataSource {
    #[cfg(target_arch = "wasm32")]
    source: WindowedDataSource,
}

/// Handle returned by `GridDataSource.subscribe`
#[wasm_bindgen]
pub struct GridSubscription {
    #[cfg(target_arch = "wasm32")]
    subscription: Subscription,
}

#[cfg(target_arch = "wasm32")]
struct JsFetcher {
    function: js_sys::Function,
}

#[cfg(target_arch = "wasm32")]
fn js_error(value: &JsValue) -> GridWindowError {
    GridWindowError::Fetch(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

#[cfg(target_arch = "wasm32")]
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
}

#[cfg(target_arch = "wasm32")]
impl Fetcher for JsFetcher {
    fn fetch_block(&self, request: BlockRequest) -> FetchFuture {
        let function = self.function.clone();
        Box::pin(async move {
            let arg = request
                .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
                .map_err(|e| GridWindowError::Other(e.to_string()))?;
            let returned = function
                .call1(&JsValue::NULL, &arg)
                .map_err(|e| js_error(&e))?;
            // Accept plain values as well as promises
            let promise = js_sys::Promise::resolve(&returned);
            let value = wasm_bindgen_futures::JsFuture::from(promise)
                .await
                .map_err(|e| js_error(&e))?;
            serde_wasm_bindgen::from_value::<BlockResponse>(value)
                .map_err(|e| GridWindowError::Fetch(format!("malformed response: {e}")))
        })
    }
}

#[cfg(target_arch = "wasm32")]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsEvent<'a> {
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<&'a [u64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[cfg(target_arch = "wasm32")]
impl<'a> From<&'a SourceEvent> for JsEvent<'a> {
    fn from(event: &'a SourceEvent) -> Self {
        let mut js = JsEvent {
            kind: event.kind(),
            block: event.block(),
            blocks: None,
            generation: None,
            error: None,
        };
        match event {
            SourceEvent::BlockFailed { error, .. } => js.error = Some(error.to_string()),
            SourceEvent::BlocksExpired { blocks } => js.blocks = Some(blocks),
            SourceEvent::Refreshed { generation } => js.generation = Some(*generation),
            SourceEvent::BlockLoaded { .. } | SourceEvent::Destroyed => {}
        }
        js
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl GridDataSource {
    /// Create a data source around an async fetch function.
    ///
    /// `config` may be `undefined` or a partial `{ blockSize, maxConcurrentRequests,
    /// cacheBlockCount, cacheTimeout, fetchTimeout, prefetch }` object
    /// (durations in milliseconds).
    #[wasm_bindgen(constructor)]
    pub fn new(fetch: js_sys::Function, config: JsValue) -> Result<GridDataSource, JsValue> {
        console_error_panic_hook::set_once();

        let config = if config.is_undefined() || config.is_null() {
            DataSourceConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsValue::from_str(&format!("Invalid config: {e}")))?
        };
        let source = WindowedDataSource::new(JsFetcher { function: fetch }, config)?;
        Ok(GridDataSource { source })
    }

    /// Rows `[start, end)`; placeholders carry `_loading: true`.
    #[wasm_bindgen(js_name = getRows)]
    pub fn get_rows(&self, start: u32, end: u32) -> Result<JsValue, JsValue> {
        to_js(&self.source.get_rows(u64::from(start), u64::from(end)))
    }

    #[wasm_bindgen(js_name = getRow)]
    pub fn get_row(&self, index: u32) -> Result<JsValue, JsValue> {
        to_js(&self.source.get_row(u64::from(index)))
    }

    #[wasm_bindgen(js_name = isRowLoaded)]
    pub fn is_row_loaded(&self, index: u32) -> bool {
        self.source.is_row_loaded(u64::from(index))
    }

    #[wasm_bindgen(js_name = isRangeLoaded)]
    pub fn is_range_loaded(&self, start: u32, end: u32) -> bool {
        self.source.is_range_loaded(u64::from(start), u64::from(end))
    }

    /// `"idle" | "queued" | "loading" | "loaded" | "failed"`
    #[wasm_bindgen(js_name = blockState)]
    pub fn block_state(&self, block: u32) -> String {
        self.source.block_state(u64::from(block)).name().to_string()
    }

    // Row counts stay far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    #[wasm_bindgen(js_name = totalRowCount)]
    pub fn total_row_count(&self) -> Option<f64> {
        self.source.total_row_count().map(|n| n as f64)
    }

    /// `[{ field, direction: "asc" | "desc" }]`
    #[wasm_bindgen(js_name = setSortSpec)]
    pub fn set_sort_spec(&self, spec: JsValue) -> Result<(), JsValue> {
        let sort: SortSpec = serde_wasm_bindgen::from_value(spec)
            .map_err(|e| JsValue::from_str(&format!("Invalid sort spec: {e}")))?;
        self.source.set_sort_spec(sort);
        Ok(())
    }

    /// `{ [field]: { type, value } }`
    #[wasm_bindgen(js_name = setFilterSpec)]
    pub fn set_filter_spec(&self, spec: JsValue) -> Result<(), JsValue> {
        let filter: FilterSpec = serde_wasm_bindgen::from_value(spec)
            .map_err(|e| JsValue::from_str(&format!("Invalid filter spec: {e}")))?;
        self.source.set_filter_spec(filter);
        Ok(())
    }

    #[wasm_bindgen(js_name = sortSpec)]
    pub fn sort_spec(&self) -> Result<JsValue, JsValue> {
        to_js(&self.source.sort_spec())
    }

    #[wasm_bindgen(js_name = filterSpec)]
    pub fn filter_spec(&self) -> Result<JsValue, JsValue> {
        to_js(&self.source.filter_spec())
    }

    pub fn refresh(&self) {
        self.source.refresh();
    }

    #[wasm_bindgen(js_name = retryFailed)]
    pub fn retry_failed(&self) -> u32 {
        u32::try_from(self.source.retry_failed()).unwrap_or(u32::MAX)
    }

    #[wasm_bindgen(js_name = purgeExpired)]
    pub fn purge_expired(&self) -> u32 {
        u32::try_from(self.source.purge_expired()).unwrap_or(u32::MAX)
    }

    /// Call `callback(event)` after every cache change, fetch result and
    /// refresh. `event.kind` names the change.
    pub fn subscribe(&self, callback: js_sys::Function) -> GridSubscription {
        let subscription = self.source.subscribe(move |event: &SourceEvent| {
            if let Ok(value) = to_js(&JsEvent::from(event)) {
                let _ = callback.call1(&JsValue::NULL, &value);
            }
        });
        GridSubscription { subscription }
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_js(&self.source.stats())
    }

    pub fn destroy(&self) {
        self.source.destroy();
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl GridSubscription {
    /// Stop receiving events. Safe to call more than once.
    pub fn unsubscribe(&self) -> bool {
        self.subscription.unsubscribe()
    }
}
