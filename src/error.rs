//! Structured error types for gridwindow.
//!
//! Fetch failures are recorded per block and surfaced through observers; the
//! read path (`get_rows`/`get_row`) never returns an error.

/// All errors that can occur while configuring or feeding a data source.
#[derive(Debug, thiserror::Error)]
pub enum GridWindowError {
    /// The remote read rejected or failed.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The remote read did not resolve within the configured fetch timeout.
    #[error("Fetch of rows {start_row}..{end_row} timed out after {after_ms}ms")]
    Timeout {
        start_row: u64,
        end_row: u64,
        after_ms: u64,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A native data source was constructed outside a Tokio runtime.
    #[error("No async runtime available to run block fetches")]
    NoRuntime,

    /// JSON (de)serialization error.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for string errors raised by fetchers.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GridWindowError>;

impl From<String> for GridWindowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for GridWindowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

#[cfg(target_arch = "wasm32")]
impl From<GridWindowError> for wasm_bindgen::JsValue {
    fn from(e: GridWindowError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
