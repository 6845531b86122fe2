//! Row records and loading placeholders.

use serde_json::{Map, Value};

/// An opaque row record: field name to JSON value.
///
/// Every row carries an `id` field that is unique within the full dataset.
pub type Row = Map<String, Value>;

/// Field holding a row's identity.
pub const ID_FIELD: &str = "id";

/// Field set to `true` on placeholder rows.
pub const LOADING_FIELD: &str = "_loading";

/// Build the placeholder returned for a row whose block is not loaded yet.
///
/// The result is `{ "id": "loading-<row_index>", "_loading": true }`.
pub fn placeholder_row(row_index: u64) -> Row {
    let mut row = Map::with_capacity(2);
    row.insert(
        ID_FIELD.to_string(),
        Value::String(format!("loading-{row_index}")),
    );
    row.insert(LOADING_FIELD.to_string(), Value::Bool(true));
    row
}

/// Whether a row is a loading placeholder.
pub fn is_placeholder(row: &Row) -> bool {
    matches!(row.get(LOADING_FIELD), Some(Value::Bool(true)))
}

/// The row's `id` value, if present.
pub fn row_id(row: &Row) -> Option<&Value> {
    row.get(ID_FIELD)
}
