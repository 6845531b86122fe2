use serde::{Deserialize, Serialize};

use super::{FilterSpec, Row, SortSpec};

/// Arguments of one remote block read: a half-open row range plus the query.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    pub start_row: u64,
    pub end_row: u64,
    #[serde(default)]
    pub sort_spec: SortSpec,
    #[serde(default)]
    pub filter_spec: FilterSpec,
}

impl BlockRequest {
    /// Number of rows the request asks for.
    pub fn len(&self) -> u64 {
        self.end_row.saturating_sub(self.start_row)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one remote block read
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    /// Rows in query order, starting at the request's `start_row`
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Total rows matching the query, when the server knows it
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_rows: Option<u64>,
    /// End-of-data marker: no row exists at or after this index
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_row: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{FilterCondition, SortKey};

    #[test]
    fn test_request_serializes_camel_case() {
        let mut filter = FilterSpec::new();
        filter.insert("city".into(), FilterCondition::new("equals", "Oslo"));
        let request = BlockRequest {
            start_row: 100,
            end_row: 200,
            sort_spec: vec![SortKey::asc("name")],
            filter_spec: filter,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["startRow"], 100);
        assert_eq!(json["endRow"], 200);
        assert_eq!(json["sortSpec"][0]["field"], "name");
        assert_eq!(json["filterSpec"]["city"]["type"], "equals");
        assert_eq!(request.len(), 100);
    }

    #[test]
    fn test_response_optional_fields() {
        let response: BlockResponse = serde_json::from_str(r#"{"rows":[{"id":1}]}"#).unwrap();
        assert_eq!(response.rows.len(), 1);
        assert_eq!(response.total_rows, None);
        assert_eq!(response.last_row, None);

        let response: BlockResponse =
            serde_json::from_str(r#"{"rows":[],"totalRows":5,"lastRow":5}"#).unwrap();
        assert_eq!(response.total_rows, Some(5));
        assert_eq!(response.last_row, Some(5));
    }
}
