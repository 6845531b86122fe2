use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort order for one field
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One entry of a sort spec
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    /// Field to sort by
    pub field: String,
    /// Direction for this field
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Ordered list of sort keys; earlier keys take precedence.
pub type SortSpec = Vec<SortKey>;

/// Predicate description for one filtered field.
///
/// `kind` is passed through to the fetcher untouched; the in-memory fetcher
/// understands the names in [`FilterOperator`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FilterCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// The well-known operator named by `kind`, if any.
    pub fn operator(&self) -> Option<FilterOperator> {
        FilterOperator::parse(&self.kind)
    }
}

/// Field name to predicate. Ordered so requests serialize deterministically.
pub type FilterSpec = BTreeMap<String, FilterCondition>;

/// Filter predicates with a conventional name
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEqual,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// Value must be one of an array of candidates
    Set,
}

impl FilterOperator {
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "equals" => Self::Equals,
            "notEqual" => Self::NotEqual,
            "contains" => Self::Contains,
            "startsWith" => Self::StartsWith,
            "endsWith" => Self::EndsWith,
            "greaterThan" => Self::GreaterThan,
            "greaterThanOrEqual" => Self::GreaterThanOrEqual,
            "lessThan" => Self::LessThan,
            "lessThanOrEqual" => Self::LessThanOrEqual,
            "set" => Self::Set,
            _ => return None,
        };
        Some(op)
    }
}

/// The sort and filter currently applied to a data source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub sort: SortSpec,
    pub filter: FilterSpec,
}
