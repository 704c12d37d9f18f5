use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query condition over stored documents.
///
/// Keys are storage names (`_id` for the entity id). Equality against a
/// stored array matches when the array contains the value, so to-one and
/// to-many references can be queried the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[serde(rename = "$eq")]
    Eq(String, Value),
    #[serde(rename = "$in")]
    In(String, Vec<Value>),
    /// Value is absent or null
    #[serde(rename = "$missing")]
    Missing(String),
    #[serde(rename = "$and")]
    And(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Single sort key over a storage name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
