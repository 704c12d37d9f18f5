use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid sort key: {0}")]
    InvalidSort(String),
}
