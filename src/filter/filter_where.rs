use serde_json::Value;

use super::error::FilterError;
use super::types::{Filter, SqlResult};
use crate::database::record::ID_KEY;

/// Generates parameterized WHERE clauses over a document table with the
/// columns `id uuid`, `lk bigint` and `data jsonb`.
///
/// Every parameter is a JSON value that the caller binds as `jsonb`.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    pub fn generate(filter: &Filter, starting_param_index: usize) -> Result<SqlResult, FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let query = filter_where.build(filter)?;
        Ok(SqlResult { query, params: filter_where.param_values })
    }

    fn build(&mut self, filter: &Filter) -> Result<String, FilterError> {
        match filter {
            Filter::Eq(key, value) => self.build_eq(key, value),
            Filter::In(key, values) => {
                if values.is_empty() {
                    return Ok("1=0".to_string());
                }
                let parts = values
                    .iter()
                    .map(|value| self.build_eq(key, value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }
            Filter::Missing(key) => {
                if key == ID_KEY {
                    return Ok("1=0".to_string());
                }
                let column = json_column(key)?;
                Ok(format!("({0} IS NULL OR {0} = 'null'::jsonb)", column))
            }
            Filter::And(filters) => {
                if filters.is_empty() {
                    return Ok("1=1".to_string());
                }
                let parts = filters
                    .iter()
                    .map(|filter| self.build(filter))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
        }
    }

    fn build_eq(&mut self, key: &str, value: &Value) -> Result<String, FilterError> {
        if key == ID_KEY {
            return Ok(format!("\"id\" = ({} #>> '{{}}')::uuid", self.param(value.clone())));
        }

        let column = json_column(key)?;
        if value.is_null() {
            return Ok(format!("({0} IS NULL OR {0} = 'null'::jsonb)", column));
        }

        // jsonb containment matches equal scalars and arrays containing the scalar
        Ok(format!("{} @> {}", column, self.param(value.clone())))
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

/// Column expression for a stored document key
pub fn json_column(key: &str) -> Result<String, FilterError> {
    validate_key(key)?;
    Ok(format!("\"data\" -> '{}'", key))
}

pub fn validate_key(key: &str) -> Result<(), FilterError> {
    let mut chars = key.chars();
    let valid_start = chars.next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false);
    if !valid_start || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(FilterError::InvalidKey(key.to_string()));
    }
    Ok(())
}
