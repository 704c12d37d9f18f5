use super::error::FilterError;
use super::filter_where::json_column;
use super::types::{Sort, SortDirection};
use crate::database::record::ID_KEY;

pub struct FilterOrder;

impl FilterOrder {
    /// Parse a signed sort key such as "title" or "-created".
    pub fn parse(key: &str) -> Result<Sort, FilterError> {
        let (name, direction) = match key.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (key, SortDirection::Asc),
        };

        if name.is_empty() {
            return Err(FilterError::InvalidSort(key.to_string()));
        }

        Ok(Sort { key: name.to_string(), direction })
    }

    pub fn generate(sorting: &[Sort]) -> Result<String, FilterError> {
        if sorting.is_empty() {
            return Ok(String::new());
        }

        let parts = sorting
            .iter()
            .map(|sort| {
                let column = if sort.key == ID_KEY { "\"id\"".to_string() } else { json_column(&sort.key)? };
                Ok(format!("{} {}", column, sort.direction.to_sql()))
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}
