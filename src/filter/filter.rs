use serde_json::{Map, Value};
use std::cmp::Ordering;
use uuid::Uuid;

use super::types::{Filter, Sort, SortDirection};
use crate::database::record::ID_KEY;

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(key.into(), value.into())
    }

    pub fn any_of(key: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In(key.into(), values)
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Filter::Missing(key.into())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Match a single entity by id
    pub fn id(id: Uuid) -> Self {
        Filter::Eq(ID_KEY.to_string(), Value::String(id.to_string()))
    }

    /// Match any of the given entity ids
    pub fn ids(ids: &[Uuid]) -> Self {
        Filter::In(ID_KEY.to_string(), ids.iter().map(|id| Value::String(id.to_string())).collect())
    }

    /// Evaluate the condition against a stored document
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        match self {
            Filter::Eq(key, value) => value_matches(document.get(key), value),
            Filter::In(key, values) => values.iter().any(|value| value_matches(document.get(key), value)),
            Filter::Missing(key) => document.get(key).map(Value::is_null).unwrap_or(true),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(document)),
        }
    }
}

fn value_matches(stored: Option<&Value>, expected: &Value) -> bool {
    match stored {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(stored) => stored == expected,
    }
}

impl Sort {
    pub fn asc(key: impl Into<String>) -> Self {
        Self { key: key.into(), direction: SortDirection::Asc }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self { key: key.into(), direction: SortDirection::Desc }
    }
}

/// Order two documents by a list of sort keys
pub fn compare_documents(a: &Map<String, Value>, b: &Map<String, Value>, sorting: &[Sort]) -> Ordering {
    for sort in sorting {
        let ordering = compare_values(
            a.get(&sort.key).unwrap_or(&Value::Null),
            b.get(&sort.key).unwrap_or(&Value::Null),
        );
        let ordering = match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (a, b) in a.iter().zip(b.iter()) {
                let ordering = compare_values(a, b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn matches_scalars_and_arrays() {
        let document = doc(json!({"title": "Hello", "tags": ["a", "b"], "deleted": null}));

        assert!(Filter::eq("title", "Hello").matches(&document));
        assert!(!Filter::eq("title", "World").matches(&document));
        assert!(Filter::eq("tags", "b").matches(&document));
        assert!(!Filter::eq("tags", "c").matches(&document));
        assert!(Filter::any_of("title", vec![json!("World"), json!("Hello")]).matches(&document));
        assert!(!Filter::any_of("title", vec![]).matches(&document));
    }

    #[test]
    fn matches_missing_values() {
        let document = doc(json!({"deleted": null, "removed": "2024-01-01T00:00:00Z"}));

        assert!(Filter::missing("deleted").matches(&document));
        assert!(Filter::missing("absent").matches(&document));
        assert!(!Filter::missing("removed").matches(&document));
        assert!(Filter::eq("absent", Value::Null).matches(&document));
    }

    #[test]
    fn combines_conditions() {
        let id = Uuid::new_v4();
        let document = doc(json!({"_id": id.to_string(), "deleted": null}));

        assert!(Filter::and(vec![]).matches(&document));
        assert!(Filter::and(vec![Filter::id(id), Filter::missing("deleted")]).matches(&document));
        assert!(!Filter::and(vec![Filter::id(Uuid::new_v4()), Filter::missing("deleted")]).matches(&document));
        assert!(Filter::ids(&[Uuid::new_v4(), id]).matches(&document));
    }

    #[test]
    fn sorts_documents() {
        let a = doc(json!({"title": "a", "stars": 2}));
        let b = doc(json!({"title": "b", "stars": 2}));
        let c = doc(json!({"title": "c"}));

        assert_eq!(compare_documents(&a, &b, &[Sort::asc("title")]), Ordering::Less);
        assert_eq!(compare_documents(&a, &b, &[Sort::desc("title")]), Ordering::Greater);
        assert_eq!(compare_documents(&a, &b, &[Sort::asc("stars"), Sort::desc("title")]), Ordering::Greater);
        assert_eq!(compare_documents(&c, &a, &[Sort::asc("stars")]), Ordering::Less);
    }
}
