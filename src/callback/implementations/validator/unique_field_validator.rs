// Validator: uniqueness of a field value
use async_trait::async_trait;
use serde_json::Value;

use super::super::storage_name;
use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::filter::Filter;
use crate::meta::Flag;
use crate::types::Operation;

/// Ensures a field stays unique among documents that share the values of
/// the scope fields.
///
/// The check is skipped when the value equals the zero value, and on
/// Update when the value did not change. Soft deleted documents are ignored.
///
/// ```ignore
/// UniqueFieldValidator::new("name", "").scope("creator")
/// ```
#[derive(Debug)]
pub struct UniqueFieldValidator {
    field: String,
    zero: Option<Value>,
    scope: Vec<String>,
}

impl UniqueFieldValidator {
    pub fn new(field: &str, zero: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            zero: Some(zero.into()),
            scope: Vec::new(),
        }
    }

    /// Check every value, including zero values
    pub fn without_zero(field: &str) -> Self {
        Self {
            field: field.to_string(),
            zero: None,
            scope: Vec::new(),
        }
    }

    pub fn scope(mut self, field: &str) -> Self {
        self.scope.push(field.to_string());
        self
    }
}

#[async_trait]
impl Callback for UniqueFieldValidator {
    fn name(&self) -> &str {
        "UniqueFieldValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        matches!(ctx.operation, Operation::Create | Operation::Update)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let record = ctx.record()?;

        if ctx.operation == Operation::Update {
            if let Some(original) = &ctx.original {
                if !record.changed(original, &self.field) {
                    return Ok(());
                }
            }
        }

        let value = record.get(&self.field).cloned().unwrap_or(Value::Null);
        if self.zero.as_ref() == Some(&value) {
            return Ok(());
        }

        let meta = record.meta().clone();
        let mut filters = vec![Filter::eq(storage_name(&meta, &self.field)?, value)];
        for field in &self.scope {
            let scoped = record.get(field).cloned().unwrap_or(Value::Null);
            filters.push(Filter::eq(storage_name(&meta, field)?, scoped));
        }
        if let Some(field) = meta.flagged(Flag::SoftDelete) {
            filters.push(Filter::missing(storage_name(&meta, &field.name)?));
        }

        let count = ctx.session()?.count(&meta.collection, &Filter::and(filters)).await?;
        if count != 0 {
            return Err(CallbackError::safe(format!("attribute {} is not unique", self.field)));
        }

        Ok(())
    }
}
