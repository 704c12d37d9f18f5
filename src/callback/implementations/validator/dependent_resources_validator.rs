// Validator: refuse deletes that would break references
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::super::storage_name;
use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::filter::Filter;
use crate::meta::{Flag, Meta};
use crate::types::Operation;

/// Refuses a Delete while other documents still reference the resource.
///
/// Dependents are declared as pairs of a model and its field that points
/// at the current model. Soft deleted dependents are ignored.
///
/// ```ignore
/// DependentResourcesValidator::new()
///     .dependent(Post::meta(), "author")
///     .dependent(Comment::meta(), "author")
/// ```
#[derive(Debug, Default)]
pub struct DependentResourcesValidator {
    dependents: Vec<(Arc<Meta>, String)>,
}

impl DependentResourcesValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dependent(mut self, meta: Arc<Meta>, field: &str) -> Self {
        self.dependents.push((meta, field.to_string()));
        self
    }
}

#[async_trait]
impl Callback for DependentResourcesValidator {
    fn name(&self) -> &str {
        "DependentResourcesValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        ctx.operation == Operation::Delete
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let id = Value::String(ctx.record()?.id().to_string());

        for (meta, field) in &self.dependents {
            let mut filters = vec![Filter::eq(storage_name(meta, field)?, id.clone())];
            if let Some(flagged) = meta.flagged(Flag::SoftDelete) {
                filters.push(Filter::missing(storage_name(meta, &flagged.name)?));
            }

            let count = ctx.session()?.count(&meta.collection, &Filter::and(filters)).await?;
            if count != 0 {
                return Err(CallbackError::safe("resource has dependent resources"));
            }
        }

        Ok(())
    }
}
