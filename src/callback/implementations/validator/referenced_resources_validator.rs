// Validator: referenced resources must exist
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::database::record::ID_KEY;
use crate::filter::Filter;
use crate::meta::Meta;
use crate::types::Operation;

/// Makes sure every id referenced by the listed relationship fields exists
/// in the collection of the referenced model. Supports to-one, optional
/// to-one and to-many fields.
///
/// ```ignore
/// ReferencedResourcesValidator::new()
///     .reference("post", Post::meta())
///     .reference("author", User::meta())
/// ```
#[derive(Debug, Default)]
pub struct ReferencedResourcesValidator {
    references: Vec<(String, Arc<Meta>)>,
}

impl ReferencedResourcesValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(mut self, field: &str, meta: Arc<Meta>) -> Self {
        self.references.push((field.to_string(), meta));
        self
    }
}

#[async_trait]
impl Callback for ReferencedResourcesValidator {
    fn name(&self) -> &str {
        "ReferencedResourcesValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        matches!(ctx.operation, Operation::Create | Operation::Update)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        for (field, meta) in &self.references {
            let value = ctx.record()?.get(field).cloned().unwrap_or(Value::Null);

            match value {
                Value::Null => continue,
                Value::Array(items) => {
                    let ids: BTreeSet<String> = items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    if ids.is_empty() {
                        continue;
                    }

                    let filter = Filter::any_of(ID_KEY, ids.iter().cloned().map(Value::String).collect());
                    let count = ctx.session()?.count(&meta.collection, &filter).await?;
                    if count != ids.len() as u64 {
                        return Err(CallbackError::safe(format!("missing references for field {}", field)));
                    }
                }
                id => {
                    let count = ctx.session()?.count(&meta.collection, &Filter::eq(ID_KEY, id)).await?;
                    if count != 1 {
                        return Err(CallbackError::safe(format!("missing reference for field {}", field)));
                    }
                }
            }
        }

        Ok(())
    }
}
