// Validator: referenced resources must share fields with the model
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::super::storage_name;
use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::database::record::ID_KEY;
use crate::filter::Filter;
use crate::meta::Meta;
use crate::types::Operation;

/// Compares the model with the resources one of its relationships points
/// at, and requires each of them to hold the same value in the paired
/// fields.
///
/// The reference may be a to-one, optional to-one or to-many field. An
/// unset reference passes. Pairs name a field of the model and a field of
/// the target; a to-many target field matches when it contains the value.
///
/// ```ignore
/// // a post may only be filed under categories of its own blog
/// MatchingReferencesValidator::new("categories", Category::meta())
///     .matching("blog", "blog")
/// ```
#[derive(Debug)]
pub struct MatchingReferencesValidator {
    reference: String,
    target: Arc<Meta>,
    pairs: Vec<(String, String)>,
}

impl MatchingReferencesValidator {
    pub fn new(reference: &str, target: Arc<Meta>) -> Self {
        Self {
            reference: reference.to_string(),
            target,
            pairs: Vec::new(),
        }
    }

    /// Require `target_field` of every referenced resource to equal `field`
    /// of the model
    pub fn matching(mut self, field: &str, target_field: &str) -> Self {
        self.pairs.push((field.to_string(), target_field.to_string()));
        self
    }

    fn referenced_ids(&self, value: Option<&Value>) -> Result<BTreeSet<String>, CallbackError> {
        match value {
            None | Some(Value::Null) => Ok(BTreeSet::new()),
            Some(Value::String(id)) => Ok(BTreeSet::from([id.clone()])),
            Some(Value::Array(items)) => Ok(items.iter().filter_map(Value::as_str).map(str::to_string).collect()),
            Some(_) => Err(anyhow::anyhow!("field {} does not hold references", self.reference).into()),
        }
    }
}

#[async_trait]
impl Callback for MatchingReferencesValidator {
    fn name(&self) -> &str {
        "MatchingReferencesValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        matches!(ctx.operation, Operation::Create | Operation::Update)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let record = ctx.record()?;

        let ids = self.referenced_ids(record.get(&self.reference))?;
        if ids.is_empty() {
            return Ok(());
        }

        let mut filters = vec![Filter::any_of(ID_KEY, ids.iter().cloned().map(Value::String).collect())];
        for (field, target_field) in &self.pairs {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            filters.push(Filter::eq(storage_name(&self.target, target_field)?, value));
        }

        let count = ctx.session()?.count(&self.target.collection, &Filter::and(filters)).await?;
        if count != ids.len() as u64 {
            return Err(CallbackError::safe("references do not match"));
        }

        Ok(())
    }
}
