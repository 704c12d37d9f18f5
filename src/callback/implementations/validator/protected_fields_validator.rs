// Validator: fields that cannot be changed by clients
use async_trait::async_trait;
use serde_json::Value;

use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::types::Operation;

/// Rejects changes to protected fields.
///
/// On Create a protected field must hold its fixed default, unless it was
/// declared without one. On Update it must equal the stored value.
///
/// ```ignore
/// ProtectedFieldsValidator::new()
///     .field("link", "")             // default is fixed and cannot be changed
///     .field_without_default("title") // can only be set during Create
/// ```
#[derive(Debug, Default)]
pub struct ProtectedFieldsValidator {
    fields: Vec<(String, Option<Value>)>,
}

impl ProtectedFieldsValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.fields.push((name.to_string(), Some(default.into())));
        self
    }

    pub fn field_without_default(mut self, name: &str) -> Self {
        self.fields.push((name.to_string(), None));
        self
    }
}

#[async_trait]
impl Callback for ProtectedFieldsValidator {
    fn name(&self) -> &str {
        "ProtectedFieldsValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        matches!(ctx.operation, Operation::Create | Operation::Update)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let record = ctx.record()?;

        for (name, default) in &self.fields {
            let changed = match ctx.operation {
                Operation::Create => match default {
                    Some(default) => record.get(name) != Some(default),
                    None => false,
                },
                _ => {
                    let original = ctx
                        .original
                        .as_ref()
                        .ok_or_else(|| anyhow::anyhow!("original model not loaded"))?;
                    record.changed(original, name)
                }
            };

            if changed {
                return Err(CallbackError::safe(format!("field {} is protected", name)));
            }
        }

        Ok(())
    }
}
