// Validator: created and updated timestamps
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::meta::Flag;
use crate::types::Operation;

/// Sets the fields flagged `CreatedTimestamp` and `UpdatedTimestamp`.
///
/// The created timestamp is set on Create and backfilled on Update when it
/// is missing. The updated timestamp is set on every Create and Update.
#[derive(Debug, Default)]
pub struct TimestampValidator;

#[async_trait]
impl Callback for TimestampValidator {
    fn name(&self) -> &str {
        "TimestampValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        matches!(ctx.operation, Operation::Create | Operation::Update)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let operation = ctx.operation;
        let record = ctx.record_mut()?;
        let meta = record.meta().clone();

        if let Some(field) = meta.flagged(Flag::CreatedTimestamp) {
            let missing = record.get(&field.name).map(Value::is_null).unwrap_or(true);
            if operation == Operation::Create || missing {
                record.set(&field.name, now.clone())?;
            }
        }

        if let Some(field) = meta.flagged(Flag::UpdatedTimestamp) {
            record.set(&field.name, now)?;
        }

        Ok(())
    }
}
