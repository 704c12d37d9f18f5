// Ordered execution of callback lists
use std::sync::Arc;
use std::time::Instant;

use super::traits::{Callback, Stage};
use crate::context::Context;
use crate::error::Error;

/// Run the matching callbacks of a stage in registration order.
///
/// The first failure stops the list and is classified for the stage.
pub async fn run_callbacks(stage: Stage, callbacks: &[Arc<dyn Callback>], ctx: &mut Context) -> Result<(), Error> {
    if callbacks.is_empty() {
        return Ok(());
    }

    tracing::debug!("Running {} {} callbacks for {}", callbacks.len(), stage, ctx.operation);

    for callback in callbacks {
        if !callback.matches(ctx) {
            tracing::trace!("Callback {} skipped for {}", callback.name(), ctx.operation);
            continue;
        }

        let started = Instant::now();
        let result = callback.run(ctx).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                tracing::debug!("Callback {} ({}) completed in {:?}", callback.name(), stage, elapsed);
            }
            Err(err) => {
                tracing::warn!("Callback {} ({}) failed in {:?}: {}", callback.name(), stage, elapsed, err);
                return Err(err.into_error(stage));
            }
        }
    }

    Ok(())
}
