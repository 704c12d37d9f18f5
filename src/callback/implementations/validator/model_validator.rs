// Validator: typed model validation
use async_trait::async_trait;
use std::marker::PhantomData;

use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::meta::Model;
use crate::types::Operation;

/// Implemented by typed models that check their own invariants.
pub trait Validate {
    /// Return a safe error to reject the model with a bad request.
    fn validate(&self) -> Result<(), CallbackError>;
}

/// Decodes the record into `T` and runs `T::validate` on Create and Update.
pub struct ModelValidator<T> {
    _model: PhantomData<fn() -> T>,
}

impl<T: Model + Validate> ModelValidator<T> {
    pub fn new() -> Self {
        Self { _model: PhantomData }
    }
}

impl<T: Model + Validate> Default for ModelValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Model + Validate + 'static> Callback for ModelValidator<T> {
    fn name(&self) -> &str {
        "ModelValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        matches!(ctx.operation, Operation::Create | Operation::Update)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        let model: T = ctx.record()?.decode()?;
        model.validate()
    }
}
