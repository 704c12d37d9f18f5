// Callback system for the controller pipeline
//
// Callbacks are registered per stage on a controller and run in order at
// fixed points of every operation: authorizers, validators, decorators and
// notifiers. Actions are custom endpoints with their own handler.

pub mod action;
pub mod error;
pub mod implementations;
pub mod pipeline;
pub mod traits;

pub use action::*;
pub use error::*;
pub use implementations::*;
pub use pipeline::*;
pub use traits::*;
