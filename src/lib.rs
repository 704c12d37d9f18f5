pub mod callback;
pub mod config;
pub mod context;
pub mod controller;
pub mod database;
pub mod error;
pub mod filter;
pub mod group;
pub mod jsonapi;
pub mod meta;
pub mod types;

pub use callback::{callback, Action, Callback, CallbackError, Matcher, Stage};
pub use context::Context;
pub use controller::{ConfigError, Controller};
pub use error::Error;
pub use group::{Group, Incoming};
pub use meta::{Kind, Meta, Model};
pub use types::Operation;
