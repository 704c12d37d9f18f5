// Built-in callbacks organized by the stage they are meant for

// Authorizers
#[path = "authorizer/basic_authorizer.rs"]
pub mod basic_authorizer;

// Validators
#[path = "validator/dependent_resources_validator.rs"]
pub mod dependent_resources_validator;
#[path = "validator/matching_references_validator.rs"]
pub mod matching_references_validator;
#[path = "validator/model_validator.rs"]
pub mod model_validator;
#[path = "validator/protected_fields_validator.rs"]
pub mod protected_fields_validator;
#[path = "validator/referenced_resources_validator.rs"]
pub mod referenced_resources_validator;
#[path = "validator/relationship_validator.rs"]
pub mod relationship_validator;
#[path = "validator/timestamp_validator.rs"]
pub mod timestamp_validator;
#[path = "validator/unique_field_validator.rs"]
pub mod unique_field_validator;

pub use basic_authorizer::*;
pub use dependent_resources_validator::*;
pub use matching_references_validator::*;
pub use model_validator::*;
pub use protected_fields_validator::*;
pub use referenced_resources_validator::*;
pub use relationship_validator::*;
pub use timestamp_validator::*;
pub use unique_field_validator::*;

use crate::callback::CallbackError;
use crate::meta::Meta;

/// Storage name of a stored field
pub(crate) fn storage_name(meta: &Meta, field: &str) -> Result<String, CallbackError> {
    meta.field(field)
        .and_then(|f| f.storage_name.clone())
        .ok_or_else(|| anyhow::anyhow!("model {} has no stored field {}", meta.name, field).into())
}
