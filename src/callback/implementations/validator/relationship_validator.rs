// Validator: keep all relationships of a model intact
use async_trait::async_trait;
use std::sync::Arc;

use super::dependent_resources_validator::DependentResourcesValidator;
use super::referenced_resources_validator::ReferencedResourcesValidator;
use crate::callback::{Callback, CallbackError};
use crate::context::Context;
use crate::controller::ConfigError;
use crate::meta::Meta;

/// Combines a `DependentResourcesValidator` and a
/// `ReferencedResourcesValidator` derived from the relationships of a model.
///
/// Stored relationships (to-one, to-many) must reference existing
/// resources. Inverse relationships (has-one, has-many) block deletes while
/// related resources still point back. Related models are looked up by
/// resource type in `catalog`.
///
/// ```ignore
/// let catalog = [User::meta(), Post::meta(), Comment::meta()];
/// let posts = Controller::new(Post::meta())
///     .validator(RelationshipValidator::new(&Post::meta(), &catalog, &[])?);
/// ```
#[derive(Debug)]
pub struct RelationshipValidator {
    dependents: DependentResourcesValidator,
    references: ReferencedResourcesValidator,
}

impl RelationshipValidator {
    /// Derive the validators, skipping the fields named in `excluded`
    pub fn new(meta: &Meta, catalog: &[Arc<Meta>], excluded: &[&str]) -> Result<Self, ConfigError> {
        let mut dependents = DependentResourcesValidator::new();
        let mut references = ReferencedResourcesValidator::new();

        for field in meta.relationships() {
            let Some(rel) = &field.relationship else {
                continue;
            };
            if excluded.contains(&field.name.as_str()) {
                continue;
            }

            let related = catalog
                .iter()
                .find(|candidate| candidate.plural_name == rel.related_type)
                .ok_or_else(|| ConfigError::MissingRelatedController {
                    model: meta.name.clone(),
                    related: rel.related_type.clone(),
                })?;

            match rel.cardinality.inverse() {
                Some(inverse) => {
                    let back = related
                        .relationship(inverse)
                        .filter(|back| back.relationship.as_ref().is_some_and(|r| r.cardinality.is_stored()))
                        .ok_or_else(|| ConfigError::MissingInverse {
                            model: meta.name.clone(),
                            field: field.name.clone(),
                            inverse: inverse.to_string(),
                            related: rel.related_type.clone(),
                        })?;
                    dependents = dependents.dependent(related.clone(), &back.name);
                }
                None => references = references.reference(&field.name, related.clone()),
            }
        }

        Ok(Self { dependents, references })
    }
}

#[async_trait]
impl Callback for RelationshipValidator {
    fn name(&self) -> &str {
        "RelationshipValidator"
    }

    fn matches(&self, ctx: &Context) -> bool {
        self.dependents.matches(ctx) || self.references.matches(ctx)
    }

    async fn run(&self, ctx: &mut Context) -> Result<(), CallbackError> {
        if self.dependents.matches(ctx) {
            self.dependents.run(ctx).await?;
        }
        if self.references.matches(ctx) {
            self.references.run(ctx).await?;
        }
        Ok(())
    }
}
