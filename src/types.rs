/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Operations a controller can execute for a request.
/// Derived once from the request intent and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    List,
    Find,
    Create,
    Update,
    Delete,
    CollectionAction,
    ResourceAction,
}

impl Operation {
    /// List and Find only read from the store
    pub fn is_read(&self) -> bool {
        matches!(self, Operation::List | Operation::Find)
    }

    /// Create, Update and Delete modify the store
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }

    /// Actions run without an implicit transaction
    pub fn is_action(&self) -> bool {
        matches!(self, Operation::CollectionAction | Operation::ResourceAction)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Find => "find",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::CollectionAction => "collection-action",
            Operation::ResourceAction => "resource-action",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_operations() {
        assert!(Operation::List.is_read());
        assert!(Operation::Find.is_read());
        assert!(!Operation::Create.is_read());

        assert!(Operation::Delete.is_write());
        assert!(!Operation::ResourceAction.is_write());

        assert!(Operation::CollectionAction.is_action());
        assert!(!Operation::Update.is_action());
    }
}
