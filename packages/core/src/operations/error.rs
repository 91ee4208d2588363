//! Error types for tree operations
//!
//! Structural precondition failures (`NotFound`, `InvalidParent`,
//! `InvalidSibling`, `CyclicMove`, `NotSiblings`, `ConflictingBatch`) are
//! detected before any write and leave the forest untouched. Storage failures
//! roll the transaction back and surface as `Storage` with the operation name
//! attached.
//!
//! Messages stay entity-neutral; entity adapters translate them into
//! domain wording.
//!
//! # Examples
//!
//! ```rust
//! use hierarchy_core::operations::TreeError;
//!
//! let err = TreeError::cyclic_move("org-1", "org-7");
//! assert_eq!(
//!     err.to_string(),
//!     "Cannot move node 'org-1' under 'org-7': target lies inside its own subtree"
//! );
//! ```

use crate::models::Violation;
use thiserror::Error;

/// Errors raised by the tree engine
#[derive(Error, Debug)]
pub enum TreeError {
    /// Referenced node does not exist in this forest
    #[error("Node '{node_id}' does not exist")]
    NotFound { node_id: String },

    /// Requested parent does not exist in this forest
    #[error("Invalid parent: node '{parent_id}' does not exist")]
    InvalidParent { parent_id: String },

    /// Anchor sibling exists but is not a child of the requested parent
    #[error("Invalid sibling: node '{sibling_id}' is not a child of {parent}")]
    InvalidSibling { sibling_id: String, parent: String },

    /// Target parent is the node itself or one of its descendants
    #[error("Cannot move node '{node_id}' under '{target_id}': target lies inside its own subtree")]
    CyclicMove { node_id: String, target_id: String },

    /// Swap requested across different parents
    #[error("Nodes '{first_id}' and '{second_id}' are not siblings")]
    NotSiblings { first_id: String, second_id: String },

    /// Forest lock could not be obtained before the deadline
    #[error("Forest '{forest}' is busy: lock not acquired within {waited_ms}ms")]
    Busy { forest: String, waited_ms: u64 },

    /// Deadline passed while the operation was running; nothing was committed
    #[error("Operation '{operation}' timed out")]
    Timeout { operation: String },

    /// Long-running scan was cancelled; nothing was committed
    #[error("Operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    /// Forest breaks one or more invariants
    #[error("Forest is corrupted: {} violation(s)", violations.len())]
    Corrupted { violations: Vec<Violation> },

    /// Two specs in one batch cannot be applied in a well-defined order
    #[error("Conflicting batch: {reason}")]
    ConflictingBatch { reason: String },

    /// Caller-supplied id is already taken
    #[error("Node '{node_id}' already exists")]
    DuplicateId { node_id: String },

    /// Forest name is not a usable table identifier
    #[error("Invalid forest name: '{name}'")]
    InvalidForest { name: String },

    /// Payload could not be (de)serialized
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Storage layer failed; the transaction was rolled back
    #[error("Storage error during {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TreeError {
    /// Create a NotFound error
    pub fn not_found(node_id: impl Into<String>) -> Self {
        Self::NotFound {
            node_id: node_id.into(),
        }
    }

    /// Create an InvalidParent error
    pub fn invalid_parent(parent_id: impl Into<String>) -> Self {
        Self::InvalidParent {
            parent_id: parent_id.into(),
        }
    }

    /// Create an InvalidSibling error; `parent_id = None` means "the roots"
    pub fn invalid_sibling(sibling_id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self::InvalidSibling {
            sibling_id: sibling_id.into(),
            parent: match parent_id {
                Some(id) => format!("'{}'", id),
                None => "the forest root".to_string(),
            },
        }
    }

    /// Create a CyclicMove error
    pub fn cyclic_move(node_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::CyclicMove {
            node_id: node_id.into(),
            target_id: target_id.into(),
        }
    }

    /// Create a NotSiblings error
    pub fn not_siblings(first_id: impl Into<String>, second_id: impl Into<String>) -> Self {
        Self::NotSiblings {
            first_id: first_id.into(),
            second_id: second_id.into(),
        }
    }

    /// Create a Busy error
    pub fn busy(forest: impl Into<String>, waited_ms: u64) -> Self {
        Self::Busy {
            forest: forest.into(),
            waited_ms,
        }
    }

    /// Create a Timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a Cancelled error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a ConflictingBatch error
    pub fn conflicting_batch(reason: impl Into<String>) -> Self {
        Self::ConflictingBatch {
            reason: reason.into(),
        }
    }

    /// Create a DuplicateId error
    pub fn duplicate_id(node_id: impl Into<String>) -> Self {
        Self::DuplicateId {
            node_id: node_id.into(),
        }
    }

    /// Create an InvalidForest error
    pub fn invalid_forest(name: impl Into<String>) -> Self {
        Self::InvalidForest { name: name.into() }
    }

    /// Wrap a storage failure with the operation it interrupted
    pub fn storage(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// True for failures detected before any write was attempted
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            TreeError::NotFound { .. }
                | TreeError::InvalidParent { .. }
                | TreeError::InvalidSibling { .. }
                | TreeError::CyclicMove { .. }
                | TreeError::NotSiblings { .. }
                | TreeError::ConflictingBatch { .. }
                | TreeError::DuplicateId { .. }
        )
    }
}

/// Result alias for tree operations
pub type TreeResult<T> = Result<T, TreeError>;
