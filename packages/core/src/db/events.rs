//! Tree Events
//!
//! Events published after a structural change or payload update has committed.
//! Subscribers (message publishers, search-index sync) receive them through a
//! `tokio::sync::broadcast` channel owned by the mutator; nothing is published
//! for a mutation that rolled back.

use crate::models::ForestId;
use serde::{Deserialize, Serialize};

/// Change that has been committed to a forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    /// A node was created
    #[serde(rename_all = "camelCase")]
    NodeInserted {
        forest: String,
        node_id: String,
        parent_id: Option<String>,
    },

    /// A subtree was relocated
    #[serde(rename_all = "camelCase")]
    NodeMoved {
        forest: String,
        node_id: String,
        old_parent_id: Option<String>,
        new_parent_id: Option<String>,
    },

    /// One or more nodes were removed
    #[serde(rename_all = "camelCase")]
    NodesDeleted {
        forest: String,
        node_ids: Vec<String>,
        /// Children re-attached to the deleted node's parent, if any
        reparented: Vec<String>,
    },

    /// Two siblings exchanged places
    #[serde(rename_all = "camelCase")]
    SiblingsSwapped {
        forest: String,
        first_id: String,
        second_id: String,
    },

    /// A node's payload was replaced
    #[serde(rename_all = "camelCase")]
    PayloadUpdated { forest: String, node_id: String },

    /// All positional fields were recomputed
    #[serde(rename_all = "camelCase")]
    ForestRebuilt { forest: String, node_count: usize },
}

impl TreeEvent {
    pub fn inserted(forest: &ForestId, node_id: &str, parent_id: Option<&str>) -> Self {
        Self::NodeInserted {
            forest: forest.to_string(),
            node_id: node_id.to_string(),
            parent_id: parent_id.map(str::to_string),
        }
    }

    pub fn moved(
        forest: &ForestId,
        node_id: &str,
        old_parent_id: Option<&str>,
        new_parent_id: Option<&str>,
    ) -> Self {
        Self::NodeMoved {
            forest: forest.to_string(),
            node_id: node_id.to_string(),
            old_parent_id: old_parent_id.map(str::to_string),
            new_parent_id: new_parent_id.map(str::to_string),
        }
    }

    pub fn deleted(forest: &ForestId, node_ids: Vec<String>, reparented: Vec<String>) -> Self {
        Self::NodesDeleted {
            forest: forest.to_string(),
            node_ids,
            reparented,
        }
    }

    pub fn swapped(forest: &ForestId, first_id: &str, second_id: &str) -> Self {
        Self::SiblingsSwapped {
            forest: forest.to_string(),
            first_id: first_id.to_string(),
            second_id: second_id.to_string(),
        }
    }

    pub fn payload_updated(forest: &ForestId, node_id: &str) -> Self {
        Self::PayloadUpdated {
            forest: forest.to_string(),
            node_id: node_id.to_string(),
        }
    }

    pub fn rebuilt(forest: &ForestId, node_count: usize) -> Self {
        Self::ForestRebuilt {
            forest: forest.to_string(),
            node_count,
        }
    }

    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::NodeInserted { .. } => "node:inserted",
            TreeEvent::NodeMoved { .. } => "node:moved",
            TreeEvent::NodesDeleted { .. } => "nodes:deleted",
            TreeEvent::SiblingsSwapped { .. } => "siblings:swapped",
            TreeEvent::PayloadUpdated { .. } => "payload:updated",
            TreeEvent::ForestRebuilt { .. } => "forest:rebuilt",
        }
    }

    /// Forest the event belongs to
    pub fn forest(&self) -> &str {
        match self {
            TreeEvent::NodeInserted { forest, .. }
            | TreeEvent::NodeMoved { forest, .. }
            | TreeEvent::NodesDeleted { forest, .. }
            | TreeEvent::SiblingsSwapped { forest, .. }
            | TreeEvent::PayloadUpdated { forest, .. }
            | TreeEvent::ForestRebuilt { forest, .. } => forest,
        }
    }
}
