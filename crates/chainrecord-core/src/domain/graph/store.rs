//! Store adapter trait for relationship lookups
//!
//! The traversal engine and the scoring context builder only ever read the
//! graph through this trait. Implementations decide where the edges live
//! (SQLite, in-memory arena, ...). All reads are point-in-time; no locking is
//! implied across several calls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::node::NodeRef;
use super::relationship::{Relationship, RelationshipType};

/// Direction for edge lookups relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Edges where the node is the source
    Outgoing,
    /// Edges where the node is the target
    Incoming,
    /// Edges in both directions
    Both,
}

/// Relationship counts grouped for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipStatistics {
    pub total: u64,
    pub active: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
}

/// Read-only access to the relationship graph
///
/// An unknown node is not an error: it simply has no edges.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Active edges incident to `node` as of `as_of`, optionally filtered by type
    async fn incident_edges(
        &self,
        node: &NodeRef,
        direction: TraversalDirection,
        rel_type: Option<RelationshipType>,
        as_of: NaiveDate,
    ) -> Result<Vec<Relationship>>;

    /// Number of distinct entity nodes (other than `excluding`) holding an
    /// active `rel_type` edge with `far_node`, in either direction
    async fn count_entities_sharing(
        &self,
        rel_type: RelationshipType,
        far_node: &NodeRef,
        excluding: &NodeRef,
        as_of: NaiveDate,
    ) -> Result<u64>;

    /// Active edges where `node` is the source
    async fn outgoing(
        &self,
        node: &NodeRef,
        rel_type: Option<RelationshipType>,
        as_of: NaiveDate,
    ) -> Result<Vec<Relationship>> {
        self.incident_edges(node, TraversalDirection::Outgoing, rel_type, as_of)
            .await
    }

    /// Active edges where `node` is the target
    async fn incoming(
        &self,
        node: &NodeRef,
        rel_type: Option<RelationshipType>,
        as_of: NaiveDate,
    ) -> Result<Vec<Relationship>> {
        self.incident_edges(node, TraversalDirection::Incoming, rel_type, as_of)
            .await
    }
}
