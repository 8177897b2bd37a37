//! Relationship graph domain module
//!
//! Entities, people and properties are connected by directed, typed,
//! confidence-weighted relationships stored in a single table. This module
//! holds the graph-side view of that data:
//!
//! - **NodeRef**: a `(kind, id)` key; the records themselves live elsewhere
//! - **Relationship**: an edge with provenance, confidence and validity window
//! - **RelationshipStore**: the read-only adapter the engine queries
//! - **GraphTraversal**: bounded breadth-first expansion from a seed node
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::collections::HashSet;
//! use chainrecord_core::domain::graph::{GraphTraversal, NodeRef, RelationshipType};
//!
//! let traversal = GraphTraversal::new(store);
//! let owns: HashSet<_> = [RelationshipType::Owns].into_iter().collect();
//! let subgraph = traversal.expand(NodeRef::entity(1), 2, Some(&owns)).await?;
//! println!("{}", serde_json::to_string_pretty(&subgraph.to_payload())?);
//! ```

mod memory;
mod node;
mod payload;
mod relationship;
mod store;
#[cfg(test)]
pub(crate) mod testing;
mod traversal;

pub use memory::MemoryRelationshipStore;
pub use node::{NodeKind, NodeRef};
pub use payload::{EdgePayload, GraphPayload, NodePayload};
pub use relationship::{Relationship, RelationshipType};
pub use store::{RelationshipStatistics, RelationshipStore, TraversalDirection};
pub use traversal::{GraphTraversal, MAX_TRAVERSAL_DEPTH, Subgraph};
