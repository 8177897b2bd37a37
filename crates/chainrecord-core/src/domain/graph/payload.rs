//! Response rendering for graph expansions
//!
//! Callers serving a "relationship graph" query render a [`Subgraph`] into
//! this shape: nodes keyed as `"{kind}:{id}"` and a flat edge list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::node::NodeKind;
use super::traversal::Subgraph;

/// Serializable view of a subgraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub seed: String,
    pub max_depth: u32,
    pub nodes: BTreeMap<String, NodePayload>,
    pub edges: Vec<EdgePayload>,
    pub total_nodes: usize,
    pub total_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub id: i64,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePayload {
    pub from: String,
    pub to: String,
    pub relationship: String,
    pub confidence: f64,
    pub source: String,
}

impl Subgraph {
    /// Render into the response payload shape
    pub fn to_payload(&self) -> GraphPayload {
        let nodes = self
            .nodes
            .iter()
            .map(|(node, depth)| {
                (
                    node.key(),
                    NodePayload {
                        kind: node.kind,
                        id: node.id,
                        depth: *depth,
                    },
                )
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|rel| EdgePayload {
                from: rel.from.key(),
                to: rel.to.key(),
                relationship: rel.rel_type.as_str().to_string(),
                confidence: rel.confidence,
                source: rel.source_system.clone(),
            })
            .collect();

        GraphPayload {
            seed: self.seed.key(),
            max_depth: self.max_depth,
            nodes,
            edges,
            total_nodes: self.node_count(),
            total_edges: self.edge_count(),
        }
    }
}
