//! Bounded breadth-first expansion of the relationship graph
//!
//! Starting from one seed node, the engine walks active edges in both
//! directions up to a fixed number of hops. Each node is enqueued at most once
//! and keeps the depth at which it was first reached, so cycles terminate and
//! depths are shortest-path depths.
//!
//! Only edges that lead from layer `d` into layer `d + 1` are reported: the
//! edge that first discovered a node plus any other edge reaching that same
//! node from the previous layer. Edges between nodes already placed at equal
//! or shallower depths are left out to keep the result bounded.
//!
//! Ordering is deterministic: frontier nodes are processed in enqueue order,
//! and for each node the outgoing edges are examined before the incoming ones,
//! each group sorted by descending confidence.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::error::{Error, Result};

use super::node::NodeRef;
use super::relationship::{Relationship, RelationshipType};
use super::store::RelationshipStore;

/// Largest depth `expand` accepts
pub const MAX_TRAVERSAL_DEPTH: u32 = 5;

/// Result of a bounded expansion
#[derive(Debug, Clone)]
pub struct Subgraph {
    /// Node the expansion started from
    pub seed: NodeRef,
    /// Depth bound the expansion ran with
    pub max_depth: u32,
    /// Every reached node with its minimum hop count from the seed
    pub nodes: BTreeMap<NodeRef, u32>,
    /// Deduplicated edges used to reach nodes, in discovery order
    pub edges: Vec<Relationship>,
}

impl Subgraph {
    fn seed_only(seed: NodeRef, max_depth: u32) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(seed, 0);
        Self {
            seed,
            max_depth,
            nodes,
            edges: Vec::new(),
        }
    }

    /// Depth at which `node` was reached, if it was
    pub fn depth_of(&self, node: &NodeRef) -> Option<u32> {
        self.nodes.get(node).copied()
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes found at exactly `depth` hops, in key order
    pub fn nodes_at_depth(&self, depth: u32) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|(_, d)| **d == depth)
            .map(|(n, _)| *n)
            .collect()
    }
}

/// Graph traversal engine over a relationship store
pub struct GraphTraversal<S: RelationshipStore> {
    store: Arc<S>,
}

impl<S: RelationshipStore> Clone for GraphTraversal<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RelationshipStore> GraphTraversal<S> {
    /// Create a new traversal engine
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Expand from `seed` using today's date to decide which edges are active
    pub async fn expand(
        &self,
        seed: NodeRef,
        max_depth: u32,
        allowed_rel_types: Option<&HashSet<RelationshipType>>,
    ) -> Result<Subgraph> {
        self.expand_as_of(seed, max_depth, allowed_rel_types, Utc::now().date_naive())
            .await
    }

    /// Expand from `seed` treating `as_of` as the evaluation date
    pub async fn expand_as_of(
        &self,
        seed: NodeRef,
        max_depth: u32,
        allowed_rel_types: Option<&HashSet<RelationshipType>>,
        as_of: NaiveDate,
    ) -> Result<Subgraph> {
        if max_depth > MAX_TRAVERSAL_DEPTH {
            return Err(Error::InvalidArgument(format!(
                "max_depth must be between 0 and {}, got {}",
                MAX_TRAVERSAL_DEPTH, max_depth
            )));
        }
        if allowed_rel_types.is_some_and(|types| types.is_empty()) {
            return Err(Error::InvalidArgument(
                "allowed relationship types must not be empty when given".into(),
            ));
        }

        let mut result = Subgraph::seed_only(seed, max_depth);
        let mut edge_index: HashMap<(NodeRef, NodeRef, RelationshipType), usize> = HashMap::new();
        let mut frontier: VecDeque<(NodeRef, u32)> = VecDeque::new();
        frontier.push_back((seed, 0));

        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }

            let mut outgoing = self.store.outgoing(&node, None, as_of).await?;
            let mut incoming = self.store.incoming(&node, None, as_of).await?;
            sort_for_expansion(&mut outgoing, &node);
            sort_for_expansion(&mut incoming, &node);

            for rel in outgoing.into_iter().chain(incoming) {
                if allowed_rel_types.is_some_and(|types| !types.contains(&rel.rel_type)) {
                    continue;
                }
                let Some(far) = rel.far_end(&node) else {
                    continue;
                };

                let next_depth = depth + 1;
                match result.nodes.get(&far) {
                    None => {
                        result.nodes.insert(far, next_depth);
                        frontier.push_back((far, next_depth));
                        record_edge(&mut result.edges, &mut edge_index, rel);
                    }
                    Some(&found) if found == next_depth => {
                        record_edge(&mut result.edges, &mut edge_index, rel);
                    }
                    Some(_) => {}
                }
            }
        }

        debug!(
            seed = %seed,
            max_depth = max_depth,
            nodes = result.node_count(),
            edges = result.edge_count(),
            "Graph expansion completed"
        );

        Ok(result)
    }
}

/// Highest confidence first; ties broken by far endpoint, type, then id
fn sort_for_expansion(edges: &mut [Relationship], node: &NodeRef) {
    edges.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.far_end(node).cmp(&b.far_end(node)))
            .then_with(|| a.rel_type.cmp(&b.rel_type))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Keep one edge per (from, to, type), preferring the most confident instance
fn record_edge(
    edges: &mut Vec<Relationship>,
    index: &mut HashMap<(NodeRef, NodeRef, RelationshipType), usize>,
    rel: Relationship,
) {
    match index.get(&rel.dedup_key()) {
        Some(&i) => {
            if rel.confidence.total_cmp(&edges[i].confidence) == Ordering::Greater {
                edges[i] = rel;
            }
        }
        None => {
            index.insert(rel.dedup_key(), edges.len());
            edges.push(rel);
        }
    }
}
