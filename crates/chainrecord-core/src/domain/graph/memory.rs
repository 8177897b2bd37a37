//! In-memory relationship store
//!
//! Edges live in a flat arena and are indexed by node key, so cycles in the
//! graph never turn into cyclic ownership.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};

use super::node::{NodeKind, NodeRef};
use super::relationship::{Relationship, RelationshipType};
use super::store::{RelationshipStore, TraversalDirection};

#[derive(Debug, Default)]
struct Arena {
    edges: Vec<Relationship>,
    by_node: HashMap<NodeRef, Vec<usize>>,
}

/// Relationship store backed by process memory
///
/// Duplicates are accepted as-is, the same way an ingestion table would hold
/// them; consumers deduplicate.
#[derive(Debug, Default)]
pub struct MemoryRelationshipStore {
    arena: RwLock<Arena>,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of relationships
    pub fn from_relationships(
        relationships: impl IntoIterator<Item = Relationship>,
    ) -> Result<Self> {
        let store = Self::new();
        for rel in relationships {
            store.insert(rel)?;
        }
        Ok(store)
    }

    /// Add a relationship, returning the id it was assigned
    pub fn insert(&self, mut relationship: Relationship) -> Result<i64> {
        relationship.validate()?;

        let mut arena = self
            .arena
            .write()
            .map_err(|_| Error::StoreUnavailable("relationship arena lock poisoned".into()))?;

        let index = arena.edges.len();
        relationship.id = index as i64 + 1;
        let id = relationship.id;

        arena.by_node.entry(relationship.from).or_default().push(index);
        if relationship.to != relationship.from {
            arena.by_node.entry(relationship.to).or_default().push(index);
        }
        arena.edges.push(relationship);

        Ok(id)
    }

    /// Total number of stored edges, active or not
    pub fn len(&self) -> usize {
        self.arena.read().map(|a| a.edges.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching<F>(&self, node: &NodeRef, keep: F) -> Result<Vec<Relationship>>
    where
        F: Fn(&Relationship) -> bool,
    {
        let arena = self
            .arena
            .read()
            .map_err(|_| Error::StoreUnavailable("relationship arena lock poisoned".into()))?;

        Ok(arena
            .by_node
            .get(node)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &arena.edges[i])
                    .filter(|rel| keep(rel))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn incident_edges(
        &self,
        node: &NodeRef,
        direction: TraversalDirection,
        rel_type: Option<RelationshipType>,
        as_of: NaiveDate,
    ) -> Result<Vec<Relationship>> {
        self.matching(node, |rel| {
            let direction_ok = match direction {
                TraversalDirection::Outgoing => rel.from == *node,
                TraversalDirection::Incoming => rel.to == *node,
                TraversalDirection::Both => true,
            };
            direction_ok
                && rel_type.is_none_or(|t| rel.rel_type == t)
                && rel.is_active(as_of)
        })
    }

    async fn count_entities_sharing(
        &self,
        rel_type: RelationshipType,
        far_node: &NodeRef,
        excluding: &NodeRef,
        as_of: NaiveDate,
    ) -> Result<u64> {
        let edges =
            self.matching(far_node, |rel| rel.rel_type == rel_type && rel.is_active(as_of))?;

        let sharing: HashSet<NodeRef> = edges
            .iter()
            .filter_map(|rel| rel.far_end(far_node))
            .filter(|other| other.kind == NodeKind::Entity && other != excluding)
            .collect();

        Ok(sharing.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn rel(from: NodeRef, to: NodeRef, t: RelationshipType) -> Relationship {
        Relationship::new(from, to, t, "test")
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryRelationshipStore::new();
        let a = store
            .insert(rel(NodeRef::entity(1), NodeRef::property(5), RelationshipType::Owns))
            .unwrap();
        let b = store
            .insert(rel(NodeRef::entity(1), NodeRef::property(6), RelationshipType::Owns))
            .unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_validates() {
        let store = MemoryRelationshipStore::new();
        let bad = Relationship::new(
            NodeRef::entity(1),
            NodeRef::property(5),
            RelationshipType::Owns,
            "",
        );
        assert!(store.insert(bad).is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_directional_lookups() {
        let store = MemoryRelationshipStore::from_relationships([
            rel(NodeRef::entity(1), NodeRef::property(5), RelationshipType::Owns),
            rel(NodeRef::person(3), NodeRef::entity(1), RelationshipType::AgentFor),
        ])
        .unwrap();

        let e1 = NodeRef::entity(1);
        assert_eq!(store.outgoing(&e1, None, today()).await.unwrap().len(), 1);
        assert_eq!(store.incoming(&e1, None, today()).await.unwrap().len(), 1);
        assert_eq!(
            store
                .incident_edges(&e1, TraversalDirection::Both, None, today())
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            store
                .incident_edges(
                    &e1,
                    TraversalDirection::Both,
                    Some(RelationshipType::Owns),
                    today()
                )
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_node_is_empty() {
        let store = MemoryRelationshipStore::new();
        let edges = store
            .incident_edges(&NodeRef::entity(99), TraversalDirection::Both, None, today())
            .await
            .unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_edges_hidden() {
        let ended = rel(NodeRef::entity(1), NodeRef::property(5), RelationshipType::Owns)
            .with_end_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let store = MemoryRelationshipStore::from_relationships([ended]).unwrap();

        let edges = store.outgoing(&NodeRef::entity(1), None, today()).await.unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn test_count_entities_sharing_excludes_self_and_non_entities() {
        let agent = NodeRef::person(7);
        let store = MemoryRelationshipStore::from_relationships([
            rel(agent, NodeRef::entity(1), RelationshipType::AgentFor),
            rel(agent, NodeRef::entity(2), RelationshipType::AgentFor),
            // Duplicate from a second source counts once
            Relationship::new(agent, NodeRef::entity(2), RelationshipType::AgentFor, "other"),
            rel(agent, NodeRef::property(9), RelationshipType::AgentFor),
            rel(agent, NodeRef::entity(3), RelationshipType::OfficerOf),
        ])
        .unwrap();

        let count = store
            .count_entities_sharing(
                RelationshipType::AgentFor,
                &agent,
                &NodeRef::entity(1),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_poisoned_arena_reports_unavailable() {
        let store = std::sync::Arc::new(MemoryRelationshipStore::new());
        let writer = std::sync::Arc::clone(&store);
        let crashed = std::thread::spawn(move || {
            let _guard = writer.arena.write().unwrap();
            panic!("writer crashed while holding the arena");
        })
        .join();
        assert!(crashed.is_err());

        let err = store
            .outgoing(&NodeRef::entity(1), None, today())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));

        let err = store
            .insert(rel(NodeRef::entity(1), NodeRef::property(5), RelationshipType::Owns))
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}
