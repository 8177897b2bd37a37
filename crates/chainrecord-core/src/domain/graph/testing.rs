//! Relationship store that starts failing after a fixed number of reads

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};

use super::memory::MemoryRelationshipStore;
use super::node::NodeRef;
use super::relationship::{Relationship, RelationshipType};
use super::store::{RelationshipStore, TraversalDirection};

pub(crate) struct FailingStore {
    inner: MemoryRelationshipStore,
    reads_left: AtomicUsize,
}

impl FailingStore {
    /// Serve `reads` lookups from `relationships`, then fail every call
    pub(crate) fn after(reads: usize, relationships: Vec<Relationship>) -> Self {
        Self {
            inner: MemoryRelationshipStore::from_relationships(relationships).unwrap(),
            reads_left: AtomicUsize::new(reads),
        }
    }

    pub(crate) fn always() -> Self {
        Self::after(0, Vec::new())
    }

    fn take_read(&self) -> Result<()> {
        self.reads_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| Error::StoreUnavailable("connection reset by peer".into()))
    }
}

#[async_trait]
impl RelationshipStore for FailingStore {
    async fn incident_edges(
        &self,
        node: &NodeRef,
        direction: TraversalDirection,
        rel_type: Option<RelationshipType>,
        as_of: NaiveDate,
    ) -> Result<Vec<Relationship>> {
        self.take_read()?;
        self.inner
            .incident_edges(node, direction, rel_type, as_of)
            .await
    }

    async fn count_entities_sharing(
        &self,
        rel_type: RelationshipType,
        far_node: &NodeRef,
        excluding: &NodeRef,
        as_of: NaiveDate,
    ) -> Result<u64> {
        self.take_read()?;
        self.inner
            .count_entities_sharing(rel_type, far_node, excluding, as_of)
            .await
    }
}
