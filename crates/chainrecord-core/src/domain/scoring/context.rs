//! Scoring context construction
//!
//! A [`ScoringContext`] is the fixed set of facts rules are evaluated
//! against. The [`ContextBuilder`] derives it from an entity profile plus a
//! few depth-1 neighbour queries against the relationship store; it never
//! runs a full traversal, so building a context costs O(degree).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::entity::EntityProfile;
use crate::domain::graph::{
    NodeKind, NodeRef, Relationship, RelationshipStore, RelationshipType, TraversalDirection,
};
use crate::error::Result;

/// Facts about one entity at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub entity_id: i64,
    /// Days since formation; `None` when the formation date is unknown
    pub entity_age_days: Option<i64>,
    /// Distinct properties the entity actively owns
    pub property_count: u64,
    /// Other entities sharing this entity's registered agent
    pub agent_entity_count: u64,
    /// Other entities sharing this entity's primary address
    pub address_entity_count: u64,
    /// Filing status as recorded, e.g. "ACTIVE" (empty when unknown)
    pub status: String,
    pub has_registered_agent: bool,
    pub has_primary_address: bool,
}

impl ScoringContext {
    /// A context with every fact unknown or zero
    pub fn new(entity_id: i64) -> Self {
        Self {
            entity_id,
            entity_age_days: None,
            property_count: 0,
            agent_entity_count: 0,
            address_entity_count: 0,
            status: String::new(),
            has_registered_agent: false,
            has_primary_address: false,
        }
    }

    pub fn with_age_days(mut self, days: i64) -> Self {
        self.entity_age_days = Some(days);
        self
    }

    pub fn with_property_count(mut self, count: u64) -> Self {
        self.property_count = count;
        self
    }

    pub fn with_agent_entity_count(mut self, count: u64) -> Self {
        self.agent_entity_count = count;
        self.has_registered_agent = true;
        self
    }

    pub fn with_address_entity_count(mut self, count: u64) -> Self {
        self.address_entity_count = count;
        self.has_primary_address = true;
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Case-insensitive status check
    pub fn status_is_any(&self, statuses: &[&str]) -> bool {
        let status = self.status.trim();
        !status.is_empty() && statuses.iter().any(|s| s.eq_ignore_ascii_case(status))
    }

    /// True only when the age is known and below `days`
    pub fn younger_than(&self, days: i64) -> bool {
        self.entity_age_days.is_some_and(|age| age < days)
    }

    /// True only when the age is known and above `days`
    pub fn older_than(&self, days: i64) -> bool {
        self.entity_age_days.is_some_and(|age| age > days)
    }
}

/// Builds scoring contexts from live graph data
pub struct ContextBuilder<S: RelationshipStore> {
    store: Arc<S>,
}

impl<S: RelationshipStore> ContextBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Build a context for `entity` as of today
    pub async fn build(&self, entity: &EntityProfile) -> Result<ScoringContext> {
        self.build_as_of(entity, Utc::now().date_naive()).await
    }

    /// Build a context for `entity` as of `as_of`
    pub async fn build_as_of(
        &self,
        entity: &EntityProfile,
        as_of: NaiveDate,
    ) -> Result<ScoringContext> {
        let node = NodeRef::entity(entity.id);

        // A formation date in the future is treated as formed today
        let entity_age_days = entity
            .formation_date
            .map(|formed| (as_of - formed).num_days().max(0));

        let owned: HashSet<NodeRef> = self
            .store
            .outgoing(&node, Some(RelationshipType::Owns), as_of)
            .await?
            .into_iter()
            .map(|rel| rel.to)
            .filter(|to| to.kind == NodeKind::Property)
            .collect();

        let agent = self
            .primary_counterpart(&node, RelationshipType::AgentFor, as_of, |n| {
                n.kind == NodeKind::Person
            })
            .await?;
        let agent_entity_count = match &agent {
            Some(agent) => {
                self.store
                    .count_entities_sharing(RelationshipType::AgentFor, agent, &node, as_of)
                    .await?
            }
            None => 0,
        };

        let address = self
            .primary_counterpart(&node, RelationshipType::LocatedAt, as_of, |n| {
                n.kind != NodeKind::Entity
            })
            .await?;
        let address_entity_count = match &address {
            Some(address) => {
                self.store
                    .count_entities_sharing(RelationshipType::LocatedAt, address, &node, as_of)
                    .await?
            }
            None => 0,
        };

        let context = ScoringContext {
            entity_id: entity.id,
            entity_age_days,
            property_count: owned.len() as u64,
            agent_entity_count,
            address_entity_count,
            status: entity.status.clone().unwrap_or_default(),
            has_registered_agent: agent.is_some(),
            has_primary_address: address.is_some(),
        };

        debug!(
            entity_id = entity.id,
            age_days = ?context.entity_age_days,
            properties = context.property_count,
            agent_entities = context.agent_entity_count,
            address_entities = context.address_entity_count,
            "Scoring context built"
        );

        Ok(context)
    }

    /// The most confident counterpart reached over an active `rel_type` edge
    /// in either direction; ties go to the lowest node key
    async fn primary_counterpart<F>(
        &self,
        node: &NodeRef,
        rel_type: RelationshipType,
        as_of: NaiveDate,
        accept: F,
    ) -> Result<Option<NodeRef>>
    where
        F: Fn(&NodeRef) -> bool + Send,
    {
        let edges = self
            .store
            .incident_edges(node, TraversalDirection::Both, Some(rel_type), as_of)
            .await?;

        Ok(pick_primary(&edges, node, accept))
    }
}

fn pick_primary<F>(edges: &[Relationship], node: &NodeRef, accept: F) -> Option<NodeRef>
where
    F: Fn(&NodeRef) -> bool,
{
    edges
        .iter()
        .filter_map(|rel| rel.far_end(node).map(|far| (far, rel.confidence)))
        .filter(|(far, _)| far != node && accept(far))
        .min_by(|(a, ca), (b, cb)| cb.total_cmp(ca).then_with(|| a.cmp(b)))
        .map(|(far, _)| far)
}
