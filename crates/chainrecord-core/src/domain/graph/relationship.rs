//! Relationships (edges) of the entity graph
//!
//! A relationship is a directed, typed, confidence-weighted connection between
//! two nodes with an optional validity interval. Relationships are immutable
//! once stored; the only change ever made is closing the interval.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::node::NodeRef;

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Store-assigned identifier (0 until persisted)
    pub id: i64,
    /// Source node
    pub from: NodeRef,
    /// Target node
    pub to: NodeRef,
    /// Type of relationship
    pub rel_type: RelationshipType,
    /// Where this relationship was discovered (never empty)
    pub source_system: String,
    /// Confidence (0.0 to 1.0); 1.0 means a direct filing record
    pub confidence: f64,
    /// When the relationship began
    pub start_date: Option<NaiveDate>,
    /// When the relationship ended (None = still active)
    pub end_date: Option<NaiveDate>,
    /// When the relationship was recorded
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship with full confidence
    pub fn new(
        from: NodeRef,
        to: NodeRef,
        rel_type: RelationshipType,
        source_system: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            from,
            to,
            rel_type,
            source_system: source_system.into(),
            confidence: 1.0,
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        }
    }

    /// Set the confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the start of the validity interval
    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Set the end of the validity interval
    pub fn with_end_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    /// Check the record is well-formed before it is stored
    pub fn validate(&self) -> Result<()> {
        if self.source_system.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "Relationship source_system must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidArgument(format!(
                "Relationship confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if self.from.id <= 0 || self.to.id <= 0 {
            return Err(Error::InvalidArgument(format!(
                "Node ids must be positive ({} -> {})",
                self.from, self.to
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(Error::InvalidArgument(format!(
                    "Relationship ends ({}) before it starts ({})",
                    end, start
                )));
            }
        }
        Ok(())
    }

    /// An edge is active while it has no end date or the end date is still ahead
    pub fn is_active(&self, as_of: NaiveDate) -> bool {
        self.end_date.is_none_or(|end| end > as_of)
    }

    /// Whether `node` is either endpoint
    pub fn touches(&self, node: &NodeRef) -> bool {
        self.from == *node || self.to == *node
    }

    /// The endpoint opposite `node`, if `node` is an endpoint
    pub fn far_end(&self, node: &NodeRef) -> Option<NodeRef> {
        if self.from == *node {
            Some(self.to)
        } else if self.to == *node {
            Some(self.from)
        } else {
            None
        }
    }

    /// Identity used when collapsing duplicates from different source systems
    pub fn dedup_key(&self) -> (NodeRef, NodeRef, RelationshipType) {
        (self.from, self.to, self.rel_type)
    }
}

/// Types of relationships between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source owns target (entity -> property)
    Owns,
    /// Source manages target (person -> entity)
    Manages,
    /// Source is the registered agent for target (person -> entity)
    AgentFor,
    /// Source is located at target (entity -> address node)
    LocatedAt,
    /// Source is an officer of target (person -> entity)
    OfficerOf,
    /// Source granted target in a deed (entity/person -> entity/person)
    GrantsTo,
    /// Source is a member of target (person/entity -> entity)
    MemberOf,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owns => "owns",
            Self::Manages => "manages",
            Self::AgentFor => "agent_for",
            Self::LocatedAt => "located_at",
            Self::OfficerOf => "officer_of",
            Self::GrantsTo => "grants_to",
            Self::MemberOf => "member_of",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "owns" => Some(Self::Owns),
            "manages" => Some(Self::Manages),
            "agent_for" | "agentfor" => Some(Self::AgentFor),
            "located_at" | "locatedat" => Some(Self::LocatedAt),
            "officer_of" | "officerof" => Some(Self::OfficerOf),
            "grants_to" | "grantsto" => Some(Self::GrantsTo),
            "member_of" | "memberof" => Some(Self::MemberOf),
            _ => None,
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::Owns,
            Self::Manages,
            Self::AgentFor,
            Self::LocatedAt,
            Self::OfficerOf,
            Self::GrantsTo,
            Self::MemberOf,
        ]
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
