//! Node references for the relationship graph
//!
//! Nodes are owned by the surrounding system (entity, person and property
//! records). The graph only ever holds `(kind, id)` keys, never the records.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of node in the relationship graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A legal entity (LLC, corporation, trust, ...)
    Entity,
    /// A natural person (officer, registered agent, ...)
    Person,
    /// A parcel of real property
    Property,
}

impl NodeKind {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Person => "person",
            Self::Property => "property",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "entity" => Some(Self::Entity),
            "person" => Some(Self::Person),
            "property" => Some(Self::Property),
            _ => None,
        }
    }

    /// Get all node kinds
    pub fn all() -> &'static [NodeKind] {
        &[Self::Entity, Self::Person, Self::Property]
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `(kind, id)` reference to a node
///
/// Ids are positive and unique within their kind only, so `entity:1` and
/// `person:1` are different nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub id: i64,
}

impl NodeRef {
    pub fn new(kind: NodeKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn entity(id: i64) -> Self {
        Self::new(NodeKind::Entity, id)
    }

    pub fn person(id: i64) -> Self {
        Self::new(NodeKind::Person, id)
    }

    pub fn property(id: i64) -> Self {
        Self::new(NodeKind::Property, id)
    }

    /// Parse a `"{kind}:{id}"` key as rendered in graph payloads
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, id) = s.split_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!("Node reference '{}' is not kind:id", s))
        })?;

        let kind = NodeKind::parse(kind.trim())
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown node kind '{}'", kind)))?;

        let id: i64 = id
            .trim()
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Invalid node id '{}'", id)))?;

        if id <= 0 {
            return Err(Error::InvalidArgument(format!(
                "Node id must be positive, got {}",
                id
            )));
        }

        Ok(Self { kind, id })
    }

    /// Payload key, e.g. `entity:42`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
