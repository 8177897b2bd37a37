//! Chainrecord Core Library
//!
//! This crate provides the core functionality for Chainrecord, including:
//! - Relationship graph model and bounded breadth-first traversal
//! - Rule-based risk scoring with letter grades
//! - Append-only score history
//! - Storage (SQLite with versioned migrations)
//! - Configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

#[cfg(test)]
mod config_tests;

pub use error::{Error, ErrorKind, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::entity::{EntityDirectory, EntityProfile};
    pub use crate::domain::graph::{
        GraphTraversal, NodeKind, NodeRef, Relationship, RelationshipStore, RelationshipType,
        Subgraph,
    };
    pub use crate::domain::scoring::{
        Evaluation, Grade, RuleRegistry, ScoreRecord, ScoreRepository, ScoringContext, ScoringRule,
        ScoringService,
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::infrastructure::entities::SqliteEntityDirectory;
    pub use crate::infrastructure::graph::SqliteRelationshipStore;
    pub use crate::infrastructure::scoring::SqliteScoreRepository;
    pub use crate::storage::Database;
}
