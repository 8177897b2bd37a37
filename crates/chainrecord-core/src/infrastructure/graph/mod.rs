//! Relationship graph infrastructure
//!
//! SQLite implementation of the relationship store trait.

mod repository;

pub use repository::SqliteRelationshipStore;
