//! Score history infrastructure
//!
//! SQLite implementation of the append-only score repository.

mod repository;

pub use repository::SqliteScoreRepository;
