//! Entity directory infrastructure

mod repository;

pub use repository::SqliteEntityDirectory;
