//! Infrastructure layer
//!
//! Contains the SQLite implementations of the domain storage traits.

pub mod entities;
pub mod graph;
pub mod scoring;
