//! Domain layer
//!
//! Contains the relationship graph and risk scoring models, plus the narrow
//! traits they use to reach storage.

pub mod entity;
pub mod graph;
pub mod scoring;
