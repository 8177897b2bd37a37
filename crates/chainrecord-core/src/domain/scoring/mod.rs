//! Risk scoring domain module
//!
//! Scores an entity by evaluating an ordered set of weighted rules against a
//! [`ScoringContext`] of facts derived from the relationship graph:
//!
//! - **ContextBuilder**: depth-1 graph queries producing the context
//! - **RuleRegistry**: ordered, write-once rule collection and evaluator
//! - **Grade**: letter grade mapped from the final score
//! - **ScoreRepository**: append-only score history
//! - **ScoringService**: lookup, evaluate and persist in one call

mod context;
mod grade;
mod record;
mod registry;
pub mod rule;
mod service;

pub use context::{ContextBuilder, ScoringContext};
pub use grade::Grade;
pub use record::{MAX_HISTORY_LIMIT, ScoreRecord, ScoreRepository, ScoreStatistics, check_limit};
pub use registry::{Evaluation, RuleRegistry, ScoreBounds};
pub use rule::{RuleDescriptor, RulePredicate, RuleSet, ScoringRule, extended_rules, standard_rules};
pub use service::{BatchFailure, BatchSummary, ScorePreview, ScoringService};
