//! Score records and their repository
//!
//! Records are append-only: every evaluation writes a new row and nothing
//! updates or deletes one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::grade::Grade;
use super::registry::Evaluation;
use super::rule::RuleDescriptor;

/// Largest page a history query may request
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// One persisted evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: i64,
    pub entity_id: i64,
    pub score: i64,
    pub raw_score: i64,
    pub grade: Grade,
    pub flags: Vec<String>,
    pub rule_details: Vec<RuleDescriptor>,
    pub calculated_at: DateTime<Utc>,
}

impl ScoreRecord {
    /// Unsaved record for an evaluation
    pub fn from_evaluation(entity_id: i64, evaluation: &Evaluation) -> Self {
        Self {
            id: 0,
            entity_id,
            score: evaluation.score,
            raw_score: evaluation.raw_score,
            grade: evaluation.grade,
            flags: evaluation.flags.clone(),
            rule_details: evaluation.rule_details.clone(),
            calculated_at: Utc::now(),
        }
    }
}

/// Aggregates over the latest record of each scored entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub entities_scored: u64,
    pub total_records: u64,
    pub average_score: Option<f64>,
    pub grade_distribution: BTreeMap<Grade, u64>,
}

/// Append-only storage of score records
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Persist a new record and return it with its id
    async fn append(&self, record: ScoreRecord) -> Result<ScoreRecord>;

    /// Most recent record by `calculated_at`
    async fn latest(&self, entity_id: i64) -> Result<Option<ScoreRecord>>;

    /// Records most-recent-first, at most `limit`
    async fn history(&self, entity_id: i64, limit: u32) -> Result<Vec<ScoreRecord>>;

    /// Latest record per entity with grade at or above `min_grade`,
    /// highest score first
    async fn high_risk(&self, min_grade: Grade, limit: u32) -> Result<Vec<ScoreRecord>>;

    async fn statistics(&self) -> Result<ScoreStatistics>;
}

/// Reject limits outside `1..=MAX_HISTORY_LIMIT`
pub fn check_limit(limit: u32) -> Result<u32> {
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(Error::InvalidArgument(format!(
            "limit must be between 1 and {}, got {}",
            MAX_HISTORY_LIMIT, limit
        )));
    }
    Ok(limit)
}
