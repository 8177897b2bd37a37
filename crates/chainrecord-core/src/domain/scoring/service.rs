//! Scoring service
//!
//! Looks an entity up, builds its context from the relationship store,
//! evaluates the shared registry and appends the result to score history.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::entity::EntityDirectory;
use crate::domain::graph::RelationshipStore;
use crate::error::{Error, Result};

use super::context::{ContextBuilder, ScoringContext};
use super::record::{ScoreRecord, ScoreRepository, check_limit};
use super::registry::{Evaluation, RuleRegistry};

/// Outcome of scoring several entities in one call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub requested: usize,
    pub scored: usize,
    pub records: Vec<ScoreRecord>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub entity_id: i64,
    pub code: String,
    pub message: String,
}

/// Context and evaluation computed without persisting anything
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorePreview {
    pub context: ScoringContext,
    pub evaluation: Evaluation,
}

pub struct ScoringService<S, E, R>
where
    S: RelationshipStore,
    E: EntityDirectory,
    R: ScoreRepository,
{
    registry: Arc<RuleRegistry>,
    contexts: ContextBuilder<S>,
    entities: Arc<E>,
    scores: Arc<R>,
}

impl<S, E, R> ScoringService<S, E, R>
where
    S: RelationshipStore,
    E: EntityDirectory,
    R: ScoreRepository,
{
    pub fn new(
        registry: Arc<RuleRegistry>,
        store: Arc<S>,
        entities: Arc<E>,
        scores: Arc<R>,
    ) -> Self {
        Self {
            registry,
            contexts: ContextBuilder::new(store),
            entities,
            scores,
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Evaluate an entity as of `as_of` without writing a record
    pub async fn preview(&self, entity_id: i64, as_of: NaiveDate) -> Result<ScorePreview> {
        let entity = self
            .entities
            .get_entity(entity_id)
            .await?
            .ok_or(Error::EntityNotFound(entity_id))?;

        let context = self.contexts.build_as_of(&entity, as_of).await?;
        let evaluation = self.registry.evaluate(&context)?;
        Ok(ScorePreview { context, evaluation })
    }

    /// Score an entity now and append the result to its history
    pub async fn score_entity(&self, entity_id: i64) -> Result<ScoreRecord> {
        self.score_entity_as_of(entity_id, Utc::now().date_naive()).await
    }

    pub async fn score_entity_as_of(
        &self,
        entity_id: i64,
        as_of: NaiveDate,
    ) -> Result<ScoreRecord> {
        let preview = self.preview(entity_id, as_of).await?;
        let record = self
            .scores
            .append(ScoreRecord::from_evaluation(entity_id, &preview.evaluation))
            .await?;

        info!(
            entity_id,
            score = record.score,
            grade = %record.grade,
            flags = record.flags.len(),
            "Risk score recorded"
        );
        Ok(record)
    }

    /// Score several entities; failures are logged and reported, not fatal
    pub async fn score_entities(&self, entity_ids: &[i64]) -> Result<BatchSummary> {
        let as_of = Utc::now().date_naive();
        let mut summary = BatchSummary {
            requested: entity_ids.len(),
            ..Default::default()
        };

        for &entity_id in entity_ids {
            match self.score_entity_as_of(entity_id, as_of).await {
                Ok(record) => summary.records.push(record),
                Err(e) => {
                    warn!(entity_id, error = %e, code = e.code(), "Skipping entity in batch");
                    summary.failures.push(BatchFailure {
                        entity_id,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        summary.scored = summary.records.len();
        info!(
            requested = summary.requested,
            scored = summary.scored,
            "Batch scoring finished"
        );
        Ok(summary)
    }

    pub async fn latest(&self, entity_id: i64) -> Result<Option<ScoreRecord>> {
        self.scores.latest(entity_id).await
    }

    pub async fn history(&self, entity_id: i64, limit: u32) -> Result<Vec<ScoreRecord>> {
        self.scores.history(entity_id, check_limit(limit)?).await
    }
}
