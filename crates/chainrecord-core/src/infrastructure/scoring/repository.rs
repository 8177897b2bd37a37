//! SQLite implementation of the ScoreRepository
//!
//! `risk_scores` is insert-only. "Latest" always means the row with the
//! greatest `calculated_at`, ties broken by id.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::scoring::{
    Grade, RuleDescriptor, ScoreRecord, ScoreRepository, ScoreStatistics, check_limit,
};
use crate::error::{Error, Result};

/// Subquery selecting the id of each entity's latest record
const LATEST_ID: &str = r#"
    SELECT r2.id FROM risk_scores r2
    WHERE r2.entity_id = r.entity_id
    ORDER BY r2.calculated_at DESC, r2.id DESC
    LIMIT 1
"#;

/// SQLite implementation of the score repository
#[derive(Clone)]
pub struct SqliteScoreRepository {
    pool: SqlitePool,
}

impl SqliteScoreRepository {
    /// Create a new SQLite score repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreRepository for SqliteScoreRepository {
    async fn append(&self, record: ScoreRecord) -> Result<ScoreRecord> {
        let flags_json = serde_json::to_string(&record.flags)
            .map_err(|e| Error::Other(format!("Failed to serialize flags: {}", e)))?;
        let details_json = serde_json::to_string(&record.rule_details)
            .map_err(|e| Error::Other(format!("Failed to serialize rule details: {}", e)))?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO risk_scores (
                entity_id, score, raw_score, grade, flags, rule_details, calculated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(record.entity_id)
        .bind(record.score)
        .bind(record.raw_score)
        .bind(record.grade.as_str())
        .bind(&flags_json)
        .bind(&details_json)
        .bind(timestamp_text(record.calculated_at))
        .fetch_one(&self.pool)
        .await?;

        debug!(score_id = id, entity_id = record.entity_id, "Score record appended");
        Ok(ScoreRecord { id, ..record })
    }

    async fn latest(&self, entity_id: i64) -> Result<Option<ScoreRecord>> {
        let row: Option<ScoreRow> = sqlx::query_as(
            r#"
            SELECT * FROM risk_scores
            WHERE entity_id = ?
            ORDER BY calculated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_record()).transpose()
    }

    async fn history(&self, entity_id: i64, limit: u32) -> Result<Vec<ScoreRecord>> {
        let limit = check_limit(limit)?;

        let rows: Vec<ScoreRow> = sqlx::query_as(
            r#"
            SELECT * FROM risk_scores
            WHERE entity_id = ?
            ORDER BY calculated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(entity_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn high_risk(&self, min_grade: Grade, limit: u32) -> Result<Vec<ScoreRecord>> {
        let limit = check_limit(limit)?;

        // Grade letters are fixed constants, safe to inline
        let grades = Grade::all()
            .iter()
            .filter(|g| **g >= min_grade)
            .map(|g| format!("'{}'", g.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let rows: Vec<ScoreRow> = sqlx::query_as(&format!(
            r#"
            SELECT r.* FROM risk_scores r
            WHERE r.id = ({LATEST_ID})
              AND r.grade IN ({grades})
            ORDER BY r.score DESC, r.entity_id
            LIMIT ?
            "#
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_record()).collect()
    }

    async fn statistics(&self) -> Result<ScoreStatistics> {
        let (total_records,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM risk_scores")
            .fetch_one(&self.pool)
            .await?;

        let (entities_scored, average_score): (i64, Option<f64>) = sqlx::query_as(&format!(
            "SELECT COUNT(*), AVG(r.score) FROM risk_scores r WHERE r.id = ({LATEST_ID})"
        ))
        .fetch_one(&self.pool)
        .await?;

        let by_grade: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT r.grade, COUNT(*) FROM risk_scores r \
             WHERE r.id = ({LATEST_ID}) GROUP BY r.grade"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut stats = ScoreStatistics {
            entities_scored: entities_scored as u64,
            total_records: total_records as u64,
            average_score,
            ..Default::default()
        };
        for (grade, count) in by_grade {
            let grade = Grade::parse(&grade)
                .ok_or_else(|| Error::Other(format!("Invalid grade in score history: {}", grade)))?;
            stats.grade_distribution.insert(grade, count as u64);
        }
        Ok(stats)
    }
}

fn timestamp_text(at: DateTime<Utc>) -> String {
    // Fixed width so text ordering matches time ordering
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(FromRow)]
struct ScoreRow {
    id: i64,
    entity_id: i64,
    score: i64,
    raw_score: i64,
    grade: String,
    flags: String,
    rule_details: String,
    calculated_at: String,
}

impl ScoreRow {
    fn into_record(self) -> Result<ScoreRecord> {
        let grade = Grade::parse(&self.grade)
            .ok_or_else(|| Error::Other(format!("Invalid grade: {}", self.grade)))?;

        let flags: Vec<String> = serde_json::from_str(&self.flags)
            .map_err(|e| Error::Other(format!("Invalid flags for score {}: {}", self.id, e)))?;
        let rule_details: Vec<RuleDescriptor> =
            serde_json::from_str(&self.rule_details).map_err(|e| {
                Error::Other(format!("Invalid rule details for score {}: {}", self.id, e))
            })?;

        let calculated_at = DateTime::parse_from_rfc3339(&self.calculated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                Error::Other(format!("Invalid calculated_at for score {}: {}", self.id, e))
            })?;

        Ok(ScoreRecord {
            id: self.id,
            entity_id: self.entity_id,
            score: self.score,
            raw_score: self.raw_score,
            grade,
            flags,
            rule_details,
            calculated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scoring::Evaluation;
    use crate::storage::migrations::run_migrations;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqliteScoreRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteScoreRepository::new(pool)
    }

    async fn create_test_entity(repo: &SqliteScoreRepository, name: &str) -> i64 {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO entities (legal_name) VALUES (?) RETURNING id")
                .bind(name)
                .fetch_one(&repo.pool)
                .await
                .expect("Failed to create test entity");
        id
    }

    fn record(entity_id: i64, score: i64, minutes_ago: i64) -> ScoreRecord {
        let evaluation = Evaluation {
            score,
            raw_score: score,
            grade: Grade::from_score(score),
            flags: vec!["NEW_ENTITY_LT_90_DAYS".into()],
            rule_details: vec![RuleDescriptor {
                name: "NEW_ENTITY_LT_90_DAYS".into(),
                weight: 10,
                category: "entity".into(),
                description: "Entity formed within the last 90 days".into(),
            }],
        };
        let mut record = ScoreRecord::from_evaluation(entity_id, &evaluation);
        record.calculated_at = Utc::now() - Duration::minutes(minutes_ago);
        record
    }

    #[tokio::test]
    async fn test_append_and_latest() {
        let repo = setup_test_db().await;
        let entity = create_test_entity(&repo, "Alpha LLC").await;

        let saved = repo.append(record(entity, 10, 5)).await.unwrap();
        assert!(saved.id > 0);

        let latest = repo.latest(entity).await.unwrap().unwrap();
        assert_eq!(latest.id, saved.id);
        assert_eq!(latest.grade, Grade::A);
        assert_eq!(latest.flags, vec!["NEW_ENTITY_LT_90_DAYS".to_string()]);
        assert_eq!(latest.rule_details[0].weight, 10);

        assert!(repo.latest(entity + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_is_by_calculated_at_not_insertion() {
        let repo = setup_test_db().await;
        let entity = create_test_entity(&repo, "Backfill LLC").await;

        let newer = repo.append(record(entity, 40, 1)).await.unwrap();
        // Backfilled older evaluation inserted afterwards
        repo.append(record(entity, 10, 60)).await.unwrap();

        let latest = repo.latest(entity).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.score, 40);
    }

    #[tokio::test]
    async fn test_history_most_recent_first_and_bounded() {
        let repo = setup_test_db().await;
        let entity = create_test_entity(&repo, "History LLC").await;

        for (i, score) in [10, 20, 30, 40].into_iter().enumerate() {
            repo.append(record(entity, score, 40 - i as i64 * 10)).await.unwrap();
        }

        let history = repo.history(entity, 3).await.unwrap();
        let scores: Vec<i64> = history.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![40, 30, 20]);

        assert!(matches!(repo.history(entity, 0).await, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_high_risk_uses_latest_record() {
        let repo = setup_test_db().await;
        let risky = create_test_entity(&repo, "Risky LLC").await;
        let improved = create_test_entity(&repo, "Improved LLC").await;
        let moderate = create_test_entity(&repo, "Moderate LLC").await;

        repo.append(record(risky, 85, 10)).await.unwrap();
        repo.append(record(improved, 90, 30)).await.unwrap();
        repo.append(record(improved, 15, 5)).await.unwrap();
        repo.append(record(moderate, 65, 10)).await.unwrap();

        let f_only = repo.high_risk(Grade::F, 10).await.unwrap();
        assert_eq!(f_only.len(), 1);
        assert_eq!(f_only[0].entity_id, risky);

        let d_and_up = repo.high_risk(Grade::D, 10).await.unwrap();
        let ids: Vec<i64> = d_and_up.iter().map(|r| r.entity_id).collect();
        assert_eq!(ids, vec![risky, moderate]);

        let limited = repo.high_risk(Grade::A, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].score, 85);
    }

    #[tokio::test]
    async fn test_statistics_over_latest_records() {
        let repo = setup_test_db().await;
        let a = create_test_entity(&repo, "A LLC").await;
        let b = create_test_entity(&repo, "B LLC").await;

        let empty = repo.statistics().await.unwrap();
        assert_eq!(empty.entities_scored, 0);
        assert_eq!(empty.average_score, None);

        repo.append(record(a, 80, 20)).await.unwrap();
        repo.append(record(a, 20, 10)).await.unwrap();
        repo.append(record(b, 40, 10)).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.entities_scored, 2);
        assert_eq!(stats.average_score, Some(30.0));
        assert_eq!(stats.grade_distribution.get(&Grade::B), Some(&1));
        assert_eq!(stats.grade_distribution.get(&Grade::C), Some(&1));
        assert_eq!(stats.grade_distribution.get(&Grade::F), None);
    }

    #[tokio::test]
    async fn test_score_for_unknown_entity_rejected() {
        let repo = setup_test_db().await;
        let err = repo.append(record(4242, 10, 0)).await.unwrap_err();

        assert!(matches!(err, Error::ConstraintViolation(_)));
        assert_eq!(err.code(), "E301");
        assert_eq!(err.kind(), crate::error::ErrorKind::Client);
        assert!(repo.latest(4242).await.unwrap().is_none());
    }
}
