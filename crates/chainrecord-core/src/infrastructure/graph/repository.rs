//! SQLite implementation of the RelationshipStore
//!
//! Every node kind shares the single `relationships` table, keyed by
//! `(from_type, from_id)` and `(to_type, to_id)`. Dates are stored as
//! `YYYY-MM-DD` text so activity checks compare lexically.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::graph::{
    NodeKind, NodeRef, Relationship, RelationshipStatistics, RelationshipStore, RelationshipType,
    TraversalDirection,
};
use crate::error::{Error, Result};

const ACTIVE: &str = "(end_date IS NULL OR end_date > ?)";

/// SQLite implementation of the relationship store
#[derive(Clone)]
pub struct SqliteRelationshipStore {
    pool: SqlitePool,
}

impl SqliteRelationshipStore {
    /// Create a new SQLite relationship store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a relationship
    ///
    /// When an active edge with the same (from, to, type) already exists it
    /// is returned unchanged and nothing is inserted.
    pub async fn create_relationship(&self, relationship: &Relationship) -> Result<Relationship> {
        relationship.validate()?;
        let today = Utc::now().date_naive();

        let existing: Option<RelationshipRow> = sqlx::query_as(&format!(
            r#"
            SELECT * FROM relationships
            WHERE from_type = ? AND from_id = ? AND to_type = ? AND to_id = ? AND rel_type = ?
              AND {ACTIVE}
            ORDER BY confidence DESC, id
            LIMIT 1
            "#
        ))
        .bind(relationship.from.kind.as_str())
        .bind(relationship.from.id)
        .bind(relationship.to.kind.as_str())
        .bind(relationship.to.id)
        .bind(relationship.rel_type.as_str())
        .bind(date_text(today))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            let existing = row.into_relationship()?;
            debug!(
                relationship_id = existing.id,
                from = %existing.from,
                to = %existing.to,
                "Active relationship already recorded"
            );
            return Ok(existing);
        }

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO relationships (
                from_type, from_id, to_type, to_id, rel_type, source_system,
                start_date, end_date, confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(relationship.from.kind.as_str())
        .bind(relationship.from.id)
        .bind(relationship.to.kind.as_str())
        .bind(relationship.to.id)
        .bind(relationship.rel_type.as_str())
        .bind(&relationship.source_system)
        .bind(relationship.start_date.map(date_text))
        .bind(relationship.end_date.map(date_text))
        .bind(relationship.confidence)
        .bind(relationship.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        info!(
            relationship_id = id,
            from = %relationship.from,
            to = %relationship.to,
            rel_type = %relationship.rel_type,
            source = %relationship.source_system,
            "Relationship created"
        );

        Ok(Relationship {
            id,
            ..relationship.clone()
        })
    }

    /// Get a relationship by id, active or not
    pub async fn get(&self, id: i64) -> Result<Option<Relationship>> {
        let row: Option<RelationshipRow> =
            sqlx::query_as("SELECT * FROM relationships WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_relationship()).transpose()
    }

    /// Close an open relationship; returns false when it is unknown or
    /// already ended
    pub async fn end_relationship(&self, id: i64, end_date: NaiveDate) -> Result<bool> {
        let Some(current) = self.get(id).await? else {
            return Ok(false);
        };
        if current.start_date.is_some_and(|start| end_date < start) {
            return Err(Error::InvalidArgument(format!(
                "end date {} is before start date of relationship {}",
                end_date, id
            )));
        }

        let result =
            sqlx::query("UPDATE relationships SET end_date = ? WHERE id = ? AND end_date IS NULL")
                .bind(date_text(end_date))
                .bind(id)
                .execute(&self.pool)
                .await?;

        let ended = result.rows_affected() > 0;
        if ended {
            info!(relationship_id = id, end_date = %end_date, "Relationship ended");
        }
        Ok(ended)
    }

    /// Totals by relationship type and by source system
    pub async fn statistics(&self) -> Result<RelationshipStatistics> {
        let today = date_text(Utc::now().date_naive());

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM relationships")
            .fetch_one(&self.pool)
            .await?;
        let (active,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM relationships WHERE {ACTIVE}"))
                .bind(&today)
                .fetch_one(&self.pool)
                .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT rel_type, COUNT(*) FROM relationships
            GROUP BY rel_type ORDER BY rel_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let by_source: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT source_system, COUNT(*) FROM relationships
            GROUP BY source_system ORDER BY source_system
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(RelationshipStatistics {
            total: total as u64,
            active: active as u64,
            by_type: by_type.into_iter().map(|(k, v)| (k, v as u64)).collect(),
            by_source: by_source.into_iter().map(|(k, v)| (k, v as u64)).collect(),
        })
    }
}

#[async_trait]
impl RelationshipStore for SqliteRelationshipStore {
    async fn incident_edges(
        &self,
        node: &NodeRef,
        direction: TraversalDirection,
        rel_type: Option<RelationshipType>,
        as_of: NaiveDate,
    ) -> Result<Vec<Relationship>> {
        let endpoint = match direction {
            TraversalDirection::Outgoing => "(from_type = ?1 AND from_id = ?2)",
            TraversalDirection::Incoming => "(to_type = ?1 AND to_id = ?2)",
            TraversalDirection::Both => {
                "((from_type = ?1 AND from_id = ?2) OR (to_type = ?1 AND to_id = ?2))"
            }
        };

        let rows: Vec<RelationshipRow> = sqlx::query_as(&format!(
            r#"
            SELECT * FROM relationships
            WHERE {endpoint}
              AND (?3 IS NULL OR rel_type = ?3)
              AND (end_date IS NULL OR end_date > ?4)
            ORDER BY id
            "#
        ))
        .bind(node.kind.as_str())
        .bind(node.id)
        .bind(rel_type.map(|t| t.as_str()))
        .bind(date_text(as_of))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_relationship() {
                    Ok(rel) => Some(rel),
                    Err(e) => {
                        warn!(
                            relationship_id = id,
                            error = %e,
                            "Skipping malformed relationship row"
                        );
                        None
                    }
                }
            })
            .collect())
    }

    async fn count_entities_sharing(
        &self,
        rel_type: RelationshipType,
        far_node: &NodeRef,
        excluding: &NodeRef,
        as_of: NaiveDate,
    ) -> Result<u64> {
        // Node ids are positive, so 0 never matches
        let excluded_entity = if excluding.kind == NodeKind::Entity {
            excluding.id
        } else {
            0
        };

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(DISTINCT entity_id) FROM (
                SELECT from_id AS entity_id FROM relationships
                WHERE to_type = ?1 AND to_id = ?2 AND from_type = 'entity'
                  AND rel_type = ?3 AND (end_date IS NULL OR end_date > ?4)
                UNION ALL
                SELECT to_id AS entity_id FROM relationships
                WHERE from_type = ?1 AND from_id = ?2 AND to_type = 'entity'
                  AND rel_type = ?3 AND (end_date IS NULL OR end_date > ?4)
            )
            WHERE entity_id != ?5
            "#,
        )
        .bind(far_node.kind.as_str())
        .bind(far_node.id)
        .bind(rel_type.as_str())
        .bind(date_text(as_of))
        .bind(excluded_entity)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| Error::Other(format!("Invalid date '{}': {}", value, e)))
}

/// Accepts RFC 3339 or SQLite's `CURRENT_TIMESTAMP` format
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .map_err(|e| Error::Other(format!("Invalid created_at '{}': {}", value, e)))
}

#[derive(FromRow)]
struct RelationshipRow {
    id: i64,
    from_type: String,
    from_id: i64,
    to_type: String,
    to_id: i64,
    rel_type: String,
    source_system: String,
    start_date: Option<String>,
    end_date: Option<String>,
    confidence: f64,
    created_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<Relationship> {
        let kind = |value: &str| {
            NodeKind::parse(value)
                .ok_or_else(|| Error::Other(format!("Invalid node kind: {}", value)))
        };
        let from = NodeRef::new(kind(&self.from_type)?, self.from_id);
        let to = NodeRef::new(kind(&self.to_type)?, self.to_id);

        let rel_type = RelationshipType::parse(&self.rel_type)
            .ok_or_else(|| Error::Other(format!("Invalid relationship type: {}", self.rel_type)))?;

        Ok(Relationship {
            id: self.id,
            from,
            to,
            rel_type,
            source_system: self.source_system,
            confidence: self.confidence,
            start_date: self.start_date.as_deref().map(parse_date).transpose()?,
            end_date: self.end_date.as_deref().map(parse_date).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqliteRelationshipStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        SqliteRelationshipStore::new(pool)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn owns(entity: i64, property: i64) -> Relationship {
        Relationship::new(
            NodeRef::entity(entity),
            NodeRef::property(property),
            RelationshipType::Owns,
            "marion_pa",
        )
    }

    #[tokio::test]
    async fn test_create_and_get_relationship() {
        let store = setup_test_db().await;

        let rel = owns(1, 5)
            .with_confidence(0.85)
            .with_start_date(date(2020, 3, 1));
        let created = store.create_relationship(&rel).await.unwrap();
        assert!(created.id > 0);

        let fetched = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.from, NodeRef::entity(1));
        assert_eq!(fetched.to, NodeRef::property(5));
        assert_eq!(fetched.rel_type, RelationshipType::Owns);
        assert_eq!(fetched.confidence, 0.85);
        assert_eq!(fetched.start_date, Some(date(2020, 3, 1)));
        assert_eq!(fetched.end_date, None);

        assert!(store.get(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_returns_existing_active_duplicate() {
        let store = setup_test_db().await;

        let first = store.create_relationship(&owns(1, 5)).await.unwrap();
        let mut again = owns(1, 5);
        again.source_system = "sunbiz".into();
        let second = store.create_relationship(&again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.source_system, "marion_pa");
        assert_eq!(store.statistics().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_create_after_end_inserts_new_edge() {
        let store = setup_test_db().await;

        let first = store.create_relationship(&owns(1, 5)).await.unwrap();
        assert!(store.end_relationship(first.id, date(2021, 1, 1)).await.unwrap());

        let second = store.create_relationship(&owns(1, 5)).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid() {
        let store = setup_test_db().await;

        let mut blank = owns(1, 5);
        blank.source_system = "".into();
        assert!(matches!(
            store.create_relationship(&blank).await,
            Err(Error::InvalidArgument(_))
        ));

        let mut overconfident = owns(1, 5);
        overconfident.confidence = 1.2;
        assert!(store.create_relationship(&overconfident).await.is_err());
    }

    #[tokio::test]
    async fn test_end_relationship() {
        let store = setup_test_db().await;
        let rel = store
            .create_relationship(&owns(1, 5).with_start_date(date(2020, 1, 1)))
            .await
            .unwrap();

        assert!(matches!(
            store.end_relationship(rel.id, date(2019, 1, 1)).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(store.end_relationship(rel.id, date(2022, 6, 30)).await.unwrap());
        // Already ended
        assert!(!store.end_relationship(rel.id, date(2023, 1, 1)).await.unwrap());
        assert!(!store.end_relationship(4242, date(2023, 1, 1)).await.unwrap());

        let ended = store.get(rel.id).await.unwrap().unwrap();
        assert_eq!(ended.end_date, Some(date(2022, 6, 30)));
    }

    #[tokio::test]
    async fn test_incident_edges_respects_direction_type_and_activity() {
        let store = setup_test_db().await;
        let e1 = NodeRef::entity(1);

        store.create_relationship(&owns(1, 5)).await.unwrap();
        store
            .create_relationship(&Relationship::new(
                NodeRef::person(3),
                e1,
                RelationshipType::AgentFor,
                "sunbiz",
            ))
            .await
            .unwrap();
        let sold = store.create_relationship(&owns(1, 6)).await.unwrap();
        store.end_relationship(sold.id, date(2020, 1, 1)).await.unwrap();
        store
            .create_relationship(&owns(1, 7).with_end_date(today() + chrono::Duration::days(30)))
            .await
            .unwrap();

        let out = store.outgoing(&e1, None, today()).await.unwrap();
        assert_eq!(out.len(), 2);
        let incoming = store.incoming(&e1, None, today()).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].rel_type, RelationshipType::AgentFor);

        let both = store
            .incident_edges(&e1, TraversalDirection::Both, None, today())
            .await
            .unwrap();
        assert_eq!(both.len(), 3);

        let agent_only = store
            .incident_edges(
                &e1,
                TraversalDirection::Both,
                Some(RelationshipType::AgentFor),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(agent_only.len(), 1);

        // Before the sale the sold property is still active
        let then = store.outgoing(&e1, None, date(2019, 6, 1)).await.unwrap();
        assert_eq!(then.len(), 3);
    }

    #[tokio::test]
    async fn test_end_date_equal_to_as_of_is_inactive() {
        let store = setup_test_db().await;
        store
            .create_relationship(&owns(1, 5).with_end_date(date(2024, 1, 1)))
            .await
            .unwrap();

        let e1 = NodeRef::entity(1);
        assert!(store.outgoing(&e1, None, date(2024, 1, 1)).await.unwrap().is_empty());
        assert_eq!(store.outgoing(&e1, None, date(2023, 12, 31)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_node_has_no_edges() {
        let store = setup_test_db().await;
        let edges = store
            .incident_edges(&NodeRef::person(77), TraversalDirection::Both, None, today())
            .await
            .unwrap();
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn test_count_entities_sharing_agent() {
        let store = setup_test_db().await;
        let agent = NodeRef::person(50);

        for entity in 1..=5 {
            store
                .create_relationship(&Relationship::new(
                    agent,
                    NodeRef::entity(entity),
                    RelationshipType::AgentFor,
                    "sunbiz",
                ))
                .await
                .unwrap();
        }
        // Duplicate from another source counts once
        let mut dup = Relationship::new(
            agent,
            NodeRef::entity(2),
            RelationshipType::AgentFor,
            "opencorporates",
        );
        dup.confidence = 0.6;
        sqlx::query(
            r#"
            INSERT INTO relationships
                (from_type, from_id, to_type, to_id, rel_type, source_system, confidence)
            VALUES ('person', 50, 'entity', 2, 'agent_for', ?, ?)
            "#,
        )
        .bind(&dup.source_system)
        .bind(dup.confidence)
        .execute(&store.pool)
        .await
        .unwrap();
        // Ended agency does not count
        let ended = store
            .create_relationship(&Relationship::new(
                agent,
                NodeRef::entity(9),
                RelationshipType::AgentFor,
                "sunbiz",
            ))
            .await
            .unwrap();
        store.end_relationship(ended.id, date(2020, 1, 1)).await.unwrap();
        // Reverse direction counts
        store
            .create_relationship(&Relationship::new(
                NodeRef::entity(6),
                agent,
                RelationshipType::AgentFor,
                "manual",
            ))
            .await
            .unwrap();

        let count = store
            .count_entities_sharing(
                RelationshipType::AgentFor,
                &agent,
                &NodeRef::entity(1),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(count, 5);

        let count_other_type = store
            .count_entities_sharing(
                RelationshipType::LocatedAt,
                &agent,
                &NodeRef::entity(1),
                today(),
            )
            .await
            .unwrap();
        assert_eq!(count_other_type, 0);
    }

    #[tokio::test]
    async fn test_malformed_rows_skipped() {
        let store = setup_test_db().await;
        store.create_relationship(&owns(1, 5)).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO relationships (from_type, from_id, to_type, to_id, rel_type, source_system)
            VALUES ('entity', 1, 'property', 6, 'haunts', 'legacy')
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let edges = store.outgoing(&NodeRef::entity(1), None, today()).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, NodeRef::property(5));
    }

    #[tokio::test]
    async fn test_unparseable_created_at_row_skipped() {
        let store = setup_test_db().await;
        store.create_relationship(&owns(1, 5)).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO relationships
                (from_type, from_id, to_type, to_id, rel_type, source_system, created_at)
            VALUES ('entity', 1, 'property', 6, 'owns', 'legacy', 'yesterday')
            "#,
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let edges = store.outgoing(&NodeRef::entity(1), None, today()).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, NodeRef::property(5));
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = setup_test_db().await;
        store.create_relationship(&owns(1, 5)).await.unwrap();
        store.create_relationship(&owns(1, 6)).await.unwrap();
        let rel = store
            .create_relationship(&Relationship::new(
                NodeRef::person(3),
                NodeRef::entity(1),
                RelationshipType::OfficerOf,
                "sunbiz",
            ))
            .await
            .unwrap();
        store.end_relationship(rel.id, date(2020, 1, 1)).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.by_type.get("owns"), Some(&2));
        assert_eq!(stats.by_type.get("officer_of"), Some(&1));
        assert_eq!(stats.by_source.get("marion_pa"), Some(&2));
        assert_eq!(stats.by_source.get("sunbiz"), Some(&1));
    }
}
