//! SQLite implementation of the EntityDirectory

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};

use crate::domain::entity::{EntityDirectory, EntityProfile};
use crate::error::{Error, Result};

/// Entity lookups over the `entities` table
#[derive(Clone)]
pub struct SqliteEntityDirectory {
    pool: SqlitePool,
}

impl SqliteEntityDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a profile (id 0) or update the existing row; returns the id
    pub async fn save(&self, entity: &EntityProfile) -> Result<i64> {
        if entity.legal_name.trim().is_empty() {
            return Err(Error::InvalidArgument("legal name must not be empty".into()));
        }
        let formation_date = entity.formation_date.map(|d| d.format("%Y-%m-%d").to_string());

        let id = if entity.id == 0 {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO entities (legal_name, entity_type, status, formation_date)
                VALUES (?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&entity.legal_name)
            .bind(&entity.entity_type)
            .bind(&entity.status)
            .bind(&formation_date)
            .fetch_one(&self.pool)
            .await?;
            id
        } else {
            sqlx::query(
                r#"
                INSERT INTO entities (id, legal_name, entity_type, status, formation_date)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    legal_name = excluded.legal_name,
                    entity_type = excluded.entity_type,
                    status = excluded.status,
                    formation_date = excluded.formation_date
                "#,
            )
            .bind(entity.id)
            .bind(&entity.legal_name)
            .bind(&entity.entity_type)
            .bind(&entity.status)
            .bind(&formation_date)
            .execute(&self.pool)
            .await?;
            entity.id
        };

        debug!(entity_id = id, legal_name = %entity.legal_name, "Entity saved");
        Ok(id)
    }

    /// Ids of every entity, ascending
    pub async fn list_ids(&self) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM entities ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl EntityDirectory for SqliteEntityDirectory {
    async fn get_entity(&self, id: i64) -> Result<Option<EntityProfile>> {
        let row: Option<EntityRow> = sqlx::query_as(
            "SELECT id, legal_name, entity_type, status, formation_date FROM entities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_profile()))
    }
}

#[derive(FromRow)]
struct EntityRow {
    id: i64,
    legal_name: String,
    entity_type: Option<String>,
    status: Option<String>,
    formation_date: Option<String>,
}

impl EntityRow {
    fn into_profile(self) -> EntityProfile {
        // An unreadable date is treated as unknown so age rules fail open
        let formation_date = self.formation_date.as_deref().and_then(|value| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .inspect_err(|e| {
                    warn!(
                        entity_id = self.id,
                        value,
                        error = %e,
                        "Ignoring malformed formation date"
                    )
                })
                .ok()
        });

        EntityProfile {
            id: self.id,
            legal_name: self.legal_name,
            entity_type: self.entity_type,
            status: self.status,
            formation_date,
        }
    }
}
