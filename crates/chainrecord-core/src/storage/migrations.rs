//! Database migrations
//!
//! This module manages SQLite schema migrations for chainrecord.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Entities and the relationship graph
///
/// People and properties are referenced only as relationship endpoints; their
/// records belong to the systems that ingest them.
const MIGRATION_V1: &str = r#"
    -- Legal entities (LLCs, corporations, trusts, ...)
    CREATE TABLE IF NOT EXISTS entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        legal_name TEXT NOT NULL,
        entity_type TEXT,
        status TEXT,
        formation_date TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_entities_legal_name ON entities(legal_name);
    CREATE INDEX IF NOT EXISTS idx_entities_status ON entities(status);

    -- Directed, typed edges between any two nodes
    CREATE TABLE IF NOT EXISTS relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_type TEXT NOT NULL CHECK (from_type IN ('entity', 'person', 'property')),
        from_id INTEGER NOT NULL CHECK (from_id > 0),
        to_type TEXT NOT NULL CHECK (to_type IN ('entity', 'person', 'property')),
        to_id INTEGER NOT NULL CHECK (to_id > 0),
        rel_type TEXT NOT NULL,
        source_system TEXT NOT NULL CHECK (length(trim(source_system)) > 0),
        start_date TEXT,
        end_date TEXT,
        confidence REAL NOT NULL DEFAULT 1.0 CHECK (confidence >= 0.0 AND confidence <= 1.0),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_relationships_from
        ON relationships(from_type, from_id, rel_type);
    CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_type, to_id, rel_type);
    CREATE INDEX IF NOT EXISTS idx_relationships_active ON relationships(end_date);
"#;

/// Migration 2: Append-only risk score history
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS risk_scores (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        score INTEGER NOT NULL,
        raw_score INTEGER NOT NULL,
        grade TEXT NOT NULL CHECK (grade IN ('A', 'B', 'C', 'D', 'F')),
        flags TEXT NOT NULL DEFAULT '[]',
        rule_details TEXT NOT NULL DEFAULT '[]',
        calculated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_risk_scores_entity ON risk_scores(entity_id, calculated_at);
    CREATE INDEX IF NOT EXISTS idx_risk_scores_grade ON risk_scores(grade);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Relationship graph");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Risk score history");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
        assert!(!needs_migration(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in ["entities", "relationships", "risk_scores"] {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }

        // Agent and address links live only in the relationships table
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('entities') ORDER BY cid")
                .fetch_all(&pool)
                .await
                .unwrap();
        let columns: Vec<&str> = columns.iter().map(|(name,)| name.as_str()).collect();
        assert_eq!(
            columns,
            vec!["id", "legal_name", "entity_type", "status", "formation_date", "created_at"]
        );

        for table in ["people", "properties"] {
            let result = sqlx::query(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await;
            assert!(result.is_err(), "Table {} should not exist", table);
        }
    }

    #[tokio::test]
    async fn test_relationship_constraints() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let insert = r#"
            INSERT INTO relationships
                (from_type, from_id, to_type, to_id, rel_type, source_system, confidence)
            VALUES ('entity', 1, 'property', 2, 'owns', ?, ?)
        "#;

        let ok = sqlx::query(insert).bind("sunbiz").bind(0.9).execute(&pool).await;
        assert!(ok.is_ok());

        let blank_source = sqlx::query(insert).bind("  ").bind(0.9).execute(&pool).await;
        assert!(blank_source.is_err());

        let bad_confidence = sqlx::query(insert).bind("sunbiz").bind(1.5).execute(&pool).await;
        assert!(bad_confidence.is_err());
    }
}
