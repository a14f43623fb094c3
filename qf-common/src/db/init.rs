//! Database initialization
//!
//! Creates the database file and schema on first run. Table creation is
//! idempotent, so startup against an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    apply_connection_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every `sqlite::memory:` connection is a separate database, so the pool is
/// capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    apply_connection_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

async fn apply_connection_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_sessions_table(pool).await?;
    create_doubts_table(pool).await?;
    create_doubt_merged_students_table(pool).await?;
    create_doubt_upvotes_table(pool).await?;
    create_confusion_readings_table(pool).await?;
    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            instructor_name TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            auto_merge_doubts INTEGER NOT NULL DEFAULT 1,
            total_doubts INTEGER NOT NULL DEFAULT 0,
            answered_doubts INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            ended_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_doubts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS doubts (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            question TEXT NOT NULL,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            is_anonymous INTEGER NOT NULL DEFAULT 0,
            topic TEXT NOT NULL,
            confusion_level INTEGER NOT NULL DEFAULT 1,
            is_answered INTEGER NOT NULL DEFAULT 0,
            answer TEXT,
            answered_at INTEGER,
            upvotes INTEGER NOT NULL DEFAULT 0,
            merged_with TEXT REFERENCES doubts(id),
            merged_count INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_doubts_session_canonical ON doubts(session_id, merged_with)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_doubt_merged_students_table(pool: &SqlitePool) -> Result<()> {
    // One row per submission folded into a doubt (append-only)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS doubt_merged_students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doubt_id TEXT NOT NULL REFERENCES doubts(id),
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_merged_students_doubt ON doubt_merged_students(doubt_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_doubt_upvotes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS doubt_upvotes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doubt_id TEXT NOT NULL REFERENCES doubts(id),
            student_id TEXT NOT NULL,
            UNIQUE(doubt_id, student_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_confusion_readings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS confusion_readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            student_id TEXT NOT NULL,
            student_name TEXT,
            level INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_confusion_session_time ON confusion_readings(session_id, timestamp)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_has_schema() {
        let pool = init_memory_database().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec![
                "confusion_readings",
                "doubt_merged_students",
                "doubt_upvotes",
                "doubts",
                "sessions",
            ]
        );
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        create_schema(&pool).await.expect("second schema pass should succeed");
    }
}
