//! Session queries

use qf_common::models::{Session, SessionSettings, SessionStats};
use qf_common::time::{from_millis, to_millis};
use qf_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SESSION_COLUMNS: &str = "id, title, instructor_name, is_active, auto_merge_doubts, \
     total_doubts, answered_doubts, created_at, ended_at";

fn session_from_row(row: &SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        title: row.get("title"),
        instructor_name: row.get("instructor_name"),
        is_active: row.get::<i64, _>("is_active") != 0,
        settings: SessionSettings {
            auto_merge_doubts: row.get::<i64, _>("auto_merge_doubts") != 0,
        },
        stats: SessionStats {
            total_doubts: row.get("total_doubts"),
            answered_doubts: row.get("answered_doubts"),
        },
        created_at: from_millis(row.get("created_at")),
        ended_at: row.get::<Option<i64>, _>("ended_at").map(from_millis),
    }
}

pub async fn insert(db: &SqlitePool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, title, instructor_name, is_active, auto_merge_doubts,
                              total_doubts, answered_doubts, created_at, ended_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(&session.title)
    .bind(&session.instructor_name)
    .bind(session.is_active as i64)
    .bind(session.settings.auto_merge_doubts as i64)
    .bind(session.stats.total_doubts)
    .bind(session.stats.answered_doubts)
    .bind(to_millis(session.created_at))
    .bind(session.ended_at.map(to_millis))
    .execute(db)
    .await?;
    Ok(())
}

/// Get a session by identity
pub async fn get(db: &SqlitePool, session_id: &str) -> Result<Session> {
    let sql = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
    sqlx::query(&sql)
        .bind(session_id)
        .fetch_optional(db)
        .await?
        .map(|row| session_from_row(&row))
        .ok_or_else(|| Error::NotFound(format!("Session {}", session_id)))
}

/// All active sessions, newest first
pub async fn list_active(db: &SqlitePool) -> Result<Vec<Session>> {
    let sql = format!(
        "SELECT {} FROM sessions WHERE is_active = 1 ORDER BY created_at DESC, id",
        SESSION_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(db).await?;
    Ok(rows.iter().map(session_from_row).collect())
}

/// Identities of all active sessions
pub async fn active_ids(db: &SqlitePool) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar("SELECT id FROM sessions WHERE is_active = 1")
        .fetch_all(db)
        .await?;
    Ok(ids)
}

/// Mark a session inactive; returns false if it was not active
pub async fn deactivate(db: &SqlitePool, session_id: &str, ended_at: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET is_active = 0, ended_at = ? WHERE id = ? AND is_active = 1")
        .bind(ended_at)
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() == 1)
}
