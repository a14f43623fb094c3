//! Confusion reading queries (append-only)

use qf_common::models::ConfusionReading;
use qf_common::time::{from_millis, to_millis};
use qf_common::Result;
use sqlx::{Row, SqlitePool};

/// Append a reading; the returned value carries the assigned row id
pub async fn insert(db: &SqlitePool, reading: &ConfusionReading) -> Result<ConfusionReading> {
    let result = sqlx::query(
        "INSERT INTO confusion_readings (session_id, student_id, student_name, level, timestamp) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&reading.session_id)
    .bind(&reading.student_id)
    .bind(&reading.student_name)
    .bind(reading.level)
    .bind(to_millis(reading.timestamp))
    .execute(db)
    .await?;

    Ok(ConfusionReading {
        id: result.last_insert_rowid(),
        ..reading.clone()
    })
}

/// Readings for a session at or after `since_ms`, newest first
pub async fn readings_since(db: &SqlitePool, session_id: &str, since_ms: i64) -> std::result::Result<Vec<ConfusionReading>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, student_id, student_name, level, timestamp
        FROM confusion_readings
        WHERE session_id = ? AND timestamp >= ?
        ORDER BY timestamp DESC, id DESC
        "#,
    )
    .bind(session_id)
    .bind(since_ms)
    .fetch_all(db)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ConfusionReading {
            id: row.get("id"),
            session_id: row.get("session_id"),
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            level: row.get("level"),
            timestamp: from_millis(row.get("timestamp")),
        })
        .collect())
}
