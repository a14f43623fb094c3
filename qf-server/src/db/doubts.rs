//! Doubt queries
//!
//! A doubt is stored as one `doubts` row plus its merge events
//! (`doubt_merged_students`) and upvotes (`doubt_upvotes`).

use std::collections::HashMap;

use qf_common::models::{Doubt, MergedStudent};
use qf_common::time::{from_millis, to_millis};
use qf_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

const DOUBT_COLUMNS: &str = "id, session_id, question, student_id, student_name, is_anonymous, \
     topic, confusion_level, is_answered, answer, answered_at, upvotes, merged_with, \
     merged_count, created_at";

/// Listing filters; `None` means "don't filter"
#[derive(Debug, Clone, Default)]
pub struct DoubtFilter {
    pub answered: Option<bool>,
    pub topic: Option<String>,
}

fn doubt_from_row(row: &SqliteRow) -> Doubt {
    Doubt {
        id: row.get("id"),
        session_id: row.get("session_id"),
        question: row.get("question"),
        student_id: row.get("student_id"),
        student_name: row.get("student_name"),
        is_anonymous: row.get::<i64, _>("is_anonymous") != 0,
        topic: row.get("topic"),
        confusion_level: row.get("confusion_level"),
        is_answered: row.get::<i64, _>("is_answered") != 0,
        answer: row.get("answer"),
        answered_at: row.get::<Option<i64>, _>("answered_at").map(from_millis),
        upvotes: row.get("upvotes"),
        upvoted_by: Vec::new(),
        merged_with: row.get("merged_with"),
        merged_count: row.get("merged_count"),
        merged_students: Vec::new(),
        created_at: from_millis(row.get("created_at")),
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, doubts: &[Doubt]) {
    let mut ids = qb.separated(", ");
    for doubt in doubts {
        ids.push_bind(doubt.id.clone());
    }
    ids.push_unseparated(") ORDER BY id");
}

/// Attach merge events and upvoters to bare doubt rows
async fn hydrate(db: &SqlitePool, mut doubts: Vec<Doubt>) -> Result<Vec<Doubt>> {
    if doubts.is_empty() {
        return Ok(doubts);
    }

    let mut merged: HashMap<String, Vec<MergedStudent>> = HashMap::new();
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT doubt_id, student_id, student_name, timestamp FROM doubt_merged_students WHERE doubt_id IN (",
    );
    push_id_list(&mut qb, &doubts);
    for row in qb.build().fetch_all(db).await? {
        merged
            .entry(row.get("doubt_id"))
            .or_default()
            .push(MergedStudent {
                student_id: row.get("student_id"),
                student_name: row.get("student_name"),
                timestamp: from_millis(row.get("timestamp")),
            });
    }

    let mut upvoters: HashMap<String, Vec<String>> = HashMap::new();
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT doubt_id, student_id FROM doubt_upvotes WHERE doubt_id IN (");
    push_id_list(&mut qb, &doubts);
    for row in qb.build().fetch_all(db).await? {
        upvoters
            .entry(row.get("doubt_id"))
            .or_default()
            .push(row.get("student_id"));
    }

    for doubt in &mut doubts {
        doubt.merged_students = merged.remove(&doubt.id).unwrap_or_default();
        doubt.upvoted_by = upvoters.remove(&doubt.id).unwrap_or_default();
    }
    Ok(doubts)
}

/// Get a fully hydrated doubt
pub async fn get(db: &SqlitePool, doubt_id: &str) -> Result<Doubt> {
    let sql = format!("SELECT {} FROM doubts WHERE id = ?", DOUBT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(doubt_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Doubt {}", doubt_id)))?;

    let mut doubts = hydrate(db, vec![doubt_from_row(&row)]).await?;
    doubts
        .pop()
        .ok_or_else(|| Error::Internal(format!("Doubt {} vanished during load", doubt_id)))
}

/// Canonical doubts of a session, most merged first, then most recent first
pub async fn list_canonical(db: &SqlitePool, session_id: &str, filter: &DoubtFilter) -> Result<Vec<Doubt>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {} FROM doubts WHERE session_id = ", DOUBT_COLUMNS));
    qb.push_bind(session_id.to_string());
    qb.push(" AND merged_with IS NULL");
    if let Some(answered) = filter.answered {
        qb.push(" AND is_answered = ").push_bind(answered as i64);
    }
    if let Some(topic) = &filter.topic {
        qb.push(" AND topic = ").push_bind(topic.clone());
    }
    qb.push(" ORDER BY merged_count DESC, created_at DESC, id");

    let rows = qb.build().fetch_all(db).await?;
    hydrate(db, rows.iter().map(doubt_from_row).collect()).await
}

/// Canonical doubts of a session as bare rows, oldest first
///
/// Used for duplicate matching, which only looks at question text and
/// topic, so merge events and upvoters are not loaded.
pub async fn merge_candidates(db: &SqlitePool, session_id: &str) -> Result<Vec<Doubt>> {
    let sql = format!(
        "SELECT {} FROM doubts WHERE session_id = ? AND merged_with IS NULL ORDER BY created_at, id",
        DOUBT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(session_id).fetch_all(db).await?;
    Ok(rows.iter().map(doubt_from_row).collect())
}

/// Persist a new canonical doubt and count it in the session stats
///
/// The doubt's `merged_students` (its own submission) are stored alongside.
pub async fn insert_new(db: &SqlitePool, doubt: &Doubt) -> Result<()> {
    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO doubts (id, session_id, question, student_id, student_name, is_anonymous,
                            topic, confusion_level, is_answered, answer, answered_at, upvotes,
                            merged_with, merged_count, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, 0, NULL, ?, ?)
        "#,
    )
    .bind(&doubt.id)
    .bind(&doubt.session_id)
    .bind(&doubt.question)
    .bind(&doubt.student_id)
    .bind(&doubt.student_name)
    .bind(doubt.is_anonymous as i64)
    .bind(&doubt.topic)
    .bind(doubt.confusion_level)
    .bind(doubt.merged_students.len() as i64)
    .bind(to_millis(doubt.created_at))
    .execute(&mut *tx)
    .await?;

    for student in &doubt.merged_students {
        sqlx::query(
            "INSERT INTO doubt_merged_students (doubt_id, student_id, student_name, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(&doubt.id)
        .bind(&student.student_id)
        .bind(&student.student_name)
        .bind(to_millis(student.timestamp))
        .execute(&mut *tx)
        .await?;
    }

    let updated = sqlx::query("UPDATE sessions SET total_doubts = total_doubts + 1 WHERE id = ?")
        .bind(&doubt.session_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Session {}", doubt.session_id)));
    }

    tx.commit().await?;
    Ok(())
}

/// Fold a submission into a canonical doubt
///
/// Returns false (and changes nothing) when the target is missing or is not
/// canonical.
pub async fn merge_into(db: &SqlitePool, doubt_id: &str, student: &MergedStudent) -> Result<bool> {
    let mut tx = db.begin().await?;

    let updated = sqlx::query(
        "UPDATE doubts SET merged_count = merged_count + 1 WHERE id = ? AND merged_with IS NULL",
    )
    .bind(doubt_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO doubt_merged_students (doubt_id, student_id, student_name, timestamp) VALUES (?, ?, ?, ?)",
    )
    .bind(doubt_id)
    .bind(&student.student_id)
    .bind(&student.student_name)
    .bind(to_millis(student.timestamp))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Mark a doubt answered
///
/// `answered_doubts` on the owning session is only incremented on the
/// unanswered → answered transition. Returns whether that transition happened.
pub async fn mark_answered(db: &SqlitePool, doubt_id: &str, answer: Option<&str>, answered_at: i64) -> Result<bool> {
    let mut tx = db.begin().await?;

    let transitioned = sqlx::query("UPDATE doubts SET is_answered = 1 WHERE id = ? AND is_answered = 0")
        .bind(doubt_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
        == 1;

    let updated = sqlx::query("UPDATE doubts SET answered_at = ?, answer = COALESCE(?, answer) WHERE id = ?")
        .bind(answered_at)
        .bind(answer)
        .bind(doubt_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Doubt {}", doubt_id)));
    }

    if transitioned {
        sqlx::query(
            "UPDATE sessions SET answered_doubts = answered_doubts + 1 \
             WHERE id = (SELECT session_id FROM doubts WHERE id = ?)",
        )
        .bind(doubt_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(transitioned)
}

/// Flip one student's upvote on a doubt; returns true if the vote is now cast
pub async fn toggle_upvote(db: &SqlitePool, doubt_id: &str, student_id: &str) -> Result<bool> {
    let mut tx = db.begin().await?;

    let removed = sqlx::query("DELETE FROM doubt_upvotes WHERE doubt_id = ? AND student_id = ?")
        .bind(doubt_id)
        .bind(student_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
        == 1;

    if removed {
        sqlx::query("UPDATE doubts SET upvotes = upvotes - 1 WHERE id = ?")
            .bind(doubt_id)
            .execute(&mut *tx)
            .await?;
    } else {
        let updated = sqlx::query("UPDATE doubts SET upvotes = upvotes + 1 WHERE id = ?")
            .bind(doubt_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Doubt {}", doubt_id)));
        }
        sqlx::query("INSERT INTO doubt_upvotes (doubt_id, student_id) VALUES (?, ?)")
            .bind(doubt_id)
            .bind(student_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(!removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qf_common::db::init_memory_database;
    use qf_common::models::{Session, SessionSettings, SessionStats};
    use qf_common::time::now;

    const SESSION_ID: &str = "5f0c2d1e-8a7b-4c3d-9e2f-0a1b2cab12cd";

    fn doubt(id: &str, question: &str) -> Doubt {
        let created_at = now();
        Doubt {
            id: id.to_string(),
            session_id: SESSION_ID.to_string(),
            question: question.to_string(),
            student_id: "alice".to_string(),
            student_name: "Alice".to_string(),
            is_anonymous: false,
            topic: "Recursion".to_string(),
            confusion_level: 1,
            is_answered: false,
            answer: None,
            answered_at: None,
            upvotes: 0,
            upvoted_by: vec![],
            merged_with: None,
            merged_count: 1,
            merged_students: vec![MergedStudent {
                student_id: "alice".to_string(),
                student_name: "Alice".to_string(),
                timestamp: created_at,
            }],
            created_at,
        }
    }

    #[tokio::test]
    async fn test_merge_candidates_are_bare_canonical_rows() {
        let db = init_memory_database().await.unwrap();
        crate::db::sessions::insert(
            &db,
            &Session {
                id: SESSION_ID.to_string(),
                title: "Algorithms".to_string(),
                instructor_name: None,
                is_active: true,
                settings: SessionSettings::default(),
                stats: SessionStats::default(),
                created_at: now(),
                ended_at: None,
            },
        )
        .await
        .unwrap();

        insert_new(&db, &doubt("d1", "What is recursion?")).await.unwrap();
        toggle_upvote(&db, "d1", "bob").await.unwrap();

        let candidates = merge_candidates(&db, SESSION_ID).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].question, "What is recursion?");
        assert_eq!(candidates[0].upvotes, 1);
        assert!(candidates[0].merged_students.is_empty());
        assert!(candidates[0].upvoted_by.is_empty());

        // fully hydrated read still carries the details
        let full = get(&db, "d1").await.unwrap();
        assert_eq!(full.merged_students.len(), 1);
        assert_eq!(full.upvoted_by, vec!["bob".to_string()]);

        assert!(merge_candidates(&db, "other-session").await.unwrap().is_empty());
    }
}
