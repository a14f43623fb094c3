//! Sliding-window confusion aggregation
//!
//! Readings are append-only. A snapshot counts, per level, the most recent
//! reading of every student inside the trailing window.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qf_common::models::{ConfusionReading, ConfusionSnapshot};
use qf_common::time::{now, to_millis};
use qf_common::{Error, Result, RoomBroadcaster, SessionEvent};
use sqlx::SqlitePool;
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::db;

/// Why a snapshot could not be computed
#[derive(Debug, ThisError)]
pub enum AggregationError {
    #[error("failed to read confusion readings: {0}")]
    Store(#[from] sqlx::Error),
}

/// Outcome of recording a reading
///
/// The reading is always persisted when this is returned; the snapshot may
/// still have failed.
#[derive(Debug)]
pub struct RecordOutcome {
    pub reading: ConfusionReading,
    pub snapshot: std::result::Result<ConfusionSnapshot, AggregationError>,
}

pub struct ConfusionAggregator {
    db: SqlitePool,
    rooms: Arc<RoomBroadcaster>,
    window: Duration,
}

impl ConfusionAggregator {
    pub fn new(db: SqlitePool, rooms: Arc<RoomBroadcaster>, window: Duration) -> Self {
        Self { db, rooms, window }
    }

    /// Append a reading for an active session and recompute its snapshot
    ///
    /// `confusion-updated` is broadcast only when the snapshot was computed.
    pub async fn record(
        &self,
        session_id: &str,
        student_id: &str,
        student_name: Option<String>,
        level: i64,
    ) -> Result<RecordOutcome> {
        if student_id.trim().is_empty() {
            return Err(Error::InvalidInput("studentId must not be empty".to_string()));
        }
        let session = db::sessions::get(&self.db, session_id).await?;
        if !session.is_active {
            return Err(Error::InvalidState(format!("Session {} is not active", session_id)));
        }

        let reading = db::confusion::insert(
            &self.db,
            &ConfusionReading {
                id: 0,
                session_id: session_id.to_string(),
                student_id: student_id.to_string(),
                student_name,
                level,
                timestamp: now(),
            },
        )
        .await?;

        let snapshot = self.snapshot(session_id).await;
        match &snapshot {
            Ok(stats) => {
                self.rooms
                    .broadcast(session_id, &SessionEvent::ConfusionUpdated(*stats));
            }
            Err(e) => warn!(session_id, error = %e, "confusion snapshot failed after recording reading"),
        }

        Ok(RecordOutcome { reading, snapshot })
    }

    /// Current snapshot for a session
    pub async fn snapshot(&self, session_id: &str) -> std::result::Result<ConfusionSnapshot, AggregationError> {
        self.snapshot_at(session_id, now()).await
    }

    /// Snapshot as seen at `at`
    pub async fn snapshot_at(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<ConfusionSnapshot, AggregationError> {
        let since = to_millis(at) - self.window.as_millis() as i64;
        let readings = db::confusion::readings_since(&self.db, session_id, since).await?;
        let snapshot = aggregate(&readings, at, self.window);
        debug!(session_id, readings = readings.len(), total = snapshot.total, "confusion snapshot");
        Ok(snapshot)
    }
}

/// Bucket the latest in-window reading of each student
///
/// Readings outside `[at - window, at]` are ignored. When a student has two
/// readings with the same timestamp the one with the higher id wins. Unknown
/// levels are dropped without error.
pub fn aggregate(readings: &[ConfusionReading], at: DateTime<Utc>, window: Duration) -> ConfusionSnapshot {
    let upper = to_millis(at);
    let lower = upper - window.as_millis() as i64;

    let mut in_window: Vec<&ConfusionReading> = readings
        .iter()
        .filter(|r| {
            let ts = to_millis(r.timestamp);
            ts >= lower && ts <= upper
        })
        .collect();
    in_window.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

    let mut seen: HashSet<&str> = HashSet::new();
    let mut snapshot = ConfusionSnapshot::zero();
    for reading in in_window {
        if seen.insert(reading.student_id.as_str()) {
            snapshot.add(reading.level);
        }
    }
    snapshot
}
