//! Doubt lifecycle: submission with duplicate merging, answers and upvotes
//!
//! Every mutation is persisted first and broadcast to the owning session's
//! room only after the store accepted it. A failed write produces no event.

use std::sync::Arc;

use qf_common::models::{Doubt, MergedStudent, ANONYMOUS_NAME};
use qf_common::time::{now, to_millis};
use qf_common::{Error, Result, RoomBroadcaster, SessionEvent};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db;
use crate::db::doubts::DoubtFilter;
use crate::services::similarity::{extract_topic, SimilarityMatcher};

/// Confusion level recorded when the submission carries none
pub const DEFAULT_CONFUSION_LEVEL: i64 = 1;

/// One question as submitted by a student
#[derive(Debug, Clone)]
pub struct DoubtSubmission {
    pub question: String,
    pub student_id: String,
    pub student_name: Option<String>,
    pub is_anonymous: bool,
    pub confusion_level: Option<i64>,
}

/// Result of a submission: the canonical doubt it landed in
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub doubt: Doubt,
    pub merged: bool,
}

pub struct DoubtLedger {
    db: SqlitePool,
    rooms: Arc<RoomBroadcaster>,
    matcher: Arc<SimilarityMatcher>,
}

impl DoubtLedger {
    pub fn new(db: SqlitePool, rooms: Arc<RoomBroadcaster>, matcher: Arc<SimilarityMatcher>) -> Self {
        Self { db, rooms, matcher }
    }

    /// Submit a question to an active session
    ///
    /// With auto-merge enabled the question is folded into the best-ranked
    /// similar canonical doubt if there is one; otherwise a new canonical doubt
    /// is created and counted in the session's `totalDoubts`.
    pub async fn submit(&self, session_id: &str, submission: DoubtSubmission) -> Result<SubmitOutcome> {
        let session = db::sessions::get(&self.db, session_id).await?;
        if !session.is_active {
            return Err(Error::InvalidState(format!("Session {} is not active", session_id)));
        }

        let question = submission.question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question must not be empty".to_string()));
        }
        if submission.student_id.trim().is_empty() {
            return Err(Error::InvalidInput("studentId must not be empty".to_string()));
        }

        let student_name = if submission.is_anonymous {
            ANONYMOUS_NAME.to_string()
        } else {
            submission
                .student_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| ANONYMOUS_NAME.to_string())
        };
        let submitted_at = now();
        let contribution = MergedStudent {
            student_id: submission.student_id.clone(),
            student_name: student_name.clone(),
            timestamp: submitted_at,
        };

        if session.settings.auto_merge_doubts {
            let matches = self.matcher.find_similar(&self.db, session_id, question).await?;
            if let Some(target) = matches.first() {
                if db::doubts::merge_into(&self.db, &target.id, &contribution).await? {
                    let doubt = db::doubts::get(&self.db, &target.id).await?;
                    info!(
                        session_id,
                        doubt_id = %doubt.id,
                        merged_count = doubt.merged_count,
                        "Merged submission into existing doubt"
                    );
                    self.rooms.broadcast(
                        session_id,
                        &SessionEvent::DoubtMerged {
                            doubt: doubt.clone(),
                            merged_count: doubt.merged_count,
                        },
                    );
                    return Ok(SubmitOutcome { doubt, merged: true });
                }
                debug!(doubt_id = %target.id, "merge target no longer canonical, creating new doubt");
            }
        }

        let doubt = Doubt {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            question: question.to_string(),
            student_id: submission.student_id,
            student_name,
            is_anonymous: submission.is_anonymous,
            topic: extract_topic(question),
            confusion_level: submission.confusion_level.unwrap_or(DEFAULT_CONFUSION_LEVEL),
            is_answered: false,
            answer: None,
            answered_at: None,
            upvotes: 0,
            upvoted_by: Vec::new(),
            merged_with: None,
            merged_count: 1,
            merged_students: vec![contribution],
            created_at: submitted_at,
        };
        db::doubts::insert_new(&self.db, &doubt).await?;

        info!(session_id, doubt_id = %doubt.id, topic = %doubt.topic, "New doubt created");
        self.rooms.broadcast(session_id, &SessionEvent::NewDoubt(doubt.clone()));
        Ok(SubmitOutcome { doubt, merged: false })
    }

    /// Mark a doubt answered, optionally recording the answer text
    pub async fn mark_answered(&self, doubt_id: &str, answer: Option<&str>) -> Result<Doubt> {
        let transitioned = db::doubts::mark_answered(&self.db, doubt_id, answer, to_millis(now())).await?;
        let doubt = db::doubts::get(&self.db, doubt_id).await?;

        info!(doubt_id, session_id = %doubt.session_id, first_answer = transitioned, "Doubt answered");
        self.rooms
            .broadcast(&doubt.session_id, &SessionEvent::DoubtAnswered(doubt.clone()));
        Ok(doubt)
    }

    /// Flip `student_id`'s upvote on a doubt
    pub async fn toggle_upvote(&self, doubt_id: &str, student_id: &str) -> Result<Doubt> {
        if student_id.trim().is_empty() {
            return Err(Error::InvalidInput("studentId must not be empty".to_string()));
        }
        let voted = db::doubts::toggle_upvote(&self.db, doubt_id, student_id).await?;
        let doubt = db::doubts::get(&self.db, doubt_id).await?;

        debug!(doubt_id, student_id, voted, upvotes = doubt.upvotes, "Upvote toggled");
        self.rooms
            .broadcast(&doubt.session_id, &SessionEvent::DoubtUpvoted(doubt.clone()));
        Ok(doubt)
    }

    /// Canonical doubts of a session, most merged then most recent first
    pub async fn list(&self, session_id: &str, filter: &DoubtFilter) -> Result<Vec<Doubt>> {
        db::doubts::list_canonical(&self.db, session_id, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qf_common::config::MatchPolicyKind;
    use qf_common::db::init_memory_database;
    use qf_common::models::{Session, SessionSettings, SessionStats};

    const SESSION_ID: &str = "5f0c2d1e-8a7b-4c3d-9e2f-0a1b2cab12cd";

    async fn setup(auto_merge: bool) -> (SqlitePool, Arc<RoomBroadcaster>, DoubtLedger) {
        let db = init_memory_database().await.unwrap();
        db::sessions::insert(
            &db,
            &Session {
                id: SESSION_ID.to_string(),
                title: "Algorithms".to_string(),
                instructor_name: None,
                is_active: true,
                settings: SessionSettings {
                    auto_merge_doubts: auto_merge,
                },
                stats: SessionStats::default(),
                created_at: now(),
                ended_at: None,
            },
        )
        .await
        .unwrap();

        let rooms = Arc::new(RoomBroadcaster::new(64));
        let matcher = Arc::new(SimilarityMatcher::from_config(MatchPolicyKind::Lexical, 0.8));
        let ledger = DoubtLedger::new(db.clone(), Arc::clone(&rooms), matcher);
        (db, rooms, ledger)
    }

    fn submission(student: &str, question: &str) -> DoubtSubmission {
        DoubtSubmission {
            question: question.to_string(),
            student_id: student.to_string(),
            student_name: Some(student.to_string()),
            is_anonymous: false,
            confusion_level: None,
        }
    }

    #[tokio::test]
    async fn test_near_duplicate_is_merged_without_counting() {
        let (db, rooms, ledger) = setup(true).await;
        let mut watcher = rooms.connect();
        rooms.join(&watcher.connection_id, SESSION_ID).unwrap();

        let first = ledger
            .submit(SESSION_ID, submission("alice", "What is recursion?"))
            .await
            .unwrap();
        assert!(!first.merged);
        assert_eq!(first.doubt.merged_count, 1);
        assert_eq!(first.doubt.confusion_level, DEFAULT_CONFUSION_LEVEL);

        let second = ledger
            .submit(SESSION_ID, submission("bob", "what is recursion"))
            .await
            .unwrap();
        assert!(second.merged);
        assert_eq!(second.doubt.id, first.doubt.id);
        assert_eq!(second.doubt.merged_count, 2);
        assert_eq!(second.doubt.merged_students.len(), 2);
        assert_eq!(second.doubt.merged_students[1].student_id, "bob");

        let session = db::sessions::get(&db, SESSION_ID).await.unwrap();
        assert_eq!(session.stats.total_doubts, 1);

        assert_eq!(watcher.receiver.try_recv().unwrap().event, "new-doubt");
        let merged = watcher.receiver.try_recv().unwrap();
        assert_eq!(merged.event, "doubt-merged");
        assert_eq!(merged.data["mergedCount"], 2);
    }

    #[tokio::test]
    async fn test_n_identical_submissions_yield_one_canonical_doubt() {
        let (_db, _rooms, ledger) = setup(true).await;
        for i in 0..5 {
            ledger
                .submit(SESSION_ID, submission(&format!("student-{}", i), "How does quicksort pick a pivot?"))
                .await
                .unwrap();
        }

        let doubts = ledger.list(SESSION_ID, &DoubtFilter::default()).await.unwrap();
        assert_eq!(doubts.len(), 1);
        assert_eq!(doubts[0].merged_count, 5);
        assert_eq!(doubts[0].merged_students.len(), 5);
    }

    #[tokio::test]
    async fn test_auto_merge_disabled_keeps_doubts_independent() {
        let (db, _rooms, ledger) = setup(false).await;
        for i in 0..3 {
            let outcome = ledger
                .submit(SESSION_ID, submission(&format!("student-{}", i), "What is recursion?"))
                .await
                .unwrap();
            assert!(!outcome.merged);
        }

        let doubts = ledger.list(SESSION_ID, &DoubtFilter::default()).await.unwrap();
        assert_eq!(doubts.len(), 3);
        assert!(doubts.iter().all(|d| d.merged_count == 1));
        let session = db::sessions::get(&db, SESSION_ID).await.unwrap();
        assert_eq!(session.stats.total_doubts, 3);
    }

    #[tokio::test]
    async fn test_anonymous_submission_keeps_raw_identity() {
        let (_db, _rooms, ledger) = setup(true).await;
        let mut anon = submission("carol", "What is a monad?");
        anon.is_anonymous = true;

        let outcome = ledger.submit(SESSION_ID, anon).await.unwrap();
        assert_eq!(outcome.doubt.student_name, ANONYMOUS_NAME);
        assert_eq!(outcome.doubt.student_id, "carol");
        assert_eq!(outcome.doubt.merged_students[0].student_name, ANONYMOUS_NAME);
    }

    #[tokio::test]
    async fn test_submit_to_missing_or_inactive_session() {
        let (db, _rooms, ledger) = setup(true).await;
        let missing = ledger.submit("no-such-session", submission("alice", "Why?")).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        db::sessions::deactivate(&db, SESSION_ID, to_millis(now())).await.unwrap();
        let inactive = ledger.submit(SESSION_ID, submission("alice", "Why?")).await;
        assert!(matches!(inactive, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let (_db, _rooms, ledger) = setup(true).await;
        let result = ledger.submit(SESSION_ID, submission("alice", "   ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_upvote_toggle_is_an_involution() {
        let (_db, rooms, ledger) = setup(true).await;
        let doubt = ledger
            .submit(SESSION_ID, submission("alice", "What is a closure?"))
            .await
            .unwrap()
            .doubt;
        let mut watcher = rooms.connect();
        rooms.join(&watcher.connection_id, SESSION_ID).unwrap();

        let voted = ledger.toggle_upvote(&doubt.id, "bob").await.unwrap();
        assert_eq!(voted.upvotes, 1);
        assert_eq!(voted.upvoted_by, vec!["bob".to_string()]);

        let restored = ledger.toggle_upvote(&doubt.id, "bob").await.unwrap();
        assert_eq!(restored.upvotes, doubt.upvotes);
        assert_eq!(restored.upvoted_by, doubt.upvoted_by);

        assert_eq!(watcher.receiver.try_recv().unwrap().event, "doubt-upvoted");
        assert_eq!(watcher.receiver.try_recv().unwrap().event, "doubt-upvoted");
    }

    #[tokio::test]
    async fn test_upvote_missing_doubt() {
        let (_db, _rooms, ledger) = setup(true).await;
        let result = ledger.toggle_upvote("missing", "bob").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_answered_counts_once() {
        let (db, _rooms, ledger) = setup(true).await;
        let doubt = ledger
            .submit(SESSION_ID, submission("alice", "What is memoization?"))
            .await
            .unwrap()
            .doubt;

        let answered = ledger
            .mark_answered(&doubt.id, Some("Caching results of calls"))
            .await
            .unwrap();
        assert!(answered.is_answered);
        assert!(answered.answered_at.is_some());
        assert_eq!(answered.answer.as_deref(), Some("Caching results of calls"));

        let again = ledger.mark_answered(&doubt.id, None).await.unwrap();
        assert_eq!(again.answer.as_deref(), Some("Caching results of calls"));

        let session = db::sessions::get(&db, SESSION_ID).await.unwrap();
        assert_eq!(session.stats.answered_doubts, 1);

        let missing = ledger.mark_answered("missing", None).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_writes_broadcast_nothing() {
        let (db, rooms, ledger) = setup(true).await;
        let existing = ledger
            .submit(SESSION_ID, submission("alice", "Why is quicksort unstable?"))
            .await
            .unwrap()
            .doubt;

        let mut watcher = rooms.connect();
        rooms.join(&watcher.connection_id, SESSION_ID).unwrap();

        sqlx::query("ALTER TABLE doubts RENAME TO doubts_unavailable")
            .execute(&db)
            .await
            .unwrap();

        assert!(ledger
            .submit(SESSION_ID, submission("bob", "What is a heap?"))
            .await
            .is_err());
        assert!(ledger.mark_answered(&existing.id, Some("pivot choice")).await.is_err());
        assert!(ledger.toggle_upvote(&existing.id, "bob").await.is_err());

        assert!(watcher.receiver.try_recv().is_err(), "no event may follow a failed write");
    }

    #[tokio::test]
    async fn test_list_filters_and_order() {
        let (_db, _rooms, ledger) = setup(true).await;
        let lone = ledger
            .submit(SESSION_ID, submission("alice", "What is a heap?"))
            .await
            .unwrap()
            .doubt;
        ledger
            .submit(SESSION_ID, submission("bob", "Explain dynamic programming"))
            .await
            .unwrap();
        ledger
            .submit(SESSION_ID, submission("carol", "explain dynamic programming!"))
            .await
            .unwrap();
        ledger.mark_answered(&lone.id, None).await.unwrap();

        let all = ledger.list(SESSION_ID, &DoubtFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].merged_count, 2, "most merged first");

        let answered = ledger
            .list(
                SESSION_ID,
                &DoubtFilter {
                    answered: Some(true),
                    topic: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].id, lone.id);

        let by_topic = ledger
            .list(
                SESSION_ID,
                &DoubtFilter {
                    answered: None,
                    topic: Some("Heap".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_topic.len(), 1);
    }
}
