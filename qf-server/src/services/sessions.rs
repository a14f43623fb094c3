//! Session directory: create, look up, list and end sessions
//!
//! Keeps the code index in step with each session's active flag.

use std::sync::Arc;

use qf_common::models::{session_code, Session, SessionSettings, SessionStats};
use qf_common::time::{now, to_millis};
use qf_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::services::code_resolver::CodeResolver;

/// Fresh identities drawn before giving up on a code collision
const MAX_CODE_ATTEMPTS: usize = 16;

/// Parameters for a new session
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub title: String,
    pub instructor_name: Option<String>,
    pub settings: Option<SessionSettings>,
}

pub struct SessionDirectory {
    db: SqlitePool,
    codes: Arc<CodeResolver>,
}

impl SessionDirectory {
    pub fn new(db: SqlitePool, codes: Arc<CodeResolver>) -> Self {
        Self { db, codes }
    }

    /// Create an active session whose code is not shared with any other
    /// active session
    pub async fn create(&self, params: NewSession) -> Result<Session> {
        let title = params.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("title must not be empty".to_string()));
        }

        let mut id = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = Uuid::new_v4().to_string();
            let code = session_code(&candidate);
            if self.codes.is_taken(&code) {
                warn!(code = %code, "session code already in use, drawing another identity");
                continue;
            }
            id = Some(candidate);
            break;
        }
        let id = id.ok_or_else(|| Error::Internal("could not allocate a unique session code".to_string()))?;

        let session = Session {
            id,
            title: title.to_string(),
            instructor_name: params.instructor_name.filter(|n| !n.trim().is_empty()),
            is_active: true,
            settings: params.settings.unwrap_or_default(),
            stats: SessionStats::default(),
            created_at: now(),
            ended_at: None,
        };
        db::sessions::insert(&self.db, &session).await?;
        self.codes.register(&session.id);

        info!(session_id = %session.id, code = %session.code(), title = %session.title, "Session created");
        Ok(session)
    }

    /// Look a session up by full identity or short code
    pub async fn get(&self, id_or_code: &str) -> Result<Session> {
        let session_id = self.codes.resolve(id_or_code)?;
        db::sessions::get(&self.db, &session_id).await
    }

    /// Active sessions, newest first
    pub async fn list_active(&self) -> Result<Vec<Session>> {
        db::sessions::list_active(&self.db).await
    }

    /// Deactivate a session; its code stops resolving
    pub async fn end(&self, id_or_code: &str) -> Result<Session> {
        let session_id = self.codes.resolve(id_or_code)?;
        let ended = db::sessions::deactivate(&self.db, &session_id, to_millis(now())).await?;
        if !ended {
            // distinguish "missing" from "already ended"
            db::sessions::get(&self.db, &session_id).await?;
            return Err(Error::InvalidState(format!("Session {} has already ended", session_id)));
        }
        self.codes.unregister(&session_id);

        let session = db::sessions::get(&self.db, &session_id).await?;
        info!(session_id = %session.id, "Session ended");
        Ok(session)
    }
}
