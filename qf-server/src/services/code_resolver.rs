//! Short session code resolution
//!
//! Keeps an index from the derived 6-character code to the identities of the
//! active sessions carrying it. The index is rebuilt from the store at startup
//! and updated by the session directory on activation and deactivation.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use qf_common::models::{is_session_code, session_code, SESSION_CODE_LEN};
use qf_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;

#[derive(Default)]
pub struct CodeResolver {
    index: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl CodeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from every active session in the store
    pub async fn load(db: &SqlitePool) -> Result<Self> {
        let resolver = Self::new();
        let ids = db::sessions::active_ids(db).await?;
        for id in &ids {
            resolver.register(id);
        }
        info!("Session code index loaded with {} active sessions", ids.len());
        Ok(resolver)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, BTreeSet<String>>> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, BTreeSet<String>>> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an active session
    pub fn register(&self, session_id: &str) {
        let code = session_code(session_id);
        debug!(session_id, code = %code, "registering session code");
        self.write().entry(code).or_default().insert(session_id.to_string());
    }

    /// Forget a session that is no longer active
    pub fn unregister(&self, session_id: &str) {
        let code = session_code(session_id);
        let mut index = self.write();
        if let Some(ids) = index.get_mut(&code) {
            ids.remove(session_id);
            if ids.is_empty() {
                index.remove(&code);
            }
        }
    }

    /// True if an active session already answers to `code`
    pub fn is_taken(&self, code: &str) -> bool {
        self.read().contains_key(&code.to_uppercase())
    }

    /// Map a raw identifier to a session identity
    ///
    /// Anything that is not exactly six characters long is taken to be a full
    /// identity and returned unchanged. A six-character value must be an
    /// alphanumeric code matching exactly one active session.
    pub fn resolve(&self, raw: &str) -> Result<String> {
        if raw.chars().count() != SESSION_CODE_LEN {
            return Ok(raw.to_string());
        }
        if !is_session_code(raw) {
            return Err(Error::NotFound(format!("Session {}", raw)));
        }

        let code = raw.to_uppercase();
        let index = self.read();
        let mut matches = index.get(&code).into_iter().flatten();
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(Error::AmbiguousCode(code)),
            (None, _) => Err(Error::NotFound(format!("Session {}", raw))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_A: &str = "5f0c2d1e-8a7b-4c3d-9e2f-0a1b2cab12cd";
    const SESSION_B: &str = "77777777-8a7b-4c3d-9e2f-000000ff00ee";

    #[test]
    fn test_resolve_code_case_insensitive() {
        let resolver = CodeResolver::new();
        resolver.register(SESSION_A);

        assert_eq!(resolver.resolve("AB12CD").unwrap(), SESSION_A);
        assert_eq!(resolver.resolve("ab12cd").unwrap(), SESSION_A);
    }

    #[test]
    fn test_full_identity_passes_through_without_lookup() {
        let resolver = CodeResolver::new();
        assert_eq!(resolver.resolve(SESSION_B).unwrap(), SESSION_B);
    }

    #[test]
    fn test_unknown_code_not_found() {
        let resolver = CodeResolver::new();
        resolver.register(SESSION_A);
        assert!(matches!(resolver.resolve("ZZZZZZ"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_non_alphanumeric_six_chars_not_found() {
        let resolver = CodeResolver::new();
        assert!(matches!(resolver.resolve("ab-12c"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_unregistered_session_no_longer_resolves() {
        let resolver = CodeResolver::new();
        resolver.register(SESSION_A);
        resolver.unregister(SESSION_A);
        assert!(matches!(resolver.resolve("AB12CD"), Err(Error::NotFound(_))));
        assert!(!resolver.is_taken("AB12CD"));
    }

    #[test]
    fn test_colliding_codes_are_ambiguous() {
        let resolver = CodeResolver::new();
        resolver.register(SESSION_A);
        resolver.register("00000000-0000-4000-8000-0000ffab12cd");

        assert!(resolver.is_taken("ab12cd"));
        assert!(matches!(resolver.resolve("AB12CD"), Err(Error::AmbiguousCode(_))));
    }
}
