//! Signed-in user state.
//!
//! `SessionContext` is the one owner of the current user. It is passed
//! explicitly to the orchestrator and the auth flows, and writes through a
//! `SessionRepository` so the storage medium can be swapped in tests.

pub mod file_store;
pub mod memory_store;

pub use file_store::FileSessionRepository;
pub use memory_store::MemorySessionRepository;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{SessionState, StoredSession};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session lock poisoned")]
    LockPoisoned,

    #[error("No user is signed in")]
    NotAuthenticated,
}

/// Persistence contract for the session blob and token.
pub trait SessionRepository: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>, SessionError>;
    fn save(&self, session: &StoredSession) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

// ═══════════════════════════════════════════════════════════
// SessionContext
// ═══════════════════════════════════════════════════════════

pub struct SessionContext {
    repo: Box<dyn SessionRepository>,
    current: RwLock<Option<StoredSession>>,
}

impl SessionContext {
    /// A signed-out context over `repo`. Nothing is read.
    pub fn new(repo: Box<dyn SessionRepository>) -> Self {
        Self {
            repo,
            current: RwLock::new(None),
        }
    }

    /// Load any persisted session. A blob that no longer parses is discarded
    /// and the context starts signed out.
    pub fn restore(repo: Box<dyn SessionRepository>) -> Result<Self, SessionError> {
        let current = match repo.load() {
            Ok(stored) => stored,
            Err(SessionError::Serialization(e)) => {
                tracing::warn!(error = %e, "Discarding unreadable stored session");
                repo.clear()?;
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(stored) = &current {
            tracing::debug!(user_id = %stored.user.id, "Restored session");
        }

        Ok(Self {
            repo,
            current: RwLock::new(current),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<StoredSession>>, SessionError> {
        self.current.read().map_err(|_| SessionError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<StoredSession>>, SessionError> {
        self.current.write().map_err(|_| SessionError::LockPoisoned)
    }

    pub fn user(&self) -> Option<SessionState> {
        self.read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.user.clone()))
    }

    pub fn email(&self) -> Option<String> {
        self.user().map(|u| u.email)
    }

    pub fn token(&self) -> Option<String> {
        self.read()
            .ok()
            .and_then(|guard| guard.as_ref().and_then(|s| s.token.clone()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Persist and adopt a freshly authenticated user.
    pub fn sign_in(&self, user: SessionState, token: Option<String>) -> Result<(), SessionError> {
        let stored = StoredSession { user, token };
        self.repo.save(&stored)?;
        *self.write()? = Some(stored);
        Ok(())
    }

    /// Forget the user both in memory and in storage.
    pub fn logout(&self) -> Result<(), SessionError> {
        *self.write()? = None;
        self.repo.clear()
    }

    /// Count one analyzed report for the signed-in user, in memory only.
    /// Follow with `persist()`; a failed write leaves the credit in memory.
    pub fn credit_upload(&self, at: DateTime<Utc>) -> Result<StoredSession, SessionError> {
        let mut guard = self.write()?;
        let stored = guard.as_mut().ok_or(SessionError::NotAuthenticated)?;
        stored.user.record_upload(at);
        Ok(stored.clone())
    }

    /// Write the signed-in session to the repository as it is now.
    pub fn persist(&self) -> Result<SessionState, SessionError> {
        let stored = self.read()?.clone().ok_or(SessionError::NotAuthenticated)?;
        self.repo.save(&stored)?;
        Ok(stored.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_user() -> SessionState {
        SessionState {
            id: "u1".into(),
            username: "sam".into(),
            email: "sam@example.org".into(),
            reports_analyzed: 2,
            last_upload_date: None,
        }
    }

    #[test]
    fn new_context_is_signed_out() {
        let ctx = SessionContext::new(Box::new(MemorySessionRepository::new()));
        assert!(!ctx.is_authenticated());
        assert!(ctx.user().is_none());
        assert!(ctx.token().is_none());
    }

    #[test]
    fn sign_in_persists_and_restores() {
        let repo = MemorySessionRepository::new();
        let ctx = SessionContext::new(Box::new(repo.clone()));
        ctx.sign_in(sample_user(), Some("tok".into())).unwrap();

        let restored = SessionContext::restore(Box::new(repo)).unwrap();
        assert_eq!(restored.email().as_deref(), Some("sam@example.org"));
        assert_eq!(restored.token().as_deref(), Some("tok"));
    }

    #[test]
    fn logout_clears_storage() {
        let repo = MemorySessionRepository::new();
        let ctx = SessionContext::new(Box::new(repo.clone()));
        ctx.sign_in(sample_user(), None).unwrap();
        ctx.logout().unwrap();

        assert!(!ctx.is_authenticated());
        assert!(repo.load().unwrap().is_none());
    }

    #[test]
    fn credit_stays_in_memory_until_persisted() {
        let repo = MemorySessionRepository::new();
        let ctx = SessionContext::new(Box::new(repo.clone()));
        ctx.sign_in(sample_user(), None).unwrap();

        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let stored = ctx.credit_upload(at).unwrap();
        assert_eq!(stored.user.reports_analyzed, 3);
        assert_eq!(stored.user.last_upload_date, Some(at));
        assert_eq!(repo.load().unwrap().unwrap().user.reports_analyzed, 2);

        assert_eq!(ctx.persist().unwrap().reports_analyzed, 3);
        assert_eq!(repo.load().unwrap().unwrap().user.reports_analyzed, 3);
    }

    #[test]
    fn credit_and_persist_require_user() {
        let ctx = SessionContext::new(Box::new(MemorySessionRepository::new()));
        assert!(matches!(
            ctx.credit_upload(Utc::now()),
            Err(SessionError::NotAuthenticated)
        ));
        assert!(matches!(ctx.persist(), Err(SessionError::NotAuthenticated)));
    }

    #[test]
    fn credit_survives_failed_persist() {
        let repo = MemorySessionRepository::new();
        let ctx = SessionContext::new(Box::new(repo.clone()));
        ctx.sign_in(sample_user(), None).unwrap();

        repo.fail_saves(true);
        ctx.credit_upload(Utc::now()).unwrap();
        assert!(ctx.persist().is_err());
        assert_eq!(ctx.user().unwrap().reports_analyzed, 3);
    }

    #[test]
    fn corrupt_blob_starts_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(crate::config::USER_KEY), "{not json").unwrap();

        let repo = FileSessionRepository::new(dir.path());
        let ctx = SessionContext::restore(Box::new(repo)).unwrap();
        assert!(!ctx.is_authenticated());
        assert!(!dir.path().join(crate::config::USER_KEY).exists());
    }
}
