use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{SessionError, SessionRepository};
use crate::models::StoredSession;

/// Process-local repository. Clones share the same slot.
#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    slot: Arc<Mutex<Option<StoredSession>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        let repo = Self::new();
        if let Ok(mut slot) = repo.slot.lock() {
            *slot = Some(session);
        }
        repo
    }

    /// Make every later `save` fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl SessionRepository for MemorySessionRepository {
    fn load(&self) -> Result<Option<StoredSession>, SessionError> {
        let slot = self.slot.lock().map_err(|_| SessionError::LockPoisoned)?;
        Ok(slot.clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), SessionError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SessionError::Io(std::io::Error::other(
                "session storage unavailable",
            )));
        }
        let mut slot = self.slot.lock().map_err(|_| SessionError::LockPoisoned)?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut slot = self.slot.lock().map_err(|_| SessionError::LockPoisoned)?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionState;

    fn stored() -> StoredSession {
        StoredSession {
            user: SessionState {
                id: "1".into(),
                username: "a".into(),
                email: "a@b.c".into(),
                reports_analyzed: 0,
                last_upload_date: None,
            },
            token: None,
        }
    }

    #[test]
    fn clones_share_state() {
        let a = MemorySessionRepository::new();
        let b = a.clone();
        a.save(&stored()).unwrap();
        assert_eq!(b.load().unwrap(), Some(stored()));
        b.clear().unwrap();
        assert_eq!(a.load().unwrap(), None);
    }

    #[test]
    fn preloaded_session() {
        let repo = MemorySessionRepository::with_session(stored());
        assert!(repo.load().unwrap().is_some());
    }

    #[test]
    fn failing_saves() {
        let repo = MemorySessionRepository::new();
        repo.fail_saves(true);
        assert!(matches!(repo.save(&stored()), Err(SessionError::Io(_))));
        assert_eq!(repo.load().unwrap(), None);
    }
}
