//! One file per storage key under the data directory: the user blob as JSON
//! and the bearer token as plain text.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{SessionError, SessionRepository};
use crate::config::{TOKEN_KEY, USER_KEY};
use crate::models::{SessionState, StoredSession};

pub struct FileSessionRepository {
    dir: PathBuf,
}

impl FileSessionRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn user_path(&self) -> PathBuf {
        self.dir.join(USER_KEY)
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_KEY)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, SessionError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_optional(path: &Path) -> Result<(), SessionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write via a sibling temp file so a crash never leaves half a blob.
/// The temp file is restricted before any content lands in it.
fn write_atomic(path: &Path, contents: &str) -> Result<(), SessionError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, "")?;
    set_file_permissions(&tmp)?;
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Set directory permissions to owner-only (0o700 on Unix).
#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SessionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SessionError> {
    Ok(())
}

/// Session files hold the bearer token: owner read/write only (0o600 on Unix).
#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SessionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SessionError> {
    Ok(())
}

impl SessionRepository for FileSessionRepository {
    fn load(&self) -> Result<Option<StoredSession>, SessionError> {
        let Some(blob) = read_optional(&self.user_path())? else {
            return Ok(None);
        };
        let user: SessionState = serde_json::from_str(&blob)?;
        let token = read_optional(&self.token_path())?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(Some(StoredSession { user, token }))
    }

    fn save(&self, session: &StoredSession) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir)?;
        set_dir_permissions(&self.dir)?;
        write_atomic(&self.user_path(), &serde_json::to_string(&session.user)?)?;
        match &session.token {
            Some(token) => write_atomic(&self.token_path(), token)?,
            None => remove_optional(&self.token_path())?,
        }
        tracing::debug!(dir = %self.dir.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        remove_optional(&self.user_path())?;
        remove_optional(&self.token_path())?;
        Ok(())
    }
}
