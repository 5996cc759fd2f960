use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use pulse_common::config::SessionConfig;
use pulse_common::{PulseError, Session};

/// On-disk home of the login session. Single writer: the run that owns it.
pub struct SessionStore {
    path: PathBuf,
    max_age: Option<chrono::Duration>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, max_age: Option<chrono::Duration>) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.path.clone(), config.max_age())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved session. Missing, unreadable, corrupt or stale files all
    /// come back as `None`; nothing here is fatal.
    pub fn load(&self) -> Option<Session> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved session");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Saved session unreadable");
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Saved session is corrupt");
                return None;
            }
        };

        if let Some(max_age) = self.max_age {
            let age = session.age(Utc::now());
            if age > max_age {
                info!(
                    path = %self.path.display(),
                    age_hours = age.num_hours(),
                    "Saved session is stale"
                );
                return None;
            }
        }

        Some(session)
    }

    /// Replace the saved session atomically: write a sibling temp file, then rename.
    pub fn save(&self, session: &Session) -> Result<(), PulseError> {
        self.write_atomic(session)
            .map_err(|e| PulseError::Session(format!("{e:#}")))?;
        info!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    /// Delete the saved session. A missing file is fine.
    pub fn invalidate(&self) -> Result<(), PulseError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Saved session invalidated");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PulseError::Session(format!(
                "Failed to delete {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_atomic(&self, session: &Session) -> anyhow::Result<()> {
        let dir = parent_dir(&self.path);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(session).context("Failed to serialize session")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json).context("Failed to write session")?;
        tmp.as_file().sync_all().context("Failed to flush session")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Directory a sibling temp file should live in so `rename` stays on one filesystem.
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("session.json"), None)
    }

    #[test]
    fn save_then_load_returns_same_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let session = Session::capture(json!([{ "name": "SUB", "value": "abc" }]));

        store.save(&session).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, session);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().is_none());
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn stale_session_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(
            dir.path().join("session.json"),
            Some(chrono::Duration::hours(1)),
        );
        let session = Session {
            state: json!([]),
            captured_at: Utc::now() - chrono::Duration::hours(3),
        };
        store.save(&session).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn save_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&Session::capture(json!(["old"]))).unwrap();
        store.save(&Session::capture(json!(["new"]))).unwrap();

        assert_eq!(store.load().unwrap().state, json!(["new"]));
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/state/session.json"), None);
        store.save(&Session::capture(json!([]))).unwrap();
        assert!(store.load().is_some());
    }

    #[test]
    fn invalidate_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&Session::capture(json!([]))).unwrap();

        store.invalidate().unwrap();
        assert!(!store.path().exists());
        store.invalidate().unwrap();
    }
}
