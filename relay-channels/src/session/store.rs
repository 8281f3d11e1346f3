//! File-backed storage for the session record.
//!
//! The record is loaded and saved as a whole. Saves write a temporary file
//! next to the target and rename it into place, so a crash mid-write leaves
//! the previous record intact. A sidecar `.lock` file serializes writers
//! from different processes.

use super::state::{SessionRef, SessionState};
use fs4::fs_std::FileExt;
use relay_common::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk shape. Every field is optional so older or hand-edited records
/// still load.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    scope: Option<PathBuf>,
    #[serde(default)]
    session: SessionRef,
}

/// Durable store for the singleton [`SessionState`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    default_scope: PathBuf,
}

impl SessionStore {
    /// Create a store backed by `path`, falling back to `default_scope`.
    pub fn new(path: impl Into<PathBuf>, default_scope: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_scope: default_scope.into(),
        }
    }

    /// Path of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// State used when no usable record exists.
    pub fn defaults(&self) -> SessionState {
        SessionState::new(self.default_scope.clone())
    }

    /// Load the record. Never fails: a missing or unparsable file yields defaults.
    pub fn load(&self) -> SessionState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.defaults(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Session record unreadable, using defaults");
                return self.defaults();
            }
        };

        match serde_json::from_str::<StoredSession>(&content) {
            Ok(stored) => SessionState {
                scope: stored.scope.unwrap_or_else(|| self.default_scope.clone()),
                session: stored.session,
            },
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Session record corrupt, using defaults");
                self.defaults()
            }
        }
    }

    /// Overwrite the record with `state`.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).context(format!("creating {}", dir.display()))?;

        let lock_path = self.path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .context(format!("opening {}", lock_path.display()))?;
        lock.lock_exclusive()
            .context("locking session record")?;

        let stored = StoredSession {
            scope: Some(state.scope.clone()),
            session: state.session.clone(),
        };

        let result = (|| -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            serde_json::to_writer_pretty(&mut tmp, &stored)?;
            tmp.write_all(b"\n")?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(e) = FileExt::unlock(&lock) {
            tracing::warn!(error = %e, "Failed to release session lock");
        }

        result.context(format!("writing {}", self.path.display()))?;
        tracing::debug!(
            scope = %state.scope.display(),
            session = %state.session,
            "Session record saved"
        );
        Ok(())
    }
}
