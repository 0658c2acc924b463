//! Session persistence between runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nexdesk_identity::Session;

use crate::error::Result;

/// Tracing target for session persistence.
pub const TRACING_TARGET: &str = "nexdesk_reqwest::session_file";

/// JSON file holding the last known session.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session. A missing file means no session.
    pub async fn load(&self) -> Result<Option<Session>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let session: Session = serde_json::from_slice(&contents)?;
        tracing::debug!(
            target: TRACING_TARGET,
            path = %self.path.display(),
            user_id = %session.identity.id,
            "Loaded stored session"
        );
        Ok(Some(session))
    }

    /// Replaces the stored session.
    pub async fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so readers never see a torn file.
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(session)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::trace!(
            target: TRACING_TARGET,
            path = %self.path.display(),
            "Stored session"
        );
        Ok(())
    }

    /// Deletes the stored session, if any.
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
