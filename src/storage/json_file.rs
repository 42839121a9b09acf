//! JSON files on local disk, one state file and one summary file per session

use super::{validate_session_id, SessionStore, StoreError};
use crate::context::models::{ConversationState, SessionSummary};
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    pub fn summary_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}_summary.json", session_id))
    }

    /// Write `value` to a sibling temp file, sync it, then rename over `path`
    async fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(value)?;
        let tmp_path = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn save(
        &self,
        state: &ConversationState,
        summary: Option<&SessionSummary>,
    ) -> Result<(), StoreError> {
        validate_session_id(&state.session_id)?;
        fs::create_dir_all(&self.dir).await?;

        self.write_atomic(&self.state_path(&state.session_id), state).await?;
        if let Some(summary) = summary {
            self.write_atomic(&self.summary_path(&state.session_id), summary).await?;
        }

        debug!(
            "Saved session {} ({} messages) to {}",
            state.session_id,
            state.len(),
            self.dir.display()
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, StoreError> {
        validate_session_id(session_id)?;

        let content = match fs::read_to_string(self.state_path(session_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }
}
