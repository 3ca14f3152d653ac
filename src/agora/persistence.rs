//! Where finalized messages go.
//!
//! The streaming session hands every emitted entry to a [`PersistenceSink`], one call per
//! message and in stream order. Saving is best-effort: a failing sink is logged and the
//! stream carries on.
//!
//! Three sinks ship with the crate:
//!
//! - [`NoopSink`] drops everything.
//! - [`InMemorySink`] keeps records in memory, handy in tests.
//! - [`JsonlFileSink`] appends one JSON line per message to `<dir>/<conversation>.jsonl`.

use crate::client_wrapper::Role;
use crate::error::ChatError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub conversation_id: String,
    pub role: Role,
    pub name: String,
    pub content: String,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(
        &self,
        conversation_id: &str,
        role: Role,
        name: &str,
        content: &str,
    ) -> Result<(), ChatError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl PersistenceSink for NoopSink {
    async fn save(&self, _: &str, _: Role, _: &str, _: &str) -> Result<(), ChatError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySink {
    records: Mutex<Vec<PersistedMessage>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far, in save order.
    pub async fn records(&self) -> Vec<PersistedMessage> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn save(
        &self,
        conversation_id: &str,
        role: Role,
        name: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        self.records.lock().await.push(PersistedMessage {
            conversation_id: conversation_id.to_string(),
            role,
            name: name.to_string(),
            content: content.to_string(),
            saved_at: Utc::now(),
        });
        Ok(())
    }
}

/// Appends messages as JSON lines, one file per conversation.
#[derive(Debug, Clone)]
pub struct JsonlFileSink {
    dir: PathBuf,
}

impl JsonlFileSink {
    /// The directory is created lazily on the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `conversation_id`. Characters other than alphanumerics, `-` and `_` are
    /// replaced with `_`.
    pub fn file_path(&self, conversation_id: &str) -> PathBuf {
        let safe_id: String = conversation_id
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let safe_id = if safe_id.is_empty() {
            "conversation".to_string()
        } else {
            safe_id
        };
        self.dir.join(format!("{}.jsonl", safe_id))
    }

    /// Read back a conversation. A missing file is an empty conversation; unparsable lines
    /// are skipped with a warning.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<PersistedMessage>, ChatError> {
        let path = self.file_path(conversation_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut messages = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PersistedMessage>(line) {
                Ok(message) => messages.push(message),
                Err(err) => log::warn!(
                    "JsonlFileSink::load(): skipping line {} of {}: {}",
                    line_no + 1,
                    path.display(),
                    err
                ),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl PersistenceSink for JsonlFileSink {
    async fn save(
        &self,
        conversation_id: &str,
        role: Role,
        name: &str,
        content: &str,
    ) -> Result<(), ChatError> {
        let record = PersistedMessage {
            conversation_id: conversation_id.to_string(),
            role,
            name: name.to_string(),
            content: content.to_string(),
            saved_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| ChatError::Persistence(format!("Failed to serialize message: {}", e)))?;
        line.push('\n');

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(conversation_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
