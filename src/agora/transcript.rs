//! The ordered log of turns within one session.
//!
//! A [`Transcript`] is owned exclusively by the coordinator while it runs. Appending an entry
//! also pushes a copy onto the relay, if one is attached; this is what makes the chat stream
//! rather than arrive in one batch. Nobody else reads the transcript during a run, so it needs
//! no lock.

use crate::client_wrapper::{Message, Role};
use crate::error::ChatError;
use crate::relay::RelaySender;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub speaker_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: Role, speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            speaker_name: speaker_name.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::User, speaker_name, content)
    }

    pub fn assistant(speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, speaker_name, content)
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Context form handed to the LLM: role, content and speaker name.
    pub fn to_message(&self) -> Message {
        Message::new(self.role, self.content.as_str()).with_name(self.speaker_name.as_str())
    }
}

/// Append-only sequence of [`TranscriptEntry`] values.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    relay: Option<RelaySender>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from prior history. Seed entries are never relayed.
    pub fn seeded(entries: Vec<TranscriptEntry>) -> Self {
        Self {
            entries,
            relay: None,
        }
    }

    /// From now on every appended entry is also pushed onto `relay`.
    pub fn attach_relay(&mut self, relay: RelaySender) {
        self.relay = Some(relay);
    }

    /// Append `entry` and relay a copy of it.
    ///
    /// The entry is stored even when relaying fails. A closed relay, or a cancelled one still
    /// waiting for room, is reported as [`ChatError::Cancelled`].
    pub async fn append(&mut self, entry: TranscriptEntry) -> Result<(), ChatError> {
        match &self.relay {
            Some(relay) => {
                let copy = entry.clone();
                self.entries.push(entry);
                relay.send_entry(copy).await
            }
            None => {
                self.entries.push(entry);
                Ok(())
            }
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// The whole transcript as LLM context, oldest first.
    pub fn to_messages(&self) -> Vec<Message> {
        self.entries.iter().map(TranscriptEntry::to_message).collect()
    }

    pub fn into_entries(self) -> Vec<TranscriptEntry> {
        self.entries
    }
}
