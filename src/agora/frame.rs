//! Server-sent event frames.
//!
//! Every frame is one `data: <payload>\n\n` block. The payload is a JSON object, either
//! `{role, name, content, timestamp}` for a transcript entry or `{error}` for a fatal
//! failure. The stream always ends with the literal `data: [DONE]\n\n`.
//!
//! ```
//! use agora::frame::StreamFrame;
//!
//! assert_eq!(StreamFrame::Done.to_sse(), "data: [DONE]\n\n");
//! assert_eq!(
//!     StreamFrame::error("boom").to_sse(),
//!     "data: {\"error\":\"boom\"}\n\n"
//! );
//! ```

use crate::client_wrapper::Role;
use crate::transcript::TranscriptEntry;
use serde::{Deserialize, Serialize};

pub const DONE_SENTINEL: &str = "[DONE]";

/// Wire form of one transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFrame {
    pub role: Role,
    pub name: String,
    pub content: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl From<&TranscriptEntry> for EntryFrame {
    fn from(entry: &TranscriptEntry) -> Self {
        Self {
            role: entry.role,
            name: entry.speaker_name.clone(),
            content: entry.content.clone(),
            timestamp: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ErrorFrame {
    error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Entry(EntryFrame),
    Error(String),
    Done,
}

impl StreamFrame {
    pub fn entry(entry: &TranscriptEntry) -> Self {
        StreamFrame::Entry(EntryFrame::from(entry))
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamFrame::Error(message.into())
    }

    /// Error frames and the done marker end the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFrame::Entry(_))
    }

    /// The frame's `data:` payload, without framing.
    pub fn payload(&self) -> String {
        let json = match self {
            StreamFrame::Entry(entry) => serde_json::to_string(entry),
            StreamFrame::Error(error) => serde_json::to_string(&ErrorFrame {
                error: error.clone(),
            }),
            StreamFrame::Done => return DONE_SENTINEL.to_string(),
        };
        // Plain string fields only; serializing them cannot fail.
        json.unwrap_or_else(|err| {
            log::error!("StreamFrame::payload(): {}", err);
            String::from("{}")
        })
    }

    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    /// Parse one `data: ...` block back into a frame. Returns `None` for anything else.
    pub fn from_sse(block: &str) -> Option<Self> {
        let payload = block.trim_end().strip_prefix("data:")?.trim_start();
        if payload == DONE_SENTINEL {
            return Some(StreamFrame::Done);
        }
        if let Ok(entry) = serde_json::from_str::<EntryFrame>(payload) {
            return Some(StreamFrame::Entry(entry));
        }
        serde_json::from_str::<ErrorFrame>(payload)
            .ok()
            .map(|frame| StreamFrame::Error(frame.error))
    }
}
