//! Core data types for Retrace
//!
//! Raw records mirror the agent's on-disk JSON; the public records are
//! read-only projections built from them and never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, ProjectId, SessionId};

/// Title shown for sessions whose metadata has none.
pub const UNTITLED_SESSION: &str = "(no title)";

/// A message sub-record, tagged by its `type` field.
///
/// Only `patch` and `tool` carry data we use; every other tag
/// deserializes to `Unknown` so newer storage formats still load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Patch {
        #[serde(default)]
        hash: Option<String>,
    },
    Tool {
        #[serde(default)]
        tool: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// `message/<sessionId>/<messageId>.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageInfo {
    #[serde(rename = "sessionID", default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub time: Option<MessageTime>,
}

/// Timestamps recorded on a message, epoch milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageTime {
    #[serde(default)]
    pub created: Option<i64>,
}

/// `session/<projectId>/<sessionId>.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "projectID", default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
}

/// One agent session, newest activity first when listed.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    /// Last write to the session's message directory.
    pub modified: DateTime<Utc>,
    pub message_count: usize,
    pub project_id: Option<ProjectId>,
    pub directory: Option<String>,
}

/// One message of a session, with what is known about its edit.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub created: DateTime<Utc>,
    pub patch_hash: Option<String>,
    /// Whether `patch_hash` exists in the project's snapshot repository.
    pub has_snapshot: bool,
    /// Tools invoked by the message, in part order.
    pub tools: Vec<String>,
}

/// A message whose edit touched the searched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHistoryEntry {
    pub message_id: MessageId,
    pub session_id: SessionId,
    pub session_title: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

/// Convert epoch milliseconds, falling back to `fallback` when out of range.
pub(crate) fn millis_to_utc(millis: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(fallback)
}
