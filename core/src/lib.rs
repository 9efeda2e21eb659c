//! Retrace Core - reconstruct agent file edits
//!
//! This crate provides:
//! - Read-only accessors over the agent's session log (sessions, messages, parts)
//! - Resolution from message/session ids to projects and working trees
//! - Diffs of recorded edits against per-project snapshot repositories
//! - File history search across recent sessions
//! - Confirmed, reverse-patch revert of a single file

pub mod config;
pub mod error;
pub mod history;
pub mod ids;
pub mod parts;
pub mod resolver;
pub mod revert;
pub mod snapshot;
pub mod storage;
pub mod types;

pub use config::{Config, DATA_DIR_ENV};
pub use error::{Error, Result};
pub use history::{EditHistory, FileHistoryIter, DEFAULT_SESSION_LIMIT};
pub use ids::{MessageId, ProjectId, SessionId};
pub use resolver::Resolver;
pub use revert::{revert_file, Confirm, RevertOutcome, RevertPreview, RevertRejection};
pub use snapshot::{git_version, SnapshotRepo};
pub use storage::Storage;
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::history::EditHistory;
    pub use crate::ids::{MessageId, ProjectId, SessionId};
    pub use crate::revert::{revert_file, Confirm, RevertOutcome, RevertPreview};
    pub use crate::types::*;
}
