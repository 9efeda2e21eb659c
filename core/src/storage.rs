//! Read-only accessors over the agent's session log
//!
//! Layout under the storage root:
//!
//! ```text
//! message/<sessionId>/<messageId>.json
//! part/<messageId>/<partId>.json
//! session/<projectId>/<sessionId>.json
//! ```
//!
//! Nothing here caches; every call re-reads the directory tree. A missing or
//! unreadable directory is an empty listing, never an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::ids::{MessageId, SessionId};
use crate::types::{MessageInfo, Part, SessionInfo};

/// A session's message directory.
#[derive(Debug, Clone)]
pub struct SessionDir {
    pub id: SessionId,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// A single message file inside a session directory.
#[derive(Debug, Clone)]
pub struct MessageFile {
    pub id: MessageId,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// A session metadata file and the project directory it was found under.
#[derive(Debug, Clone)]
pub struct SessionFile {
    /// Name of the containing `session/<dir>` directory.
    pub project_dir: String,
    /// File stem, i.e. the session id as stored.
    pub session_id: String,
    pub path: PathBuf,
}

/// Handle on the storage root.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn message_root(&self) -> PathBuf {
        self.root.join("message")
    }

    fn part_root(&self) -> PathBuf {
        self.root.join("part")
    }

    fn session_root(&self) -> PathBuf {
        self.root.join("session")
    }

    /// All session message directories, most recently modified first.
    ///
    /// Directory names that are not valid session ids are skipped.
    pub fn list_sessions_by_recency(&self) -> Vec<SessionDir> {
        let mut sessions: Vec<SessionDir> = read_entries(&self.message_root())
            .into_iter()
            .filter(|(path, _)| path.is_dir())
            .filter_map(|(path, modified)| {
                let name = path.file_name()?.to_str()?;
                match SessionId::parse(name) {
                    Ok(id) => Some(SessionDir { id, path, modified }),
                    Err(_) => {
                        debug!("Skipping non-session directory {}", path.display());
                        None
                    }
                }
            })
            .collect();

        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        sessions
    }

    /// Message files of one session, most recently modified first.
    pub fn list_messages_by_recency(&self, session_id: &SessionId) -> Vec<MessageFile> {
        let dir = self.message_root().join(session_id.as_str());
        let mut messages: Vec<MessageFile> = read_entries(&dir)
            .into_iter()
            .filter_map(|(path, modified)| {
                let id = json_stem(&path).and_then(|stem| MessageId::parse(stem).ok())?;
                Some(MessageFile { id, path, modified })
            })
            .collect();

        messages.sort_by(|a, b| b.modified.cmp(&a.modified));
        messages
    }

    /// Locate a message file by scanning sessions newest first.
    ///
    /// Returns the containing session directory and the file path.
    pub fn find_message(&self, message_id: &MessageId) -> Option<(SessionDir, PathBuf)> {
        let file_name = format!("{}.json", message_id);
        self.list_sessions_by_recency().into_iter().find_map(|session| {
            let path = session.path.join(&file_name);
            path.is_file().then_some((session, path))
        })
    }

    /// Parse a message file. Unreadable or malformed files yield `None`.
    pub fn read_message_info(&self, path: &Path) -> Option<MessageInfo> {
        read_json(path)
    }

    /// Parse every part of a message in directory enumeration order.
    ///
    /// Malformed part files are skipped.
    pub fn read_parts(&self, message_id: &MessageId) -> Vec<Part> {
        let dir = self.part_root().join(message_id.as_str());
        read_entries(&dir)
            .into_iter()
            .filter(|(path, _)| json_stem(path).is_some())
            .filter_map(|(path, _)| read_json::<Part>(&path))
            .collect()
    }

    /// Every `session/<project>/<session>.json` file, in enumeration order.
    pub fn session_files(&self) -> Vec<SessionFile> {
        let mut files = Vec::new();
        for (project_path, _) in read_entries(&self.session_root()) {
            if !project_path.is_dir() {
                continue;
            }
            let Some(project_dir) = project_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            for (path, _) in read_entries(&project_path) {
                if let Some(stem) = json_stem(&path) {
                    files.push(SessionFile {
                        project_dir: project_dir.to_string(),
                        session_id: stem.to_string(),
                        path: path.clone(),
                    });
                }
            }
        }
        files
    }

    /// Parse a session metadata file. Unreadable or malformed files yield `None`.
    pub fn read_session_info(&self, path: &Path) -> Option<SessionInfo> {
        read_json(path)
    }
}

/// `(path, mtime)` for each entry of `dir`, in enumeration order.
fn read_entries(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| match entry {
            Ok(entry) => {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(UNIX_EPOCH);
                Some((entry.path(), modified))
            }
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                None
            }
        })
        .collect()
}

/// File stem of a `*.json` path.
fn json_stem(path: &Path) -> Option<&str> {
    if path.extension().map(|e| e == "json").unwrap_or(false) {
        path.file_stem().and_then(|s| s.to_str())
    } else {
        None
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Skipping malformed JSON {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn pin_mtime(path: &Path, secs: i64) {
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    #[test]
    fn test_missing_root_is_empty() {
        let storage = Storage::new("/definitely/not/here");
        assert!(storage.list_sessions_by_recency().is_empty());
        let session = SessionId::parse("ses_A").unwrap();
        assert!(storage.list_messages_by_recency(&session).is_empty());
        assert!(storage.session_files().is_empty());
    }

    #[test]
    fn test_sessions_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        for (name, secs) in [("ses_old", 1_000), ("ses_new", 3_000), ("ses_mid", 2_000)] {
            let path = dir.path().join("message").join(name);
            fs::create_dir_all(&path).unwrap();
            pin_mtime(&path, secs);
        }
        fs::create_dir_all(dir.path().join("message/not-a-session")).unwrap();

        let ids: Vec<String> = storage
            .list_sessions_by_recency()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["ses_new", "ses_mid", "ses_old"]);
    }

    #[test]
    fn test_messages_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let session_dir = dir.path().join("message/ses_A");
        write(&session_dir.join("msg_1.json"), "{}");
        write(&session_dir.join("msg_2.json"), "{}");
        write(&session_dir.join("notes.txt"), "x");
        pin_mtime(&session_dir.join("msg_1.json"), 5_000);
        pin_mtime(&session_dir.join("msg_2.json"), 4_000);

        let session = SessionId::parse("ses_A").unwrap();
        let ids: Vec<String> = storage
            .list_messages_by_recency(&session)
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["msg_1", "msg_2"]);
    }

    #[test]
    fn test_read_parts_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let parts_dir = dir.path().join("part/msg_1");
        write(&parts_dir.join("prt_a.json"), r#"{"type":"tool","tool":"bash"}"#);
        write(&parts_dir.join("prt_b.json"), "{not json");
        write(&parts_dir.join("prt_c.json"), r#"{"type":"text","text":"hi"}"#);

        let parts = storage.read_parts(&MessageId::parse("msg_1").unwrap());
        assert_eq!(parts.len(), 2);
        assert!(parts.contains(&Part::Tool { tool: Some("bash".into()) }));
        assert!(parts.contains(&Part::Unknown));
    }

    #[test]
    fn test_find_message_and_session_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        write(&dir.path().join("message/ses_A/msg_1.json"), r#"{"sessionID":"ses_A"}"#);
        write(&dir.path().join("session/proj1/ses_A.json"), r#"{"projectID":"proj1"}"#);

        let (session, path) = storage.find_message(&MessageId::parse("msg_1").unwrap()).unwrap();
        assert_eq!(session.id.as_str(), "ses_A");
        let info = storage.read_message_info(&path).unwrap();
        assert_eq!(info.session_id.as_deref(), Some("ses_A"));
        assert!(storage.find_message(&MessageId::parse("msg_9").unwrap()).is_none());

        let files = storage.session_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].project_dir, "proj1");
        assert_eq!(files[0].session_id, "ses_A");
    }
}
