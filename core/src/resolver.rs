//! Cross-index resolution: message -> session -> project -> working tree
//!
//! The session log only records session -> project (inside each session
//! metadata file), so every lookup is a scan. A `Resolver` reads all session
//! metadata once when it is built and answers every lookup of one top-level
//! operation from that snapshot. Scan order is directory enumeration order and
//! the first match wins, exactly as a fresh rescan would.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::ids::{MessageId, ProjectId, SessionId};
use crate::storage::Storage;
use crate::types::{SessionInfo, UNTITLED_SESSION};

/// One parsed session metadata file.
#[derive(Debug, Clone)]
struct IndexedSession {
    project_dir: String,
    session_id: String,
    info: SessionInfo,
}

/// Resolves project identity and location from session or message ids.
pub struct Resolver<'a> {
    storage: &'a Storage,
    sessions: Vec<IndexedSession>,
}

impl<'a> Resolver<'a> {
    /// Snapshot all session metadata under the storage root.
    pub fn new(storage: &'a Storage) -> Self {
        let sessions: Vec<IndexedSession> = storage
            .session_files()
            .into_iter()
            .filter_map(|file| {
                let info = storage.read_session_info(&file.path)?;
                Some(IndexedSession {
                    project_dir: file.project_dir,
                    session_id: file.session_id,
                    info,
                })
            })
            .collect();
        debug!("Indexed {} session metadata files", sessions.len());
        Self { storage, sessions }
    }

    /// Metadata of a session, from the first file found for it.
    pub fn session_info(&self, session_id: &SessionId) -> Option<&SessionInfo> {
        self.sessions
            .iter()
            .find(|s| s.session_id == session_id.as_str())
            .map(|s| &s.info)
    }

    /// Session title, or `(no title)`.
    pub fn session_title(&self, session_id: &SessionId) -> String {
        self.session_info(session_id)
            .and_then(|info| info.title.as_deref())
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_SESSION)
            .to_string()
    }

    /// Project of a session: the first non-empty `projectID` among the
    /// session's metadata files, under any project directory.
    pub fn project_id_from_session(&self, session_id: &SessionId) -> Option<ProjectId> {
        let raw = self
            .sessions
            .iter()
            .filter(|s| s.session_id == session_id.as_str())
            .find_map(|s| s.info.project_id.as_deref().filter(|p| !p.is_empty()))?;

        match ProjectId::parse(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Ignoring project of {}: {}", session_id, e);
                None
            }
        }
    }

    /// Session owning a message: the message file's `sessionID`, falling back
    /// to the name of the directory it was found in.
    pub fn session_id_from_message(&self, message_id: &MessageId) -> Option<SessionId> {
        let (session_dir, path) = self.storage.find_message(message_id)?;
        let recorded = self
            .storage
            .read_message_info(&path)
            .and_then(|info| info.session_id)
            .filter(|s| !s.is_empty());

        match recorded.map(|s| SessionId::parse(&s)) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                debug!("{}: {}; using directory name", message_id, e);
                Some(session_dir.id)
            }
            None => Some(session_dir.id),
        }
    }

    /// Project of a message, via its session.
    pub fn project_id_from_message(&self, message_id: &MessageId) -> Option<ProjectId> {
        let session_id = self.session_id_from_message(message_id)?;
        self.project_id_from_session(&session_id)
    }

    /// Working-tree path of a project.
    ///
    /// Session files stored under `session/<projectId>/` are preferred; only if
    /// there are none is every session file searched for a matching
    /// `projectID`. The first match's `directory` is returned if it is a
    /// non-empty string.
    pub fn project_directory(&self, project_id: &ProjectId) -> Option<PathBuf> {
        let first = self
            .sessions
            .iter()
            .find(|s| s.project_dir == project_id.as_str())
            .or_else(|| {
                self.sessions
                    .iter()
                    .find(|s| s.info.project_id.as_deref() == Some(project_id.as_str()))
            })?;

        first
            .info
            .directory
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("session/proj1/ses_A.json"),
            r#"{"title":"Add auth","projectID":"proj1","directory":"/work/one"}"#,
        );
        // Stored under an unrelated directory, as older layouts did.
        write(
            &root.join("session/global/ses_B.json"),
            r#"{"projectID":"proj2","directory":"/work/two"}"#,
        );
        write(&root.join("session/global/ses_C.json"), r#"{"projectID":"../evil"}"#);
        write(&root.join("session/global/ses_D.json"), "not json");
        write(&root.join("message/ses_A/msg_1.json"), r#"{"sessionID":"ses_A"}"#);
        write(&root.join("message/ses_B/msg_2.json"), r#"{"role":"user"}"#);
        dir
    }

    #[test]
    fn test_project_from_session() {
        let dir = fixture();
        let storage = Storage::new(dir.path());
        let resolver = Resolver::new(&storage);

        let a = SessionId::parse("ses_A").unwrap();
        let b = SessionId::parse("ses_B").unwrap();
        assert_eq!(resolver.project_id_from_session(&a).unwrap().as_str(), "proj1");
        assert_eq!(resolver.project_id_from_session(&b).unwrap().as_str(), "proj2");
        assert!(resolver
            .project_id_from_session(&SessionId::parse("ses_C").unwrap())
            .is_none());
        assert!(resolver
            .project_id_from_session(&SessionId::parse("ses_D").unwrap())
            .is_none());
    }

    #[test]
    fn test_project_from_message_with_and_without_session_field() {
        let dir = fixture();
        let storage = Storage::new(dir.path());
        let resolver = Resolver::new(&storage);

        let m1 = MessageId::parse("msg_1").unwrap();
        let m2 = MessageId::parse("msg_2").unwrap();
        assert_eq!(resolver.project_id_from_message(&m1).unwrap().as_str(), "proj1");
        // No sessionID field: directory name is used.
        assert_eq!(resolver.project_id_from_message(&m2).unwrap().as_str(), "proj2");
        assert!(resolver
            .project_id_from_message(&MessageId::parse("msg_404").unwrap())
            .is_none());
    }

    #[test]
    fn test_project_directory_prefers_named_dir_then_scans() {
        let dir = fixture();
        let storage = Storage::new(dir.path());
        let resolver = Resolver::new(&storage);

        let p1 = ProjectId::parse("proj1").unwrap();
        let p2 = ProjectId::parse("proj2").unwrap();
        assert_eq!(resolver.project_directory(&p1), Some(PathBuf::from("/work/one")));
        assert_eq!(resolver.project_directory(&p2), Some(PathBuf::from("/work/two")));
        assert_eq!(resolver.project_directory(&ProjectId::parse("proj3").unwrap()), None);
    }

    #[test]
    fn test_empty_directory_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("session/p/ses_E.json"),
            r#"{"projectID":"p","directory":""}"#,
        );
        let storage = Storage::new(dir.path());
        let resolver = Resolver::new(&storage);
        assert_eq!(resolver.project_directory(&ProjectId::parse("p").unwrap()), None);
    }

    #[test]
    fn test_session_title_default() {
        let dir = fixture();
        let storage = Storage::new(dir.path());
        let resolver = Resolver::new(&storage);
        assert_eq!(resolver.session_title(&SessionId::parse("ses_A").unwrap()), "Add auth");
        assert_eq!(resolver.session_title(&SessionId::parse("ses_B").unwrap()), "(no title)");
        assert_eq!(resolver.session_title(&SessionId::parse("ses_Z").unwrap()), "(no title)");
    }
}
