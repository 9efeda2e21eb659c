//! Session listing, message diffs and file history search
//!
//! `EditHistory` is the entry point collaborators use. Each public operation
//! builds one `Resolver` (a snapshot of session metadata) and runs to
//! completion synchronously; nothing is cached between calls.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::{validate_file_path, MessageId, ProjectId, SessionId};
use crate::parts::{self, patch_hash_in, tools_in};
use crate::resolver::Resolver;
use crate::snapshot::SnapshotRepo;
use crate::storage::{MessageFile, SessionDir, Storage};
use crate::types::{millis_to_utc, FileHistoryEntry, Message, Session};

/// Default number of sessions listed or searched.
pub const DEFAULT_SESSION_LIMIT: usize = 10;

/// Everything needed to reconstruct one message's edit.
#[derive(Debug, Clone)]
pub(crate) struct LocatedPatch {
    pub hash: String,
    pub project_id: ProjectId,
    pub repo: SnapshotRepo,
    /// Project working tree, if it still exists on disk.
    pub work_tree: Option<PathBuf>,
}

/// Read-only view over the session log and snapshot repositories.
#[derive(Debug, Clone)]
pub struct EditHistory {
    config: Config,
    storage: Storage,
}

impl EditHistory {
    pub fn new(config: Config) -> Self {
        let storage = Storage::from_config(&config);
        Self { config, storage }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The `limit` most recently active sessions.
    pub fn list_sessions(&self, limit: usize) -> Vec<Session> {
        let resolver = Resolver::new(&self.storage);
        self.storage
            .list_sessions_by_recency()
            .into_iter()
            .take(limit)
            .map(|dir| {
                let info = resolver.session_info(&dir.id);
                Session {
                    title: resolver.session_title(&dir.id),
                    modified: DateTime::<Utc>::from(dir.modified),
                    message_count: self.storage.list_messages_by_recency(&dir.id).len(),
                    project_id: resolver.project_id_from_session(&dir.id),
                    directory: info
                        .and_then(|i| i.directory.clone())
                        .filter(|d| !d.is_empty()),
                    id: dir.id,
                }
            })
            .collect()
    }

    /// Messages of a session, newest first, each with `has_snapshot` checked
    /// against the session's project snapshot repository.
    ///
    /// # Errors
    /// Returns `Error::InvalidId` for a malformed session id and
    /// `Error::GitSpawn` if git cannot be started.
    pub fn session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let session_id = SessionId::parse(session_id)?;
        let resolver = Resolver::new(&self.storage);

        let repo = resolver
            .project_id_from_session(&session_id)
            .map(|project| SnapshotRepo::for_project(&self.config, &project))
            .filter(SnapshotRepo::exists);
        if repo.is_none() {
            debug!("No snapshot repository for {}", session_id);
        }

        let mut messages = Vec::new();
        for file in self.storage.list_messages_by_recency(&session_id) {
            let parts = self.storage.read_parts(&file.id);
            let patch_hash = patch_hash_in(&parts);
            let has_snapshot = match (&patch_hash, &repo) {
                (Some(hash), Some(repo)) => repo.hash_exists(hash)?,
                _ => false,
            };
            messages.push(Message {
                created: self.message_created(&file),
                session_id: session_id.clone(),
                patch_hash,
                has_snapshot,
                tools: tools_in(&parts),
                id: file.id,
            });
        }
        Ok(messages)
    }

    /// Diff of the edit recorded by `message_id`, optionally limited to one path.
    ///
    /// `Ok(None)` when the message has no patch, its project or snapshot
    /// repository cannot be found, the hash is gone from the repository, or
    /// git fails (logged with stderr). `Ok(Some(""))` means no differences.
    ///
    /// # Errors
    /// Returns `Error::InvalidId`/`Error::InvalidPath` for malformed input and
    /// `Error::GitSpawn` if git cannot be started.
    pub fn message_diff(
        &self,
        message_id: &str,
        file_path: Option<&str>,
    ) -> Result<Option<String>> {
        let message_id = MessageId::parse(message_id)?;
        let file_path = file_path.map(validate_file_path).transpose()?;
        let resolver = Resolver::new(&self.storage);

        let Some(located) = self.locate(&resolver, &message_id)? else {
            return Ok(None);
        };
        if located.work_tree.is_none() {
            info!(
                "Working tree of project {} not found; diffing {} against the snapshot",
                located.project_id, message_id
            );
        }

        downgrade_git_failure(located.repo.diff(
            &located.hash,
            located.work_tree.as_deref(),
            file_path,
        ))
    }

    /// Tools a message invoked; explains messages without a patch.
    ///
    /// # Errors
    /// Returns `Error::InvalidId` for a malformed message id.
    pub fn tools_used(&self, message_id: &str) -> Result<Vec<String>> {
        let message_id = MessageId::parse(message_id)?;
        Ok(parts::tools_used(&self.storage, &message_id))
    }

    /// Every message in the `session_limit` most recent sessions whose edit
    /// touched exactly `file_path`, newest session first, then newest message.
    ///
    /// # Errors
    /// Returns `Error::InvalidPath` for an empty path and `Error::GitSpawn`
    /// if git cannot be started.
    pub fn file_history(
        &self,
        file_path: &str,
        session_limit: usize,
    ) -> Result<Vec<FileHistoryEntry>> {
        self.file_history_iter(file_path, session_limit)?.collect()
    }

    /// Lazy form of [`EditHistory::file_history`]: entries are produced one at
    /// a time and the caller may stop at any point.
    ///
    /// # Errors
    /// Returns `Error::InvalidPath` for an empty path.
    pub fn file_history_iter(
        &self,
        file_path: &str,
        session_limit: usize,
    ) -> Result<FileHistoryIter<'_>> {
        let file_path = validate_file_path(file_path)?.to_string();
        let resolver = Resolver::new(&self.storage);
        let sessions: Vec<SessionDir> = self
            .storage
            .list_sessions_by_recency()
            .into_iter()
            .take(session_limit)
            .collect();

        Ok(FileHistoryIter {
            history: self,
            resolver,
            file_path,
            sessions: sessions.into_iter(),
            current: None,
            projects: HashMap::new(),
            work_trees: HashMap::new(),
            failed: false,
        })
    }

    /// Resolve patch hash, project, snapshot repository and working tree.
    pub(crate) fn locate(
        &self,
        resolver: &Resolver<'_>,
        message_id: &MessageId,
    ) -> Result<Option<LocatedPatch>> {
        let Some(hash) = parts::patch_hash(&self.storage, message_id) else {
            debug!("{} has no patch part", message_id);
            return Ok(None);
        };
        let Some(project_id) = resolver.project_id_from_message(message_id) else {
            debug!("{} resolves to no project", message_id);
            return Ok(None);
        };
        let repo = SnapshotRepo::for_project(&self.config, &project_id);
        if !repo.exists() {
            debug!("No snapshot repository at {}", repo.git_dir().display());
            return Ok(None);
        }
        if !repo.hash_exists(&hash)? {
            debug!("{} not in snapshot repository of {}", hash, project_id);
            return Ok(None);
        }

        let work_tree = resolver
            .project_directory(&project_id)
            .filter(|dir| dir.is_dir());
        Ok(Some(LocatedPatch {
            hash,
            project_id,
            repo,
            work_tree,
        }))
    }

    fn message_created(&self, file: &MessageFile) -> DateTime<Utc> {
        let mtime = DateTime::<Utc>::from(file.modified);
        self.storage
            .read_message_info(&file.path)
            .and_then(|info| info.time)
            .and_then(|time| time.created)
            .map(|ms| millis_to_utc(ms, mtime))
            .unwrap_or(mtime)
    }
}

/// Non-zero git exits were already logged; they read as "not reconstructable".
pub(crate) fn downgrade_git_failure<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::Git { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Session currently being walked by a [`FileHistoryIter`].
struct SessionCursor {
    id: SessionId,
    title: String,
    messages: std::vec::IntoIter<MessageFile>,
}

/// Iterator behind [`EditHistory::file_history_iter`].
///
/// Project ids and working trees are memoized for the lifetime of the
/// iterator only.
pub struct FileHistoryIter<'a> {
    history: &'a EditHistory,
    resolver: Resolver<'a>,
    file_path: String,
    sessions: std::vec::IntoIter<SessionDir>,
    current: Option<SessionCursor>,
    projects: HashMap<SessionId, Option<ProjectId>>,
    work_trees: HashMap<ProjectId, Option<PathBuf>>,
    failed: bool,
}

impl FileHistoryIter<'_> {
    fn project_of(&mut self, session_id: &SessionId) -> Option<ProjectId> {
        if let Some(cached) = self.projects.get(session_id) {
            return cached.clone();
        }
        let project = self.resolver.project_id_from_session(session_id);
        self.projects.insert(session_id.clone(), project.clone());
        project
    }

    fn work_tree_of(&mut self, project_id: &ProjectId) -> Option<PathBuf> {
        if let Some(cached) = self.work_trees.get(project_id) {
            return cached.clone();
        }
        let dir = self.resolver.project_directory(project_id);
        self.work_trees.insert(project_id.clone(), dir.clone());
        dir
    }

    /// Test one message; `Ok(None)` if it did not touch the file.
    fn check_message(
        &mut self,
        session_id: &SessionId,
        title: &str,
        file: &MessageFile,
    ) -> Result<Option<FileHistoryEntry>> {
        let history = self.history;
        let storage = history.storage();
        let Some(hash) = parts::patch_hash(storage, &file.id) else {
            return Ok(None);
        };

        // The message's own sessionID decides the project, as for single lookups.
        let owner = storage
            .read_message_info(&file.path)
            .and_then(|info| info.session_id)
            .and_then(|s| SessionId::parse(&s).ok())
            .unwrap_or_else(|| session_id.clone());
        let Some(project_id) = self.project_of(&owner) else {
            return Ok(None);
        };

        let repo = SnapshotRepo::for_project(history.config(), &project_id);
        if !repo.exists() {
            return Ok(None);
        }
        let work_tree = self.work_tree_of(&project_id);
        let changed = downgrade_git_failure(repo.changed_paths(&hash, work_tree.as_deref()))?;
        let Some(changed) = changed else {
            return Ok(None);
        };
        if !changed.contains(&self.file_path) {
            return Ok(None);
        }

        Ok(Some(FileHistoryEntry {
            message_id: file.id.clone(),
            session_id: session_id.clone(),
            session_title: title.to_string(),
            timestamp: history.message_created(file),
            hash,
        }))
    }
}

impl Iterator for FileHistoryIter<'_> {
    type Item = Result<FileHistoryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let Some(cursor) = self.current.as_mut() else {
                let dir = self.sessions.next()?;
                let messages = self.history.storage().list_messages_by_recency(&dir.id);
                self.current = Some(SessionCursor {
                    title: self.resolver.session_title(&dir.id),
                    messages: messages.into_iter(),
                    id: dir.id,
                });
                continue;
            };

            let Some(file) = cursor.messages.next() else {
                self.current = None;
                continue;
            };
            let session_id = cursor.id.clone();
            let title = cursor.title.clone();

            match self.check_message(&session_id, &title, &file) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
