//! Reverting one file to its state before a message's edit
//!
//! The only operation that writes to a working tree. It walks
//! `Located -> Validated -> Confirmed -> Applied`, stopping as `Rejected`,
//! cancelled or `Failed` along the way. Callers must not run two reverts (or
//! a revert and a diff) against the same file concurrently; there is no lock.

use thiserror::Error;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::history::{EditHistory, LocatedPatch};
use crate::ids::{validate_file_path, MessageId};
use crate::resolver::Resolver;

/// Shown to the user before anything is written.
#[derive(Debug, Clone)]
pub struct RevertPreview {
    pub message_id: MessageId,
    pub file_path: String,
    /// The exact patch that will be applied in reverse, byte for byte.
    pub patch: Vec<u8>,
    /// `patch` decoded for display. Never applied.
    pub diff: String,
}

/// Asks for an explicit yes before a revert mutates the working tree.
pub trait Confirm {
    fn confirm(&mut self, preview: &RevertPreview) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&RevertPreview) -> bool,
{
    fn confirm(&mut self, preview: &RevertPreview) -> bool {
        self(preview)
    }
}

/// Why a revert was refused before confirmation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevertRejection {
    #[error("no reconstructable snapshot for this message")]
    NotLocated,

    #[error("project working tree not found on disk")]
    WorkTreeMissing,

    #[error("file not modified in this message")]
    FileNotModified,

    #[error("file already matches the snapshot")]
    NothingToRevert,
}

/// Result of [`revert_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    /// The reverse patch applied cleanly.
    Applied { diff: String },
    /// The user declined; nothing was written.
    Cancelled,
    Rejected(RevertRejection),
    /// git could not validate or apply the patch. The working tree is left as
    /// git left it; `git apply` writes nothing when any hunk fails.
    Failed { stderr: String, remediation: String },
}

impl RevertOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RevertOutcome::Applied { .. })
    }
}

const CONFLICT_REMEDIATION: &str = "The file changed since the diff was computed. \
Resolve the conflict manually: review the diff above and edit the file, \
or re-run the revert after restoring the conflicting changes.";

/// git stderr fragments that mean the working tree no longer matches the patch.
const CONFLICT_MARKERS: [&str; 3] = [
    "patch does not apply",
    "patch failed",
    "does not match index",
];

/// Remediation for a failed `git apply --reverse`, chosen from git's stderr.
fn remediation(stderr: &str, located: &LocatedPatch, file_path: &str) -> String {
    if CONFLICT_MARKERS.iter().any(|marker| stderr.contains(marker)) {
        return CONFLICT_REMEDIATION.to_string();
    }
    let work_tree = located
        .work_tree
        .as_ref()
        .map(|dir| format!(" --work-tree {}", dir.display()))
        .unwrap_or_default();
    format!(
        "git could not reverse the patch. Restore the file from the snapshot manually: \
git --git-dir {}{} checkout {} -- {}",
        located.repo.git_dir().display(),
        work_tree,
        located.hash,
        file_path
    )
}

/// Revert `file_path` to its state before the edit recorded by `message_id`.
///
/// # Errors
/// Returns `Error::InvalidId`/`Error::InvalidPath` for malformed input and
/// `Error::GitSpawn` if git cannot be started. Every other failure is a
/// [`RevertOutcome`].
pub fn revert_file(
    history: &EditHistory,
    message_id: &str,
    file_path: &str,
    confirm: &mut dyn Confirm,
) -> Result<RevertOutcome> {
    let message_id = MessageId::parse(message_id)?;
    let file_path = validate_file_path(file_path)?;
    let resolver = Resolver::new(history.storage());

    // Located
    let Some(located) = history.locate(&resolver, &message_id)? else {
        return Ok(reject(&message_id, RevertRejection::NotLocated));
    };
    let Some(work_tree) = located.work_tree.as_deref() else {
        return Ok(reject(&message_id, RevertRejection::WorkTreeMissing));
    };
    info!("Revert {}: located {} in project {}", message_id, located.hash, located.project_id);

    // Validated
    let changed = match located.repo.changed_paths(&located.hash, Some(work_tree)) {
        Ok(changed) => changed,
        Err(e) => return failed(e, &located, file_path),
    };
    if !changed.contains(file_path) {
        return Ok(reject(&message_id, RevertRejection::FileNotModified));
    }
    let patch = match located.repo.patch(&located.hash, Some(work_tree), Some(file_path)) {
        Ok(patch) => patch,
        Err(e) => return failed(e, &located, file_path),
    };
    if patch.iter().all(u8::is_ascii_whitespace) {
        return Ok(reject(&message_id, RevertRejection::NothingToRevert));
    }
    info!("Revert {}: validated {}", message_id, file_path);

    // Confirmed
    let preview = RevertPreview {
        message_id: message_id.clone(),
        file_path: file_path.to_string(),
        diff: String::from_utf8_lossy(&patch).into_owned(),
        patch,
    };
    if !confirm.confirm(&preview) {
        info!("Revert {}: cancelled", message_id);
        return Ok(RevertOutcome::Cancelled);
    }

    // Applied
    match located.repo.apply_reverse(work_tree, &preview.patch) {
        Ok(()) => {
            info!("Revert {}: applied to {}", message_id, file_path);
            Ok(RevertOutcome::Applied { diff: preview.diff })
        }
        Err(e) => failed(e, &located, file_path),
    }
}

fn reject(message_id: &MessageId, reason: RevertRejection) -> RevertOutcome {
    info!("Revert {}: rejected ({})", message_id, reason);
    RevertOutcome::Rejected(reason)
}

/// git exit failures become a `Failed` outcome; spawn failures stay errors.
fn failed(error: Error, located: &LocatedPatch, file_path: &str) -> Result<RevertOutcome> {
    match error {
        Error::Git { stderr, .. } => {
            warn!("Revert failed: {}", stderr);
            let remediation = remediation(&stderr, located, file_path);
            Ok(RevertOutcome::Failed {
                stderr,
                remediation,
            })
        }
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_closure_confirm() {
        let preview = RevertPreview {
            message_id: MessageId::parse("msg_1").unwrap(),
            file_path: "a.txt".into(),
            patch: Vec::new(),
            diff: String::new(),
        };
        let mut seen = 0;
        let mut confirm = |p: &RevertPreview| {
            seen += 1;
            p.file_path == "a.txt"
        };
        assert!(Confirm::confirm(&mut confirm, &preview));
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_invalid_input_never_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let history = EditHistory::new(Config::from_data_dir(dir.path()));
        let mut confirm = |_: &RevertPreview| -> bool { panic!("prompted") };

        let err = revert_file(&history, "../msg", "a.txt", &mut confirm).unwrap_err();
        assert!(err.is_invalid_input());
        let err = revert_file(&history, "msg_1", "", &mut confirm).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_unknown_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let history = EditHistory::new(Config::from_data_dir(dir.path()));
        let mut confirm = |_: &RevertPreview| -> bool { panic!("prompted") };

        let outcome = revert_file(&history, "msg_1", "a.txt", &mut confirm).unwrap();
        assert_eq!(outcome, RevertOutcome::Rejected(RevertRejection::NotLocated));
    }

    fn located() -> LocatedPatch {
        let config = Config::from_data_dir("/data");
        let project_id = crate::ids::ProjectId::parse("proj1").unwrap();
        LocatedPatch {
            hash: "abcd1234".into(),
            repo: crate::snapshot::SnapshotRepo::for_project(&config, &project_id),
            project_id,
            work_tree: None,
        }
    }

    fn git_failure(stderr: &str) -> Error {
        Error::Git {
            command: "apply --reverse".into(),
            status: "exit status: 1".into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn test_failed_keeps_stderr() {
        let error = git_failure("error: patch failed: a.txt:1");
        let outcome = failed(error, &located(), "a.txt").unwrap();
        match outcome {
            RevertOutcome::Failed { stderr, remediation } => {
                assert!(stderr.contains("patch failed"));
                assert_eq!(remediation, CONFLICT_REMEDIATION);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_conflict_failure_names_restore_command() {
        let stderr = "error: cannot apply binary patch to 'a.bin' without full index line";
        let outcome = failed(git_failure(stderr), &located(), "a.bin").unwrap();
        match outcome {
            RevertOutcome::Failed { remediation, .. } => {
                assert_ne!(remediation, CONFLICT_REMEDIATION);
                assert!(remediation.contains("checkout abcd1234 -- a.bin"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_spawn_failure_stays_error() {
        let error = Error::GitSpawn {
            program: "git".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(failed(error, &located(), "a.txt").is_err());
    }
}
