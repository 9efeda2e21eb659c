//! Snapshot repository access through the git executable
//!
//! Each project has a bare-style git directory under the snapshot root whose
//! objects hold the file states the agent recorded. Every invocation passes
//! `--git-dir` (and `--work-tree` when one is known) explicitly; nothing relies
//! on the current directory being inside a repository.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::ProjectId;

/// A per-project snapshot git directory.
#[derive(Debug, Clone)]
pub struct SnapshotRepo {
    git_dir: PathBuf,
    git_binary: String,
}

impl SnapshotRepo {
    pub fn new(git_dir: impl Into<PathBuf>, git_binary: impl Into<String>) -> Self {
        Self {
            git_dir: git_dir.into(),
            git_binary: git_binary.into(),
        }
    }

    /// Snapshot repository of `project_id` under the configured snapshot root.
    pub fn for_project(config: &Config, project_id: &ProjectId) -> Self {
        Self::new(
            config.snapshot_root.join(project_id.as_str()),
            config.git_binary.clone(),
        )
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Whether the repository directory is present on disk.
    pub fn exists(&self) -> bool {
        self.git_dir.is_dir()
    }

    fn command(&self, work_tree: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.git_binary);
        cmd.arg("--git-dir").arg(&self.git_dir);
        if let Some(work_tree) = work_tree {
            cmd.arg("--work-tree").arg(work_tree).current_dir(work_tree);
        }
        cmd.args(["-c", "core.quotepath=false"]);
        cmd
    }

    fn run<I, S>(&self, work_tree: Option<&Path>, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(work_tree);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("Running {:?}", cmd);

        cmd.output().map_err(|source| Error::GitSpawn {
            program: self.git_binary.clone(),
            source,
        })
    }

    /// Whether `hash` names an object in this repository.
    ///
    /// # Errors
    /// Returns `Error::GitSpawn` if git cannot be started. A missing object
    /// or missing repository is `Ok(false)`.
    pub fn hash_exists(&self, hash: &str) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        let output = self.run(None, ["cat-file", "-e", hash])?;
        Ok(output.status.success())
    }

    /// Whether the repository has a `HEAD` commit. Snapshot repositories
    /// built with `write-tree` alone usually do not.
    fn has_head(&self) -> Result<bool> {
        let output = self.run(None, ["rev-parse", "--verify", "--quiet", "HEAD"])?;
        Ok(output.status.success())
    }

    /// Arguments of a `git diff` from `hash` to the working tree. Without an
    /// existing working tree the other side is `HEAD`, or the snapshot index
    /// when there is no `HEAD`.
    fn diff_args<'s>(
        &self,
        hash: &'s str,
        work_tree: Option<&Path>,
        options: &[&'s str],
        path: Option<&'s str>,
    ) -> Result<Vec<&'s str>> {
        let mut args = vec!["diff", "--no-ext-diff"];
        args.extend_from_slice(options);
        match work_tree {
            Some(_) => args.push(hash),
            None if self.has_head()? => args.extend([hash, "HEAD"]),
            None => args.extend(["--cached", hash]),
        }
        if let Some(path) = path {
            args.extend(["--", path]);
        }
        Ok(args)
    }

    fn diff_output(
        &self,
        command: &str,
        hash: &str,
        work_tree: Option<&Path>,
        options: &[&str],
        path: Option<&str>,
    ) -> Result<Vec<u8>> {
        let work_tree = work_tree.filter(|w| w.is_dir());
        let args = self.diff_args(hash, work_tree, options, path)?;
        let output = self.run(work_tree, &args)?;
        check_status(command, &output)?;
        Ok(output.stdout)
    }

    /// Unified diff from `hash` to the working tree, optionally limited to
    /// one path, decoded for display.
    ///
    /// Empty output means no differences.
    ///
    /// # Errors
    /// Returns `Error::GitSpawn` if git cannot be started and `Error::Git`
    /// (carrying stderr) if it exits non-zero.
    pub fn diff(
        &self,
        hash: &str,
        work_tree: Option<&Path>,
        path: Option<&str>,
    ) -> Result<String> {
        let stdout = self.diff_output("diff", hash, work_tree, &["--no-color"], path)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// The diff from `hash` to the working tree as raw bytes that
    /// `git apply` accepts, binary files included.
    ///
    /// # Errors
    /// Same as [`SnapshotRepo::diff`].
    pub fn patch(
        &self,
        hash: &str,
        work_tree: Option<&Path>,
        path: Option<&str>,
    ) -> Result<Vec<u8>> {
        self.diff_output(
            "diff --binary",
            hash,
            work_tree,
            &["--no-color", "--binary", "--full-index"],
            path,
        )
    }

    /// Paths that differ between `hash` and the working tree, exactly as git
    /// records them.
    ///
    /// # Errors
    /// Same as [`SnapshotRepo::diff`].
    pub fn changed_paths(
        &self,
        hash: &str,
        work_tree: Option<&Path>,
    ) -> Result<BTreeSet<String>> {
        let options = ["--name-only", "-z"];
        let stdout = self.diff_output("diff --name-only", hash, work_tree, &options, None)?;
        Ok(stdout
            .split(|&b| b == 0)
            .filter(|path| !path.is_empty())
            .map(|path| String::from_utf8_lossy(path).into_owned())
            .collect())
    }

    /// Apply `patch` in reverse to `work_tree`.
    ///
    /// `git apply` is all-or-nothing: on failure no hunk has been written.
    ///
    /// # Errors
    /// Returns `Error::Git` with git's stderr if the patch does not apply.
    pub fn apply_reverse(&self, work_tree: &Path, patch: &[u8]) -> Result<()> {
        let mut cmd = self.command(Some(work_tree));
        cmd.args(["apply", "--reverse", "--whitespace=nowarn", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!("Running {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| Error::GitSpawn {
            program: self.git_binary.clone(),
            source,
        })?;
        // Dropping stdin closes the pipe before waiting.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(patch),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;
        check_status("apply --reverse", &output)?;
        written?;
        Ok(())
    }
}

/// Version string of the configured git, for diagnostics.
///
/// # Errors
/// Returns `Error::GitSpawn` if git cannot be started.
pub fn git_version(git_binary: &str) -> Result<String> {
    let output = Command::new(git_binary)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map_err(|source| Error::GitSpawn {
            program: git_binary.to_string(),
            source,
        })?;
    check_status("--version", &output)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_status(command: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    warn!("git {} failed ({}): {}", command, output.status, stderr);
    Err(Error::Git {
        command: command.to_string(),
        status: output.status.to_string(),
        stderr,
    })
}
