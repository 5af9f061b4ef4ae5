use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize_path;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git is unavailable: {0}")]
    Unavailable(String),
    #[error("git {args} failed ({status}): {stderr}")]
    CommandFailed {
        args: String,
        status: String,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
}

impl ChangeStatus {
    fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('A') | Some('C') => Self::Added,
            Some('D') => Self::Deleted,
            Some('R') => Self::Renamed,
            _ => Self::Modified,
        }
    }
}

/// One file changed between a revision and the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub old_path: Option<String>,
    pub status: ChangeStatus,
    /// `None` for both counts means git reported the file as binary.
    pub added: Option<u64>,
    pub removed: Option<u64>,
}

impl DiffEntry {
    pub fn is_binary(&self) -> bool {
        self.added.is_none() && self.removed.is_none()
    }
}

/// Thin wrapper over the `git` executable for queries gix does not cover
/// against the working tree (diffs, index contents, status).
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locates the top-level directory of the repository containing
    /// `workspace`.
    pub fn discover(workspace: &Path) -> Result<Self, GitError> {
        let probe = Self::new(workspace);
        let top = probe
            .output_text(&["rev-parse", "--show-toplevel"])
            .map_err(|err| match err {
                GitError::CommandFailed { stderr, .. } => GitError::Unavailable(stderr),
                other => other,
            })?;
        let top = top.trim();
        if top.is_empty() {
            return Err(GitError::Unavailable(format!(
                "{} is not inside a git work tree",
                workspace.display()
            )));
        }
        Ok(Self::new(top))
    }

    /// The repository top-level containing `path`, or `path` unchanged
    /// outside a repository.
    pub fn top_level_or_self(path: &Path) -> PathBuf {
        match Self::discover(path) {
            Ok(git) => git.root.canonicalize().unwrap_or(git.root),
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "not inside a git work tree"
                );
                path.to_path_buf()
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files differing between `baseline` and the working tree (staged and
    /// unstaged), restricted to `pathspecs`. Renames are reported under
    /// their new path.
    pub fn diff_entries(
        &self,
        baseline: &str,
        pathspecs: &[String],
    ) -> Result<Vec<DiffEntry>, GitError> {
        let mut status_args = vec!["diff", "--name-status", "-z", "-M", "--no-ext-diff", baseline];
        push_pathspecs(&mut status_args, pathspecs);
        let statuses = parse_name_status(&self.output_text(&status_args)?);

        let mut numstat_args = vec!["diff", "--numstat", "-z", "-M", "--no-ext-diff", baseline];
        push_pathspecs(&mut numstat_args, pathspecs);
        let counts = parse_numstat(&self.output_text(&numstat_args)?);

        let mut entries = BTreeMap::new();
        for (path, (status, old_path)) in statuses {
            let (added, removed) = counts.get(&path).copied().unwrap_or((Some(0), Some(0)));
            entries.insert(
                path.clone(),
                DiffEntry {
                    path,
                    old_path,
                    status,
                    added,
                    removed,
                },
            );
        }

        Ok(entries.into_values().collect())
    }

    /// Zero-context unified diff for the given paths against `baseline`.
    pub fn diff_unified(&self, baseline: &str, paths: &[&str]) -> Result<String, GitError> {
        let mut args = vec![
            "diff",
            "-U0",
            "-M",
            "--no-color",
            "--no-ext-diff",
            baseline,
            "--",
        ];
        args.extend_from_slice(paths);
        self.output_text(&args)
    }

    pub fn untracked_files(&self, pathspecs: &[String]) -> Result<Vec<String>, GitError> {
        let mut args = vec!["ls-files", "--others", "--exclude-standard", "-z"];
        push_pathspecs(&mut args, pathspecs);
        let raw = self.output_text(&args)?;
        Ok(split_nul(&raw).map(normalize_path).collect())
    }

    /// Contents of `path` at `revision`. An empty revision reads the index
    /// (staged) version. Returns `None` when the path does not exist there.
    pub fn show_blob(&self, revision: &str, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let object = format!("{revision}:{path}");
        match self.output(&["show", object.as_str()]) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(GitError::CommandFailed { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn staged_paths(&self) -> Result<Vec<String>, GitError> {
        let raw = self.output_text(&["diff", "--cached", "--name-only", "-z"])?;
        Ok(split_nul(&raw).map(normalize_path).collect())
    }

    pub fn is_dirty(&self) -> Result<bool, GitError> {
        let raw = self.output_text(&["status", "--porcelain"])?;
        Ok(!raw.trim().is_empty())
    }

    pub fn add(&self, path: &str) -> Result<(), GitError> {
        self.output(&["add", "--", path]).map(|_| ())
    }

    fn output_text(&self, args: &[&str]) -> Result<String, GitError> {
        let bytes = self.output(args)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn output(&self, args: &[&str]) -> Result<Vec<u8>, GitError> {
        tracing::debug!(root = %self.root.display(), args = ?args, "running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .output()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => GitError::Unavailable("git executable not found".to_owned()),
                _ => GitError::Io(err),
            })?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(output.stdout)
    }
}

fn push_pathspecs<'a>(args: &mut Vec<&'a str>, pathspecs: &'a [String]) {
    if pathspecs.is_empty() {
        return;
    }
    args.push("--");
    args.extend(pathspecs.iter().map(String::as_str));
}

fn split_nul(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('\0').filter(|token| !token.is_empty())
}

/// Parses `git diff --name-status -z` into new path -> (status, old path).
fn parse_name_status(raw: &str) -> BTreeMap<String, (ChangeStatus, Option<String>)> {
    let mut records = BTreeMap::new();
    let mut tokens = split_nul(raw);
    while let Some(code) = tokens.next() {
        let status = ChangeStatus::from_code(code);
        let takes_two = code.starts_with('R') || code.starts_with('C');
        let Some(first) = tokens.next() else {
            break;
        };
        if takes_two {
            let Some(second) = tokens.next() else {
                break;
            };
            let old_path = (status == ChangeStatus::Renamed).then(|| normalize_path(first));
            records.insert(normalize_path(second), (status, old_path));
        } else {
            records.insert(normalize_path(first), (status, None));
        }
    }
    records
}

/// Parses `git diff --numstat -z` into path -> (added, removed). Binary
/// files report `-` for both counts, which maps to `None`.
fn parse_numstat(raw: &str) -> BTreeMap<String, (Option<u64>, Option<u64>)> {
    let mut records = BTreeMap::new();
    let mut tokens = raw.split('\0');
    while let Some(token) = tokens.next() {
        if token.is_empty() {
            continue;
        }
        let mut parts = token.splitn(3, '\t');
        let added = parts.next().unwrap_or_default().trim().parse::<u64>().ok();
        let removed = parts.next().unwrap_or_default().trim().parse::<u64>().ok();
        let path = parts.next().unwrap_or_default();

        let path = if path.is_empty() {
            // Rename records carry the old and new path as separate tokens.
            let _old = tokens.next();
            match tokens.next() {
                Some(new_path) => new_path,
                None => break,
            }
        } else {
            path
        };

        records.insert(normalize_path(path), (added, removed));
    }
    records
}
