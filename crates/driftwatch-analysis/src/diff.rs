use std::fs;

use driftwatch_core::{ChangeStatus, DiffEntry, GitCli, count_lines, path_within};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;
use crate::classify::{Hunk, parse_hunks};

/// Git's own heuristic: a NUL byte in the first 8000 bytes marks a file as
/// binary.
const BINARY_SNIFF_BYTES: usize = 8_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeRecord {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub status: ChangeStatus,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub is_binary: bool,
    pub is_rename: bool,
    pub post_change_lines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedChange {
    pub record: FileChangeRecord,
    pub hunks: Vec<Hunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffCollection {
    pub changes: Vec<CollectedChange>,
    pub skipped: Vec<SkippedFile>,
}

/// Collects per-file changes between a baseline revision and the working
/// tree, staged and unstaged edits included. Untracked files in scope count
/// as new files.
pub struct DiffCollector<'a> {
    git: &'a GitCli,
    baseline: &'a str,
    excluded: &'a [String],
}

impl<'a> DiffCollector<'a> {
    pub fn new(git: &'a GitCli, baseline: &'a str) -> Self {
        Self {
            git,
            baseline,
            excluded: &[],
        }
    }

    /// Paths (files or directories, repository-relative) left out of the
    /// collection even when they fall inside the scope.
    pub fn excluding(mut self, excluded: &'a [String]) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn collect(&self, scope: &[String]) -> Result<DiffCollection, AnalysisError> {
        let entries = self.git.diff_entries(self.baseline, scope)?;
        let untracked = self.git.untracked_files(scope)?;

        let mut collection = DiffCollection::default();
        for entry in entries.iter().filter(|entry| !self.is_excluded(&entry.path)) {
            match self.collect_tracked(entry) {
                Ok(change) => collection.changes.push(change),
                Err(err) => skip(&mut collection, &entry.path, err),
            }
        }
        for path in untracked.into_iter().filter(|path| !self.is_excluded(path)) {
            match self.collect_untracked(&path) {
                Ok(change) => collection.changes.push(change),
                Err(err) => skip(&mut collection, &path, err),
            }
        }

        collection
            .changes
            .sort_by(|left, right| left.record.path.cmp(&right.record.path));
        Ok(collection)
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded
            .iter()
            .any(|excluded| !excluded.is_empty() && path_within(path, excluded))
    }

    fn collect_tracked(&self, entry: &DiffEntry) -> Result<CollectedChange, AnalysisError> {
        let is_binary = entry.is_binary();
        let post_change_lines = match entry.status {
            ChangeStatus::Deleted => 0,
            _ if is_binary => 0,
            _ => self.working_line_count(&entry.path)?,
        };

        let hunks = if is_binary {
            Vec::new()
        } else {
            let mut paths = Vec::with_capacity(2);
            if let Some(old_path) = entry.old_path.as_deref() {
                paths.push(old_path);
            }
            paths.push(entry.path.as_str());
            parse_hunks(&self.git.diff_unified(self.baseline, &paths)?)
        };

        Ok(CollectedChange {
            record: FileChangeRecord {
                path: entry.path.clone(),
                old_path: entry.old_path.clone(),
                status: entry.status,
                lines_added: entry.added.unwrap_or(0),
                lines_removed: entry.removed.unwrap_or(0),
                is_binary,
                is_rename: entry.status == ChangeStatus::Renamed,
                post_change_lines,
            },
            hunks,
        })
    }

    fn collect_untracked(&self, path: &str) -> Result<CollectedChange, AnalysisError> {
        let bytes = fs::read(self.git.root().join(path))?;
        let is_binary = looks_binary(&bytes);
        let lines = if is_binary {
            0
        } else {
            count_lines(&String::from_utf8_lossy(&bytes)) as u64
        };

        Ok(CollectedChange {
            record: FileChangeRecord {
                path: path.to_owned(),
                old_path: None,
                status: ChangeStatus::Added,
                lines_added: lines,
                lines_removed: 0,
                is_binary,
                is_rename: false,
                post_change_lines: lines,
            },
            hunks: Vec::new(),
        })
    }

    fn working_line_count(&self, path: &str) -> Result<u64, AnalysisError> {
        let bytes = fs::read(self.git.root().join(path))?;
        Ok(count_lines(&String::from_utf8_lossy(&bytes)) as u64)
    }
}

fn skip(collection: &mut DiffCollection, path: &str, err: AnalysisError) {
    tracing::warn!(path = %path, error = %err, "skipping file in drift collection");
    collection.skipped.push(SkippedFile {
        path: path.to_owned(),
        reason: err.to_string(),
    });
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|byte| *byte == 0)
}
