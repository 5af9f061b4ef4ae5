use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use walkdir::{DirEntry, WalkDir};

const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", "node_modules"];
const SKIPPED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentFile {
    /// Workspace-relative, forward slashes.
    pub path: String,
    pub modified: DateTime<Utc>,
}

/// Lists files under watch-root directories modified strictly after a
/// timestamp.
#[derive(Debug, Clone)]
pub struct RecencyScanner {
    max_results: usize,
    excluded_names: BTreeSet<String>,
    excluded_paths: BTreeSet<String>,
}

impl RecencyScanner {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results: max_results.max(1),
            excluded_names: SKIPPED_FILES.iter().map(|name| (*name).to_owned()).collect(),
            excluded_paths: BTreeSet::new(),
        }
    }

    /// Excludes a workspace-relative path and, for sidecar-style artifacts,
    /// every file sharing its name.
    pub fn exclude_artifact(mut self, relative_path: &str) -> Self {
        if let Some(name) = relative_path.rsplit('/').next().filter(|name| !name.is_empty()) {
            self.excluded_names.insert(name.to_owned());
        }
        self.excluded_paths.insert(relative_path.to_owned());
        self
    }

    pub fn exclude_path(mut self, relative_path: &str) -> Self {
        self.excluded_paths.insert(relative_path.to_owned());
        self
    }

    /// Most recent first, ties by path, capped at the configured count.
    /// Unreadable entries are skipped.
    pub fn scan(&self, workspace: &Path, root: &str, since: DateTime<Utc>) -> Vec<RecentFile> {
        let base = workspace.join(root);
        if !base.is_dir() {
            return Vec::new();
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(&base)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(root = %root, error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if self.excluded_names.contains(name.as_ref()) {
                continue;
            }
            let Some(relative) = relative_path(workspace, entry.path()) else {
                continue;
            };
            if self.excluded_paths.contains(&relative) {
                continue;
            }
            let Some(modified) = entry.metadata().ok().and_then(|meta| meta.modified().ok()) else {
                continue;
            };
            let modified = DateTime::<Utc>::from(modified);
            if modified > since {
                found.push(RecentFile {
                    path: relative,
                    modified,
                });
            }
        }

        found.sort_by(|left, right| {
            right
                .modified
                .cmp(&left.modified)
                .then_with(|| left.path.cmp(&right.path))
        });
        found.truncate(self.max_results);
        found
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIPPED_DIRS
            .iter()
            .any(|name| entry.file_name() == std::ffi::OsStr::new(name))
}

fn relative_path(workspace: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(workspace).ok()?;
    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use tempfile::tempdir;

    use super::*;

    fn touch(path: &Path, modified: SystemTime) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, "x\n").expect("write");
        File::options()
            .write(true)
            .open(path)
            .expect("open")
            .set_modified(modified)
            .expect("set mtime");
    }

    #[test]
    fn scan_lists_recent_files_newest_first_and_skips_noise() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let since = DateTime::<Utc>::from(base);

        touch(&workspace.join("context/old.md"), base - Duration::from_secs(60));
        touch(&workspace.join("context/exact.md"), base);
        touch(&workspace.join("context/newer.md"), base + Duration::from_secs(10));
        touch(&workspace.join("context/newest.md"), base + Duration::from_secs(20));
        touch(&workspace.join("context/.DS_Store"), base + Duration::from_secs(30));
        touch(&workspace.join("context/.freshness.json"), base + Duration::from_secs(30));
        touch(&workspace.join("context/current-goals.md"), base + Duration::from_secs(30));
        touch(&workspace.join("context/node_modules/pkg.md"), base + Duration::from_secs(30));

        let scanner = RecencyScanner::new(10)
            .exclude_artifact("context/.freshness.json")
            .exclude_path("context/current-goals.md");
        let found = scanner
            .scan(workspace, "context", since)
            .into_iter()
            .map(|file| file.path)
            .collect::<Vec<_>>();

        assert_eq!(found, vec!["context/newest.md", "context/newer.md"]);
    }

    #[test]
    fn scan_caps_results_and_tolerates_missing_roots() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for index in 0..5 {
            touch(
                &workspace.join(format!("docs/decisions/{index:03}.md")),
                base + Duration::from_secs(index + 1),
            );
        }

        let scanner = RecencyScanner::new(3);
        let found = scanner.scan(workspace, "docs/decisions", DateTime::<Utc>::from(base));
        assert_eq!(
            found.iter().map(|file| file.path.as_str()).collect::<Vec<_>>(),
            vec!["docs/decisions/004.md", "docs/decisions/003.md", "docs/decisions/002.md"]
        );
        assert!(scanner.scan(workspace, "missing", DateTime::<Utc>::from(base)).is_empty());
    }
}
