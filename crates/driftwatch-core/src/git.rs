use std::path::{Component, Path, PathBuf};

use gix::bstr::ByteSlice;

/// Read-only view of a repository used to resolve revisions.
pub struct GitContext {
    repo: gix::Repository,
}

impl GitContext {
    pub fn open(workspace: &Path) -> Option<Self> {
        gix::discover(workspace).ok().map(|repo| Self { repo })
    }

    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    pub fn head_commit_hash(&self) -> Option<String> {
        let head_id = self.repo.head_id().ok()?.detach();
        Some(head_id.to_string().to_ascii_lowercase())
    }

    /// Resolves any revision spec (`HEAD~2`, a tag, `origin/main`, an
    /// abbreviated hash) to the full hash of the commit it points at.
    pub fn resolve_commit(&self, spec: &str) -> Option<String> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }

        let peeled = format!("{spec}^{{commit}}");
        let id = self.repo.rev_parse_single(peeled.as_bytes().as_bstr()).ok()?;
        Some(id.detach().to_string().to_ascii_lowercase())
    }

    /// Newest commit reachable from HEAD whose commit time is at or before
    /// `cutoff_seconds`.
    pub fn newest_commit_before(&self, cutoff_seconds: i64) -> Option<String> {
        let head_id = self.repo.head_id().ok()?.detach();
        let walk = self
            .repo
            .rev_walk([head_id])
            .sorting(gix::revision::walk::Sorting::ByCommitTime(
                gix::traverse::commit::simple::CommitTimeOrder::NewestFirst,
            ))
            .all()
            .ok()?;

        for entry in walk {
            let Ok(info) = entry else {
                continue;
            };
            let Some(seconds) = self.commit_time(info.id) else {
                continue;
            };
            if seconds <= cutoff_seconds {
                return Some(info.id.to_string().to_ascii_lowercase());
            }
        }

        None
    }

    pub fn commit_timestamp(&self, hash: &str) -> Option<i64> {
        let id = self.repo.rev_parse_single(hash.as_bytes().as_bstr()).ok()?;
        self.commit_time(id.detach())
    }

    pub fn repo_relative_path(&self, path: &Path) -> Option<String> {
        let relative_path = match self.repo.workdir() {
            Some(workdir) => {
                let absolute = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    workdir.join(path)
                };
                absolute.strip_prefix(workdir).ok()?.to_path_buf()
            }
            None => {
                if path.is_absolute() {
                    return None;
                }
                path.to_path_buf()
            }
        };

        normalize_git_path(&relative_path)
    }

    fn commit_time(&self, id: gix::ObjectId) -> Option<i64> {
        let commit = self.repo.find_commit(id).ok()?;
        commit.time().ok().map(|time| time.seconds)
    }
}

fn normalize_git_path(path: &Path) -> Option<String> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => segments.push(segment.to_str()?.to_owned()),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}
