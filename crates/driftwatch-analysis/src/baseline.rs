use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use driftwatch_config::DriftConfig;
use driftwatch_core::{GitCli, GitContext};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselineProvenance {
    Explicit,
    Persisted,
    RemoteDefault,
    Lookback,
}

impl BaselineProvenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Persisted => "persisted",
            Self::RemoteDefault => "remote-default",
            Self::Lookback => "lookback",
        }
    }
}

impl fmt::Display for BaselineProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The revision every diff in one run is taken against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub revision: String,
    pub provenance: BaselineProvenance,
    /// The token or artifact the revision was resolved from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One way of finding a baseline. Sources are tried in declaration order
/// and the first one that yields a revision wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineSource {
    /// A caller-supplied token. Fails with `InvalidBaseline` when it does
    /// not resolve, which stops the search.
    Explicit(String),
    /// The pin file written by `baseline pin`. A missing, empty, or
    /// unresolvable pin is skipped.
    PinFile(PathBuf),
    /// Conventional remote default branches. Skipped when none resolve.
    RemoteDefault(Vec<String>),
}

impl BaselineSource {
    fn attempt(&self, git: &GitContext) -> Result<Option<Baseline>, AnalysisError> {
        match self {
            Self::Explicit(token) => match git.resolve_commit(token) {
                Some(revision) => Ok(Some(Baseline {
                    revision,
                    provenance: BaselineProvenance::Explicit,
                    source: Some(token.trim().to_owned()),
                })),
                None => Err(AnalysisError::InvalidBaseline(token.trim().to_owned())),
            },
            Self::PinFile(path) => {
                let Some(token) = read_baseline_pin(path)? else {
                    return Ok(None);
                };
                match git.resolve_commit(&token) {
                    Some(revision) => Ok(Some(Baseline {
                        revision,
                        provenance: BaselineProvenance::Persisted,
                        source: Some(token),
                    })),
                    None => {
                        tracing::warn!(
                            path = %path.display(),
                            revision = %token,
                            "pinned baseline does not resolve; ignoring it"
                        );
                        Ok(None)
                    }
                }
            }
            Self::RemoteDefault(refs) => Ok(refs.iter().find_map(|candidate| {
                git.resolve_commit(candidate).map(|revision| Baseline {
                    revision,
                    provenance: BaselineProvenance::RemoteDefault,
                    source: Some(candidate.clone()),
                })
            })),
        }
    }
}

pub struct BaselineResolver {
    sources: Vec<BaselineSource>,
}

impl BaselineResolver {
    pub fn new(sources: Vec<BaselineSource>) -> Self {
        Self { sources }
    }

    /// Explicit token (when given), then the pin file, then remote defaults.
    pub fn for_workspace(workspace: &Path, config: &DriftConfig, explicit: Option<&str>) -> Self {
        let mut sources = Vec::new();
        if let Some(token) = explicit {
            sources.push(BaselineSource::Explicit(token.to_owned()));
        }
        sources.push(BaselineSource::PinFile(workspace.join(&config.baseline_pin)));
        sources.push(BaselineSource::RemoteDefault(
            config.remote_default_refs.clone(),
        ));
        Self::new(sources)
    }

    pub fn sources(&self) -> &[BaselineSource] {
        &self.sources
    }

    pub fn resolve(&self, git: &GitContext) -> Result<Baseline, AnalysisError> {
        for source in &self.sources {
            if let Some(baseline) = source.attempt(git)? {
                tracing::debug!(
                    revision = %baseline.revision,
                    provenance = %baseline.provenance,
                    "resolved baseline"
                );
                return Ok(baseline);
            }
        }

        Err(AnalysisError::NoBaselineAvailable(
            "no explicit baseline, pinned baseline, or remote default branch resolved".to_owned(),
        ))
    }
}

/// Newest commit at least `lookback_days` older than `now_seconds`.
pub fn lookback_baseline(
    git: &GitContext,
    lookback_days: u32,
    now_seconds: i64,
) -> Option<Baseline> {
    let cutoff = now_seconds - i64::from(lookback_days) * SECONDS_PER_DAY;
    git.newest_commit_before(cutoff).map(|revision| Baseline {
        revision,
        provenance: BaselineProvenance::Lookback,
        source: Some(format!("{lookback_days}d")),
    })
}

/// First non-empty, non-comment line of the pin file.
pub fn read_baseline_pin(path: &Path) -> Result<Option<String>, AnalysisError> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned))
}

/// Resolves `revision` and records it as the persisted baseline at the
/// repository top-level.
pub fn pin_baseline(
    git: &GitContext,
    workspace: &Path,
    config: &DriftConfig,
    revision: &str,
) -> Result<Baseline, AnalysisError> {
    let resolved = git
        .resolve_commit(revision)
        .ok_or_else(|| AnalysisError::InvalidBaseline(revision.trim().to_owned()))?;

    let path = GitCli::top_level_or_self(workspace).join(&config.baseline_pin);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, format!("{resolved}\n"))?;
    tracing::info!(path = %path.display(), revision = %resolved, "pinned baseline");

    Ok(Baseline {
        revision: resolved,
        provenance: BaselineProvenance::Persisted,
        source: Some(config.baseline_pin.clone()),
    })
}
