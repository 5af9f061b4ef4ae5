use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use driftwatch_config::FreshnessConfig;
use driftwatch_core::{GitCli, content_digest};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

pub const SIDECAR_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SidecarEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, SidecarEntry>,
}

impl Default for SidecarRecord {
    fn default() -> Self {
        Self {
            version: SIDECAR_VERSION,
            updated_at: None,
            files: BTreeMap::new(),
        }
    }
}

fn default_version() -> u32 {
    SIDECAR_VERSION
}

/// Persistence for the review record. Scoring only ever reads it.
pub trait SidecarStore {
    /// `Ok(None)` when nothing has been recorded yet.
    fn read(&self) -> Result<Option<SidecarRecord>, AnalysisError>;
    fn write(&self, record: &SidecarRecord) -> Result<(), AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct JsonSidecarStore {
    path: PathBuf,
}

impl JsonSidecarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_workspace(workspace: &Path, config: &FreshnessConfig) -> Self {
        Self::new(workspace.join(&config.sidecar))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SidecarStore for JsonSidecarStore {
    fn read(&self) -> Result<Option<SidecarRecord>, AnalysisError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| AnalysisError::SidecarCorrupt {
                path: self.path.display().to_string(),
                reason: err.to_string(),
            })
    }

    fn write(&self, record: &SidecarRecord) -> Result<(), AnalysisError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, to_stable_json(record)?)?;
        Ok(())
    }
}

/// Pretty JSON with sorted object keys and a trailing newline, so repeated
/// writes of the same record are byte-identical.
pub fn to_stable_json(record: &SidecarRecord) -> Result<String, AnalysisError> {
    // serde_json::Value keeps object keys in a BTreeMap.
    let value = serde_json::to_value(record)?;
    let mut rendered = serde_json::to_string_pretty(&value)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Reads the sidecar, treating a corrupt file as absent.
pub fn read_sidecar_lenient(store: &dyn SidecarStore) -> (Option<SidecarRecord>, Option<String>) {
    match store.read() {
        Ok(record) => (record, None),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable freshness sidecar");
            (None, Some(err.to_string()))
        }
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SidecarUpdate {
    pub sidecar: String,
    pub updated: Vec<String>,
    pub written: bool,
    pub staged: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Records `reviewed_at = now` for every document whose content digest
/// differs from the stored one. Writes only when something changed.
pub fn apply_reviews(
    store: &dyn SidecarStore,
    contents: &[(String, Vec<u8>)],
    now: DateTime<Utc>,
) -> Result<(Vec<String>, bool), AnalysisError> {
    let (existing, _) = read_sidecar_lenient(store);
    let mut record = existing.unwrap_or_default();
    let mut updated = Vec::new();

    for (path, bytes) in contents {
        let digest = content_digest(bytes);
        let entry = record.files.entry(path.clone()).or_default();
        if entry.content_hash.as_deref() == Some(digest.as_str()) {
            continue;
        }
        entry.reviewed_at = Some(format_timestamp(now));
        entry.content_hash = Some(digest);
        updated.push(path.clone());
    }

    if updated.is_empty() {
        return Ok((updated, false));
    }

    record.version = SIDECAR_VERSION;
    record.updated_at = Some(format_timestamp(now));
    store.write(&record)?;
    Ok((updated, true))
}

/// Commit-time update: compares the staged content of every tracked
/// document that is part of the pending commit, records the changed ones,
/// and stages the sidecar so it lands in the same commit.
pub fn update_from_index(
    workspace: &Path,
    config: &FreshnessConfig,
    now: DateTime<Utc>,
) -> Result<SidecarUpdate, AnalysisError> {
    let mut update = SidecarUpdate {
        sidecar: config.sidecar.clone(),
        ..SidecarUpdate::default()
    };

    let git = match GitCli::discover(workspace) {
        Ok(git) => git,
        Err(err) => {
            tracing::info!(error = %err, "not inside a git repository; sidecar left untouched");
            update.warnings.push(err.to_string());
            return Ok(update);
        }
    };

    let staged = git.staged_paths()?;
    let mut contents = Vec::new();
    for document in &config.documents {
        if !staged.iter().any(|path| path == &document.path) {
            continue;
        }
        match git.show_blob("", &document.path) {
            Ok(Some(bytes)) => contents.push((document.path.clone(), bytes)),
            Ok(None) => {
                tracing::debug!(path = %document.path, "document staged for removal; skipping");
            }
            Err(err) => {
                tracing::warn!(path = %document.path, error = %err, "could not read staged document");
                update.warnings.push(format!("{}: {err}", document.path));
            }
        }
    }

    let store = JsonSidecarStore::for_workspace(git.root(), config);
    let (updated, written) = apply_reviews(&store, &contents, now)?;
    update.updated = updated;
    update.written = written;

    if written {
        git.add(&config.sidecar)?;
        update.staged = true;
        tracing::info!(sidecar = %config.sidecar, files = update.updated.len(), "updated freshness sidecar");
    }
    Ok(update)
}
