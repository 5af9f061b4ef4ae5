use std::path::{Path, PathBuf};

use chrono::Utc;
use driftwatch_config::{DriftConfig, load_workspace_config, normalize_relative_path};
use driftwatch_core::{GitCli, GitContext, path_within};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;
use crate::baseline::{Baseline, BaselineResolver, lookback_baseline};
use crate::classify::{SemanticBucket, classify_file};
use crate::diff::{DiffCollector, SkippedFile};
use crate::magnitude::file_magnitude;
use crate::weight::{CriticalityTable, FileDriftScore, aggregate_scores};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DriftReportRequest {
    pub baseline: Option<String>,
    /// Overrides the configured scope when non-empty.
    pub scope: Option<Vec<String>>,
    pub warn_threshold: Option<f64>,
    pub fail_threshold: Option<f64>,
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    /// `None` when drift could not be computed (no baseline, no repository).
    pub aggregate: Option<f64>,
    pub recommended: bool,
    pub failed: bool,
    pub warn_threshold: f64,
    pub fail_threshold: f64,
    pub baseline: Option<Baseline>,
    pub scope: Vec<String>,
    pub files: Vec<FileDriftScore>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub omitted_files: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DriftReport {
    pub fn is_unknown(&self) -> bool {
        self.aggregate.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExplainRequest {
    pub file: String,
    pub baseline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExplanation {
    pub path: String,
    pub aggregate: Option<f64>,
    pub file_score: f64,
    pub in_scope: bool,
    pub entry: Option<FileDriftScore>,
    pub baseline: Option<Baseline>,
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct DriftAnalyzer {
    workspace: PathBuf,
    config: DriftConfig,
    excluded: Vec<String>,
}

impl DriftAnalyzer {
    /// Loads the workspace config; the freshness sidecar is excluded from
    /// drift alongside the baseline pin.
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let workspace = GitCli::top_level_or_self(workspace.as_ref());
        let config = load_workspace_config(&workspace)?;
        Ok(Self::with_config(workspace, config.drift).exclude_path(config.freshness.sidecar))
    }

    /// `workspace` may be any directory inside the repository; paths are
    /// resolved from its top-level.
    pub fn with_config(workspace: impl Into<PathBuf>, config: DriftConfig) -> Self {
        let workspace = GitCli::top_level_or_self(&workspace.into());
        let excluded = vec![normalize_relative_path(&config.baseline_pin)];
        Self {
            workspace,
            config,
            excluded,
        }
    }

    /// Keeps a bookkeeping file written by driftwatch itself out of the
    /// aggregate.
    pub fn exclude_path(mut self, path: impl AsRef<str>) -> Self {
        let path = normalize_relative_path(path.as_ref());
        if !path.is_empty() && !self.excluded.contains(&path) {
            self.excluded.push(path);
        }
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Runs the provider chain without the lookback fallback.
    pub fn resolve_baseline(&self, explicit: Option<&str>) -> Result<Baseline, AnalysisError> {
        let git = self.git_context()?;
        BaselineResolver::for_workspace(&self.workspace, &self.config, explicit).resolve(&git)
    }

    /// The baseline a report would diff against, lookback degrade included.
    /// `None` means drift would be unknown; the reason is in the warnings.
    pub fn effective_baseline(
        &self,
        explicit: Option<&str>,
    ) -> Result<(Option<Baseline>, Vec<String>), AnalysisError> {
        let git = self.git_context()?;
        let mut warnings = Vec::new();
        let baseline = self.resolve_with_degrade(&git, explicit, &mut warnings)?;
        Ok((baseline, warnings))
    }

    /// Scores every changed file in scope. Only an unresolvable explicit
    /// baseline is an error; every other failure degrades to an unknown or
    /// partial report with warnings.
    pub fn report(&self, request: DriftReportRequest) -> Result<DriftReport, AnalysisError> {
        let warn_threshold = request.warn_threshold.unwrap_or(self.config.warn_threshold);
        let fail_threshold = request.fail_threshold.unwrap_or(self.config.fail_threshold);
        let scope = match request.scope.as_deref() {
            Some(paths) if !paths.is_empty() => paths
                .iter()
                .map(|path| normalize_relative_path(path))
                .filter(|path| !path.is_empty())
                .collect(),
            _ => self.config.scope.clone(),
        };

        let mut report = DriftReport {
            aggregate: None,
            recommended: false,
            failed: false,
            warn_threshold,
            fail_threshold,
            baseline: None,
            scope,
            files: Vec::new(),
            omitted_files: 0,
            skipped: Vec::new(),
            warnings: Vec::new(),
        };

        let (git_context, git) = match self.repositories() {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "drift is unknown");
                report.warnings.push(err.to_string());
                return Ok(report);
            }
        };

        let resolved = self.resolve_with_degrade(
            &git_context,
            request.baseline.as_deref(),
            &mut report.warnings,
        )?;
        let Some(baseline) = resolved else {
            return Ok(report);
        };

        let collector = DiffCollector::new(&git, &baseline.revision).excluding(&self.excluded);
        let collection = match collector.collect(&report.scope) {
            Ok(collection) => collection,
            Err(err) => {
                tracing::warn!(revision = %baseline.revision, error = %err, "diff collection failed");
                report.warnings.push(format!("diff collection failed: {err}"));
                report.baseline = Some(baseline);
                return Ok(report);
            }
        };

        let k = self.config.effective_normalization();
        let table = CriticalityTable::new(&self.config.weights);
        let scores = collection
            .changes
            .iter()
            .map(|change| {
                let record = &change.record;
                let bucket = if record.is_binary {
                    SemanticBucket::Binary
                } else {
                    classify_file(&change.hunks, record.is_rename)
                };
                FileDriftScore::new(
                    record.path.clone(),
                    file_magnitude(record, k),
                    bucket,
                    table.weight_for(&record.path),
                )
            })
            .collect::<Vec<_>>();

        let (aggregate, mut files) = aggregate_scores(scores);
        if let Some(limit) = request.top_n.or(self.config.top_n).filter(|limit| *limit > 0) {
            report.omitted_files = files.len().saturating_sub(limit);
            files.truncate(limit);
        }

        tracing::info!(
            revision = %baseline.revision,
            provenance = %baseline.provenance,
            aggregate,
            files = files.len() + report.omitted_files,
            "computed drift"
        );

        report.aggregate = Some(aggregate);
        report.recommended = aggregate >= warn_threshold;
        report.failed = aggregate >= fail_threshold;
        report.baseline = Some(baseline);
        report.files = files;
        report.skipped = collection.skipped;
        Ok(report)
    }

    /// Focused report for one path. A path outside the configured scope is
    /// diffed on its own.
    pub fn explain(&self, request: ExplainRequest) -> Result<FileExplanation, AnalysisError> {
        let path = normalize_relative_path(&request.file);
        let in_scope = self.config.scope.is_empty()
            || self.config.scope.iter().any(|prefix| path_within(&path, prefix));

        let scoped = self.report(DriftReportRequest {
            baseline: request.baseline.clone(),
            ..DriftReportRequest::default()
        })?;
        let mut entry = scoped.files.iter().find(|file| file.path == path).cloned();
        let mut warnings = scoped.warnings.clone();

        if entry.is_none() && !in_scope && !scoped.is_unknown() {
            let single = self.report(DriftReportRequest {
                baseline: request.baseline,
                scope: Some(vec![path.clone()]),
                ..DriftReportRequest::default()
            })?;
            entry = single.files.into_iter().find(|file| file.path == path);
            warnings.extend(single.warnings);
        }

        let file_score = entry.as_ref().map(|file| file.score).unwrap_or(0.0);
        let notes = explanation_notes(entry.as_ref(), in_scope, &scoped);

        Ok(FileExplanation {
            path,
            aggregate: scoped.aggregate,
            file_score,
            in_scope,
            entry,
            baseline: scoped.baseline,
            notes,
            warnings,
        })
    }

    fn git_context(&self) -> Result<GitContext, AnalysisError> {
        GitContext::open(&self.workspace).ok_or_else(|| {
            AnalysisError::VersionControlUnavailable(format!(
                "{} is not inside a git repository",
                self.workspace.display()
            ))
        })
    }

    fn repositories(&self) -> Result<(GitContext, GitCli), AnalysisError> {
        let context = self.git_context()?;
        let git = GitCli::discover(&self.workspace)
            .map_err(|err| AnalysisError::VersionControlUnavailable(err.to_string()))?;
        Ok((context, git))
    }

    /// `Ok(None)` means drift is unknown; the reason is pushed to `warnings`.
    fn resolve_with_degrade(
        &self,
        git: &GitContext,
        explicit: Option<&str>,
        warnings: &mut Vec<String>,
    ) -> Result<Option<Baseline>, AnalysisError> {
        let resolver = BaselineResolver::for_workspace(&self.workspace, &self.config, explicit);
        match resolver.resolve(git) {
            Ok(baseline) => Ok(Some(baseline)),
            Err(AnalysisError::NoBaselineAvailable(reason)) => {
                let lookback_days = self.config.lookback_days;
                match lookback_baseline(git, lookback_days, Utc::now().timestamp()) {
                    Some(baseline) => {
                        tracing::warn!(
                            revision = %baseline.revision,
                            lookback_days,
                            "no baseline resolved; falling back to lookback window"
                        );
                        warnings.push(format!(
                            "{reason}; using newest commit older than {lookback_days} days"
                        ));
                        Ok(Some(baseline))
                    }
                    None => {
                        tracing::warn!(reason = %reason, "no baseline available; drift is unknown");
                        warnings.push(format!(
                            "{reason}; no commit older than {lookback_days} days either, drift is unknown"
                        ));
                        Ok(None)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }
}

pub fn magnitude_label(magnitude: f64) -> &'static str {
    if magnitude <= 0.0 {
        "no detected change"
    } else if magnitude < 0.2 {
        "a light touch"
    } else if magnitude < 0.6 {
        "a moderate update"
    } else {
        "a large rewrite"
    }
}

pub fn bucket_label(bucket: SemanticBucket) -> &'static str {
    match bucket {
        SemanticBucket::Structural => "structure and organization",
        SemanticBucket::Copy => "light wording tweaks",
        SemanticBucket::Content => "content updates",
        SemanticBucket::Binary => "binary content",
    }
}

pub fn criticality_label(weight: f64) -> &'static str {
    if weight >= 1.3 {
        "priority scope material"
    } else if weight > 1.0 {
        "higher-attention material"
    } else {
        "standard-scope material"
    }
}

fn explanation_notes(
    entry: Option<&FileDriftScore>,
    in_scope: bool,
    report: &DriftReport,
) -> Vec<String> {
    let mut notes = Vec::new();
    match entry {
        Some(file) => {
            notes.push(format!(
                "This file shows {} ({:.2}).",
                magnitude_label(file.magnitude),
                file.magnitude
            ));
            notes.push(format!(
                "Most of the change is {}.",
                bucket_label(file.semantic_bucket)
            ));
            notes.push(format!(
                "It is treated as {} (weight {:.2}).",
                criticality_label(file.criticality_weight),
                file.criticality_weight
            ));
        }
        None if report.is_unknown() => {
            notes.push("Drift could not be computed for this run.".to_owned());
        }
        None => notes.push(format!("This file shows {}.", magnitude_label(0.0))),
    }

    if in_scope {
        notes.push("It is within the standard drift scope.".to_owned());
    } else {
        notes.push(
            "It is outside the standard drift scope and does not count toward the aggregate."
                .to_owned(),
        );
    }
    notes
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}
