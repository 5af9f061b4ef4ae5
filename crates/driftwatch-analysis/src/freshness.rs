use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use driftwatch_config::{FreshnessConfig, TrackedDocument, load_workspace_config};
use driftwatch_core::{GitCli, content_digest};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AnalysisError;
use crate::recency::RecencyScanner;
use crate::sidecar::{JsonSidecarStore, SidecarRecord, format_timestamp, read_sidecar_lenient};

const LAST_UPDATED_PREFIX: &str = "Last updated:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreshnessBaselineSource {
    #[serde(rename = "sidecar.reviewedAt")]
    Sidecar,
    #[serde(rename = "file.lastUpdated")]
    DocumentMarker,
}

/// Where a document's freshness baseline came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineState {
    NoBaseline,
    FromSidecar(DateTime<Utc>),
    FromDocumentMarker(DateTime<Utc>),
}

impl BaselineState {
    pub fn at(self) -> Option<DateTime<Utc>> {
        match self {
            Self::NoBaseline => None,
            Self::FromSidecar(at) | Self::FromDocumentMarker(at) => Some(at),
        }
    }

    pub fn source(self) -> Option<FreshnessBaselineSource> {
        match self {
            Self::NoBaseline => None,
            Self::FromSidecar(_) => Some(FreshnessBaselineSource::Sidecar),
            Self::FromDocumentMarker(_) => Some(FreshnessBaselineSource::DocumentMarker),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastUpdatedMarker {
    pub raw: String,
    pub at: DateTime<Utc>,
    pub has_time: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessEvaluation {
    pub id: String,
    pub file: String,
    /// False only when the document is missing.
    pub ok: bool,
    pub recommended: bool,
    pub score: u32,
    pub baseline_date: Option<String>,
    pub baseline_source: Option<FreshnessBaselineSource>,
    pub age_days: Option<i64>,
    pub last_reviewed: Option<String>,
    pub last_updated: Option<String>,
    pub has_time: bool,
    pub reasons: Vec<String>,
    pub signals: BTreeMap<String, Value>,
    pub changes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FreshnessRequest {
    pub max_age_days: Option<u32>,
    pub warn_threshold: Option<u32>,
    pub include_git_dirty: Option<bool>,
    pub require_sidecar: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessReport {
    pub ok: bool,
    pub recommended: bool,
    pub today_utc: String,
    pub max_age_days: u32,
    pub warn_threshold: u32,
    pub sidecar: String,
    pub files: Vec<FreshnessEvaluation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchOutcome {
    pub file: String,
    pub touched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Inputs shared by every document in one run.
struct RunContext<'a> {
    config: &'a FreshnessConfig,
    sidecar: Option<SidecarRecord>,
    git: Option<GitCli>,
    dirty: Option<bool>,
    now: DateTime<Utc>,
}

pub struct FreshnessAnalyzer {
    workspace: PathBuf,
    config: FreshnessConfig,
}

impl FreshnessAnalyzer {
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let workspace = GitCli::top_level_or_self(workspace.as_ref());
        let config = load_workspace_config(&workspace)?.freshness;
        Ok(Self::with_config(workspace, config))
    }

    /// Documents, the sidecar and committed blobs are all resolved from the
    /// repository top-level containing `workspace`.
    pub fn with_config(workspace: impl Into<PathBuf>, config: FreshnessConfig) -> Self {
        Self {
            workspace: GitCli::top_level_or_self(&workspace.into()),
            config,
        }
    }

    pub fn config(&self) -> &FreshnessConfig {
        &self.config
    }

    pub fn report(&self, request: FreshnessRequest) -> FreshnessReport {
        self.report_at(request, Utc::now())
    }

    /// Evaluates every tracked document as of `now`. Missing documents,
    /// a corrupt sidecar, and a missing repository all degrade into reasons
    /// and warnings rather than errors.
    pub fn report_at(&self, request: FreshnessRequest, now: DateTime<Utc>) -> FreshnessReport {
        let mut config = self.config.clone();
        if let Some(value) = request.max_age_days {
            config.max_age_days = value;
        }
        if let Some(value) = request.warn_threshold {
            config.warn_threshold = value;
        }
        if let Some(value) = request.include_git_dirty {
            config.include_git_dirty = value;
        }
        if let Some(value) = request.require_sidecar {
            config.require_sidecar = value;
        }

        let mut warnings = Vec::new();
        let store = JsonSidecarStore::for_workspace(&self.workspace, &config);
        let (sidecar, sidecar_warning) = read_sidecar_lenient(&store);
        warnings.extend(sidecar_warning);

        let git = match GitCli::discover(&self.workspace) {
            Ok(git) => Some(git),
            Err(err) => {
                tracing::warn!(error = %err, "version control unavailable; skipping git signals");
                warnings.push(AnalysisError::VersionControlUnavailable(err.to_string()).to_string());
                None
            }
        };
        let dirty = git.as_ref().and_then(|git| match git.is_dirty() {
            Ok(dirty) => Some(dirty),
            Err(err) => {
                tracing::warn!(error = %err, "could not read working tree status");
                None
            }
        });

        let context = RunContext {
            config: &config,
            sidecar,
            git,
            dirty,
            now,
        };
        let files = config
            .documents
            .iter()
            .map(|document| self.evaluate(document, &context))
            .collect::<Vec<_>>();

        FreshnessReport {
            ok: true,
            recommended: files.iter().any(|file| file.recommended),
            today_utc: now.date_naive().format("%Y-%m-%d").to_string(),
            max_age_days: config.max_age_days,
            warn_threshold: config.warn_threshold,
            sidecar: config.sidecar.clone(),
            files,
            warnings,
        }
    }

    /// Rewrites the `Last updated:` marker of recommended documents, or of
    /// every present document with `touch_all`.
    pub fn touch(
        &self,
        evaluations: &[FreshnessEvaluation],
        touch_all: bool,
        now: DateTime<Utc>,
    ) -> Vec<TouchOutcome> {
        evaluations
            .iter()
            .map(|evaluation| {
                let outcome = |touched: bool, replacement: Option<String>, reason: Option<&str>| {
                    TouchOutcome {
                        file: evaluation.file.clone(),
                        touched,
                        replacement,
                        reason: reason.map(str::to_owned),
                    }
                };
                if !evaluation.ok {
                    return outcome(false, None, Some("missing"));
                }
                if !touch_all && !evaluation.recommended {
                    return outcome(false, None, Some("not-recommended"));
                }

                let path = self.workspace.join(&evaluation.file);
                let content = match fs::read_to_string(&path) {
                    Ok(content) => content,
                    Err(err) => {
                        tracing::warn!(path = %evaluation.file, error = %err, "could not read document to touch");
                        return outcome(false, None, Some("unreadable"));
                    }
                };
                let replacement = marker_replacement(parse_last_updated(&content).as_ref(), now);
                let next = touch_last_updated(&content, &replacement);
                if next == content {
                    return outcome(false, None, Some("no-change"));
                }
                if let Err(err) = fs::write(&path, next) {
                    tracing::warn!(path = %evaluation.file, error = %err, "could not write document");
                    return outcome(false, None, Some("unwritable"));
                }
                outcome(true, Some(replacement), None)
            })
            .collect()
    }

    fn evaluate(
        &self,
        document: &TrackedDocument,
        context: &RunContext<'_>,
    ) -> FreshnessEvaluation {
        let config = context.config;
        let mut evaluation = FreshnessEvaluation {
            id: document.id.clone(),
            file: document.path.clone(),
            ok: true,
            recommended: false,
            score: 0,
            baseline_date: None,
            baseline_source: None,
            age_days: None,
            last_reviewed: None,
            last_updated: None,
            has_time: false,
            reasons: Vec::new(),
            signals: BTreeMap::new(),
            changes: BTreeMap::new(),
        };

        let bytes = match self.read_document(&document.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %document.path, error = %err, "tracked document unavailable");
                evaluation.ok = false;
                evaluation.score = config.missing_penalty;
                evaluation.recommended = true;
                evaluation.reasons.push(format!("Missing file at {}", document.path));
                return evaluation;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let marker = parse_last_updated(&text);
        evaluation.last_updated = marker.as_ref().map(|marker| marker.raw.clone());
        evaluation.has_time = marker.as_ref().is_some_and(|marker| marker.has_time);
        evaluation.signals.insert(
            "lastUpdatedInFile".to_owned(),
            json!(evaluation.last_updated),
        );

        if let Some(dirty) = context.dirty {
            evaluation.signals.insert("gitDirty".to_owned(), json!(dirty));
            if dirty && config.include_git_dirty {
                evaluation.score += config.dirty_penalty;
                evaluation
                    .reasons
                    .push("Working tree has uncommitted changes".to_owned());
            }
        }

        let digest = self.committed_digest(&document.path, &bytes, context.git.as_ref());
        let entry = context
            .sidecar
            .as_ref()
            .and_then(|record| record.files.get(&document.path));
        let reviewed_raw = entry.and_then(|entry| entry.reviewed_at.clone());
        evaluation.last_reviewed = reviewed_raw.clone();

        let stored_hash = entry.and_then(|entry| entry.content_hash.as_deref());
        if stored_hash.is_some_and(|stored| stored != digest) {
            evaluation.score += config.out_of_sync_penalty;
            evaluation.reasons.push(
                "Freshness sidecar is out of sync with file content (run git commit hook to refresh)"
                    .to_owned(),
            );
        }

        let state = resolve_baseline_state(
            reviewed_raw.as_deref(),
            marker.as_ref(),
            config.require_sidecar,
        );
        evaluation.baseline_source = state.source();
        evaluation.signals.insert(
            "freshnessBaseline".to_owned(),
            json!({ "source": state.source(), "reviewedAt": reviewed_raw }),
        );

        match state.at() {
            None => {
                evaluation.score += config.no_baseline_penalty;
                evaluation.reasons.push(
                    "No freshness baseline found (missing sidecar reviewedAt and missing/invalid Last updated)"
                        .to_owned(),
                );
            }
            Some(at) => {
                let age_days = days_between_utc(at, context.now);
                evaluation.baseline_date = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
                evaluation.age_days = Some(age_days);
                evaluation.signals.insert("ageDays".to_owned(), json!(age_days));
                if age_days > i64::from(config.max_age_days) {
                    evaluation.score += config.age_penalty;
                    evaluation.reasons.push(format!(
                        "Freshness baseline is {age_days}d old (>{}d)",
                        config.max_age_days
                    ));
                }
            }
        }

        let since = state
            .at()
            .unwrap_or_else(|| context.now - Duration::days(i64::from(config.lookback_days)));
        let scanner = RecencyScanner::new(config.max_results_per_root)
            .exclude_artifact(&config.sidecar)
            .exclude_path(&document.path);
        for root in &document.watch_roots {
            let recent = scanner.scan(&self.workspace, &root.path, since);
            if recent.is_empty() {
                continue;
            }
            let paths = recent.into_iter().map(|file| file.path).collect::<Vec<_>>();
            evaluation
                .signals
                .insert(format!("recent:{}", root.id), json!(paths));
            evaluation.reasons.push(format!(
                "New/updated {} artifacts since last update ({} shown)",
                root.id,
                paths.len()
            ));
            evaluation.score += root.weight;
            evaluation.changes.insert(root.id.clone(), paths);
        }

        evaluation.recommended = evaluation.score >= config.warn_threshold;
        tracing::debug!(
            path = %document.path,
            score = evaluation.score,
            recommended = evaluation.recommended,
            "evaluated document freshness"
        );
        evaluation
    }

    fn read_document(&self, relative: &str) -> Result<Vec<u8>, AnalysisError> {
        let path = self.workspace.join(relative);
        if !path.is_file() {
            return Err(AnalysisError::MissingArtifact(relative.to_owned()));
        }
        Ok(fs::read(path)?)
    }

    /// Digest of the committed version when the document is tracked,
    /// otherwise of the working copy.
    fn committed_digest(&self, relative: &str, working: &[u8], git: Option<&GitCli>) -> String {
        let committed = git.and_then(|git| match git.show_blob("HEAD", relative) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(path = %relative, error = %err, "no committed version");
                None
            }
        });
        content_digest(committed.as_deref().unwrap_or(working))
    }
}

/// Sidecar `reviewedAt` first, then the document marker unless the sidecar
/// is required.
pub fn resolve_baseline_state(
    reviewed_at: Option<&str>,
    marker: Option<&LastUpdatedMarker>,
    require_sidecar: bool,
) -> BaselineState {
    if let Some(at) = reviewed_at.and_then(parse_timestamp) {
        return BaselineState::FromSidecar(at);
    }
    match marker {
        Some(marker) if !require_sidecar => BaselineState::FromDocumentMarker(marker.at),
        _ => BaselineState::NoBaseline,
    }
}

/// Whole UTC calendar days from `from` to `to`.
pub fn days_between_utc(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

/// First `Last updated: <date or ISO timestamp>` line in the document.
pub fn parse_last_updated(markdown: &str) -> Option<LastUpdatedMarker> {
    markdown.lines().find_map(|line| {
        let value = line.trim_start().strip_prefix(LAST_UPDATED_PREFIX)?.trim();
        let (at, has_time) = parse_marker_value(value)?;
        Some(LastUpdatedMarker {
            raw: value.to_owned(),
            at,
            has_time,
        })
    })
}

fn parse_marker_value(value: &str) -> Option<(DateTime<Utc>, bool)> {
    if value.contains('T') {
        return parse_timestamp(value).map(|at| (at, true));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some((date.and_hms_opt(0, 0, 0)?.and_utc(), false))
}

/// RFC 3339, or an ISO timestamp without offset read as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Date-only markers stay date-only; everything else gets a full UTC
/// timestamp.
pub fn marker_replacement(existing: Option<&LastUpdatedMarker>, now: DateTime<Utc>) -> String {
    match existing {
        Some(marker) if marker.has_time => format_timestamp(now),
        _ => now.date_naive().format("%Y-%m-%d").to_string(),
    }
}

/// Replaces the first `Last updated:` line, or inserts one after the first
/// top-level heading, or at the top of the document.
pub fn touch_last_updated(markdown: &str, replacement: &str) -> String {
    let marker_line = format!("{LAST_UPDATED_PREFIX} {replacement}");
    let mut lines = markdown.split('\n').map(str::to_owned).collect::<Vec<_>>();

    if let Some(line) = lines
        .iter_mut()
        .find(|line| line.trim_start().starts_with(LAST_UPDATED_PREFIX))
    {
        let carriage_return = line.ends_with('\r');
        *line = marker_line;
        if carriage_return {
            line.push('\r');
        }
        return lines.join("\n");
    }

    if let Some(index) = lines.iter().position(|line| line.starts_with("# ")) {
        let next_is_blank = lines
            .get(index + 1)
            .is_some_and(|line| line.trim().is_empty());
        let mut inserted = vec![String::new(), marker_line];
        if !next_is_blank {
            inserted.push(String::new());
        }
        for (offset, line) in inserted.into_iter().enumerate() {
            lines.insert(index + 1 + offset, line);
        }
        return lines.join("\n");
    }

    format!("{marker_line}\n\n{markdown}")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn parse_last_updated_accepts_dates_and_timestamps() {
        let marker = parse_last_updated("# Goals\n\nLast updated: 2024-02-03\n").expect("date marker");
        assert_eq!(marker.raw, "2024-02-03");
        assert_eq!(marker.at, utc(2024, 2, 3, 0));
        assert!(!marker.has_time);

        let marker = parse_last_updated("  Last updated: 2024-02-03T10:30:00.123Z  ").expect("iso marker");
        assert!(marker.has_time);
        assert_eq!(marker.at.timestamp_millis(), utc(2024, 2, 3, 10).timestamp_millis() + 1_800_123);

        let marker = parse_last_updated("Last updated: 2024-02-03T10:30").expect("short iso marker");
        assert_eq!(marker.at, utc(2024, 2, 3, 10) + Duration::minutes(30));

        let marker = parse_last_updated("Last updated: 2024-02-03T12:00:00+02:00").expect("offset");
        assert_eq!(marker.at, utc(2024, 2, 3, 10));
    }

    #[test]
    fn parse_last_updated_skips_invalid_values() {
        assert!(parse_last_updated("# Goals\nLast updated: soon\n").is_none());
        assert!(parse_last_updated("Last updated: 2024-13-45").is_none());
        assert!(parse_last_updated("See Last updated: 2024-01-01").is_none());
        assert_eq!(
            parse_last_updated("Last updated: tbd\nLast updated: 2024-01-05")
                .map(|marker| marker.raw),
            Some("2024-01-05".to_owned())
        );
    }

    #[test]
    fn sidecar_review_takes_priority_over_marker() {
        let marker = parse_last_updated("Last updated: 2024-01-01").expect("marker");

        assert_eq!(
            resolve_baseline_state(Some("2024-03-01T09:00:00.000Z"), Some(&marker), false),
            BaselineState::FromSidecar(utc(2024, 3, 1, 9))
        );
        assert_eq!(
            resolve_baseline_state(Some("garbage"), Some(&marker), false),
            BaselineState::FromDocumentMarker(utc(2024, 1, 1, 0))
        );
        assert_eq!(
            resolve_baseline_state(None, Some(&marker), true),
            BaselineState::NoBaseline
        );
        assert_eq!(resolve_baseline_state(None, None, false), BaselineState::NoBaseline);
    }

    #[test]
    fn days_between_counts_calendar_days() {
        assert_eq!(days_between_utc(utc(2024, 3, 1, 23), utc(2024, 3, 2, 1)), 1);
        assert_eq!(days_between_utc(utc(2024, 3, 1, 0), utc(2024, 3, 1, 23)), 0);
        assert_eq!(days_between_utc(utc(2024, 2, 20, 12), utc(2024, 3, 1, 12)), 10);
    }

    #[test]
    fn touch_replaces_or_inserts_marker() {
        assert_eq!(
            touch_last_updated("# Goals\nLast updated: 2024-01-01\n- ship\n", "2024-03-01"),
            "# Goals\nLast updated: 2024-03-01\n- ship\n"
        );
        assert_eq!(
            touch_last_updated("# Goals\n- ship\n", "2024-03-01"),
            "# Goals\n\nLast updated: 2024-03-01\n\n- ship\n"
        );
        assert_eq!(
            touch_last_updated("# Goals\n\n- ship\n", "2024-03-01"),
            "# Goals\n\nLast updated: 2024-03-01\n\n- ship\n"
        );
        assert_eq!(
            touch_last_updated("- ship\n", "2024-03-01"),
            "Last updated: 2024-03-01\n\n- ship\n"
        );
        assert_eq!(
            touch_last_updated("# Goals\r\nLast updated: 2024-01-01\r\n", "2024-03-01"),
            "# Goals\r\nLast updated: 2024-03-01\r\n"
        );
    }

    #[test]
    fn marker_replacement_keeps_date_only_style() {
        let now = utc(2024, 3, 1, 9);
        let date_only = parse_last_updated("Last updated: 2024-01-01").expect("marker");
        let timestamped = parse_last_updated("Last updated: 2024-01-01T08:00:00Z").expect("marker");

        assert_eq!(marker_replacement(Some(&date_only), now), "2024-03-01");
        assert_eq!(marker_replacement(None, now), "2024-03-01");
        assert_eq!(
            marker_replacement(Some(&timestamped), now),
            "2024-03-01T09:00:00.000Z"
        );
    }
}
