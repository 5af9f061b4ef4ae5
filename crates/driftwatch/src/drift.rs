use std::io::Write;
use std::path::{Component, Path};

use anyhow::{Context, Result, bail};
use driftwatch_analysis::{
    Baseline, DriftAnalyzer, DriftReport, DriftReportRequest, ExplainRequest, FileExplanation,
};
use driftwatch_config::DriftConfig;

use crate::ExitStatus;
use crate::cli::{DriftArgs, ExplainArgs};
use crate::output::{write_bullets, write_json, write_warnings};

/// `sidecar` is the freshness sidecar path, which never counts as drift.
pub fn run_drift_command(
    workspace: &Path,
    config: DriftConfig,
    sidecar: &str,
    args: DriftArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let analyzer = DriftAnalyzer::with_config(workspace, config).exclude_path(sidecar);
    let report = analyzer
        .report(DriftReportRequest {
            baseline: args.baseline,
            scope: (!args.paths.is_empty()).then_some(args.paths),
            warn_threshold: args.warn_threshold,
            fail_threshold: args.fail_threshold,
            top_n: args.top,
        })
        .context("drift report failed")?;

    if args.json {
        write_json(out, &report)?;
    } else {
        render_drift_report(out, &report)?;
    }
    Ok(drift_exit_status(&report, args.strict, args.advisory))
}

pub fn drift_exit_status(report: &DriftReport, strict: bool, advisory: bool) -> ExitStatus {
    if strict && (report.is_unknown() || report.failed) {
        return ExitStatus::Failure;
    }
    if report.recommended && !advisory {
        ExitStatus::UpdateRecommended
    } else {
        ExitStatus::Clean
    }
}

pub fn render_drift_report(out: &mut dyn Write, report: &DriftReport) -> Result<()> {
    let Some(aggregate) = report.aggregate else {
        writeln!(out, "Drift is unknown for this run.").context("failed to write output")?;
        return write_warnings(out, &report.warnings);
    };

    writeln!(
        out,
        "Drift score: {aggregate:.2} (warn at {:.2}, fail at {:.2})",
        report.warn_threshold, report.fail_threshold
    )
    .context("failed to write output")?;
    if let Some(baseline) = &report.baseline {
        writeln!(out, "Baseline: {}", describe_baseline(baseline))
            .context("failed to write output")?;
    }
    if !report.scope.is_empty() {
        writeln!(out, "Scope: {}", report.scope.join(", ")).context("failed to write output")?;
    }

    let verdict = if report.failed {
        "Context drift is past the fail threshold."
    } else if report.recommended {
        "Context update recommended."
    } else {
        "Context drift is within bounds."
    };
    writeln!(out, "\n{verdict}").context("failed to write output")?;

    if !report.files.is_empty() {
        writeln!(out, "\nTop contributors:").context("failed to write output")?;
        for file in &report.files {
            writeln!(
                out,
                "- {} {:.2} (magnitude {:.2}, {}, weight {:.2})",
                file.path, file.score, file.magnitude, file.semantic_bucket, file.criticality_weight
            )
            .context("failed to write output")?;
        }
        if report.omitted_files > 0 {
            writeln!(out, "  ({} more not shown)", report.omitted_files)
                .context("failed to write output")?;
        }
    }

    if !report.skipped.is_empty() {
        writeln!(out, "\nSkipped:").context("failed to write output")?;
        let skipped = report
            .skipped
            .iter()
            .map(|file| format!("{}: {}", file.path, file.reason))
            .collect::<Vec<_>>();
        write_bullets(out, &skipped)?;
    }

    write_warnings(out, &report.warnings)
}

pub fn run_explain_command(
    workspace: &Path,
    config: DriftConfig,
    sidecar: &str,
    args: ExplainArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let file = workspace_relative(workspace, &args.file)?;
    let analyzer = DriftAnalyzer::with_config(workspace, config).exclude_path(sidecar);
    let explanation = analyzer
        .explain(ExplainRequest {
            file,
            baseline: args.baseline,
        })
        .context("drift explanation failed")?;

    if args.json {
        write_json(out, &explanation)?;
    } else {
        render_explanation(out, &explanation)?;
    }
    Ok(ExitStatus::Clean)
}

pub fn render_explanation(out: &mut dyn Write, explanation: &FileExplanation) -> Result<()> {
    writeln!(out, "Drift check for {}", explanation.path).context("failed to write output")?;
    let overall = explanation
        .aggregate
        .map(|aggregate| format!("{aggregate:.2}"))
        .unwrap_or_else(|| "unknown".to_owned());
    writeln!(out, "Overall drift score: {overall}").context("failed to write output")?;
    writeln!(
        out,
        "Selected file drift score: {:.2}",
        explanation.file_score
    )
    .context("failed to write output")?;

    writeln!(out, "\nNotes:").context("failed to write output")?;
    write_bullets(out, &explanation.notes)?;
    write_warnings(out, &explanation.warnings)
}

fn describe_baseline(baseline: &Baseline) -> String {
    let short = baseline.revision.get(..12).unwrap_or(&baseline.revision);
    match &baseline.source {
        Some(source) => format!("{short} ({}, {source})", baseline.provenance),
        None => format!("{short} ({})", baseline.provenance),
    }
}

/// Relative paths are taken from the workspace root; absolute ones must lie
/// inside it.
fn workspace_relative(workspace: &Path, raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("no file provided; pass --file <path>");
    }

    let candidate = Path::new(raw);
    let relative = if candidate.is_absolute() {
        let absolute = candidate
            .canonicalize()
            .unwrap_or_else(|_| candidate.to_path_buf());
        match absolute.strip_prefix(workspace) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => bail!("{raw} is outside the workspace {}", workspace.display()),
        }
    } else {
        candidate.to_path_buf()
    };

    if relative
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        bail!("{raw} is outside the workspace {}", workspace.display());
    }

    let normalized = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    if normalized.is_empty() {
        bail!("{raw} does not name a file inside the workspace");
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use driftwatch_analysis::{BaselineProvenance, FileDriftScore, SemanticBucket};

    use super::*;

    fn report(aggregate: Option<f64>) -> DriftReport {
        let aggregate_value = aggregate.unwrap_or(0.0);
        DriftReport {
            aggregate,
            recommended: aggregate.is_some() && aggregate_value >= 3.0,
            failed: aggregate.is_some() && aggregate_value >= 6.0,
            warn_threshold: 3.0,
            fail_threshold: 6.0,
            baseline: aggregate.map(|_| Baseline {
                revision: "0123456789abcdef0123".to_owned(),
                provenance: BaselineProvenance::Persisted,
                source: Some(".driftwatch/baseline".to_owned()),
            }),
            scope: vec!["context".to_owned()],
            files: Vec::new(),
            omitted_files: 0,
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn exit_status_honors_strict_and_advisory() {
        assert_eq!(drift_exit_status(&report(Some(1.0)), false, false), ExitStatus::Clean);
        assert_eq!(
            drift_exit_status(&report(Some(3.0)), false, false),
            ExitStatus::UpdateRecommended
        );
        assert_eq!(drift_exit_status(&report(Some(3.0)), false, true), ExitStatus::Clean);
        assert_eq!(
            drift_exit_status(&report(Some(6.0)), false, false),
            ExitStatus::UpdateRecommended
        );
        assert_eq!(drift_exit_status(&report(Some(6.0)), true, false), ExitStatus::Failure);
        assert_eq!(drift_exit_status(&report(None), false, false), ExitStatus::Clean);
        assert_eq!(drift_exit_status(&report(None), true, false), ExitStatus::Failure);
    }

    #[test]
    fn human_report_lists_contributors_and_omissions() {
        let mut value = report(Some(3.5));
        value.files = vec![FileDriftScore::new(
            "docs/decisions/001.md".to_owned(),
            1.0,
            SemanticBucket::Content,
            1.5,
        )];
        value.omitted_files = 2;

        let mut buffer = Vec::new();
        render_drift_report(&mut buffer, &value).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.starts_with("Drift score: 3.50 (warn at 3.00, fail at 6.00)\n"));
        assert!(text.contains("Baseline: 0123456789ab (persisted, .driftwatch/baseline)\n"));
        assert!(text.contains("\nContext update recommended.\n"));
        assert!(text.contains(
            "- docs/decisions/001.md 1.50 (magnitude 1.00, content, weight 1.50)\n"
        ));
        assert!(text.contains("(2 more not shown)"));
    }

    #[test]
    fn unknown_report_prints_warnings_only() {
        let mut value = report(None);
        value.warnings = vec!["no baseline".to_owned()];

        let mut buffer = Vec::new();
        render_drift_report(&mut buffer, &value).expect("render");
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "Drift is unknown for this run.\n\nWarnings:\n- no baseline\n"
        );
    }

    #[test]
    fn explanation_mirrors_the_file_report_layout() {
        let explanation = FileExplanation {
            path: "context/goals.md".to_owned(),
            aggregate: Some(1.234),
            file_score: 0.5,
            in_scope: true,
            entry: None,
            baseline: None,
            notes: vec!["It is within the standard drift scope.".to_owned()],
            warnings: Vec::new(),
        };

        let mut buffer = Vec::new();
        render_explanation(&mut buffer, &explanation).expect("render");
        assert_eq!(
            String::from_utf8(buffer).expect("utf8"),
            "Drift check for context/goals.md\n\
             Overall drift score: 1.23\n\
             Selected file drift score: 0.50\n\
             \n\
             Notes:\n\
             - It is within the standard drift scope.\n"
        );
    }

    #[test]
    fn explain_paths_are_workspace_relative() {
        let workspace = Path::new("/work/repo");
        assert_eq!(
            workspace_relative(workspace, "./context/goals.md").expect("relative"),
            "context/goals.md"
        );
        assert_eq!(
            workspace_relative(workspace, "/work/repo/specs/a.md").expect("absolute"),
            "specs/a.md"
        );
        assert!(workspace_relative(workspace, "../other.md").is_err());
        assert!(workspace_relative(workspace, "/elsewhere/a.md").is_err());
        assert!(workspace_relative(workspace, "  ").is_err());
    }
}
