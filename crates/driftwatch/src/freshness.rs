use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use driftwatch_analysis::{
    FreshnessAnalyzer, FreshnessEvaluation, FreshnessReport, FreshnessRequest, TouchOutcome,
};
use driftwatch_config::FreshnessConfig;
use serde::Serialize;

use crate::ExitStatus;
use crate::cli::{FreshnessArgs, RefreshArgs};
use crate::output::{write_json, write_warnings};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    #[serde(flatten)]
    pub report: FreshnessReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub touched: Vec<TouchOutcome>,
}

pub fn run_freshness_command(
    workspace: &Path,
    config: FreshnessConfig,
    args: FreshnessArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let analyzer = FreshnessAnalyzer::with_config(workspace, config);
    let report = analyzer.report(FreshnessRequest {
        max_age_days: args.max_age_days,
        warn_threshold: args.warn_threshold,
        include_git_dirty: args.include_git_dirty.then_some(true),
        require_sidecar: args.require_sidecar.then_some(true),
    });

    if args.json {
        write_json(out, &report)?;
    } else {
        render_freshness_report(out, &report)?;
    }

    if report.recommended && !args.advisory {
        Ok(ExitStatus::UpdateRecommended)
    } else {
        Ok(ExitStatus::Clean)
    }
}

pub fn render_freshness_report(out: &mut dyn Write, report: &FreshnessReport) -> Result<()> {
    if !report.recommended {
        writeln!(out, "Context looks fresh enough.").context("failed to write output")?;
        return write_warnings(out, &report.warnings);
    }

    writeln!(out, "Context update recommended.\n").context("failed to write output")?;
    for evaluation in report.files.iter().filter(|file| file.recommended) {
        writeln!(out, "- {}", evaluation.file).context("failed to write output")?;
        for reason in &evaluation.reasons {
            writeln!(out, "  - {reason}").context("failed to write output")?;
        }
    }
    writeln!(
        out,
        "\nNext: run `driftwatch refresh` or open the tracked documents."
    )
    .context("failed to write output")?;
    write_warnings(out, &report.warnings)
}

pub fn run_refresh_command(
    workspace: &Path,
    config: FreshnessConfig,
    args: RefreshArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    refresh_at(workspace, config, args, Utc::now(), out)
}

pub fn refresh_at(
    workspace: &Path,
    config: FreshnessConfig,
    args: RefreshArgs,
    now: DateTime<Utc>,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let analyzer = FreshnessAnalyzer::with_config(workspace, config);
    let report = analyzer.report_at(
        FreshnessRequest {
            max_age_days: args.max_age_days,
            ..FreshnessRequest::default()
        },
        now,
    );
    let touched = if args.touches() {
        analyzer.touch(&report.files, args.touch_all, now)
    } else {
        Vec::new()
    };

    let summary = RefreshSummary { report, touched };
    if args.json {
        write_json(out, &summary)?;
    } else {
        render_refresh(out, &summary)?;
    }
    Ok(ExitStatus::Clean)
}

pub fn render_refresh(out: &mut dyn Write, summary: &RefreshSummary) -> Result<()> {
    writeln!(out, "Context refresh (guided)\n").context("failed to write output")?;
    for evaluation in &summary.report.files {
        render_refresh_entry(out, evaluation)?;
    }

    if summary.touched.iter().any(|outcome| outcome.touched) {
        writeln!(out, "Touched Last updated for:").context("failed to write output")?;
        for outcome in summary.touched.iter().filter(|outcome| outcome.touched) {
            let replacement = outcome.replacement.as_deref().unwrap_or_default();
            writeln!(out, "- {} -> {replacement}", outcome.file)
                .context("failed to write output")?;
        }
        writeln!(out).context("failed to write output")?;
    }

    writeln!(
        out,
        "Next: edit the recommended files (keep bullets short), then re-run the freshness check."
    )
    .context("failed to write output")?;
    write_warnings(out, &summary.report.warnings)
}

fn render_refresh_entry(out: &mut dyn Write, evaluation: &FreshnessEvaluation) -> Result<()> {
    writeln!(out, "== {} ==", evaluation.file).context("failed to write output")?;
    writeln!(
        out,
        "Last reviewed: {}",
        evaluation.last_reviewed.as_deref().unwrap_or("(missing)")
    )
    .context("failed to write output")?;
    writeln!(
        out,
        "Last updated: {}",
        evaluation.last_updated.as_deref().unwrap_or("(missing)")
    )
    .context("failed to write output")?;
    writeln!(
        out,
        "Recommended: {} (score {})",
        if evaluation.recommended { "yes" } else { "no" },
        evaluation.score
    )
    .context("failed to write output")?;

    if !evaluation.reasons.is_empty() {
        writeln!(out, "Reasons:").context("failed to write output")?;
        for reason in &evaluation.reasons {
            writeln!(out, "- {reason}").context("failed to write output")?;
        }
    }

    let changes = evaluation
        .changes
        .iter()
        .filter(|(_, items)| !items.is_empty())
        .collect::<Vec<_>>();
    if !changes.is_empty() {
        writeln!(out, "Recent changes since last update:").context("failed to write output")?;
        for (root, items) in changes {
            writeln!(out, "- {root}:").context("failed to write output")?;
            for item in items {
                writeln!(out, "  - {item}").context("failed to write output")?;
            }
        }
    }

    writeln!(out).context("failed to write output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn evaluation(file: &str, recommended: bool) -> FreshnessEvaluation {
        FreshnessEvaluation {
            id: "goals".to_owned(),
            file: file.to_owned(),
            ok: true,
            recommended,
            score: if recommended { 3 } else { 0 },
            baseline_date: None,
            baseline_source: None,
            age_days: None,
            last_reviewed: None,
            last_updated: Some("2024-01-01".to_owned()),
            has_time: false,
            reasons: if recommended {
                vec!["New/updated decisions artifacts since last update (1 shown)".to_owned()]
            } else {
                Vec::new()
            },
            signals: BTreeMap::new(),
            changes: if recommended {
                BTreeMap::from([(
                    "decisions".to_owned(),
                    vec!["docs/decisions/003.md".to_owned()],
                )])
            } else {
                BTreeMap::new()
            },
        }
    }

    fn report(files: Vec<FreshnessEvaluation>) -> FreshnessReport {
        FreshnessReport {
            ok: true,
            recommended: files.iter().any(|file| file.recommended),
            today_utc: "2024-01-02".to_owned(),
            max_age_days: 7,
            warn_threshold: 3,
            sidecar: "context/.freshness.json".to_owned(),
            files,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn fresh_report_is_one_line() {
        let mut buffer = Vec::new();
        render_freshness_report(&mut buffer, &report(vec![evaluation("context/a.md", false)]))
            .expect("render");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "Context looks fresh enough.\n");
    }

    #[test]
    fn recommended_report_lists_only_recommended_documents() {
        let value = report(vec![
            evaluation("context/a.md", true),
            evaluation("context/b.md", false),
        ]);
        let mut buffer = Vec::new();
        render_freshness_report(&mut buffer, &value).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.starts_with(
            "Context update recommended.\n\n- context/a.md\n  - New/updated decisions artifacts"
        ));
        assert!(!text.contains("context/b.md"));
    }

    #[test]
    fn refresh_lists_every_document_and_touches() {
        let summary = RefreshSummary {
            report: report(vec![evaluation("context/a.md", true)]),
            touched: vec![TouchOutcome {
                file: "context/a.md".to_owned(),
                touched: true,
                replacement: Some("Last updated: 2024-01-02".to_owned()),
                reason: None,
            }],
        };
        let mut buffer = Vec::new();
        render_refresh(&mut buffer, &summary).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert_eq!(
            text,
            "Context refresh (guided)\n\n\
             == context/a.md ==\n\
             Last reviewed: (missing)\n\
             Last updated: 2024-01-01\n\
             Recommended: yes (score 3)\n\
             Reasons:\n\
             - New/updated decisions artifacts since last update (1 shown)\n\
             Recent changes since last update:\n\
             - decisions:\n  - docs/decisions/003.md\n\
             \n\
             Touched Last updated for:\n\
             - context/a.md -> Last updated: 2024-01-02\n\
             \n\
             Next: edit the recommended files (keep bullets short), then re-run the freshness check.\n"
        );
    }
}
