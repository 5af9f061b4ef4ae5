use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use driftwatch_analysis::{Baseline, DriftAnalyzer, pin_baseline};
use driftwatch_config::DriftConfig;
use driftwatch_core::GitContext;
use serde::Serialize;

use crate::ExitStatus;
use crate::cli::{BaselinePinArgs, BaselineShowArgs};
use crate::output::{write_json, write_warnings};

#[derive(Debug, Clone, Serialize)]
pub struct BaselineView {
    pub baseline: Option<Baseline>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub fn run_baseline_pin_command(
    workspace: &Path,
    config: &DriftConfig,
    args: BaselinePinArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let git = GitContext::open(workspace)
        .ok_or_else(|| anyhow!("{} is not inside a git repository", workspace.display()))?;
    let baseline = pin_baseline(&git, workspace, config, &args.revision)
        .with_context(|| format!("failed to pin baseline {}", args.revision))?;

    writeln!(
        out,
        "Pinned baseline {} in {}",
        baseline.revision, config.baseline_pin
    )
    .context("failed to write output")?;
    Ok(ExitStatus::Clean)
}

/// Exits 2 when no baseline resolves, since a drift run would be unknown.
pub fn run_baseline_show_command(
    workspace: &Path,
    config: DriftConfig,
    args: BaselineShowArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let analyzer = DriftAnalyzer::with_config(workspace, config);
    let (baseline, warnings) = analyzer
        .effective_baseline(args.baseline.as_deref())
        .context("baseline resolution failed")?;
    let status = if baseline.is_some() {
        ExitStatus::Clean
    } else {
        ExitStatus::Failure
    };

    let view = BaselineView { baseline, warnings };
    if args.json {
        write_json(out, &view)?;
    } else {
        render_baseline(out, &view)?;
    }
    Ok(status)
}

pub fn render_baseline(out: &mut dyn Write, view: &BaselineView) -> Result<()> {
    match &view.baseline {
        Some(baseline) => {
            writeln!(out, "Baseline: {}", baseline.revision).context("failed to write output")?;
            writeln!(out, "Provenance: {}", baseline.provenance)
                .context("failed to write output")?;
            if let Some(source) = &baseline.source {
                writeln!(out, "Source: {source}").context("failed to write output")?;
            }
        }
        None => writeln!(out, "No baseline resolves.").context("failed to write output")?,
    }
    write_warnings(out, &view.warnings)
}
