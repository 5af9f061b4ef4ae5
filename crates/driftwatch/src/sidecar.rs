use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use driftwatch_analysis::{SidecarUpdate, update_from_index};
use driftwatch_config::FreshnessConfig;

use crate::ExitStatus;
use crate::cli::SidecarUpdateArgs;
use crate::output::{write_bullets, write_json, write_warnings};

pub fn run_sidecar_update_command(
    workspace: &Path,
    config: &FreshnessConfig,
    args: SidecarUpdateArgs,
    out: &mut dyn Write,
) -> Result<ExitStatus> {
    let update =
        update_from_index(workspace, config, Utc::now()).context("sidecar update failed")?;

    if args.json {
        write_json(out, &update)?;
    } else {
        render_sidecar_update(out, &update)?;
    }
    Ok(ExitStatus::Clean)
}

pub fn render_sidecar_update(out: &mut dyn Write, update: &SidecarUpdate) -> Result<()> {
    if update.written {
        writeln!(out, "Updated {} for:", update.sidecar).context("failed to write output")?;
        write_bullets(out, &update.updated)?;
        if update.staged {
            writeln!(out, "Staged {}.", update.sidecar).context("failed to write output")?;
        }
    } else {
        writeln!(out, "{} is up to date.", update.sidecar).context("failed to write output")?;
    }
    write_warnings(out, &update.warnings)
}
