pub mod baseline;
pub mod cli;
pub mod drift;
pub mod freshness;
pub mod logging;
pub mod output;
pub mod sidecar;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use driftwatch_config::{DriftwatchConfig, load_workspace_config, validate_config};
use driftwatch_core::GitCli;

use crate::cli::{BaselineCommand, Cli, Commands, SidecarCommand};

/// Process outcome of a command, mapped onto the exit code contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Clean,
    UpdateRecommended,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::UpdateRecommended => 1,
            Self::Failure => 2,
        }
    }
}

pub fn run(cli: Cli, out: &mut dyn Write) -> Result<ExitStatus> {
    let workspace = resolve_workspace(&cli.workspace)?;
    let config = load_config(&workspace)?;
    tracing::debug!(workspace = %workspace.display(), "resolved workspace");

    let sidecar_path = config.freshness.sidecar.as_str();
    match cli.command {
        Commands::Drift(args) => {
            drift::run_drift_command(&workspace, config.drift, sidecar_path, args, out)
        }
        Commands::Explain(args) => {
            drift::run_explain_command(&workspace, config.drift, sidecar_path, args, out)
        }
        Commands::Freshness(args) => {
            freshness::run_freshness_command(&workspace, config.freshness, args, out)
        }
        Commands::Refresh(args) => {
            freshness::run_refresh_command(&workspace, config.freshness, args, out)
        }
        Commands::Sidecar(SidecarCommand::Update(args)) => {
            sidecar::run_sidecar_update_command(&workspace, &config.freshness, args, out)
        }
        Commands::Baseline(BaselineCommand::Pin(args)) => {
            baseline::run_baseline_pin_command(&workspace, &config.drift, args, out)
        }
        Commands::Baseline(BaselineCommand::Show(args)) => {
            baseline::run_baseline_show_command(&workspace, config.drift, args, out)
        }
    }
}

/// Canonical workspace root. Inside a repository this is the git top-level,
/// so configured paths resolve the same from any subdirectory.
pub fn resolve_workspace(requested: &Path) -> Result<PathBuf> {
    let workspace = requested
        .canonicalize()
        .with_context(|| format!("failed to resolve workspace path {}", requested.display()))?;

    match GitCli::discover(&workspace) {
        Ok(git) => Ok(git
            .root()
            .canonicalize()
            .unwrap_or_else(|_| git.root().to_path_buf())),
        Err(err) => {
            tracing::debug!(error = %err, "workspace is not inside a git repository");
            Ok(workspace)
        }
    }
}

fn load_config(workspace: &Path) -> Result<DriftwatchConfig> {
    let config = load_workspace_config(workspace).with_context(|| {
        format!(
            "failed to load driftwatch config for workspace {}",
            workspace.display()
        )
    })?;
    for warning in validate_config(&config) {
        eprintln!(
            "driftwatch config warning [{}]: {}",
            warning.code, warning.message
        );
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(ExitStatus::Clean.code(), 0);
        assert_eq!(ExitStatus::UpdateRecommended.code(), 1);
        assert_eq!(ExitStatus::Failure.code(), 2);
    }

    #[test]
    fn missing_workspace_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("nope");
        let err = resolve_workspace(&missing).expect_err("missing workspace");
        assert!(format!("{err:#}").contains("failed to resolve workspace path"));
    }
}
