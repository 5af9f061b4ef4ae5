use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct DriftArgs {
    #[arg(
        long,
        value_parser = parse_threshold,
        help = "Aggregate score at or above which an update is recommended"
    )]
    pub warn_threshold: Option<f64>,

    #[arg(
        long,
        value_parser = parse_threshold,
        help = "Aggregate score at or above which --strict fails the run"
    )]
    pub fail_threshold: Option<f64>,

    #[arg(long, help = "Revision to diff against instead of the pinned or remote baseline")]
    pub baseline: Option<String>,

    #[arg(
        long = "path",
        value_name = "PREFIX",
        help = "Restrict the diff to this path prefix (repeatable; overrides the configured scope)"
    )]
    pub paths: Vec<String>,

    #[arg(long, value_name = "N", help = "Report only the N largest contributors")]
    pub top: Option<usize>,

    #[arg(long, help = "Emit the report as JSON")]
    pub json: bool,

    #[arg(
        long,
        conflicts_with = "advisory",
        help = "Exit 2 when drift is unknown or the aggregate reaches the fail threshold"
    )]
    pub strict: bool,

    #[arg(long, help = "Never exit 1 for a recommended update")]
    pub advisory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ExplainArgs {
    #[arg(long, help = "Workspace-relative path of the file to explain")]
    pub file: String,

    #[arg(long, help = "Revision to diff against instead of the pinned or remote baseline")]
    pub baseline: Option<String>,

    #[arg(long, help = "Emit the explanation as JSON")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct FreshnessArgs {
    #[arg(long, help = "Maximum baseline age in days before a penalty applies")]
    pub max_age_days: Option<u32>,

    #[arg(long, help = "Document score at or above which an update is recommended")]
    pub warn_threshold: Option<u32>,

    #[arg(long, help = "Penalize uncommitted changes in the working tree")]
    pub include_git_dirty: bool,

    #[arg(long, help = "Ignore in-document Last updated markers as a baseline")]
    pub require_sidecar: bool,

    #[arg(long, help = "Emit the report as JSON")]
    pub json: bool,

    #[arg(long, help = "Never exit 1 for a recommended update")]
    pub advisory: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RefreshArgs {
    #[arg(long, help = "Bump the Last updated marker of recommended documents")]
    pub touch: bool,

    #[arg(long, help = "Bump the Last updated marker of every present document")]
    pub touch_all: bool,

    #[arg(long, help = "Maximum baseline age in days before a penalty applies")]
    pub max_age_days: Option<u32>,

    #[arg(long, help = "Emit the refresh summary as JSON")]
    pub json: bool,
}

impl RefreshArgs {
    pub fn touches(&self) -> bool {
        self.touch || self.touch_all
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SidecarUpdateArgs {
    #[arg(long, help = "Emit the update summary as JSON")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum SidecarCommand {
    /// Record review timestamps for staged tracked documents (commit hook)
    Update(SidecarUpdateArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct BaselinePinArgs {
    #[arg(default_value = "HEAD", help = "Revision to pin as the drift baseline")]
    pub revision: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct BaselineShowArgs {
    #[arg(long, help = "Explicit revision to resolve instead of the configured chain")]
    pub baseline: Option<String>,

    #[arg(long, help = "Emit the baseline as JSON")]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum BaselineCommand {
    /// Persist a revision as the drift baseline
    Pin(BaselinePinArgs),
    /// Print the baseline the next drift run would use
    Show(BaselineShowArgs),
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Commands {
    /// Score drift of curated documents against a baseline revision
    Drift(DriftArgs),
    /// Explain the drift of a single file in plain language
    Explain(ExplainArgs),
    /// Check tracked documents against review timestamps and recent changes
    Freshness(FreshnessArgs),
    /// Guided refresh: show what changed per document and optionally bump markers
    Refresh(RefreshArgs),
    /// Maintain the freshness sidecar
    #[command(subcommand)]
    Sidecar(SidecarCommand),
    /// Manage the persisted drift baseline
    #[command(subcommand)]
    Baseline(BaselineCommand),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Drift and freshness checks for curated context documents")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root (lifted to the enclosing git top-level)"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(long, short = 'v', global = true, help = "Log at debug level by default")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_threshold(value: &str) -> Result<f64, String> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid threshold '{value}': {err}"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(format!(
            "invalid threshold '{value}', expected a finite value >= 0"
        ));
    }
    Ok(parsed)
}
