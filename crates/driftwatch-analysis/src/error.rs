use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("config error: {0}")]
    Config(#[from] driftwatch_config::ConfigError),
    #[error("git error: {0}")]
    Git(#[from] driftwatch_core::GitError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid baseline '{0}': it does not resolve to a known revision")]
    InvalidBaseline(String),
    #[error("no baseline available: {0}")]
    NoBaselineAvailable(String),
    #[error("version control unavailable: {0}")]
    VersionControlUnavailable(String),
    #[error("sidecar {path} is corrupt: {reason}")]
    SidecarCorrupt { path: String, reason: String },
    #[error("missing artifact: {0}")]
    MissingArtifact(String),
}
