use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DRIFTWATCH_DIR_NAME: &str = ".driftwatch";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_SIDECAR_PATH: &str = "context/.freshness.json";
pub const DEFAULT_BASELINE_PIN_PATH: &str = ".driftwatch/baseline";
pub const DEFAULT_NORMALIZATION: f64 = 1.0;
pub const DEFAULT_DRIFT_WARN_THRESHOLD: f64 = 3.0;
pub const DEFAULT_DRIFT_FAIL_THRESHOLD: f64 = 6.0;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DriftwatchConfig {
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalityWeight {
    pub prefix: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub scope: Vec<String>,
    pub warn_threshold: f64,
    pub fail_threshold: f64,
    /// Magnitude normalization constant `k`. A file saturates once its changed
    /// line count reaches `k` times its post-change line count.
    pub normalization: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    pub baseline_pin: String,
    pub remote_default_refs: Vec<String>,
    pub lookback_days: u32,
    pub weights: Vec<CriticalityWeight>,
}

impl DriftConfig {
    /// `k` clamped into `(0, 1]`. Larger values would let magnitude shrink as
    /// lines are added to an already saturated file.
    pub fn effective_normalization(&self) -> f64 {
        if self.normalization.is_finite() && self.normalization > 0.0 {
            self.normalization.min(1.0)
        } else {
            DEFAULT_NORMALIZATION
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            warn_threshold: DEFAULT_DRIFT_WARN_THRESHOLD,
            fail_threshold: DEFAULT_DRIFT_FAIL_THRESHOLD,
            normalization: DEFAULT_NORMALIZATION,
            top_n: None,
            baseline_pin: DEFAULT_BASELINE_PIN_PATH.to_owned(),
            remote_default_refs: default_remote_refs(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            weights: default_weights(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRoot {
    pub id: String,
    pub path: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDocument {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub watch_roots: Vec<WatchRoot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub max_age_days: u32,
    pub warn_threshold: u32,
    pub missing_penalty: u32,
    pub no_baseline_penalty: u32,
    pub out_of_sync_penalty: u32,
    pub age_penalty: u32,
    pub dirty_penalty: u32,
    pub sidecar: String,
    pub require_sidecar: bool,
    pub include_git_dirty: bool,
    pub lookback_days: u32,
    pub max_results_per_root: usize,
    pub documents: Vec<TrackedDocument>,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_days: 7,
            warn_threshold: 3,
            missing_penalty: 3,
            no_baseline_penalty: 3,
            out_of_sync_penalty: 3,
            age_penalty: 2,
            dirty_penalty: 1,
            sidecar: DEFAULT_SIDECAR_PATH.to_owned(),
            require_sidecar: false,
            include_git_dirty: false,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_results_per_root: 10,
            documents: default_documents(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub fn driftwatch_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(DRIFTWATCH_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    driftwatch_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<DriftwatchConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(DriftwatchConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<DriftwatchConfig, ConfigError> {
    let parsed: DriftwatchConfig = toml::from_str(raw)?;
    Ok(normalize_config(parsed))
}

pub fn validate_config(config: &DriftwatchConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    let drift = &config.drift;

    if drift.scope.is_empty() {
        warnings.push(ConfigWarning {
            code: "drift_scope_empty",
            message: "drift.scope is empty; the whole repository will be diffed".to_owned(),
        });
    }
    if !(drift.normalization.is_finite() && drift.normalization > 0.0 && drift.normalization <= 1.0)
    {
        warnings.push(ConfigWarning {
            code: "drift_normalization_out_of_range",
            message: format!(
                "drift.normalization = {} is outside (0, 1]; using {}",
                drift.normalization,
                drift.effective_normalization()
            ),
        });
    }
    if drift.warn_threshold > drift.fail_threshold {
        warnings.push(ConfigWarning {
            code: "drift_thresholds_inverted",
            message: format!(
                "drift.warn_threshold ({}) is greater than drift.fail_threshold ({})",
                drift.warn_threshold, drift.fail_threshold
            ),
        });
    }
    for entry in &drift.weights {
        if !entry.weight.is_finite() || entry.weight < 0.0 {
            warnings.push(ConfigWarning {
                code: "drift_weight_negative",
                message: format!(
                    "weight for prefix '{}' must be a finite value >= 0 (got {}); it will be treated as 0",
                    entry.prefix, entry.weight
                ),
            });
        }
    }

    let mut seen = BTreeSet::new();
    for document in &config.freshness.documents {
        if !seen.insert(document.id.as_str()) {
            warnings.push(ConfigWarning {
                code: "freshness_duplicate_document",
                message: format!("freshness document id '{}' is declared twice", document.id),
            });
        }
    }

    warnings
}

/// Normalizes a workspace-relative path to forward slashes without leading
/// `./` or trailing separators.
pub fn normalize_relative_path(raw: &str) -> String {
    let mut value = raw.trim().replace('\\', "/");
    while let Some(stripped) = value.strip_prefix("./") {
        value = stripped.to_owned();
    }
    while value.ends_with('/') {
        value.pop();
    }
    value
}

fn default_scope() -> Vec<String> {
    vec!["context".to_owned(), "specs".to_owned(), "docs".to_owned()]
}

fn default_remote_refs() -> Vec<String> {
    vec![
        "origin/HEAD".to_owned(),
        "origin/main".to_owned(),
        "origin/master".to_owned(),
    ]
}

fn default_weights() -> Vec<CriticalityWeight> {
    vec![
        CriticalityWeight {
            prefix: "docs/decisions".to_owned(),
            weight: 1.5,
        },
        CriticalityWeight {
            prefix: "specs".to_owned(),
            weight: 1.25,
        },
        CriticalityWeight {
            prefix: "context".to_owned(),
            weight: 1.0,
        },
    ]
}

fn watch_root(id: &str, path: &str, weight: u32) -> WatchRoot {
    WatchRoot {
        id: id.to_owned(),
        path: path.to_owned(),
        weight,
    }
}

fn default_documents() -> Vec<TrackedDocument> {
    vec![
        TrackedDocument {
            id: "current-goals".to_owned(),
            path: "context/current-goals.md".to_owned(),
            watch_roots: vec![
                watch_root("context", "context", 2),
                watch_root("specs", "specs", 2),
                watch_root("decisions", "docs/decisions", 3),
                watch_root("logs", "docs/logs", 1),
            ],
        },
        TrackedDocument {
            id: "constraints".to_owned(),
            path: "context/constraints.md".to_owned(),
            watch_roots: vec![
                watch_root("context", "context", 1),
                watch_root("specs", "specs", 2),
                watch_root("decisions", "docs/decisions", 2),
            ],
        },
        TrackedDocument {
            id: "decisions".to_owned(),
            path: "context/decisions.md".to_owned(),
            watch_roots: vec![watch_root("decisions", "docs/decisions", 3)],
        },
    ]
}

fn normalize_config(mut config: DriftwatchConfig) -> DriftwatchConfig {
    let drift = &mut config.drift;
    drift.scope = drift
        .scope
        .iter()
        .map(|value| normalize_relative_path(value))
        .filter(|value| !value.is_empty())
        .collect();
    drift.remote_default_refs = drift
        .remote_default_refs
        .iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect();
    drift.baseline_pin = normalize_relative_path(&drift.baseline_pin);
    if drift.baseline_pin.is_empty() {
        drift.baseline_pin = DEFAULT_BASELINE_PIN_PATH.to_owned();
    }
    drift.top_n = drift.top_n.filter(|value| *value > 0);
    drift.lookback_days = drift.lookback_days.max(1);
    for entry in &mut drift.weights {
        entry.prefix = normalize_relative_path(&entry.prefix);
    }

    let freshness = &mut config.freshness;
    freshness.sidecar = normalize_relative_path(&freshness.sidecar);
    if freshness.sidecar.is_empty() {
        freshness.sidecar = DEFAULT_SIDECAR_PATH.to_owned();
    }
    freshness.lookback_days = freshness.lookback_days.max(1);
    freshness.max_results_per_root = freshness.max_results_per_root.max(1);
    for document in &mut freshness.documents {
        document.id = document.id.trim().to_owned();
        document.path = normalize_relative_path(&document.path);
        if document.id.is_empty() {
            document.id = document.path.clone();
        }
        for root in &mut document.watch_roots {
            root.id = root.id.trim().to_owned();
            root.path = normalize_relative_path(&root.path);
            if root.id.is_empty() {
                root.id = root.path.clone();
            }
        }
    }

    config
}
