pub mod baseline;
pub mod classify;
pub mod diff;
pub mod drift;
mod error;
pub mod freshness;
pub mod magnitude;
pub mod recency;
pub mod sidecar;
pub mod weight;

pub use baseline::{
    Baseline, BaselineProvenance, BaselineResolver, BaselineSource, lookback_baseline,
    pin_baseline, read_baseline_pin,
};
pub use classify::{Hunk, SemanticBucket, classify_file, classify_hunk, parse_hunks};
pub use diff::{CollectedChange, DiffCollection, DiffCollector, FileChangeRecord, SkippedFile};
pub use drift::{
    DriftAnalyzer, DriftReport, DriftReportRequest, ExplainRequest, FileExplanation,
    bucket_label, criticality_label, magnitude_label,
};
pub use error::AnalysisError;
pub use freshness::{
    BaselineState, FreshnessAnalyzer, FreshnessBaselineSource, FreshnessEvaluation,
    FreshnessReport, FreshnessRequest, LastUpdatedMarker, TouchOutcome, parse_last_updated,
    touch_last_updated,
};
pub use magnitude::{file_magnitude, line_magnitude};
pub use recency::{RecencyScanner, RecentFile};
pub use sidecar::{
    JsonSidecarStore, SIDECAR_VERSION, SidecarEntry, SidecarRecord, SidecarStore, SidecarUpdate,
    apply_reviews, update_from_index,
};
pub use weight::{CriticalityTable, DEFAULT_CRITICALITY_WEIGHT, FileDriftScore, aggregate_scores};
