use std::cmp::Ordering;

use driftwatch_config::CriticalityWeight;
use driftwatch_core::path_within;
use serde::{Deserialize, Serialize};

use crate::classify::SemanticBucket;

pub const DEFAULT_CRITICALITY_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDriftScore {
    pub path: String,
    pub score: f64,
    pub magnitude: f64,
    pub semantic_bucket: SemanticBucket,
    pub criticality_weight: f64,
}

impl FileDriftScore {
    pub fn new(path: String, magnitude: f64, bucket: SemanticBucket, weight: f64) -> Self {
        Self {
            path,
            score: magnitude * weight,
            magnitude,
            semantic_bucket: bucket,
            criticality_weight: weight,
        }
    }
}

/// Path-prefix weight table. Lookup picks the longest matching prefix; among
/// equal prefixes the first declared entry wins.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalityTable {
    entries: Vec<(String, f64)>,
}

impl CriticalityTable {
    pub fn new(weights: &[CriticalityWeight]) -> Self {
        let mut entries = weights
            .iter()
            .map(|entry| {
                let weight = if entry.weight.is_finite() && entry.weight > 0.0 {
                    entry.weight
                } else {
                    0.0
                };
                (entry.prefix.clone(), weight)
            })
            .collect::<Vec<_>>();
        // Stable sort keeps declaration order within one prefix length.
        entries.sort_by(|left, right| right.0.len().cmp(&left.0.len()));
        Self { entries }
    }

    pub fn weight_for(&self, path: &str) -> f64 {
        self.entries
            .iter()
            .find(|(prefix, _)| path_within(path, prefix))
            .map(|(_, weight)| *weight)
            .unwrap_or(DEFAULT_CRITICALITY_WEIGHT)
    }
}

/// Sums scores in path order, so the float result does not depend on the
/// order files were collected in, then ranks files by descending score with
/// ties broken by path.
pub fn aggregate_scores(mut files: Vec<FileDriftScore>) -> (f64, Vec<FileDriftScore>) {
    files.sort_by(|left, right| left.path.cmp(&right.path));
    let aggregate = files.iter().map(|file| file.score).sum::<f64>();

    files.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.path.cmp(&right.path))
    });
    (aggregate, files)
}
