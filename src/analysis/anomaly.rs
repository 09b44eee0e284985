//! Anomaly detection
//!
//! Isolation forest over small numeric feature vectors extracted from
//! arbitrary JSON objects. A point is anomalous when its score falls
//! strictly below the `CONTAMINATION` quantile of the training scores.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// PARAMETERS
// ============================================================================

pub const N_TREES: usize = 100;
pub const MAX_SAMPLES: usize = 256;
pub const CONTAMINATION: f64 = 0.1;
pub const FEATURE_LEN: usize = 5;
pub const SEED: u64 = 42;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub const ANOMALY_REASON: &str = "Statistically aberrant behaviour detected";

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub data_point: Value,
    pub anomaly_score: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

// ============================================================================
// FEATURE EXTRACTION
// ============================================================================

/// Hour and weekday (Monday = 0) of an ISO-8601 timestamp, in its own offset
fn timestamp_features(value: &str) -> Option<[f64; 2]> {
    let naive = if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        dt.naive_local()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        dt
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        dt
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        dt
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0)?
    };
    Some([naive.hour() as f64, naive.weekday().num_days_from_monday() as f64])
}

/// Numeric fields in document order (booleans count as 0/1), plus hour and
/// weekday for a `timestamp` string. Padded with zeros or truncated to
/// `FEATURE_LEN`; `None` when nothing numeric was found.
pub fn extract_features(point: &Value) -> Option<Vec<f64>> {
    let object = point.as_object()?;
    let mut features = Vec::new();

    for (key, value) in object {
        match value {
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    features.push(f);
                }
            }
            Value::Bool(b) => features.push(if *b { 1.0 } else { 0.0 }),
            Value::String(s) if key == "timestamp" => {
                if let Some(ts) = timestamp_features(s) {
                    features.extend_from_slice(&ts);
                }
            }
            _ => {}
        }
    }

    if features.is_empty() {
        return None;
    }
    features.resize(FEATURE_LEN, 0.0);
    Some(features)
}

// ============================================================================
// ISOLATION FOREST
// ============================================================================

/// Average path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

enum Node {
    Leaf { size: usize },
    Split { feature: usize, threshold: f64, left: Box<Node>, right: Box<Node> },
}

impl Node {
    fn build(data: &[Vec<f64>], rows: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        // Only features that still vary inside this node can split it
        let n_features = data[rows[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][f]), hi.max(data[r][f]))
                });
                (max > min).then_some((f, min, max))
            })
            .collect();

        if candidates.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(min..max);

        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(data, left, depth + 1, max_depth, rng)),
            right: Box::new(Node::build(data, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, x: &[f64], depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split { feature, threshold, left, right } => {
                if x[*feature] <= *threshold {
                    left.path_length(x, depth + 1)
                } else {
                    right.path_length(x, depth + 1)
                }
            }
        }
    }
}

pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit on `data` (at least two rows of equal length)
    pub fn fit(data: &[Vec<f64>], n_trees: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = data.len().min(MAX_SAMPLES);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..n_trees)
            .map(|_| {
                let rows = rand::seq::index::sample(&mut rng, data.len(), sample_size).into_vec();
                Node::build(data, rows, 0, max_depth, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Opposite of the anomaly score: lower is more abnormal, in [-1, 0)
    pub fn score_sample(&self, x: &[f64]) -> f64 {
        let mean_depth = self.trees.iter().map(|t| t.path_length(x, 0)).sum::<f64>() / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size);
        -(2f64.powf(-mean_depth / normalizer))
    }
}

/// Linear-interpolated percentile (`q` in 0..=100)
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Flag the outliers among `points`.
///
/// Points without numeric features are ignored; fewer than two usable
/// points never yield an anomaly.
pub fn detect_anomalies(points: &[Value]) -> Vec<Anomaly> {
    let (indices, features): (Vec<usize>, Vec<Vec<f64>>) = points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| extract_features(p).map(|f| (i, f)))
        .unzip();

    if features.len() < 2 {
        return Vec::new();
    }

    let forest = IsolationForest::fit(&features, N_TREES, SEED);
    let scores: Vec<f64> = features.iter().map(|f| forest.score_sample(f)).collect();
    let threshold = percentile(&scores, CONTAMINATION * 100.0);

    let now = Utc::now();
    indices
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| *score < threshold)
        .map(|(i, score)| Anomaly {
            data_point: points[i].clone(),
            anomaly_score: score.abs(),
            timestamp: now,
            reason: ANOMALY_REASON.to_string(),
        })
        .collect()
}
