//! Accuracy evaluation against annotated cut lists
//!
//! Detection results are read from a JSON document keyed by scene file name:
//!
//! ```json
//! { "video01.mp4": { "pred_scenes": [44, 120], "elapsed": 1.25 } }
//! ```
//!
//! Ground truth comes from annotation files with one `index<TAB>frame` line
//! per cut, where `frame` is 1-based. Counts are pooled over all files before
//! computing recall, precision and F1.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::common::{Result, SceneDetectError};

/// Detection output for one scene file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFileResult {
    /// Predicted cut frames, 0-based
    pub pred_scenes: Vec<u64>,
    /// Wall-clock detection time in seconds
    pub elapsed: f64,
}

/// Parse a results document (`{ scene_file: SceneFileResult }`)
pub fn parse_results(json: &str) -> Result<BTreeMap<String, SceneFileResult>> {
    Ok(serde_json::from_str(json)?)
}

/// Read cut frames from an annotation file
///
/// Returns 0-based frame numbers in file order. Blank lines are skipped.
///
/// # Errors
/// * `InvalidAnnotation` - a line without a frame column, a frame that is not
///   a positive integer
pub fn parse_ground_truth(text: &str) -> Result<Vec<u64>> {
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut columns = line.split('\t');
        let _index = columns.next();
        let frame = columns.next().map(str::trim).ok_or_else(|| {
            SceneDetectError::InvalidAnnotation {
                line: line_number,
                reason: "expected '<index>\\t<frame>'".to_string(),
            }
        })?;
        let frame: u64 = frame
            .parse()
            .map_err(|_| SceneDetectError::InvalidAnnotation {
                line: line_number,
                reason: format!("'{}' is not a frame number", frame),
            })?;
        if frame == 0 {
            return Err(SceneDetectError::InvalidAnnotation {
                line: line_number,
                reason: "frame numbers are 1-based".to_string(),
            });
        }
        frames.push(frame - 1);
    }
    Ok(frames)
}

/// Accuracy of a set of predicted cuts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Evaluation {
    /// Predicted cuts that match a ground truth cut exactly
    pub correct: usize,
    pub predicted: usize,
    pub ground_truth: usize,
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
}

impl Evaluation {
    fn from_counts(correct: usize, predicted: usize, ground_truth: usize) -> Self {
        let recall = ratio(correct, ground_truth);
        let precision = ratio(correct, predicted);
        let f1 = if recall + precision > 0.0 {
            2.0 * recall * precision / (recall + precision)
        } else {
            0.0
        };
        Self {
            correct,
            predicted,
            ground_truth,
            recall,
            precision,
            f1,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Compare predicted cuts against ground truth, matching exact frames
pub fn evaluate(predicted: &[u64], ground_truth: &[u64]) -> Evaluation {
    let predicted: BTreeSet<u64> = predicted.iter().copied().collect();
    let ground_truth: BTreeSet<u64> = ground_truth.iter().copied().collect();
    let correct = predicted.intersection(&ground_truth).count();
    Evaluation::from_counts(correct, predicted.len(), ground_truth.len())
}

/// Evaluation over a whole dataset
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Summary {
    /// Pooled over every evaluated file
    pub overall: Evaluation,
    pub per_file: BTreeMap<String, Evaluation>,
    /// Mean detection time of the evaluated files, in seconds
    pub mean_elapsed: f64,
}

/// Evaluate every result that has a matching ground truth entry
///
/// Files without ground truth are skipped with a warning.
#[instrument(skip_all, fields(results = results.len(), ground_truths = ground_truths.len()))]
pub fn evaluate_all(
    results: &BTreeMap<String, SceneFileResult>,
    ground_truths: &BTreeMap<String, Vec<u64>>,
) -> Summary {
    let mut summary = Summary::default();
    let (mut correct, mut predicted, mut expected) = (0, 0, 0);
    let mut elapsed = 0.0;

    for (name, result) in results {
        let Some(ground_truth) = ground_truths.get(name) else {
            warn!("No ground truth for '{}', skipping", name);
            continue;
        };
        let evaluation = evaluate(&result.pred_scenes, ground_truth);
        debug!(
            "{}: recall={:.3} precision={:.3} f1={:.3}",
            name, evaluation.recall, evaluation.precision, evaluation.f1
        );
        correct += evaluation.correct;
        predicted += evaluation.predicted;
        expected += evaluation.ground_truth;
        elapsed += result.elapsed;
        summary.per_file.insert(name.clone(), evaluation);
    }

    summary.overall = Evaluation::from_counts(correct, predicted, expected);
    if !summary.per_file.is_empty() {
        summary.mean_elapsed = elapsed / summary.per_file.len() as f64;
    }
    summary
}
