//! Detection evaluation: streaming accumulation and Average Precision.
//!
//! The engine reports detection results as flat rows of five values per
//! output channel: `(item_id, label, score_or_count, true_positive_flag,
//! false_positive_flag)`. Rows with `item_id == -1` carry the number of
//! ground-truth instances for a label in that batch; every other row is a
//! scored detection. The accumulator ingests batches in any order and is
//! read once at the end: per-label detections are ranked by descending
//! confidence, traced into a precision/recall curve and integrated under
//! the configured [`ApMethod`].

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::engine::ForwardOutput;
use crate::error::{Error, Result};
use crate::output::Output;

const RECALL_EPSILON: f32 = 1e-6;

/// How a precision/recall curve is integrated into Average Precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ApMethod {
    /// Sample the maximum precision at the eleven recall points 0.0..1.0.
    #[default]
    ElevenPoint,
    /// Integrate the curve after interpolating each precision to the
    /// maximum to its right.
    MaxIntegral,
    /// Integrate the raw curve.
    Integral,
}

impl FromStr for ApMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "11point" => Ok(Self::ElevenPoint),
            "max-integral" | "maxintegral" => Ok(Self::MaxIntegral),
            "integral" => Ok(Self::Integral),
            _ => Err(format!(
                "Unknown AP method '{s}'. Valid methods: 11point, max-integral, integral"
            )),
        }
    }
}

impl std::fmt::Display for ApMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ElevenPoint => write!(f, "11point"),
            Self::MaxIntegral => write!(f, "max-integral"),
            Self::Integral => write!(f, "integral"),
        }
    }
}

/// A label's precision/recall curve and its integral.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecisionRecall {
    pub precision: Vec<f32>,
    pub recall: Vec<f32>,
    pub average_precision: f32,
}

/// Final per-channel evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvaluation {
    pub channel: usize,
    /// Average Precision per label, for labels that produced scored
    /// detections.
    pub average_precision: BTreeMap<i32, f32>,
    /// Mean over every label with a known ground-truth count, counting
    /// labels without scored detections as zero.
    pub mean_average_precision: f32,
}

type LabelDetections = BTreeMap<i32, Vec<(f32, u32)>>;

/// Streaming accumulator for detection output.
///
/// Three tables keyed by output channel, then label: scored true-positive
/// pairs, scored false-positive pairs and ground-truth positive counts.
/// The tables only grow; [`DetectionAccumulator::summarize`] reads them
/// once after the last batch.
#[derive(Debug, Default)]
pub struct DetectionAccumulator {
    true_pos: BTreeMap<usize, LabelDetections>,
    false_pos: BTreeMap<usize, LabelDetections>,
    num_pos: BTreeMap<usize, BTreeMap<i32, usize>>,
    channels: usize,
}

impl DetectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of output channels observed so far.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Fold one forward pass into the tables.
    pub fn ingest(&mut self, output: &ForwardOutput) -> Result<()> {
        self.channels = self.channels.max(output.channels.len());
        for (channel, values) in output.channels.iter().enumerate() {
            if values.len() % 5 != 0 {
                return Err(Error::Consistency(format!(
                    "detection output channel {channel} has {} values, expected rows of 5",
                    values.len()
                )));
            }
            for row in values.chunks_exact(5) {
                let item_id = row[0] as i32;
                let label = row[1] as i32;
                if item_id == -1 {
                    // Ground-truth count row; accumulates, never overwrites.
                    *self
                        .num_pos
                        .entry(channel)
                        .or_default()
                        .entry(label)
                        .or_insert(0) += row[2] as usize;
                    continue;
                }
                let score = row[2];
                let true_positive = row[3] as u32;
                let false_positive = row[4] as u32;
                if true_positive == 0 && false_positive == 0 {
                    // Matched against a region excluded from evaluation.
                    continue;
                }
                self.true_pos
                    .entry(channel)
                    .or_default()
                    .entry(label)
                    .or_default()
                    .push((score, true_positive));
                self.false_pos
                    .entry(channel)
                    .or_default()
                    .entry(label)
                    .or_default()
                    .push((score, false_positive));
            }
        }
        Ok(())
    }

    /// Compute per-label Average Precision and per-channel mean.
    ///
    /// Every observed channel must be present in all three tables; a
    /// missing channel means the engine violated its output contract.
    /// Labels with a ground-truth count but no scored detections are
    /// warned about, excluded from the numerator and kept in the divisor.
    pub fn summarize(&self, method: ApMethod, out: &Output) -> Result<Vec<ChannelEvaluation>> {
        let mut evaluations = Vec::with_capacity(self.channels);
        for channel in 0..self.channels {
            let true_pos = self.true_pos.get(&channel).ok_or_else(|| {
                Error::Consistency(format!(
                    "missing true-positive table for output channel {channel}"
                ))
            })?;
            let false_pos = self.false_pos.get(&channel).ok_or_else(|| {
                Error::Consistency(format!(
                    "missing false-positive table for output channel {channel}"
                ))
            })?;
            let num_pos = self.num_pos.get(&channel).ok_or_else(|| {
                Error::Consistency(format!(
                    "missing ground-truth count table for output channel {channel}"
                ))
            })?;

            let mut label_ap = BTreeMap::new();
            let mut ap_sum = 0.0f32;
            for (&label, &positives) in num_pos {
                let Some(label_true_pos) = true_pos.get(&label) else {
                    out.warn(&format!("No true positives recorded for label {label}"));
                    continue;
                };
                let Some(label_false_pos) = false_pos.get(&label) else {
                    out.warn(&format!("No false positives recorded for label {label}"));
                    continue;
                };
                let curve =
                    average_precision(label_true_pos, positives, label_false_pos, method)?;
                ap_sum += curve.average_precision;
                label_ap.insert(label, curve.average_precision);
            }
            // Divide by every label with a known ground-truth count, not
            // just the scored subset.
            let mean_average_precision = if num_pos.is_empty() {
                0.0
            } else {
                ap_sum / num_pos.len() as f32
            };
            evaluations.push(ChannelEvaluation {
                channel,
                average_precision: label_ap,
                mean_average_precision,
            });
        }
        Ok(evaluations)
    }
}

/// Integrate one label's detections into Average Precision.
///
/// Both pair lists carry `(confidence, flag)` in arrival order and must be
/// the same length; ranking by descending confidence happens here.
pub fn average_precision(
    true_pos: &[(f32, u32)],
    positives: usize,
    false_pos: &[(f32, u32)],
    method: ApMethod,
) -> Result<PrecisionRecall> {
    if true_pos.len() != false_pos.len() {
        return Err(Error::Consistency(format!(
            "true/false positive sequences differ in length: {} vs {}",
            true_pos.len(),
            false_pos.len()
        )));
    }
    let mut curve = PrecisionRecall::default();
    if true_pos.is_empty() || positives == 0 {
        return Ok(curve);
    }

    let true_cumulative = ranked_cumulative(true_pos);
    let false_cumulative = ranked_cumulative(false_pos);
    for (&tp, &fp) in true_cumulative.iter().zip(&false_cumulative) {
        let detections = tp + fp;
        curve
            .precision
            .push(if detections == 0 { 0.0 } else { tp as f32 / detections as f32 });
        curve.recall.push(tp as f32 / positives as f32);
    }

    curve.average_precision = match method {
        ApMethod::ElevenPoint => eleven_point(&curve.precision, &curve.recall),
        ApMethod::MaxIntegral => max_interpolated_integral(&curve.precision, &curve.recall),
        ApMethod::Integral => integral(&curve.precision, &curve.recall),
    };
    Ok(curve)
}

/// Cumulative flag sums after a stable descending sort on confidence.
fn ranked_cumulative(pairs: &[(f32, u32)]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..pairs.len()).collect();
    order.sort_by(|&a, &b| {
        pairs[b]
            .0
            .partial_cmp(&pairs[a].0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut total = 0;
    order
        .iter()
        .map(|&index| {
            total += pairs[index].1;
            total
        })
        .collect()
}

fn eleven_point(precision: &[f32], recall: &[f32]) -> f32 {
    let count = precision.len() as isize;
    let mut max_precision = [0.0f32; 11];
    let mut start = count - 1;
    for point in (0..=10usize).rev() {
        let threshold = point as f32 / 10.0;
        let mut index = start;
        while index >= 0 {
            let i = index as usize;
            if recall[i] < threshold {
                start = index;
                if point > 0 {
                    max_precision[point - 1] = max_precision[point];
                }
                break;
            }
            if max_precision[point] < precision[i] {
                max_precision[point] = precision[i];
            }
            index -= 1;
        }
    }
    max_precision.iter().sum::<f32>() / 11.0
}

fn max_interpolated_integral(precision: &[f32], recall: &[f32]) -> f32 {
    let count = precision.len();
    let mut current_recall = recall[count - 1];
    let mut current_precision = precision[count - 1];
    let mut ap = 0.0;
    for i in (0..count.saturating_sub(1)).rev() {
        current_precision = precision[i].max(current_precision);
        if (current_recall - recall[i]).abs() > RECALL_EPSILON {
            ap += current_precision * (current_recall - recall[i]).abs();
        }
        current_recall = recall[i];
    }
    ap + current_recall * current_precision
}

fn integral(precision: &[f32], recall: &[f32]) -> f32 {
    let mut previous_recall = 0.0;
    let mut ap = 0.0;
    for (&p, &r) in precision.iter().zip(recall) {
        if (r - previous_recall).abs() > RECALL_EPSILON {
            ap += p * (r - previous_recall).abs();
        }
        previous_recall = r;
    }
    ap
}
