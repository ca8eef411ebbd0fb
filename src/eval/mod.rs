//! Evaluation accumulators fed by streaming forward-pass output.
//!
//! Two flavors: [`score::ScoreAccumulator`] averages plain scalar outputs
//! across batches; [`detection::DetectionAccumulator`] aggregates
//! structured detection rows into per-label precision/recall curves and
//! mean Average Precision.

pub mod detection;
pub mod score;

pub use detection::{average_precision, ApMethod, ChannelEvaluation, DetectionAccumulator};
pub use score::ScoreAccumulator;
