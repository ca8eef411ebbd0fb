//! Plain score accumulation for classification-style evaluation.

use crate::engine::ForwardOutput;
use crate::error::{Error, Result};

/// One averaged output scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarScore {
    /// Output channel the scalar came from.
    pub channel: usize,
    pub mean: f32,
}

/// Accumulates loss and every output scalar across batches.
///
/// The first batch establishes the output layout; later batches add into
/// it elementwise. A layout change mid-run means the engine violated its
/// output contract.
#[derive(Debug, Default)]
pub struct ScoreAccumulator {
    batches: usize,
    loss: f32,
    scores: Vec<f32>,
    channel_of: Vec<usize>,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, output: &ForwardOutput) -> Result<()> {
        self.loss += output.loss;
        let mut index = 0;
        for (channel, values) in output.channels.iter().enumerate() {
            for &value in values {
                if self.batches == 0 {
                    self.scores.push(value);
                    self.channel_of.push(channel);
                } else {
                    if index >= self.scores.len() || self.channel_of[index] != channel {
                        return Err(Error::Consistency(
                            "output layout changed between batches".to_string(),
                        ));
                    }
                    self.scores[index] += value;
                }
                index += 1;
            }
        }
        if self.batches > 0 && index != self.scores.len() {
            return Err(Error::Consistency(
                "output layout changed between batches".to_string(),
            ));
        }
        self.batches += 1;
        Ok(())
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn mean_loss(&self) -> f32 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss / self.batches as f32
        }
    }

    /// Mean of every accumulated scalar, in first-batch order.
    pub fn results(&self) -> Vec<ScalarScore> {
        self.scores
            .iter()
            .zip(&self.channel_of)
            .map(|(&sum, &channel)| ScalarScore {
                channel,
                mean: if self.batches == 0 {
                    0.0
                } else {
                    sum / self.batches as f32
                },
            })
            .collect()
    }
}
