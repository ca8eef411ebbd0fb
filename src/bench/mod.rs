//! Benchmarking of forward/backward execution with per-layer timing.
//!
//! The harness never measures an operation it has perturbed: one untimed
//! warmup pass forces lazy allocation, every timed region ends with a
//! device synchronization barrier, and per-layer brackets use the same
//! barrier discipline so asynchronous work attributed to one layer is not
//! double-counted against the next.

use std::time::Instant;

use serde::Serialize;

use crate::engine::{EngineBackend, Net};
use crate::error::Result;
use crate::output::Output;

/// Cumulative timings for one layer across all iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingRecord {
    pub forward_micros: u128,
    pub backward_micros: u128,
}

/// Per-layer timing records in execution order.
#[derive(Debug, Default)]
pub struct TimingTable {
    records: Vec<TimingRecord>,
}

impl TimingTable {
    pub fn new(layer_count: usize) -> Self {
        Self {
            records: vec![TimingRecord::default(); layer_count],
        }
    }

    pub fn add_forward(&mut self, layer: usize, micros: u128) {
        self.records[layer].forward_micros += micros;
    }

    pub fn add_backward(&mut self, layer: usize, micros: u128) {
        self.records[layer].backward_micros += micros;
    }

    pub fn record(&self, layer: usize) -> TimingRecord {
        self.records[layer]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean forward milliseconds for one layer over `iterations` rounds.
    pub fn average_forward_ms(&self, layer: usize, iterations: usize) -> f64 {
        average_ms(self.records[layer].forward_micros, iterations)
    }

    pub fn average_backward_ms(&self, layer: usize, iterations: usize) -> f64 {
        average_ms(self.records[layer].backward_micros, iterations)
    }
}

fn average_ms(micros: u128, iterations: usize) -> f64 {
    if iterations == 0 {
        0.0
    } else {
        micros as f64 / 1000.0 / iterations as f64
    }
}

/// What to benchmark and how.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkConfig {
    pub iterations: usize,
    /// Time the backward sweep as well.
    pub train_phase: bool,
    /// Bracket every individual layer invocation with its own timer.
    pub per_layer: bool,
}

/// Averaged timings for one layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerTimingReport {
    pub layer: String,
    pub forward_ms: f64,
    pub backward_ms: f64,
}

/// Final benchmark report.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub iterations: usize,
    /// Empty unless per-layer timing was enabled.
    pub per_layer: Vec<LayerTimingReport>,
    pub average_forward_ms: f64,
    pub average_backward_ms: f64,
    pub average_iteration_ms: f64,
    pub total_ms: f64,
}

/// Run the benchmark over an already constructed network.
pub fn run(
    net: &mut dyn Net,
    backend: &dyn EngineBackend,
    config: &BenchmarkConfig,
    out: &Output,
) -> Result<BenchmarkReport> {
    // Untimed warmup so lazy allocation never lands inside a timed region.
    out.info("Performing an untimed warmup forward pass");
    let warmup = net.forward()?;
    out.info(&format!("Initial loss: {}", warmup.loss));
    if config.train_phase {
        out.info("Performing an untimed warmup backward pass");
        net.backward()?;
    }

    let layer_count = net.layer_count();
    let mut table = TimingTable::new(layer_count);
    let mut forward_micros = 0u128;
    let mut backward_micros = 0u128;

    out.info(&format!("Benchmarking {} iterations", config.iterations));
    let total_timer = Instant::now();
    for round in 0..config.iterations {
        let iteration_timer = Instant::now();

        let forward_timer = Instant::now();
        for layer in 0..layer_count {
            if config.per_layer {
                let layer_timer = Instant::now();
                net.layer_mut(layer).forward()?;
                backend.synchronize()?;
                table.add_forward(layer, layer_timer.elapsed().as_micros());
            } else {
                net.layer_mut(layer).forward()?;
            }
        }
        backend.synchronize()?;
        forward_micros += forward_timer.elapsed().as_micros();

        if config.train_phase {
            let backward_timer = Instant::now();
            for layer in (0..layer_count).rev() {
                if config.per_layer {
                    let layer_timer = Instant::now();
                    net.layer_mut(layer).backward()?;
                    backend.synchronize()?;
                    table.add_backward(layer, layer_timer.elapsed().as_micros());
                } else {
                    net.layer_mut(layer).backward()?;
                }
            }
            backend.synchronize()?;
            backward_micros += backward_timer.elapsed().as_micros();
        }

        out.verbose(&format!(
            "Iteration {}: forward-backward time {:.3} ms",
            round + 1,
            iteration_timer.elapsed().as_micros() as f64 / 1000.0
        ));
    }
    let total_micros = total_timer.elapsed().as_micros();

    let per_layer = if config.per_layer {
        (0..layer_count)
            .map(|layer| LayerTimingReport {
                layer: net.layer(layer).name().to_string(),
                forward_ms: table.average_forward_ms(layer, config.iterations),
                backward_ms: table.average_backward_ms(layer, config.iterations),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(BenchmarkReport {
        iterations: config.iterations,
        per_layer,
        average_forward_ms: average_ms(forward_micros, config.iterations),
        average_backward_ms: average_ms(backward_micros, config.iterations),
        average_iteration_ms: average_ms(total_micros, config.iterations),
        total_ms: total_micros as f64 / 1000.0,
    })
}
