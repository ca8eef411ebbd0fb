//! Collaborator interfaces for the model-execution engine.
//!
//! percolar itself performs no numeric computation. Everything numeric
//! (layer math, parameter updates, checkpoint serialization, device
//! plumbing) lives behind the traits in this module:
//!
//! - [`EngineBackend`]: device enumeration/selection/synchronization plus
//!   construction of networks and solvers
//! - [`Net`] / [`Layer`]: forward/backward evaluation and parameter loading
//! - [`Solver`]: the optimization loop, checkpoint restore and the
//!   cooperative cancellation poll
//! - [`ParallelExecutor`]: optional multi-device fan-out capability
//!
//! The [`memory`] submodule provides an in-memory reference backend used by
//! the binary and by tests; real deployments implement these traits on top
//! of an actual compute engine.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

pub mod memory;

// =============================================================================
// Shared engine types
// =============================================================================

/// Where computation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeMode {
    #[default]
    Cpu,
    Accelerator,
}

/// Network phase. Only the `time` command accepts an override; everything
/// else fixes the phase itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Test,
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TRAIN" => Ok(Phase::Train),
            "TEST" => Ok(Phase::Test),
            _ => Err(format!("phase must be \"TRAIN\" or \"TEST\", got \"{s}\"")),
        }
    }
}

/// State a network is instantiated against: phase plus the level and stage
/// selectors forwarded from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkState {
    pub phase: Phase,
    pub level: i32,
    pub stages: Vec<String>,
}

impl NetworkState {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            level: 0,
            stages: Vec::new(),
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Structured solver parameters produced by the engine's description loader.
///
/// The description text format belongs to the engine; this is the parsed
/// view the harness consults and amends before constructing a solver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverDescription {
    /// Path of the network description the solver trains.
    pub net: Option<PathBuf>,
    /// Compute mode the description asks for, if any.
    pub solver_mode: Option<ComputeMode>,
    /// Device the description asks for, if any.
    pub device_id: Option<u32>,
    /// Iteration budget.
    pub max_iterations: usize,
    /// Level selector applied to the train network.
    pub train_level: i32,
    /// Stage selectors applied to the train network.
    pub train_stages: Vec<String>,
}

/// One forward pass worth of engine output.
#[derive(Debug, Clone, Default)]
pub struct ForwardOutput {
    /// Scalar loss for the batch.
    pub loss: f32,
    /// Flattened values of every output channel, in channel order.
    pub channels: Vec<Vec<f32>>,
}

/// Cancellation request polled by the solver between optimization steps.
///
/// Signal handlers never act on this directly; they set flags that
/// [`crate::signal::SignalBridge::check`] translates at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationRequest {
    /// Keep going.
    #[default]
    None,
    /// Halt at the next iteration boundary without persisting.
    Stop,
    /// Persist a checkpoint at the next iteration boundary, then halt.
    SnapshotAndStop,
}

/// Poll function the solver calls at each iteration boundary.
pub type CancellationPoll = Box<dyn Fn() -> CancellationRequest + Send>;

/// How a solve run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// Iteration budget exhausted.
    Completed,
    /// A stop or snapshot-and-stop request was observed.
    Cancelled,
}

// =============================================================================
// Layer and network traits
// =============================================================================

/// Optional capability for layers that support parameter autotuning.
///
/// Layers opt in through [`Layer::as_tunable`]; nothing downcasts.
pub trait TunableLayer {
    /// Tune the layer against its bound buffers and batch size.
    fn tune(&mut self) -> Result<()>;
}

/// One layer of a constructed network.
///
/// `forward` and `backward` reuse the buffers bound at construction time,
/// which is what makes repeated timed sweeps meaningful.
pub trait Layer {
    fn name(&self) -> &str;

    /// Evaluate the layer against its bound inputs and outputs.
    fn forward(&mut self) -> Result<()>;

    /// Propagate gradients through the layer.
    fn backward(&mut self) -> Result<()>;

    /// Tunable-layer capability hook. Layers that support autotuning
    /// return themselves; the default opts out.
    fn as_tunable(&mut self) -> Option<&mut dyn TunableLayer> {
        None
    }
}

/// A constructed network.
pub trait Net {
    /// Run a full forward pass and return loss plus output channels.
    fn forward(&mut self) -> Result<ForwardOutput>;

    /// Run a full backward pass.
    fn backward(&mut self) -> Result<()>;

    fn layer_count(&self) -> usize;

    fn layer(&self, index: usize) -> &dyn Layer;

    fn layer_mut(&mut self, index: usize) -> &mut dyn Layer;

    /// Copy matching trainable parameters from a serialized weight file.
    /// Parameters present in the file override current values.
    fn copy_trained_layers_from(&mut self, path: &Path) -> Result<()>;

    /// Names of the output channels, in channel order.
    fn output_names(&self) -> Vec<String>;

    /// Loss weight of each output channel, in channel order.
    fn output_loss_weights(&self) -> Vec<f32>;
}

// =============================================================================
// Solver trait
// =============================================================================

/// The engine's optimization loop.
pub trait Solver {
    /// Run until the iteration budget is exhausted or cancellation is
    /// requested. Always returns gracefully; no partial output.
    fn solve(&mut self) -> Result<SolveOutcome>;

    /// Restore full solver state (iteration count, parameters, optimizer
    /// state) from a checkpoint.
    fn restore(&mut self, checkpoint: &Path) -> Result<()>;

    /// Attach the cancellation poll invoked at iteration boundaries.
    fn set_cancellation_poll(&mut self, poll: CancellationPoll);

    /// Completed iteration count.
    fn iteration(&self) -> usize;

    /// The training network.
    fn net_mut(&mut self) -> &mut dyn Net;

    /// Number of evaluation networks maintained alongside the training net.
    fn eval_net_count(&self) -> usize;

    fn eval_net_mut(&mut self, index: usize) -> &mut dyn Net;
}

// =============================================================================
// Backend trait
// =============================================================================

/// Multi-device fan-out capability. Consumes the solver and runs replicas
/// across the given devices to completion.
pub trait ParallelExecutor {
    fn run(
        &self,
        solver: Box<dyn Solver>,
        devices: &[u32],
        resume: Option<&Path>,
    ) -> Result<SolveOutcome>;
}

/// The engine's device and construction surface.
pub trait EngineBackend {
    /// Number of enumerable accelerator devices. `Err` when the engine was
    /// built without accelerator support.
    fn enumerate_devices(&self) -> Result<usize>;

    /// Human-readable diagnostics for one device.
    fn device_diagnostics(&self, device: u32) -> Result<String>;

    /// Register every device that will participate in this invocation.
    /// Must be called before any of them is made current.
    fn register_devices(&mut self, devices: &[u32]) -> Result<()>;

    /// Make one registered device current.
    fn set_current_device(&mut self, device: u32) -> Result<()>;

    fn set_mode(&mut self, mode: ComputeMode);

    /// Tell the engine how many solver replicas will run, so it can scale
    /// batch-size-aware optimization downstream.
    fn set_solver_count(&mut self, count: usize);

    /// Barrier on the current compute device. No-op in CPU mode. Required
    /// before any timing measurement is read.
    fn synchronize(&self) -> Result<()>;

    /// Parse a solver description file. Fatal on malformed input.
    fn load_solver_description(&self, path: &Path) -> Result<SolverDescription>;

    /// Construct a network from a model description and state.
    fn build_net(&self, model: &Path, state: &NetworkState) -> Result<Box<dyn Net>>;

    /// Construct a solver from parsed parameters.
    fn build_solver(&self, description: &SolverDescription) -> Result<Box<dyn Solver>>;

    /// Multi-device execution capability, when this build carries one.
    fn parallel_executor(&self) -> Option<&dyn ParallelExecutor>;
}

/// Shorthand used by handlers that require accelerator support.
pub fn no_accelerator_support() -> Error {
    Error::Config("this build has no accelerator support".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parsing() {
        assert_eq!("TRAIN".parse::<Phase>().unwrap(), Phase::Train);
        assert_eq!("TEST".parse::<Phase>().unwrap(), Phase::Test);
        assert!("train".parse::<Phase>().is_err());
        assert!("EVAL".parse::<Phase>().is_err());
    }

    #[test]
    fn test_network_state_builder() {
        let state = NetworkState::new(Phase::Test)
            .with_level(2)
            .with_stages(vec!["deploy".to_string()]);
        assert_eq!(state.phase, Phase::Test);
        assert_eq!(state.level, 2);
        assert_eq!(state.stages, vec!["deploy".to_string()]);
    }

    #[test]
    fn test_cancellation_request_default_is_none() {
        assert_eq!(CancellationRequest::default(), CancellationRequest::None);
    }
}
