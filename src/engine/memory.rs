//! In-memory reference backend.
//!
//! Implements the engine traits without any real compute, the same way the
//! crate's storage-less collaborators are faked elsewhere in the ecosystem:
//! canned forward outputs, no-op layers, a solver that counts iterations.
//! The binary wires this backend by default; tests drive every command
//! through it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::engine::{
    CancellationPoll, CancellationRequest, ComputeMode, EngineBackend, ForwardOutput, Layer, Net,
    NetworkState, ParallelExecutor, SolveOutcome, Solver, SolverDescription, TunableLayer,
};
use crate::error::{Error, Result};

/// Observable record of everything the backend was asked to do.
///
/// Shared between the engine, its solvers and tests through `Arc<Mutex<_>>`
/// so state survives the solver being consumed by a command.
#[derive(Debug, Default)]
pub struct EngineProbe {
    pub registered_devices: Vec<u32>,
    pub current_device: Option<u32>,
    pub mode: ComputeMode,
    pub solver_count: usize,
    pub synchronize_calls: usize,
    pub restored_from: Option<PathBuf>,
    pub copied_weights: Vec<PathBuf>,
    pub snapshots: Vec<usize>,
    pub final_iteration: Option<usize>,
    pub solve_outcomes: Vec<SolveOutcome>,
    pub parallel_runs: Vec<(Vec<u32>, Option<PathBuf>)>,
    pub tuned_layers: Vec<String>,
}

pub type ProbeHandle = Arc<Mutex<EngineProbe>>;

// =============================================================================
// Layers and networks
// =============================================================================

#[derive(Debug, Clone)]
pub struct MemoryLayer {
    name: String,
    tunable: bool,
    pub forward_calls: usize,
    pub backward_calls: usize,
    probe: Option<ProbeHandle>,
}

impl MemoryLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tunable: false,
            forward_calls: 0,
            backward_calls: 0,
            probe: None,
        }
    }

    pub fn tunable(mut self) -> Self {
        self.tunable = true;
        self
    }
}

impl Layer for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self) -> Result<()> {
        self.forward_calls += 1;
        Ok(())
    }

    fn backward(&mut self) -> Result<()> {
        self.backward_calls += 1;
        Ok(())
    }

    fn as_tunable(&mut self) -> Option<&mut dyn TunableLayer> {
        if self.tunable {
            Some(self)
        } else {
            None
        }
    }
}

impl TunableLayer for MemoryLayer {
    fn tune(&mut self) -> Result<()> {
        if let Some(probe) = &self.probe {
            probe.lock().unwrap().tuned_layers.push(self.name.clone());
        }
        Ok(())
    }
}

/// A network with canned forward outputs.
///
/// Batches are served in order and cycled when the iteration count exceeds
/// the canned list; an empty list yields an output with no channels.
#[derive(Debug, Clone, Default)]
pub struct MemoryNet {
    layers: Vec<MemoryLayer>,
    output_names: Vec<String>,
    output_loss_weights: Vec<f32>,
    batches: Vec<ForwardOutput>,
    cursor: usize,
    pub forward_calls: usize,
    pub backward_calls: usize,
    probe: Option<ProbeHandle>,
}

impl MemoryNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: MemoryLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, loss_weight: f32) -> Self {
        self.output_names.push(name.into());
        self.output_loss_weights.push(loss_weight);
        self
    }

    pub fn with_batches(mut self, batches: Vec<ForwardOutput>) -> Self {
        self.batches = batches;
        self
    }

    fn attach_probe(&mut self, probe: ProbeHandle) {
        for layer in &mut self.layers {
            layer.probe = Some(probe.clone());
        }
        self.probe = Some(probe);
    }

    pub fn layers(&self) -> &[MemoryLayer] {
        &self.layers
    }
}

impl Net for MemoryNet {
    fn forward(&mut self) -> Result<ForwardOutput> {
        self.forward_calls += 1;
        if self.batches.is_empty() {
            return Ok(ForwardOutput::default());
        }
        let out = self.batches[self.cursor % self.batches.len()].clone();
        self.cursor += 1;
        Ok(out)
    }

    fn backward(&mut self) -> Result<()> {
        self.backward_calls += 1;
        Ok(())
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer(&self, index: usize) -> &dyn Layer {
        &self.layers[index]
    }

    fn layer_mut(&mut self, index: usize) -> &mut dyn Layer {
        &mut self.layers[index]
    }

    fn copy_trained_layers_from(&mut self, path: &Path) -> Result<()> {
        if let Some(probe) = &self.probe {
            probe.lock().unwrap().copied_weights.push(path.to_path_buf());
        }
        Ok(())
    }

    fn output_names(&self) -> Vec<String> {
        self.output_names.clone()
    }

    fn output_loss_weights(&self) -> Vec<f32> {
        self.output_loss_weights.clone()
    }
}

// =============================================================================
// Solver
// =============================================================================

pub struct MemorySolver {
    max_iterations: usize,
    iteration: usize,
    poll: Option<CancellationPoll>,
    net: MemoryNet,
    eval_nets: Vec<MemoryNet>,
    probe: ProbeHandle,
}

impl MemorySolver {
    fn new(description: &SolverDescription, net: MemoryNet, probe: ProbeHandle) -> Self {
        let mut eval_net = net.clone();
        eval_net.attach_probe(probe.clone());
        let mut net = net;
        net.attach_probe(probe.clone());
        Self {
            max_iterations: description.max_iterations,
            iteration: 0,
            poll: None,
            net,
            eval_nets: vec![eval_net],
            probe,
        }
    }
}

impl Solver for MemorySolver {
    fn solve(&mut self) -> Result<SolveOutcome> {
        let outcome = loop {
            if self.iteration >= self.max_iterations {
                break SolveOutcome::Completed;
            }
            let request = self
                .poll
                .as_ref()
                .map(|poll| poll())
                .unwrap_or(CancellationRequest::None);
            match request {
                CancellationRequest::Stop => break SolveOutcome::Cancelled,
                CancellationRequest::SnapshotAndStop => {
                    self.probe.lock().unwrap().snapshots.push(self.iteration);
                    break SolveOutcome::Cancelled;
                }
                CancellationRequest::None => {}
            }
            // One simulated optimization step.
            self.net.forward()?;
            self.net.backward()?;
            self.iteration += 1;
        };
        let mut probe = self.probe.lock().unwrap();
        probe.final_iteration = Some(self.iteration);
        probe.solve_outcomes.push(outcome);
        Ok(outcome)
    }

    fn restore(&mut self, checkpoint: &Path) -> Result<()> {
        let text = std::fs::read_to_string(checkpoint)?;
        for line in text.lines() {
            if let Some(value) = line.strip_prefix("iteration ") {
                self.iteration = value.trim().parse().map_err(|_| {
                    Error::DescriptionParse {
                        path: checkpoint.display().to_string(),
                        message: format!("invalid iteration count '{}'", value.trim()),
                    }
                })?;
            }
        }
        self.probe.lock().unwrap().restored_from = Some(checkpoint.to_path_buf());
        Ok(())
    }

    fn set_cancellation_poll(&mut self, poll: CancellationPoll) {
        self.poll = Some(poll);
    }

    fn iteration(&self) -> usize {
        self.iteration
    }

    fn net_mut(&mut self) -> &mut dyn Net {
        &mut self.net
    }

    fn eval_net_count(&self) -> usize {
        self.eval_nets.len()
    }

    fn eval_net_mut(&mut self, index: usize) -> &mut dyn Net {
        &mut self.eval_nets[index]
    }
}

// =============================================================================
// Parallel executor
// =============================================================================

/// Stand-in for the collective-communication collaborator: records the
/// fan-out request and runs the solver as a single replica.
pub struct MemoryParallel {
    probe: ProbeHandle,
}

impl ParallelExecutor for MemoryParallel {
    fn run(
        &self,
        mut solver: Box<dyn Solver>,
        devices: &[u32],
        resume: Option<&Path>,
    ) -> Result<SolveOutcome> {
        self.probe
            .lock()
            .unwrap()
            .parallel_runs
            .push((devices.to_vec(), resume.map(Path::to_path_buf)));
        solver.solve()
    }
}

// =============================================================================
// Backend
// =============================================================================

/// In-memory engine backend.
pub struct MemoryEngine {
    device_count: Option<usize>,
    nets: HashMap<PathBuf, MemoryNet>,
    parallel: Option<MemoryParallel>,
    probe: ProbeHandle,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// A backend without accelerator support, mirroring a CPU-only build.
    pub fn new() -> Self {
        Self {
            device_count: None,
            nets: HashMap::new(),
            parallel: None,
            probe: Arc::new(Mutex::new(EngineProbe::default())),
        }
    }

    /// Enable accelerator support with `count` enumerable devices.
    pub fn with_device_count(mut self, count: usize) -> Self {
        self.device_count = Some(count);
        self
    }

    /// Enable the multi-device execution capability.
    pub fn with_parallel_executor(mut self) -> Self {
        self.parallel = Some(MemoryParallel {
            probe: self.probe.clone(),
        });
        self
    }

    /// Register a canned network prototype for a model path.
    pub fn with_net(mut self, model: impl Into<PathBuf>, net: MemoryNet) -> Self {
        self.nets.insert(model.into(), net);
        self
    }

    pub fn probe(&self) -> ProbeHandle {
        self.probe.clone()
    }

    fn net_prototype(&self, model: &Path) -> Result<MemoryNet> {
        if let Some(net) = self.nets.get(model) {
            return Ok(net.clone());
        }
        let text = std::fs::read_to_string(model)?;
        Self::parse_net(model, &text)
    }

    /// Line-oriented model description: `layer <name>`, `tunable_layer
    /// <name>`, `output <name> [loss_weight]`. `#` starts a comment.
    fn parse_net(path: &Path, text: &str) -> Result<MemoryNet> {
        let mut net = MemoryNet::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let key = parts.next().unwrap_or_default();
            let rest: Vec<&str> = parts.collect();
            match (key, rest.as_slice()) {
                ("layer", [name]) => net = net.with_layer(MemoryLayer::new(*name)),
                ("tunable_layer", [name]) => {
                    net = net.with_layer(MemoryLayer::new(*name).tunable());
                }
                ("output", [name]) => net = net.with_output(*name, 0.0),
                ("output", [name, weight]) => {
                    let weight = weight.parse().map_err(|_| Error::DescriptionParse {
                        path: path.display().to_string(),
                        message: format!("invalid loss weight '{weight}'"),
                    })?;
                    net = net.with_output(*name, weight);
                }
                _ => {
                    return Err(Error::DescriptionParse {
                        path: path.display().to_string(),
                        message: format!("unrecognized line '{line}'"),
                    });
                }
            }
        }
        Ok(net)
    }
}

impl EngineBackend for MemoryEngine {
    fn enumerate_devices(&self) -> Result<usize> {
        self.device_count
            .ok_or_else(crate::engine::no_accelerator_support)
    }

    fn device_diagnostics(&self, device: u32) -> Result<String> {
        let count = self.enumerate_devices()?;
        if (device as usize) < count {
            Ok(format!("Device {device}: in-memory backend"))
        } else {
            Err(Error::Engine(format!("no such device: {device}")))
        }
    }

    fn register_devices(&mut self, devices: &[u32]) -> Result<()> {
        if self.device_count.is_none() {
            return Err(crate::engine::no_accelerator_support());
        }
        let mut probe = self.probe.lock().unwrap();
        probe.registered_devices.extend_from_slice(devices);
        Ok(())
    }

    fn set_current_device(&mut self, device: u32) -> Result<()> {
        if self.device_count.is_none() {
            return Err(crate::engine::no_accelerator_support());
        }
        self.probe.lock().unwrap().current_device = Some(device);
        Ok(())
    }

    fn set_mode(&mut self, mode: ComputeMode) {
        self.probe.lock().unwrap().mode = mode;
    }

    fn set_solver_count(&mut self, count: usize) {
        self.probe.lock().unwrap().solver_count = count;
    }

    fn synchronize(&self) -> Result<()> {
        self.probe.lock().unwrap().synchronize_calls += 1;
        Ok(())
    }

    /// Line-oriented solver description: `net <path>`, `max_iterations
    /// <n>`, `mode cpu|accelerator`, `device <id>`.
    fn load_solver_description(&self, path: &Path) -> Result<SolverDescription> {
        let text = std::fs::read_to_string(path)?;
        let parse_err = |message: String| Error::DescriptionParse {
            path: path.display().to_string(),
            message,
        };
        let mut description = SolverDescription::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| parse_err(format!("unrecognized line '{line}'")))?;
            let value = value.trim();
            match key {
                "net" => description.net = Some(PathBuf::from(value)),
                "max_iterations" => {
                    description.max_iterations = value
                        .parse()
                        .map_err(|_| parse_err(format!("invalid iteration count '{value}'")))?;
                }
                "mode" => {
                    description.solver_mode = Some(match value {
                        "cpu" => ComputeMode::Cpu,
                        "accelerator" => ComputeMode::Accelerator,
                        _ => return Err(parse_err(format!("unknown mode '{value}'"))),
                    });
                }
                "device" => {
                    description.device_id = Some(
                        value
                            .parse()
                            .map_err(|_| parse_err(format!("invalid device id '{value}'")))?,
                    );
                }
                _ => return Err(parse_err(format!("unknown key '{key}'"))),
            }
        }
        Ok(description)
    }

    fn build_net(&self, model: &Path, _state: &NetworkState) -> Result<Box<dyn Net>> {
        let mut net = self.net_prototype(model)?;
        net.attach_probe(self.probe.clone());
        Ok(Box::new(net))
    }

    fn build_solver(&self, description: &SolverDescription) -> Result<Box<dyn Solver>> {
        let net = match &description.net {
            Some(model) => self.net_prototype(model)?,
            None => MemoryNet::new(),
        };
        Ok(Box::new(MemorySolver::new(
            description,
            net,
            self.probe.clone(),
        )))
    }

    fn parallel_executor(&self) -> Option<&dyn ParallelExecutor> {
        self.parallel
            .as_ref()
            .map(|executor| executor as &dyn ParallelExecutor)
    }
}
