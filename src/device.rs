//! Device resolution: mapping a user specification onto compute backends.
//!
//! A specification is either empty (CPU), the sentinel `all`, or a
//! comma-separated list of device identifiers. Resolution builds a
//! [`DeviceSet`]; [`apply`] then registers the set with the engine and
//! selects the compute mode.

use crate::engine::{ComputeMode, EngineBackend, SolverDescription};
use crate::error::{Error, Result};

/// Ordered accelerator identifiers selected for one invocation.
///
/// Order is the user's input order; duplicates are kept. Empty means CPU
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSet(Vec<u32>);

impl DeviceSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    pub fn first(&self) -> Option<u32> {
        self.0.first().copied()
    }

    /// Render as the comma list the user would have typed.
    pub fn display(&self) -> String {
        self.0
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Resolve a device specification against the engine.
///
/// `all` expands to every enumerable device and is the only form that
/// queries enumeration; a backend without accelerator support makes it a
/// fatal misconfiguration. An explicit list is parsed but never validated
/// against enumeration, so single-device requests touch exactly that
/// device.
pub fn resolve(spec: &str, backend: &dyn EngineBackend) -> Result<DeviceSet> {
    if spec.is_empty() {
        return Ok(DeviceSet::default());
    }
    if spec == "all" {
        let count = backend.enumerate_devices()?;
        return Ok(DeviceSet((0..count as u32).collect()));
    }
    let mut ids = Vec::new();
    for token in spec.split(',') {
        let id = token.parse::<u32>().map_err(|_| Error::DeviceParse {
            token: token.to_string(),
        })?;
        ids.push(id);
    }
    Ok(DeviceSet(ids))
}

/// Register a resolved set with the engine and pick the compute mode.
///
/// All listed devices are registered before any is made current, then the
/// first listed device becomes current. `solver_parallelism` additionally
/// reports the participant count, which the engine uses for
/// batch-size-aware optimization downstream.
pub fn apply(
    set: &DeviceSet,
    backend: &mut dyn EngineBackend,
    solver_parallelism: bool,
) -> Result<()> {
    if set.is_empty() {
        backend.set_mode(ComputeMode::Cpu);
        return Ok(());
    }
    backend.register_devices(set.ids())?;
    if let Some(first) = set.first() {
        backend.set_current_device(first)?;
    }
    backend.set_mode(ComputeMode::Accelerator);
    if solver_parallelism {
        backend.set_solver_count(set.len());
    }
    Ok(())
}

/// The effective specification for training: an absent device flag defers
/// to the solver description when it asks for an accelerator. Intent
/// expressed in configuration beats an absent flag.
pub fn effective_spec(flag: &str, description: &SolverDescription) -> String {
    if flag.is_empty() && description.solver_mode == Some(ComputeMode::Accelerator) {
        return description.device_id.unwrap_or(0).to_string();
    }
    flag.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;

    #[test]
    fn test_empty_spec_is_cpu() {
        let engine = MemoryEngine::new();
        let set = resolve("", &engine).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_explicit_list_keeps_order_and_duplicates() {
        let engine = MemoryEngine::new();
        let set = resolve("0,2,5", &engine).unwrap();
        assert_eq!(set.ids(), &[0, 2, 5]);

        let set = resolve("1,1,0", &engine).unwrap();
        assert_eq!(set.ids(), &[1, 1, 0]);
    }

    #[test]
    fn test_all_expands_to_every_device() {
        let engine = MemoryEngine::new().with_device_count(4);
        let set = resolve("all", &engine).unwrap();
        assert_eq!(set.ids(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_all_without_accelerator_support_is_fatal() {
        let engine = MemoryEngine::new();
        assert!(resolve("all", &engine).is_err());
    }

    #[test]
    fn test_non_numeric_token_is_rejected() {
        let engine = MemoryEngine::new();
        let err = resolve("0,two", &engine).unwrap_err();
        assert!(matches!(err, Error::DeviceParse { token } if token == "two"));
        assert!(resolve("-1", &engine).is_err());
    }

    #[test]
    fn test_apply_registers_then_selects_first() {
        let mut engine = MemoryEngine::new().with_device_count(8);
        let probe = engine.probe();
        let set = resolve("2,5", &engine).unwrap();
        apply(&set, &mut engine, true).unwrap();

        let probe = probe.lock().unwrap();
        assert_eq!(probe.registered_devices, vec![2, 5]);
        assert_eq!(probe.current_device, Some(2));
        assert_eq!(probe.mode, ComputeMode::Accelerator);
        assert_eq!(probe.solver_count, 2);
    }

    #[test]
    fn test_apply_without_parallelism_skips_solver_count() {
        let mut engine = MemoryEngine::new().with_device_count(8);
        let probe = engine.probe();
        let set = resolve("3", &engine).unwrap();
        apply(&set, &mut engine, false).unwrap();

        let probe = probe.lock().unwrap();
        assert_eq!(probe.current_device, Some(3));
        assert_eq!(probe.solver_count, 0);
    }

    #[test]
    fn test_apply_empty_selects_cpu() {
        let mut engine = MemoryEngine::new();
        let probe = engine.probe();
        apply(&DeviceSet::default(), &mut engine, true).unwrap();
        assert_eq!(probe.lock().unwrap().mode, ComputeMode::Cpu);
    }

    #[test]
    fn test_effective_spec_defers_to_description() {
        let description = SolverDescription {
            solver_mode: Some(ComputeMode::Accelerator),
            device_id: Some(2),
            ..Default::default()
        };
        assert_eq!(effective_spec("", &description), "2");

        let description = SolverDescription {
            solver_mode: Some(ComputeMode::Accelerator),
            device_id: None,
            ..Default::default()
        };
        assert_eq!(effective_spec("", &description), "0");

        // An explicit flag wins over the description.
        assert_eq!(effective_spec("1,3", &description), "1,3");

        // A CPU description leaves an absent flag alone.
        let description = SolverDescription::default();
        assert_eq!(effective_spec("", &description), "");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn resolve_preserves_input_order(ids in proptest::collection::vec(0u32..64, 1..8)) {
                let spec = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let engine = MemoryEngine::new();
                let set = resolve(&spec, &engine).unwrap();
                prop_assert_eq!(set.ids(), ids.as_slice());
            }

            #[test]
            fn resolve_rejects_non_numeric(token in "[a-zA-Z][a-zA-Z0-9]{0,6}") {
                prop_assume!(token != "all");
                let engine = MemoryEngine::new().with_device_count(4);
                prop_assert!(resolve(&token, &engine).is_err());
            }
        }
    }
}
