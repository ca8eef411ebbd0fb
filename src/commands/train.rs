//! Train or finetune a model.
//!
//! `Configured -> Running -> {Completed | Cancelled}`: load and amend the
//! solver description, resolve devices, wire signal-driven cancellation,
//! restore or finetune, then hand control to the solver (or the parallel
//! executor when more than one device is selected).

use std::path::PathBuf;

use crate::device;
use crate::engine::{SolveOutcome, Solver};
use crate::error::Error;
use crate::output::Output;
use crate::registry::{CommandContext, Status};
use crate::signal::SignalBridge;
use crate::Result;

pub fn run(ctx: &mut CommandContext) -> Result<Status> {
    let solver_path = ctx
        .cli
        .solver
        .clone()
        .ok_or_else(|| Error::Config("a solver description is required to train".to_string()))?;
    if ctx.cli.snapshot.is_some() && ctx.cli.weights.is_some() {
        return Err(Error::Config(
            "give a checkpoint to resume from or weights to finetune, but not both".to_string(),
        ));
    }

    let mut description = ctx.backend.load_solver_description(&solver_path)?;
    description.train_level = ctx.cli.level;
    description.train_stages = ctx.cli.stages();

    // An absent device flag defers to the description's accelerator
    // request.
    let spec = device::effective_spec(&ctx.cli.device, &description);
    let devices = device::resolve(&spec, ctx.backend.as_ref())?;
    if devices.is_empty() {
        ctx.out.info("Using CPU");
    } else {
        ctx.out.info(&format!("Using devices {}", devices.display()));
        description.device_id = devices.first();
    }
    device::apply(&devices, ctx.backend.as_mut(), true)?;

    let bridge = SignalBridge::install(ctx.cli.sigint_action, ctx.cli.sighup_action)?;
    let mut solver = ctx.backend.build_solver(&description)?;
    solver.set_cancellation_poll(bridge.into_poll());

    if let Some(checkpoint) = &ctx.cli.snapshot {
        ctx.out
            .info(&format!("Resuming from {}", checkpoint.display()));
        solver.restore(checkpoint)?;
    } else if ctx.cli.weights.is_some() {
        copy_trained_layers(solver.as_mut(), &ctx.cli.weight_paths(), &ctx.out)?;
    }

    ctx.out.info("Starting optimization");
    let outcome = if devices.len() > 1 {
        let executor = ctx.backend.parallel_executor().ok_or_else(|| {
            Error::Config(
                "multi-device training requires the parallel execution backend, which this \
                 build does not provide"
                    .to_string(),
            )
        })?;
        executor.run(solver, devices.ids(), ctx.cli.snapshot.as_deref())?
    } else {
        solver.solve()?
    };

    match outcome {
        SolveOutcome::Completed => ctx.out.info("Optimization done"),
        SolveOutcome::Cancelled => ctx.out.info("Optimization cancelled"),
    }
    Ok(0)
}

/// Copy trainable parameters from each weight file, in order, onto the
/// training net and every evaluation net. Later files win on collision.
fn copy_trained_layers(
    solver: &mut dyn Solver,
    weights: &[PathBuf],
    out: &Output,
) -> Result<()> {
    for path in weights {
        out.info(&format!("Finetuning from {}", path.display()));
        solver.net_mut().copy_trained_layers_from(path)?;
        for index in 0..solver.eval_net_count() {
            solver.eval_net_mut(index).copy_trained_layers_from(path)?;
        }
    }
    Ok(())
}
