//! Benchmark model execution time.

use crate::bench::{self, BenchmarkConfig, BenchmarkReport};
use crate::device;
use crate::engine::{NetworkState, Phase};
use crate::error::Error;
use crate::output::{Output, OutputFormat};
use crate::registry::{CommandContext, Status};
use crate::Result;

pub fn run(ctx: &mut CommandContext) -> Result<Status> {
    let model = ctx
        .cli
        .model
        .clone()
        .ok_or_else(|| Error::Config("a model definition is required to benchmark".to_string()))?;
    let phase = ctx.cli.phase.unwrap_or(Phase::Train);

    let devices = device::resolve(&ctx.cli.device, ctx.backend.as_ref())?;
    match devices.first() {
        Some(first) => ctx.out.info(&format!("Using device {first}")),
        None => ctx.out.info("Using CPU"),
    }
    device::apply(&devices, ctx.backend.as_mut(), false)?;

    let state = NetworkState::new(phase)
        .with_level(ctx.cli.level)
        .with_stages(ctx.cli.stages());
    let mut net = ctx.backend.build_net(&model, &state)?;

    let config = BenchmarkConfig {
        iterations: ctx.cli.iterations,
        train_phase: phase == Phase::Train,
        per_layer: ctx.cli.layer_timings,
    };
    let report = bench::run(net.as_mut(), ctx.backend.as_ref(), &config, &ctx.out)?;

    match ctx.cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| Error::Consistency(e.to_string()))?
        ),
        OutputFormat::Table => print_report(&report, &ctx.out),
    }
    Ok(0)
}

fn print_report(report: &BenchmarkReport, out: &Output) {
    if !report.per_layer.is_empty() {
        out.info("Average time per layer:");
        for layer in &report.per_layer {
            out.info(&format!(
                "  {:>12}  forward: {:.3} ms  backward: {:.3} ms",
                layer.layer, layer.forward_ms, layer.backward_ms
            ));
        }
    }
    out.info(&format!(
        "Average forward pass: {:.3} ms",
        report.average_forward_ms
    ));
    out.info(&format!(
        "Average backward pass: {:.3} ms",
        report.average_backward_ms
    ));
    out.info(&format!(
        "Average forward-backward: {:.3} ms",
        report.average_iteration_ms
    ));
    out.info(&format!("Total time: {:.3} ms", report.total_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use crate::engine::memory::{MemoryEngine, MemoryLayer, MemoryNet, ProbeHandle};
    use clap::Parser;

    fn context_with(args: &[&str], engine: MemoryEngine) -> (CommandContext, ProbeHandle) {
        let mut full = vec!["percolar", "time"];
        full.extend_from_slice(args);
        let cli = Cli::try_parse_from(full).unwrap();
        let probe = engine.probe();
        let ctx = CommandContext::new(cli, Output::from_flags(true, false), Box::new(engine));
        (ctx, probe)
    }

    fn engine_with_net() -> MemoryEngine {
        let net = MemoryNet::new()
            .with_layer(MemoryLayer::new("data"))
            .with_layer(MemoryLayer::new("fc1"));
        MemoryEngine::new().with_net("net.cfg", net)
    }

    #[test]
    fn test_requires_a_model() {
        let (mut ctx, _) = context_with(&[], MemoryEngine::new());
        assert!(matches!(run(&mut ctx), Err(Error::Config(_))));
    }

    #[test]
    fn test_default_phase_times_forward_and_backward() {
        let (mut ctx, probe) =
            context_with(&["--model", "net.cfg", "--iterations", "3"], engine_with_net());
        assert_eq!(run(&mut ctx).unwrap(), 0);
        // One sweep barrier per direction per iteration.
        assert_eq!(probe.lock().unwrap().synchronize_calls, 6);
    }

    #[test]
    fn test_test_phase_skips_backward_sweeps() {
        let (mut ctx, probe) = context_with(
            &["--model", "net.cfg", "--iterations", "3", "--phase", "TEST"],
            engine_with_net(),
        );
        run(&mut ctx).unwrap();
        assert_eq!(probe.lock().unwrap().synchronize_calls, 3);
    }

    #[test]
    fn test_layer_timings_add_per_layer_barriers() {
        let (mut ctx, probe) = context_with(
            &[
                "--model",
                "net.cfg",
                "--iterations",
                "2",
                "--phase",
                "TEST",
                "--layer-timings",
            ],
            engine_with_net(),
        );
        run(&mut ctx).unwrap();
        // Two layers plus the sweep barrier, per iteration.
        assert_eq!(probe.lock().unwrap().synchronize_calls, 2 * 3);
    }
}
