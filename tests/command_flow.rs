//! End-to-end command flows over the in-memory reference backend.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;

use percolar::commands::build_registry;
use percolar::config::Cli;
use percolar::engine::memory::{MemoryEngine, MemoryNet};
use percolar::engine::{ComputeMode, EngineBackend, ForwardOutput, SolveOutcome, Solver};
use percolar::output::Output;
use percolar::registry::CommandContext;
use percolar::signal::{SignalAction, SignalBridge};

fn context(args: &[&str], engine: MemoryEngine) -> CommandContext {
    let mut full = vec!["percolar"];
    full.extend_from_slice(args);
    let cli = Cli::try_parse_from(full).unwrap();
    CommandContext::new(cli, Output::from_flags(true, false), Box::new(engine))
}

fn write_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn training_completes_and_reports_through_the_probe() {
    let solver = write_file("max_iterations 12\n");
    let path = solver.path().to_str().unwrap().to_string();

    let engine = MemoryEngine::new();
    let probe = engine.probe();
    let mut ctx = context(&["train", "--solver", &path], engine);

    let registry = build_registry();
    assert_eq!(registry.dispatch("train", &mut ctx).unwrap(), 0);

    let probe = probe.lock().unwrap();
    assert_eq!(probe.final_iteration, Some(12));
    assert_eq!(probe.solve_outcomes, vec![SolveOutcome::Completed]);
    assert_eq!(probe.mode, ComputeMode::Cpu);
}

#[test]
fn unknown_commands_fall_back_to_the_listing() {
    let engine = MemoryEngine::new();
    let mut ctx = context(&["percolate"], engine);

    let registry = build_registry();
    assert_eq!(registry.dispatch("percolate", &mut ctx).unwrap(), 0);
    assert!(ctx.known_commands.contains(&"train".to_string()));
}

#[test]
fn detection_scoring_flows_from_canned_batches_to_summary() {
    let batch = ForwardOutput {
        loss: 0.25,
        channels: vec![vec![
            -1.0, 1.0, 1.0, 0.0, 0.0, // one ground truth for label 1
            0.0, 1.0, 0.9, 1.0, 0.0, // matched detection
        ]],
    };
    let net = MemoryNet::new()
        .with_output("detection_eval", 0.0)
        .with_batches(vec![batch]);
    let engine = MemoryEngine::new().with_net("net.cfg", net);
    let mut ctx = context(
        &[
            "test",
            "--model",
            "net.cfg",
            "--weights",
            "trained.bin",
            "--detection",
            "--iterations",
            "3",
        ],
        engine,
    );

    let registry = build_registry();
    assert_eq!(registry.dispatch("test", &mut ctx).unwrap(), 0);
}

#[test]
fn benchmark_counts_barriers_for_every_timed_region() {
    // The model comes from a real file so the loader path is exercised.
    let model = write_file("layer data\nlayer fc1\nlayer softmax\n");
    let model_path = model.path().to_str().unwrap().to_string();

    let engine = MemoryEngine::new();
    let probe = engine.probe();
    let mut ctx = context(
        &[
            "time",
            "--model",
            &model_path,
            "--iterations",
            "2",
            "--layer-timings",
        ],
        engine,
    );

    let registry = build_registry();
    assert_eq!(registry.dispatch("time", &mut ctx).unwrap(), 0);

    // Three layers per direction plus the sweep barrier, two directions,
    // two iterations.
    assert_eq!(probe.lock().unwrap().synchronize_calls, 2 * 2 * 4);
}

#[test]
fn snapshot_request_persists_the_exact_iteration_count() {
    let solver = write_file("max_iterations 100\n");
    let checkpoint = write_file("iteration 4\n");

    let engine = MemoryEngine::new();
    let probe = engine.probe();
    let description = engine.load_solver_description(solver.path()).unwrap();
    let mut solver_instance = engine.build_solver(&description).unwrap();
    solver_instance.restore(checkpoint.path()).unwrap();

    // SIGHUP maps to snapshot; the flag is already pending when the first
    // iteration boundary polls.
    let hup_flag = Arc::new(AtomicBool::new(true));
    let bridge = SignalBridge::with_flags(
        Arc::new(AtomicBool::new(false)),
        SignalAction::Stop,
        hup_flag,
        SignalAction::Snapshot,
    );
    solver_instance.set_cancellation_poll(bridge.into_poll());

    let outcome = solver_instance.solve().unwrap();
    assert_eq!(outcome, SolveOutcome::Cancelled);
    assert_eq!(solver_instance.iteration(), 4);
    assert_eq!(probe.lock().unwrap().snapshots, vec![4]);
}
