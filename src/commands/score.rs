//! Score a model (registered as `test`).
//!
//! Repeatedly runs the evaluation forward pass and feeds each batch into
//! plain score accumulation or, with `--detection`, the detection mAP
//! evaluator.

use crate::device;
use crate::engine::{Net, NetworkState, Phase};
use crate::error::Error;
use crate::eval::{ChannelEvaluation, DetectionAccumulator, ScoreAccumulator};
use crate::output::{Output, OutputFormat};
use crate::registry::{CommandContext, Status};
use crate::Result;

pub fn run(ctx: &mut CommandContext) -> Result<Status> {
    let model = ctx
        .cli
        .model
        .clone()
        .ok_or_else(|| Error::Config("a model definition is required to score".to_string()))?;
    if ctx.cli.weights.is_none() {
        return Err(Error::Config(
            "model weights are required to score".to_string(),
        ));
    }

    let devices = device::resolve(&ctx.cli.device, ctx.backend.as_ref())?;
    match devices.first() {
        Some(first) => ctx.out.info(&format!("Using device {first}")),
        None => ctx.out.info("Using CPU"),
    }
    device::apply(&devices, ctx.backend.as_mut(), false)?;

    let state = NetworkState::new(Phase::Test)
        .with_level(ctx.cli.level)
        .with_stages(ctx.cli.stages());
    let mut net = ctx.backend.build_net(&model, &state)?;
    for path in ctx.cli.weight_paths() {
        net.copy_trained_layers_from(&path)?;
    }

    ctx.out
        .info(&format!("Running for {} iterations", ctx.cli.iterations));
    if ctx.cli.detection {
        let evaluations = evaluate_detection(net.as_mut(), ctx)?;
        report_detection(net.as_ref(), &evaluations, ctx.cli.format, &ctx.out)?;
    } else {
        evaluate_scores(net.as_mut(), ctx)?;
    }
    Ok(0)
}

fn evaluate_detection(
    net: &mut dyn Net,
    ctx: &CommandContext,
) -> Result<Vec<ChannelEvaluation>> {
    let mut accumulator = DetectionAccumulator::new();
    for _ in 0..ctx.cli.iterations {
        let output = net.forward()?;
        accumulator.ingest(&output)?;
    }
    accumulator.summarize(ctx.cli.ap, &ctx.out)
}

fn report_detection(
    net: &dyn Net,
    evaluations: &[ChannelEvaluation],
    format: OutputFormat,
    out: &Output,
) -> Result<()> {
    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(evaluations)
                .map_err(|e| Error::Consistency(e.to_string()))?
        );
        return Ok(());
    }
    let names = net.output_names();
    for evaluation in evaluations {
        out.info(&format!(
            "Output #{}: {} = {:.6}",
            evaluation.channel,
            channel_name(&names, evaluation.channel),
            evaluation.mean_average_precision
        ));
    }
    Ok(())
}

fn evaluate_scores(net: &mut dyn Net, ctx: &CommandContext) -> Result<()> {
    let names = net.output_names();
    let loss_weights = net.output_loss_weights();
    let mut accumulator = ScoreAccumulator::new();
    for batch in 0..ctx.cli.iterations {
        let output = net.forward()?;
        for (channel, values) in output.channels.iter().enumerate() {
            for &value in values {
                ctx.out.verbose(&format!(
                    "Batch {batch}, {} = {value}",
                    channel_name(&names, channel)
                ));
            }
        }
        accumulator.ingest(&output)?;
    }

    ctx.out
        .info(&format!("Loss: {:.6}", accumulator.mean_loss()));
    for score in accumulator.results() {
        let name = channel_name(&names, score.channel);
        let loss_weight = loss_weights.get(score.channel).copied().unwrap_or(0.0);
        if loss_weight != 0.0 {
            ctx.out.info(&format!(
                "{name} = {:.6} (* {loss_weight} = {:.6} loss)",
                score.mean,
                loss_weight * score.mean
            ));
        } else {
            ctx.out.info(&format!("{name} = {:.6}", score.mean));
        }
    }
    Ok(())
}

fn channel_name(names: &[String], channel: usize) -> String {
    names
        .get(channel)
        .cloned()
        .unwrap_or_else(|| format!("output_{channel}"))
}
