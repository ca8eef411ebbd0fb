//! Command-line surface.
//!
//! One positional action name plus flat flags. The action name is a plain
//! string dispatched through [`crate::registry::CommandRegistry`], not a
//! clap subcommand, so that unknown names fall through to the listing
//! handler instead of a parser error.
//!
//! # Usage
//!
//! ```bash
//! percolar train --solver solver.cfg
//! percolar train --solver solver.cfg --device 0,1 --sighup-action snapshot
//! percolar test --model net.cfg --weights trained.bin --detection --ap integral
//! percolar time --model net.cfg --iterations 10 --layer-timings
//! percolar device_query --device all
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::engine::Phase;
use crate::eval::ApMethod;
use crate::output::OutputFormat;
use crate::signal::SignalAction;

/// percolar: drive a model-execution engine through training, scoring and
/// benchmarking.
#[derive(Parser, Debug, Clone)]
#[command(name = "percolar")]
#[command(version)]
#[command(about = "Command-driven harness for a layered model-execution engine")]
pub struct Cli {
    /// Action to run: train, test, device_query, time, autotune or actions
    #[arg(value_name = "ACTION")]
    pub command: Option<String>,

    /// Accelerator device ids separated by ',', or 'all' for every
    /// enumerable device. Empty means CPU. The effective training batch
    /// size is multiplied by the number of devices.
    #[arg(long, default_value = "", value_name = "IDS")]
    pub device: String,

    /// Solver description file
    #[arg(long, value_name = "FILE")]
    pub solver: Option<PathBuf>,

    /// Model description file
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Checkpoint to resume training from. Cannot be combined with
    /// --weights.
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Pretrained weight files to initialize finetuning, separated by ','.
    /// Later files override earlier ones on name collision.
    #[arg(long, value_name = "FILES")]
    pub weights: Option<String>,

    /// Number of batches or benchmark rounds to run
    #[arg(long, default_value_t = 50)]
    pub iterations: usize,

    /// Network phase override (TRAIN or TEST). Only used by 'time'.
    #[arg(long)]
    pub phase: Option<Phase>,

    /// Network level selector
    #[arg(long, default_value_t = 0)]
    pub level: i32,

    /// Network stages, separated by ','
    #[arg(long, default_value = "")]
    pub stage: String,

    /// Record per-layer timings during 'time'
    #[arg(long)]
    pub layer_timings: bool,

    /// Score with the detection mAP evaluator instead of plain
    /// accumulation
    #[arg(long)]
    pub detection: bool,

    /// AP integration method: 11point, max-integral or integral
    #[arg(long, default_value = "11point")]
    pub ap: ApMethod,

    /// Action taken when SIGINT is received: stop, snapshot or none
    #[arg(long, default_value = "stop")]
    pub sigint_action: SignalAction,

    /// Action taken when SIGHUP is received: stop, snapshot or none
    #[arg(long, default_value = "snapshot")]
    pub sighup_action: SignalAction,

    /// Report format: table or json
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Stage selectors from the comma-separated flag, empties dropped.
    pub fn stages(&self) -> Vec<String> {
        self.stage
            .split(',')
            .filter(|stage| !stage.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Weight files in the order supplied.
    pub fn weight_paths(&self) -> Vec<PathBuf> {
        self.weights
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        Self::try_parse_from(["percolar"]).expect("default flags parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["percolar", "train"]).unwrap();
        assert_eq!(cli.command.as_deref(), Some("train"));
        assert_eq!(cli.device, "");
        assert_eq!(cli.iterations, 50);
        assert_eq!(cli.level, 0);
        assert_eq!(cli.ap, ApMethod::ElevenPoint);
        assert_eq!(cli.sigint_action, SignalAction::Stop);
        assert_eq!(cli.sighup_action, SignalAction::Snapshot);
        assert!(!cli.detection);
        assert!(!cli.layer_timings);
    }

    #[test]
    fn test_typed_flags_parse() {
        let cli = Cli::try_parse_from([
            "percolar",
            "test",
            "--device",
            "0,2",
            "--ap",
            "max-integral",
            "--phase",
            "TEST",
            "--sigint-action",
            "none",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.ap, ApMethod::MaxIntegral);
        assert_eq!(cli.phase, Some(Phase::Test));
        assert_eq!(cli.sigint_action, SignalAction::None);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_unknown_enum_values_abort_parsing() {
        assert!(Cli::try_parse_from(["percolar", "train", "--ap", "voc"]).is_err());
        assert!(Cli::try_parse_from(["percolar", "train", "--phase", "EVAL"]).is_err());
        assert!(Cli::try_parse_from(["percolar", "train", "--sigint-action", "quit"]).is_err());
    }

    #[test]
    fn test_stage_and_weight_splitting() {
        let cli = Cli::try_parse_from([
            "percolar",
            "train",
            "--stage",
            "deploy,quantized",
            "--weights",
            "a.bin,b.bin",
        ])
        .unwrap();
        assert_eq!(cli.stages(), vec!["deploy", "quantized"]);
        assert_eq!(
            cli.weight_paths(),
            vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")]
        );

        let cli = Cli::try_parse_from(["percolar", "train"]).unwrap();
        assert!(cli.stages().is_empty());
        assert!(cli.weight_paths().is_empty());
    }
}
