//! Console output with verbosity tiers and terminal styling.
//!
//! All user-facing reporting goes through [`Output`] so that `--quiet` and
//! `--verbose` behave the same across every command.

use std::str::FromStr;

/// How much a command is allowed to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Progress and results.
    Normal,
    /// Everything, including per-batch detail.
    Verbose,
}

/// Sink for all command output.
#[derive(Debug, Clone)]
pub struct Output {
    verbosity: Verbosity,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
        }
    }
}

impl Output {
    /// Derive verbosity from the `--quiet` / `--verbose` flags.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };
        Self { verbosity }
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Progress and result lines. Suppressed by `--quiet`.
    pub fn info(&self, msg: &str) {
        if !self.is_quiet() {
            println!("{msg}");
        }
    }

    /// Per-batch / per-layer detail. Printed only with `--verbose`.
    pub fn verbose(&self, msg: &str) {
        if self.is_verbose() {
            println!("{msg}");
        }
    }

    /// Warnings go to stderr; suppressed by `--quiet`.
    pub fn warn(&self, msg: &str) {
        if !self.is_quiet() {
            eprintln!("{}", styles::warning(msg));
        }
    }

    /// Errors always print.
    pub fn error(&self, msg: &str) {
        eprintln!("{}", styles::error(msg));
    }
}

/// Output format for machine-readable reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable lines (default).
    #[default]
    Table,
    /// JSON for machine parsing.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown output format '{s}'. Valid options: table, json"
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Terminal styling helpers.
pub mod styles {
    /// ANSI color codes for consistent styling.
    pub struct Colors;

    impl Colors {
        pub const RESET: &'static str = "\x1b[0m";
        pub const BOLD: &'static str = "\x1b[1m";
        pub const RED: &'static str = "\x1b[31m";
        pub const YELLOW: &'static str = "\x1b[33m";
    }

    /// Format an error message.
    pub fn error(msg: &str) -> String {
        format!("{}✗{} {}", Colors::RED, Colors::RESET, msg)
    }

    /// Format a warning message.
    pub fn warning(msg: &str) -> String {
        format!("{}⚠{} {}", Colors::YELLOW, Colors::RESET, msg)
    }

    /// Format a header/title.
    pub fn header(msg: &str) -> String {
        format!("{}{}{}", Colors::BOLD, msg, Colors::RESET)
    }
}
