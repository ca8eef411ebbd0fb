//! # Percolar: Model-Execution Harness
//!
//! Percolar drives an external layered model-execution engine through three
//! operational modes: training orchestration, scoring/evaluation (including
//! detection mean Average Precision) and performance benchmarking. It does
//! no numeric computation itself; the engine is consumed through the trait
//! seams in [`engine`].
//!
//! ## Architecture
//!
//! - **registry**: explicit name-keyed command dispatch
//! - **device**: device-set resolution and compute-mode selection
//! - **commands**: one handler per action (train, test, time, device_query,
//!   autotune, actions)
//! - **eval**: streaming score and detection-mAP accumulators
//! - **bench**: barrier-disciplined forward/backward timing harness
//! - **signal**: SIGINT/SIGHUP policies feeding cooperative cancellation
//! - **engine**: collaborator traits plus an in-memory reference backend

pub mod bench;
pub mod commands;
pub mod config;
pub mod device;
pub mod engine;
pub mod eval;
pub mod output;
pub mod registry;
pub mod signal;

pub mod error;

// Re-export commonly used types
pub use error::{Error, Result};
