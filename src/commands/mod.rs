//! Command handlers and registry wiring.
//!
//! Each submodule exposes one `run` handler; [`build_registry`] is the
//! single place every command is registered, called from `main`.

pub mod autotune;
pub mod device_query;
pub mod score;
pub mod time;
pub mod train;

use crate::registry::{CommandContext, CommandRegistry, Status, FALLBACK_COMMAND};
use crate::Result;

/// Register every command. Called once at process start.
pub fn build_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register("train", Box::new(train::run));
    registry.register("test", Box::new(score::run));
    registry.register("device_query", Box::new(device_query::run));
    registry.register("time", Box::new(time::run));
    registry.register("autotune", Box::new(autotune::run));
    registry.register(FALLBACK_COMMAND, Box::new(actions));
    registry
}

/// List every registered command. Also the fallback for unknown names.
fn actions(ctx: &mut CommandContext) -> Result<Status> {
    ctx.out.info("Available actions:");
    for name in &ctx.known_commands {
        ctx.out.info(&format!("  {name}"));
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use crate::engine::memory::MemoryEngine;
    use crate::output::Output;

    #[test]
    fn test_registry_contains_every_command() {
        let registry = build_registry();
        assert_eq!(
            registry.command_names(),
            vec![
                "actions",
                "autotune",
                "device_query",
                "test",
                "time",
                "train"
            ]
        );
    }

    #[test]
    fn test_actions_lists_without_failing() {
        let registry = build_registry();
        let mut ctx = CommandContext::new(
            Cli::default_for_tests(),
            Output::from_flags(true, false),
            Box::new(MemoryEngine::new()),
        );
        assert_eq!(registry.dispatch("actions", &mut ctx).unwrap(), 0);
        assert_eq!(registry.dispatch("brew", &mut ctx).unwrap(), 0);
    }
}
