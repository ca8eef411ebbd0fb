//! Name-keyed command registry.
//!
//! The registry is an explicit object: [`crate::commands::build_registry`]
//! populates it at process start and `main` dispatches exactly one command
//! through it. There is no load-time self-registration and no global
//! mutable state.

use std::collections::BTreeMap;

use crate::config::Cli;
use crate::engine::EngineBackend;
use crate::error::Result;
use crate::output::Output;

/// Integer status a handler returns; forwarded as the process exit code,
/// with every non-zero value mapping to 1.
pub type Status = i32;

/// Everything a handler needs: the parsed flags, the output sink and the
/// engine. Fixed before dispatch, so handlers are zero-argument in effect.
pub struct CommandContext {
    pub cli: Cli,
    pub out: Output,
    pub backend: Box<dyn EngineBackend>,
    /// Registered command names, refreshed by dispatch so the listing
    /// handler can enumerate them without holding the registry.
    pub known_commands: Vec<String>,
}

impl CommandContext {
    pub fn new(cli: Cli, out: Output, backend: Box<dyn EngineBackend>) -> Self {
        Self {
            cli,
            out,
            backend,
            known_commands: Vec::new(),
        }
    }
}

pub type Handler = Box<dyn Fn(&mut CommandContext) -> Result<Status>>;

/// Name of the handler unknown commands fall back to.
pub const FALLBACK_COMMAND: &str = "actions";

#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Handler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handler. Duplicate names overwrite silently; the last
    /// registration wins.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.commands.insert(name.into(), handler);
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Look up `name` and run its handler. Unknown names warn and fall
    /// back to the listing handler instead of failing the process.
    pub fn dispatch(&self, name: &str, ctx: &mut CommandContext) -> Result<Status> {
        ctx.known_commands = self.command_names();
        if let Some(handler) = self.commands.get(name) {
            return handler(ctx);
        }
        ctx.out.warn(&format!("Unknown action: {name}"));
        match self.commands.get(FALLBACK_COMMAND) {
            Some(handler) => handler(ctx),
            None => Ok(0),
        }
    }
}
