//! Show diagnostic information for compute devices.
//!
//! Without a device flag (or with `all`) every enumerable device is
//! listed; an explicit list registers those devices and queries each one
//! in turn.

use crate::device;
use crate::registry::{CommandContext, Status};
use crate::Result;

pub fn run(ctx: &mut CommandContext) -> Result<Status> {
    if ctx.cli.device.is_empty() || ctx.cli.device == "all" {
        let count = ctx.backend.enumerate_devices()?;
        ctx.out.info(&format!("{count} available device(s)"));
        for device in 0..count as u32 {
            let diagnostics = ctx.backend.device_diagnostics(device)?;
            ctx.out.info(&diagnostics);
        }
        return Ok(0);
    }

    ctx.out
        .info(&format!("Querying devices {}", ctx.cli.device));
    let devices = device::resolve(&ctx.cli.device, ctx.backend.as_ref())?;
    ctx.backend.register_devices(devices.ids())?;
    for &device in devices.ids() {
        ctx.backend.set_current_device(device)?;
        let diagnostics = ctx.backend.device_diagnostics(device)?;
        ctx.out.info(&diagnostics);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use crate::engine::memory::{MemoryEngine, ProbeHandle};
    use crate::output::Output;
    use clap::Parser;

    fn context_with(args: &[&str], engine: MemoryEngine) -> (CommandContext, ProbeHandle) {
        let mut full = vec!["percolar", "device_query"];
        full.extend_from_slice(args);
        let cli = Cli::try_parse_from(full).unwrap();
        let probe = engine.probe();
        let ctx = CommandContext::new(cli, Output::from_flags(true, false), Box::new(engine));
        (ctx, probe)
    }

    #[test]
    fn test_enumerates_without_a_flag() {
        let (mut ctx, probe) = context_with(&[], MemoryEngine::new().with_device_count(3));
        assert_eq!(run(&mut ctx).unwrap(), 0);
        // Enumeration never registers or selects devices.
        assert!(probe.lock().unwrap().registered_devices.is_empty());
    }

    #[test]
    fn test_enumeration_without_support_is_fatal() {
        let (mut ctx, _) = context_with(&[], MemoryEngine::new());
        assert!(run(&mut ctx).is_err());
    }

    #[test]
    fn test_explicit_list_registers_and_queries_each() {
        let (mut ctx, probe) =
            context_with(&["--device", "1,0"], MemoryEngine::new().with_device_count(2));
        assert_eq!(run(&mut ctx).unwrap(), 0);
        let probe = probe.lock().unwrap();
        assert_eq!(probe.registered_devices, vec![1, 0]);
        assert_eq!(probe.current_device, Some(0));
    }
}
