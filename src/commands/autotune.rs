//! Autotune every layer that opts into the tunable capability.

use crate::device;
use crate::engine::{NetworkState, Phase};
use crate::error::Error;
use crate::registry::{CommandContext, Status};
use crate::Result;

pub fn run(ctx: &mut CommandContext) -> Result<Status> {
    let model = ctx
        .cli
        .model
        .clone()
        .ok_or_else(|| Error::Config("a model definition is required to autotune".to_string()))?;

    let devices = device::resolve(&ctx.cli.device, ctx.backend.as_ref())?;
    if devices.is_empty() {
        ctx.out.info("Using CPU");
    } else {
        ctx.out.info(&format!("Using devices {}", devices.display()));
    }
    device::apply(&devices, ctx.backend.as_mut(), true)?;

    let state = NetworkState::new(Phase::Train);
    let mut net = ctx.backend.build_net(&model, &state)?;

    let mut tuned = 0;
    for index in 0..net.layer_count() {
        let layer = net.layer_mut(index);
        let name = layer.name().to_string();
        match layer.as_tunable() {
            Some(tunable) => {
                ctx.out.verbose(&format!("Tuning layer {name}"));
                tunable.tune()?;
                tuned += 1;
            }
            None => ctx.out.verbose(&format!("Layer {name} is not tunable")),
        }
    }
    ctx.out.info(&format!("Tuned {tuned} layer(s)"));
    Ok(0)
}
