// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugins compiled into the host.
//!
//! - `lanes::Heartbeat` logs a liveness line every `every_ticks` idle ticks
//!   and hands control on when run.
//! - `lanes::Relay` passes control straight to the next plugin.

use std::sync::Arc;

use lanes_core::{LanesError, Plugin, PluginContext};
use lanes_plugin::{PluginUnit, StaticUnit};
use tracing::{debug, info};

pub const HEARTBEAT_TYPE: &str = "lanes::Heartbeat";
pub const RELAY_TYPE: &str = "lanes::Relay";

const DEFAULT_EVERY_TICKS: u64 = 4;

/// The unit registering every built-in type.
pub fn builtin_unit() -> Arc<dyn PluginUnit> {
    Arc::new(
        StaticUnit::new("lanes-builtin")
            .with_plugin::<Heartbeat>(HEARTBEAT_TYPE, "Logs a periodic liveness line")
            .with_plugin::<Relay>(RELAY_TYPE, "Passes control to the next plugin"),
    )
}

#[derive(Default)]
pub struct Heartbeat {
    ctx: Option<PluginContext>,
    every_ticks: u64,
    ticks: u64,
    beats: u64,
}

impl Heartbeat {
    pub fn beats(&self) -> u64 {
        self.beats
    }

    fn beat(&mut self) {
        self.beats += 1;
        if let Some(ctx) = &self.ctx {
            info!(
                channel = %ctx.channel_name(),
                plugin = %ctx.instance_name(),
                beats = self.beats,
                "heartbeat"
            );
        }
    }
}

impl Plugin for Heartbeat {
    fn init(&mut self, ctx: &PluginContext) -> Result<(), LanesError> {
        self.every_ticks = ctx
            .config()
            .get_value("every_ticks", DEFAULT_EVERY_TICKS)
            .max(1);
        self.ctx = Some(ctx.clone());
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), LanesError> {
        self.ticks = 0;
        Ok(())
    }

    fn on_run(&mut self) -> Result<bool, LanesError> {
        self.beat();
        if let Some(ctx) = &self.ctx {
            ctx.run_next()?;
        }
        Ok(true)
    }

    fn on_tick(&mut self) {
        self.ticks += 1;
        if self.ticks % self.every_ticks.max(1) == 0 {
            self.beat();
        }
    }
}

#[derive(Default)]
pub struct Relay {
    ctx: Option<PluginContext>,
}

impl Plugin for Relay {
    fn init(&mut self, ctx: &PluginContext) -> Result<(), LanesError> {
        self.ctx = Some(ctx.clone());
        Ok(())
    }

    fn on_run(&mut self) -> Result<bool, LanesError> {
        let Some(ctx) = &self.ctx else {
            return Ok(false);
        };
        debug!(channel = %ctx.channel_name(), plugin = %ctx.instance_name(), "relaying");
        ctx.run_next()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_unit_lists_both_types() {
        let types = builtin_unit().probe().unwrap();
        let names: Vec<_> = types.iter().map(|t| t.type_name.as_str()).collect();
        assert_eq!(names, vec![HEARTBEAT_TYPE, RELAY_TYPE]);
    }

    #[test]
    fn heartbeat_beats_every_n_ticks() {
        let mut heartbeat = Heartbeat {
            every_ticks: 3,
            ..Default::default()
        };
        for _ in 0..7 {
            heartbeat.on_tick();
        }
        assert_eq!(heartbeat.beats(), 2);
    }

    #[test]
    fn relay_without_context_does_not_continue() {
        let mut relay = Relay::default();
        assert!(!relay.on_run().unwrap());
    }
}
