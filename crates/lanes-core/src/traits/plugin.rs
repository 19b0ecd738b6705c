// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The plugin capability trait.

use crate::context::PluginContext;
use crate::error::LanesError;
use crate::traits::controller::Controller;

/// Capability implemented by every hosted plugin.
///
/// Hooks are invoked by the plugin's controller on the hosting channel's
/// worker thread, one at a time. A hook that returns `Err` (or panics) moves
/// the plugin to the error state; the controller then calls [`on_error`].
///
/// Only [`init`] is required; every other hook defaults to a no-op.
///
/// [`init`]: Plugin::init
/// [`on_error`]: Plugin::on_error
pub trait Plugin: Send + 'static {
    /// Called once on initialization with the plugin's context.
    ///
    /// The context is cheap to clone and may be kept for later use, e.g. to
    /// call [`PluginContext::run_next`] from a callback.
    fn init(&mut self, ctx: &PluginContext) -> Result<(), LanesError>;

    /// Notified after any hook failure or explicit error assignment.
    fn on_error(&mut self, _error: &LanesError) {}

    /// Called when the plugin is started or resumed.
    fn on_start(&mut self) -> Result<(), LanesError> {
        Ok(())
    }

    /// Called when the plugin holds control of the channel.
    ///
    /// Returns whether processing should continue.
    fn on_run(&mut self) -> Result<bool, LanesError> {
        Ok(true)
    }

    /// Called when the plugin is stopped.
    fn on_stop(&mut self) -> Result<(), LanesError> {
        Ok(())
    }

    /// Called when the plugin is paused.
    fn on_pause(&mut self) -> Result<(), LanesError> {
        Ok(())
    }

    /// Called on teardown. Failures are recorded but never block teardown.
    fn on_closing(&mut self) -> Result<(), LanesError> {
        Ok(())
    }

    /// Called periodically by an idle worker while the plugin is started.
    fn on_tick(&mut self) {}
}

/// What a plugin factory produces.
///
/// Most types are bare capabilities that the runtime wraps in its generic
/// controller. A type that implements the controller contract itself is
/// hosted as-is.
pub enum PluginInstance {
    /// A bare capability, wrapped by the generic controller.
    Plugin(Box<dyn Plugin>),
    /// A type that drives its own lifecycle.
    Controller(Box<dyn Controller>),
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginInstance::Plugin(_) => f.write_str("PluginInstance::Plugin"),
            PluginInstance::Controller(_) => f.write_str("PluginInstance::Controller"),
        }
    }
}
