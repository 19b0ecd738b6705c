// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context handed to a plugin's `init` hook.

use std::sync::Arc;

use uuid::Uuid;

use crate::config_handle::ConfigHandle;
use crate::error::LanesError;
use crate::traits::pipeline::Pipeline;
use crate::types::{PluginState, SharedState};

/// A plugin's view of its controller and hosting channel.
///
/// Cheap to clone; plugins usually keep a copy from `init`.
#[derive(Clone)]
pub struct PluginContext {
    id: Uuid,
    instance_name: String,
    channel_name: String,
    config: ConfigHandle,
    pipeline: Arc<dyn Pipeline>,
    state: SharedState,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("id", &self.id)
            .field("instance_name", &self.instance_name)
            .field("channel_name", &self.channel_name)
            .field("state", &self.state.get())
            .finish()
    }
}

impl PluginContext {
    /// Assembles a context. Called by controllers.
    pub fn new(
        id: Uuid,
        instance_name: impl Into<String>,
        config: ConfigHandle,
        pipeline: Arc<dyn Pipeline>,
        state: SharedState,
    ) -> Self {
        let channel_name = pipeline.channel_name().to_string();
        Self {
            id,
            instance_name: instance_name.into(),
            channel_name,
            config,
            pipeline,
            state,
        }
    }

    /// Instance id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel-scoped instance name.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Name of the hosting channel.
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Per-instance configuration.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Current lifecycle state as published by the controller.
    pub fn state(&self) -> PluginState {
        self.state.get()
    }

    /// Whether the plugin is stopped.
    pub fn is_stopped(&self) -> bool {
        self.state.get() == PluginState::Stopped
    }

    /// Whether the plugin is paused.
    pub fn is_paused(&self) -> bool {
        self.state.get() == PluginState::Paused
    }

    /// Hands control to the next plugin in the channel's chain.
    pub fn run_next(&self) -> Result<(), LanesError> {
        self.pipeline.run_next()
    }

    /// The hosting channel's pipeline handle.
    pub fn pipeline(&self) -> &Arc<dyn Pipeline> {
        &self.pipeline
    }
}
