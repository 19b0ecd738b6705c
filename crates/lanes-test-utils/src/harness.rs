// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for multi-channel integration testing.
//!
//! `TestHarness` assembles a channel set, a registry with the scripted unit
//! registered, a recording audit sink and an in-memory configuration
//! provider, all sharing one [`CallLog`].

use std::sync::Arc;
use std::time::Duration;

use lanes_channel::{
    Channel, ChannelOptions, ChannelSet, MemoryConfigStoreProvider, PluginController,
    Registration,
};
use lanes_core::{ControllerInfo, LanesError};
use lanes_plugin::PluginRegistry;

use crate::recording::RecordingAuditSink;
use crate::scripted::{CallLog, SCRIPTED_TYPE, ScriptedPlugin, scripted_unit};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    log: CallLog,
    idle_interval: Duration,
    channels: Vec<(String, Vec<ScriptedPlugin>)>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            log: CallLog::new(),
            // Long enough that idle ticks stay out of most assertions.
            idle_interval: Duration::from_secs(3600),
            channels: Vec::new(),
        }
    }

    /// Idle interval for every channel.
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Adds a channel hosting plugins named `names`, in order.
    pub fn with_channel(mut self, name: &str, names: &[&str]) -> Self {
        let plugins = names
            .iter()
            .map(|n| ScriptedPlugin::new(*n, &self.log))
            .collect();
        self.channels.push((name.to_string(), plugins));
        self
    }

    /// Adds a channel hosting pre-scripted plugins. Build them with
    /// [`TestHarnessBuilder::plugin`] so they share the harness log.
    pub fn with_scripted_channel(mut self, name: &str, plugins: Vec<ScriptedPlugin>) -> Self {
        self.channels.push((name.to_string(), plugins));
        self
    }

    /// A scripted plugin logging into the harness log.
    pub fn plugin(&self, label: &str) -> ScriptedPlugin {
        ScriptedPlugin::new(label, &self.log)
    }

    /// Creates every channel and appends its plugins.
    pub async fn build(self) -> Result<TestHarness, LanesError> {
        let audit = Arc::new(RecordingAuditSink::new());
        let configs = Arc::new(MemoryConfigStoreProvider::new());
        let options = ChannelOptions {
            idle_interval: self.idle_interval,
            audit: audit.clone(),
            config_stores: configs.clone(),
        };

        let registry = PluginRegistry::new();
        registry.register_unit(Arc::new(scripted_unit("test", &self.log)))?;

        let mut channels = ChannelSet::new();
        for (name, plugins) in self.channels {
            let channel = Channel::with_options(name, options.clone())?;
            for plugin in plugins {
                let label = plugin_label(&plugin);
                host(&channel, plugin, &label).await?;
            }
            channels.add(channel)?;
        }

        Ok(TestHarness {
            channels,
            registry,
            log: self.log,
            audit,
            configs,
            options,
        })
    }
}

fn plugin_label(plugin: &ScriptedPlugin) -> String {
    plugin.label().to_string()
}

async fn host(
    channel: &Channel,
    plugin: ScriptedPlugin,
    name: &str,
) -> Result<ControllerInfo, LanesError> {
    channel
        .add_controller(
            Box::new(PluginController::new(Box::new(plugin))),
            Registration::new(SCRIPTED_TYPE, name).with_library("test"),
        )
        .await
}

/// A complete test environment.
pub struct TestHarness {
    pub channels: ChannelSet,
    pub registry: PluginRegistry,
    pub log: CallLog,
    pub audit: Arc<RecordingAuditSink>,
    pub configs: Arc<MemoryConfigStoreProvider>,
    options: ChannelOptions,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The named channel.
    ///
    /// # Panics
    /// If no such channel exists.
    pub fn channel(&self, name: &str) -> &Channel {
        match self.channels.get(name) {
            Some(channel) => channel,
            None => panic!("no channel named '{name}' in harness"),
        }
    }

    /// Options the harness channels were built with, for extra channels.
    pub fn options(&self) -> ChannelOptions {
        self.options.clone()
    }

    /// Appends another scripted plugin to `channel`.
    pub async fn add_plugin(
        &self,
        channel: &str,
        plugin: ScriptedPlugin,
    ) -> Result<ControllerInfo, LanesError> {
        let label = plugin_label(&plugin);
        host(self.channel(channel), plugin, &label).await
    }
}
