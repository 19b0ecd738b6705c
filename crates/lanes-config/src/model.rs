// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Lanes host.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level Lanes configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LanesConfig {
    /// Runtime tuning.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Where plugin manifests are discovered.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Channels created at startup, in declaration order.
    #[serde(default, rename = "channel")]
    pub channels: Vec<ChannelConfig>,
}

/// Runtime tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Timeout applied to channel lifecycle operations, in milliseconds.
    /// `0` waits indefinitely.
    #[serde(default = "default_operation_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Grace period given to a channel on shutdown before it is force-killed.
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,

    /// How long a worker waits for work before ticking started plugins.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_timeout_ms: default_operation_timeout_ms(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
            idle_interval_ms: default_idle_interval_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Lifecycle operation timeout; `None` when configured as `0`.
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }

    /// Terminate grace period.
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    /// Worker idle interval.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_operation_timeout_ms() -> u64 {
    10_000
}

fn default_terminate_timeout_ms() -> u64 {
    5_000
}

fn default_idle_interval_ms() -> u64 {
    250
}

/// Plugin discovery settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Manifest files or directories containing `*.toml` manifests.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Log and collect discovery errors instead of failing startup.
    #[serde(default)]
    pub ignore_errors: bool,
}

/// One channel and the plugins it hosts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Channel name; unique across the configuration.
    pub name: String,

    /// Plugins hosted on this channel, in pipeline order.
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginSpec>,
}

/// A plugin instance to create on a channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    /// Qualified or short type name.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Instance name; unique within the channel.
    pub name: String,

    /// Fixed instance id. Generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
}
