// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Implementations of the `lanes` subcommands.

use std::fmt::Write as _;
use std::sync::Arc;

use lanes_config::LanesConfig;
use lanes_core::LanesError;
use lanes_plugin::PluginRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::builtin::builtin_unit;
use crate::host::Host;

/// `lanes run`: builds the host, starts every channel and runs until
/// `cancel` fires, then terminates.
pub async fn run(config: &LanesConfig, cancel: CancellationToken) -> Result<(), Arc<LanesError>> {
    let host = Host::from_config(config, vec![builtin_unit()]).await?;
    info!(
        channels = host.channels().len(),
        plugin_types = host.registry().len(),
        "host ready"
    );

    let started = host.start().await;
    if !started.succeeded() {
        warn!(failed = ?started.failed_channels(), "some channels failed to start");
    }
    host.prime().await;

    cancel.cancelled().await;
    info!("shutting down");
    host.shutdown().await;
    Ok(())
}

/// `lanes plugins`: discovers plugin types and renders them as a table.
pub fn list_plugins(config: &LanesConfig) -> Result<String, Arc<LanesError>> {
    let host = Host::new(config.runtime.clone());
    let report = host.discover(&config.discovery, vec![builtin_unit()])?;
    let mut out = render_registry(host.registry());
    for err in &report.errors {
        let _ = writeln!(out, "warning: {err}");
    }
    Ok(out)
}

fn render_registry(registry: &PluginRegistry) -> String {
    let descriptors = registry.descriptors();
    let width = descriptors
        .iter()
        .map(|d| d.type_name().len())
        .max()
        .unwrap_or(0)
        .max("TYPE".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:<16}  {:<8}  DESCRIPTION", "TYPE", "LIBRARY", "STATE");
    for d in descriptors {
        let _ = writeln!(
            out,
            "{:<width$}  {:<16}  {:<8}  {}",
            d.type_name(),
            d.library().name(),
            d.library().state().to_string(),
            d.description().unwrap_or("-"),
        );
    }
    out
}

/// Result of `lanes check`.
#[derive(Debug, Default)]
pub struct CheckReport {
    /// One line per configured plugin, then discovery warnings.
    pub output: String,
    /// Configured type names that resolve to no registered type.
    pub missing: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// `lanes check`: validates that every configured type resolves.
///
/// Configuration itself was validated while loading. Types are resolved by
/// name only; no library is activated.
pub fn check(config: &LanesConfig) -> Result<CheckReport, Arc<LanesError>> {
    let host = Host::new(config.runtime.clone());
    let report = host.discover(&config.discovery, vec![builtin_unit()])?;

    let mut out = String::new();
    let mut missing = Vec::new();
    for channel in &config.channels {
        for plugin in &channel.plugins {
            let registry = host.registry();
            let resolved = registry
                .get(&plugin.type_name)
                .or_else(|| registry.find_by_short_name(&plugin.type_name));
            match resolved {
                Some(d) => {
                    let _ = writeln!(
                        out,
                        "ok       {}/{} -> {}",
                        channel.name,
                        plugin.name,
                        d.type_name()
                    );
                }
                None => {
                    let _ = writeln!(
                        out,
                        "missing  {}/{} -> {}",
                        channel.name, plugin.name, plugin.type_name
                    );
                    missing.push(plugin.type_name.clone());
                }
            }
        }
    }
    for err in &report.errors {
        let _ = writeln!(out, "warning: {err}");
    }

    Ok(CheckReport {
        output: out,
        missing,
    })
}
