// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host context: registry, collaborators and channels of one process.

use std::sync::Arc;

use lanes_channel::{
    Channel, ChannelOptions, ChannelSet, FleetReport, MemoryConfigStoreProvider,
    TracingAuditSink,
};
use lanes_config::{ChannelConfig, DiscoveryConfig, LanesConfig, RuntimeConfig};
use lanes_core::{AuditSink, ConfigStoreProvider, ControllerInfo, LanesError};
use lanes_plugin::{DiscoveryReport, DiscoverySource, PluginRegistry, PluginUnit};
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Owns everything a running host needs. There is no process-wide state;
/// two hosts in one process are independent.
pub struct Host {
    runtime: RuntimeConfig,
    registry: PluginRegistry,
    audit: Arc<dyn AuditSink>,
    config_stores: Arc<dyn ConfigStoreProvider>,
    channels: ChannelSet,
    last_error: Mutex<Option<Arc<LanesError>>>,
}

impl Host {
    /// A host with the default collaborators.
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self::with_collaborators(
            runtime,
            Arc::new(TracingAuditSink),
            Arc::new(MemoryConfigStoreProvider::new()),
        )
    }

    pub fn with_collaborators(
        runtime: RuntimeConfig,
        audit: Arc<dyn AuditSink>,
        config_stores: Arc<dyn ConfigStoreProvider>,
    ) -> Self {
        Self {
            runtime,
            registry: PluginRegistry::new(),
            audit,
            config_stores,
            channels: ChannelSet::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Most recent error raised while building or driving the host.
    pub fn last_error(&self) -> Option<Arc<LanesError>> {
        self.last_error
            .lock()
            .clone()
            .or_else(|| self.channels.last_error())
    }

    fn record<T>(&self, result: Result<T, LanesError>) -> Result<T, Arc<LanesError>> {
        result.map_err(|err| {
            let err = Arc::new(err);
            *self.last_error.lock() = Some(Arc::clone(&err));
            err
        })
    }

    /// Registers `units` and probes the configured discovery paths.
    pub fn discover(
        &self,
        discovery: &DiscoveryConfig,
        units: Vec<Arc<dyn PluginUnit>>,
    ) -> Result<DiscoveryReport, Arc<LanesError>> {
        let source = DiscoverySource {
            paths: discovery.paths.clone(),
            units,
            ignore_errors: discovery.ignore_errors,
        };
        let report = self.record(self.registry.discover(&source))?;
        for err in &report.errors {
            warn!(error = %err, "plugin discovery problem");
        }
        Ok(report)
    }

    /// Creates a channel with the host's collaborators.
    pub fn create_channel(&mut self, name: &str) -> Result<&Channel, Arc<LanesError>> {
        let options = ChannelOptions {
            idle_interval: self.runtime.idle_interval(),
            audit: Arc::clone(&self.audit),
            config_stores: Arc::clone(&self.config_stores),
        };
        let channel = self.record(Channel::with_options(name, options))?;
        let added = self.channels.add(channel);
        self.record(added)?;
        self.record(
            self.channels
                .get(name)
                .ok_or_else(|| LanesError::Internal(format!("channel '{name}' vanished"))),
        )
    }

    /// Creates a plugin instance on a hosted channel.
    pub async fn create_instance(
        &self,
        channel: &str,
        type_name: &str,
        instance_name: &str,
        id: Option<uuid::Uuid>,
    ) -> Result<ControllerInfo, Arc<LanesError>> {
        let result = self
            .registry
            .create_instance(self.channels.get(channel), type_name, instance_name, id)
            .await;
        self.record(result)
    }

    /// Creates every configured channel and its plugins, in order.
    ///
    /// Stops at the first failure; channels created before it stay hosted.
    pub async fn build_channels(
        &mut self,
        channels: &[ChannelConfig],
    ) -> Result<(), Arc<LanesError>> {
        for channel in channels {
            self.create_channel(&channel.name)?;
            for plugin in &channel.plugins {
                self.create_instance(&channel.name, &plugin.type_name, &plugin.name, plugin.id)
                    .await
                    .inspect_err(|err| {
                        error!(
                            channel = %channel.name,
                            plugin = %plugin.name,
                            plugin_type = %plugin.type_name,
                            error = %err,
                            "failed to create plugin instance"
                        );
                    })?;
            }
            info!(channel = %channel.name, plugins = channel.plugins.len(), "channel ready");
        }
        Ok(())
    }

    /// Builds a host from configuration: discovery, then channels.
    pub async fn from_config(
        config: &LanesConfig,
        units: Vec<Arc<dyn PluginUnit>>,
    ) -> Result<Self, Arc<LanesError>> {
        let mut host = Self::new(config.runtime.clone());
        host.discover(&config.discovery, units)?;
        host.build_channels(&config.channels).await?;
        Ok(host)
    }

    /// Starts every channel with the configured operation timeout.
    pub async fn start(&self) -> FleetReport {
        self.channels.start(self.runtime.operation_timeout()).await
    }

    /// Stops every channel with the configured operation timeout.
    pub async fn stop(&self) -> FleetReport {
        self.channels.stop(self.runtime.operation_timeout()).await
    }

    /// Hands control to the first plugin of every channel and runs it.
    pub async fn prime(&self) {
        for channel in self.channels.iter() {
            let primed = async {
                if channel.run_next().await?.is_some() {
                    channel.run_active().await?;
                }
                Ok::<_, LanesError>(())
            };
            if let Err(err) = self.record(primed.await) {
                warn!(channel = %channel.name(), error = %err, "failed to prime pipeline");
            }
        }
    }

    /// Terminates every channel with the configured grace period.
    pub async fn shutdown(&self) -> FleetReport {
        let report = self
            .channels
            .terminate(self.runtime.terminate_timeout())
            .await;
        if report.succeeded() {
            info!(channels = report.len(), "all channels terminated");
        } else {
            warn!(failed = ?report.failed_channels(), "some channels did not terminate cleanly");
        }
        report
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("registry", &self.registry)
            .field("channels", &self.channels.names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use lanes_core::PluginState;

    use super::*;
    use crate::builtin::{HEARTBEAT_TYPE, builtin_unit};

    fn config(toml: &str) -> LanesConfig {
        lanes_config::load_and_validate_str(toml).unwrap()
    }

    #[tokio::test]
    async fn builds_configured_channels() {
        let config = config(
            r#"
[[channel]]
name = "main"

[[channel.plugin]]
type = "Heartbeat"
name = "beat"

[[channel.plugin]]
type = "lanes::Relay"
name = "relay"
"#,
        );
        let host = Host::from_config(&config, vec![builtin_unit()])
            .await
            .unwrap();

        let channel = host.channels().get("main").unwrap();
        assert_eq!(channel.plugin_names(), vec!["beat", "relay"]);
        assert_eq!(
            channel.controller_info("beat").unwrap().type_name,
            HEARTBEAT_TYPE
        );

        assert!(host.start().await.succeeded());
        assert_eq!(
            channel.controller_info("relay").unwrap().state,
            PluginState::Started
        );
        assert!(host.shutdown().await.succeeded());
    }

    #[tokio::test]
    async fn unknown_type_is_recorded_as_last_error() {
        let config = config(
            r#"
[[channel]]
name = "main"

[[channel.plugin]]
type = "nope::Missing"
name = "x"
"#,
        );
        let err = Host::from_config(&config, vec![builtin_unit()])
            .await
            .unwrap_err();
        assert!(matches!(*err, LanesError::TypeNotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_channel_is_rejected() {
        let mut host = Host::new(RuntimeConfig::default());
        host.create_channel("a").unwrap();
        let err = host.create_channel("a").unwrap_err();
        assert!(matches!(*err, LanesError::ChannelExists { .. }));
        assert!(host.last_error().is_some());
    }

    #[tokio::test]
    async fn missing_channel_is_reported() {
        let host = Host::new(RuntimeConfig::default());
        host.discover(&DiscoveryConfig::default(), vec![builtin_unit()])
            .unwrap();
        let err = host
            .create_instance("ghost", HEARTBEAT_TYPE, "beat", None)
            .await
            .unwrap_err();
        assert!(matches!(*err, LanesError::ChannelMissing));
    }

    #[tokio::test]
    async fn prime_runs_first_plugin_and_relays() {
        let config = config(
            r#"
[[channel]]
name = "main"

[[channel.plugin]]
type = "Relay"
name = "first"

[[channel.plugin]]
type = "Relay"
name = "second"
"#,
        );
        let host = Host::from_config(&config, vec![builtin_unit()])
            .await
            .unwrap();
        host.start().await;
        host.prime().await;

        let channel = host.channels().get("main").unwrap();
        assert_eq!(channel.active_plugin().as_deref(), Some("second"));
        assert!(host.last_error().is_none());
    }
}
