// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out of lifecycle operations over independent channels.
//!
//! Each channel receives the request concurrently; the set waits for all of
//! them and reports every channel's outcome by name. One channel's failure
//! never blocks or rolls back another, and the aggregate call never errors.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use lanes_core::LanesError;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::report::{ChannelSnapshot, OperationOutcome};

/// Per-channel outcomes of one fanned-out operation, keyed by channel name.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub results: BTreeMap<String, Result<OperationOutcome, Arc<LanesError>>>,
}

impl FleetReport {
    pub fn get(&self, channel: &str) -> Option<&Result<OperationOutcome, Arc<LanesError>>> {
        self.results.get(channel)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Channels that errored, timed out, were killed or hosted a failing plugin.
    pub fn failed_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| !matches!(result, Ok(outcome) if outcome.succeeded()))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Whether every channel completed without plugin failures.
    pub fn succeeded(&self) -> bool {
        self.failed_channels().is_empty()
    }
}

/// Zero or more independent channels addressed by name.
#[derive(Debug, Default)]
pub struct ChannelSet {
    channels: BTreeMap<String, Channel>,
    last_error: Mutex<Option<Arc<LanesError>>>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `channel`; names are unique within the set.
    pub fn add(&mut self, channel: Channel) -> Result<(), LanesError> {
        let name = channel.name().to_string();
        if self.channels.contains_key(&name) {
            return Err(LanesError::ChannelExists { name });
        }
        self.channels.insert(name, channel);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Removes a channel from the set. Dropping it tears its plugins down.
    pub fn remove(&mut self, name: &str) -> Option<Channel> {
        self.channels.remove(name)
    }

    /// Channel names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Snapshots of every channel.
    pub fn fleet_snapshot(&self) -> Vec<ChannelSnapshot> {
        self.channels.values().map(Channel::snapshot).collect()
    }

    /// Most recent channel-level error seen by a fan-out.
    pub fn last_error(&self) -> Option<Arc<LanesError>> {
        self.last_error.lock().clone()
    }

    async fn fan_out<'a, F, Fut>(&'a self, op: &str, f: F) -> FleetReport
    where
        F: Fn(&'a Channel) -> Fut,
        Fut: Future<Output = Result<OperationOutcome, LanesError>> + 'a,
    {
        let names = self.channels.keys().cloned();
        let outcomes = join_all(self.channels.values().map(f)).await;
        let mut report = FleetReport::default();
        for (name, result) in names.zip(outcomes) {
            let result = result.map_err(Arc::new);
            match &result {
                Ok(OperationOutcome::Completed(r)) if !r.succeeded() => {
                    warn!(channel = %name, op, failures = r.failures().count(), "plugin failures");
                }
                Ok(OperationOutcome::Completed(_)) => {}
                Ok(other) => warn!(channel = %name, op, outcome = ?other, "operation incomplete"),
                Err(err) => {
                    warn!(channel = %name, op, error = %err, "operation rejected");
                    *self.last_error.lock() = Some(Arc::clone(err));
                }
            }
            report.results.insert(name, result);
        }
        debug!(op, channels = report.len(), "fan-out complete");
        report
    }

    pub async fn initialize(&self, timeout: Option<Duration>) -> FleetReport {
        self.fan_out("initialize", |c| c.initialize(timeout)).await
    }

    pub async fn start(&self, timeout: Option<Duration>) -> FleetReport {
        self.fan_out("start", |c| c.start(timeout)).await
    }

    pub async fn stop(&self, timeout: Option<Duration>) -> FleetReport {
        self.fan_out("stop", |c| c.stop(timeout)).await
    }

    pub async fn pause(&self, timeout: Option<Duration>) -> FleetReport {
        self.fan_out("pause", |c| c.pause(timeout)).await
    }

    pub async fn closing(&self, timeout: Option<Duration>) -> FleetReport {
        self.fan_out("closing", |c| c.closing(timeout)).await
    }

    /// Terminates every channel, each with the same grace period.
    pub async fn terminate(&self, timeout: Duration) -> FleetReport {
        self.fan_out("terminate", |c| c.terminate(timeout)).await
    }
}
