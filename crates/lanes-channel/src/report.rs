// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Results of channel operations and published channel snapshots.

use std::sync::Arc;

use lanes_core::{ControllerInfo, LanesError, LifecycleOp, PluginState, Transition};
use uuid::Uuid;

/// How one hosted plugin fared during a fanned-out lifecycle operation.
#[derive(Debug, Clone)]
pub struct PluginReport {
    /// Instance name.
    pub name: String,
    /// The transition, or the precondition that rejected it.
    pub result: Result<Transition, Arc<LanesError>>,
    /// Hook failure recorded on the controller by this operation.
    pub error: Option<Arc<LanesError>>,
}

impl PluginReport {
    /// State after the operation, when the controller accepted it.
    pub fn state(&self) -> Option<PluginState> {
        self.result.as_ref().ok().map(Transition::state)
    }

    /// Whether the operation was rejected or a hook failed.
    pub fn failed(&self) -> bool {
        self.result.is_err() || self.error.is_some()
    }
}

/// Per-plugin results of one lifecycle operation on one channel, in chain order.
#[derive(Debug, Clone)]
pub struct LifecycleReport {
    pub channel: String,
    pub op: LifecycleOp,
    pub plugins: Vec<PluginReport>,
}

impl LifecycleReport {
    /// The entry for `name`.
    pub fn get(&self, name: &str) -> Option<&PluginReport> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Entries whose operation was rejected or failed.
    pub fn failures(&self) -> impl Iterator<Item = &PluginReport> {
        self.plugins.iter().filter(|p| p.failed())
    }

    /// Whether every plugin accepted the operation without a hook failure.
    pub fn succeeded(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Outcome of an awaited channel operation.
///
/// Timing out is not an error: the queued work is not retracted and will
/// still run when the worker reaches it.
#[derive(Debug, Clone)]
pub enum OperationOutcome {
    /// The worker executed the operation.
    Completed(LifecycleReport),
    /// The timeout elapsed first.
    TimedOut,
    /// The channel did not wind down within its grace period; its worker was
    /// abandoned and any plugin may have been left mid-operation.
    ForceKilled,
}

impl OperationOutcome {
    pub fn report(&self) -> Option<&LifecycleReport> {
        match self {
            OperationOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, OperationOutcome::Completed(_))
    }

    /// Completed with no plugin failures.
    pub fn succeeded(&self) -> bool {
        self.report().is_some_and(LifecycleReport::succeeded)
    }
}

/// State of a channel as published by its worker after every unit of work.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub id: Uuid,
    pub name: String,
    /// Hosted controllers in chain order.
    pub plugins: Vec<ControllerInfo>,
    /// Pipeline cursor; `None` when no plugin is active.
    pub cursor: Option<usize>,
    /// Name of the active plugin.
    pub active: Option<String>,
    /// Last failure of a unit of work on this channel.
    pub last_error: Option<Arc<LanesError>>,
    pub closing: bool,
    pub killed: bool,
}

impl ChannelSnapshot {
    pub(crate) fn empty(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            plugins: Vec::new(),
            cursor: None,
            active: None,
            last_error: None,
            closing: false,
            killed: false,
        }
    }

    /// Info for the controller named `name`.
    pub fn plugin(&self, name: &str) -> Option<&ControllerInfo> {
        self.plugins.iter().find(|p| p.name == name)
    }
}
