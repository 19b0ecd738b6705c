// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The controller contract driven by channel workers.

use std::sync::Arc;

use uuid::Uuid;

use crate::config_handle::ConfigHandle;
use crate::error::LanesError;
use crate::traits::audit::AuditSink;
use crate::traits::pipeline::Pipeline;
use crate::types::{ControllerInfo, PluginState, Transition};

/// Everything a controller learns when it is attached to a channel.
#[derive(Clone)]
pub struct ControllerBinding {
    /// Id of the hosting channel.
    pub channel_id: Uuid,
    /// Name of the hosting channel.
    pub channel_name: String,
    /// Library that provided the type, if any.
    pub library: Option<String>,
    /// Qualified type name.
    pub type_name: String,
    /// Channel-scoped instance name.
    pub instance_name: String,
    /// Instance id.
    pub id: Uuid,
    /// Pipeline handle of the hosting channel.
    pub pipeline: Arc<dyn Pipeline>,
    /// Per-instance configuration.
    pub config: ConfigHandle,
    /// Audit output.
    pub audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for ControllerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerBinding")
            .field("channel_id", &self.channel_id)
            .field("channel_name", &self.channel_name)
            .field("library", &self.library)
            .field("type_name", &self.type_name)
            .field("instance_name", &self.instance_name)
            .field("id", &self.id)
            .finish()
    }
}

/// Lifecycle contract for one hosted plugin instance.
///
/// Transition methods return `Ok(Transition::Ignored)` when the request is
/// not legal from the current state, `Ok(Transition::Applied)` when the hook
/// ran (including when it failed and the controller moved to `Error`), and
/// `Err` only for precondition violations such as
/// [`LanesError::NotInitialized`].
pub trait Controller: Send + 'static {
    /// Instance id (nil until bound).
    fn id(&self) -> Uuid;

    /// Channel-scoped instance name (empty until bound).
    fn name(&self) -> &str;

    /// Qualified type name (empty until bound).
    fn type_name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> PluginState;

    /// Last recorded error.
    fn last_error(&self) -> Option<Arc<LanesError>>;

    /// Library name recorded at bind time.
    fn library(&self) -> Option<&str> {
        None
    }

    /// Attaches the controller to a channel. Called once, before `initialize`.
    fn bind(&mut self, binding: ControllerBinding);

    /// `Uninitialized -> Ready`.
    fn initialize(&mut self) -> Result<Transition, LanesError>;

    /// `Ready | Paused | Stopped -> Started`.
    fn start(&mut self) -> Result<Transition, LanesError>;

    /// `Started | Paused -> Stopped`.
    fn stop(&mut self) -> Result<Transition, LanesError>;

    /// `Started -> Paused`.
    fn pause(&mut self) -> Result<Transition, LanesError>;

    /// Any non-terminal state `-> Uninitialized`.
    fn closing(&mut self) -> Result<Transition, LanesError>;

    /// Runs the plugin's run hook; returns the continue signal.
    fn run(&mut self) -> Result<bool, LanesError>;

    /// Idle tick while started.
    fn tick(&mut self);

    /// Assigns an error explicitly and moves to `Error`.
    fn set_error(&mut self, error: LanesError) -> Result<Transition, LanesError>;

    /// `Error -> Ready`.
    fn reset_error(&mut self) -> Result<Transition, LanesError>;

    /// Snapshot of this controller.
    fn info(&self) -> ControllerInfo {
        ControllerInfo {
            id: self.id(),
            name: self.name().to_string(),
            type_name: self.type_name().to_string(),
            library: self.library().map(str::to_string),
            state: self.state(),
            last_error: self.last_error().map(|e| e.to_string()),
        }
    }
}
