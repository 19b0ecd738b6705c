// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic controller driving a bare [`Plugin`] through its lifecycle.
//!
//! ```text
//! Uninitialized --initialize--> Ready --start--> Started <--pause/start--> Paused
//!                                                   |                       |
//!                                                   +--------stop-----------+--> Stopped --start--> Started
//! any state except Uninitialized --closing--> Uninitialized
//! any failure / set_error --> Error --reset_error--> Ready
//! ```
//!
//! Hooks run one at a time on the hosting channel's worker. A hook that
//! returns `Err` or panics moves the controller to `Error`, records the
//! error and notifies the plugin through `on_error`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lanes_core::{
    Controller, ControllerBinding, LanesError, LifecycleOp, Plugin, PluginContext, PluginState,
    SharedState, Transition,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics;

/// Wraps a plugin capability and enforces the lifecycle state machine.
pub struct PluginController {
    plugin: Box<dyn Plugin>,
    binding: Option<ControllerBinding>,
    state: SharedState,
    last_error: Option<Arc<LanesError>>,
    source: String,
}

impl std::fmt::Debug for PluginController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginController")
            .field("source", &self.source)
            .field("state", &self.state.get())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl PluginController {
    /// Wraps `plugin`. The controller is usable once bound to a channel.
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        Self {
            plugin,
            binding: None,
            state: SharedState::default(),
            last_error: None,
            source: String::new(),
        }
    }

    fn binding(&self) -> Result<&ControllerBinding, LanesError> {
        self.binding
            .as_ref()
            .ok_or_else(|| LanesError::Internal("controller is not bound to a channel".into()))
    }

    fn channel_name(&self) -> &str {
        self.binding
            .as_ref()
            .map(|b| b.channel_name.as_str())
            .unwrap_or_default()
    }

    fn not_initialized(&self) -> LanesError {
        LanesError::NotInitialized {
            name: self.name().to_string(),
        }
    }

    /// Runs a plugin hook, turning a panic into [`LanesError::PluginPanicked`].
    fn invoke<T>(
        &mut self,
        op: LifecycleOp,
        hook: impl FnOnce(&mut dyn Plugin) -> Result<T, LanesError>,
    ) -> Result<T, LanesError> {
        let plugin = self.plugin.as_mut();
        match panic::catch_unwind(AssertUnwindSafe(|| hook(plugin))) {
            Ok(result) => result,
            Err(payload) => Err(LanesError::PluginPanicked {
                name: self.name().to_string(),
                operation: op.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn set_state(&mut self, state: PluginState) {
        self.state.set(state);
        if let Some(binding) = &self.binding {
            binding.config.set_writable(state != PluginState::Error);
        }
    }

    fn audit(&self) -> Option<&Arc<dyn lanes_core::AuditSink>> {
        self.binding.as_ref().map(|b| &b.audit)
    }

    fn applied(&mut self, op: LifecycleOp, from: PluginState, to: PluginState) -> Transition {
        self.set_state(to);
        info!(plugin = %self.source, %op, %from, %to, "transition applied");
        if let Some(audit) = self.audit() {
            audit.write_info(&self.source, &format!("{op}: {from} -> {to}"));
        }
        metrics::record_transition(self.channel_name(), op.as_ref(), "applied");
        Transition::Applied { from, to }
    }

    fn ignored(&self, op: LifecycleOp) -> Transition {
        let state = self.state.get();
        debug!(plugin = %self.source, %op, %state, "transition ignored");
        if let Some(audit) = self.audit() {
            audit.write_warning(&self.source, &format!("{op} ignored in state {state}"));
        }
        metrics::record_transition(self.channel_name(), op.as_ref(), "ignored");
        Transition::Ignored { state }
    }

    /// Records `err`, notifies the plugin and audits the failure. Does not
    /// change state.
    fn record_failure(&mut self, op: LifecycleOp, err: LanesError) {
        error!(plugin = %self.source, %op, error = %err, "plugin hook failed");
        if let Some(audit) = self.audit() {
            audit.write_error(&self.source, &format!("{op} failed: {err}"));
        }
        metrics::record_transition(self.channel_name(), op.as_ref(), "failed");

        let name = self.name().to_string();
        let plugin = self.plugin.as_mut();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| plugin.on_error(&err))) {
            warn!(
                plugin = %name,
                panic = %panic_message(payload.as_ref()),
                "on_error hook panicked"
            );
        }
        self.last_error = Some(Arc::new(err));
    }

    fn fail(&mut self, op: LifecycleOp, from: PluginState, err: LanesError) -> Transition {
        self.record_failure(op, err);
        self.set_state(PluginState::Error);
        Transition::Applied {
            from,
            to: PluginState::Error,
        }
    }

    fn run_hook(
        &mut self,
        op: LifecycleOp,
        from: PluginState,
        to: PluginState,
        hook: impl FnOnce(&mut dyn Plugin) -> Result<(), LanesError>,
    ) -> Transition {
        match self.invoke(op, hook) {
            Ok(()) => self.applied(op, from, to),
            Err(err) => self.fail(op, from, err),
        }
    }

    fn do_initialize(&mut self) -> Result<Transition, LanesError> {
        let from = self.state.get();
        let binding = self.binding()?.clone();
        if let Err(err) = binding.config.load(false) {
            return Ok(self.fail(LifecycleOp::Initialize, from, err));
        }
        let ctx = PluginContext::new(
            binding.id,
            binding.instance_name,
            binding.config,
            binding.pipeline,
            self.state.clone(),
        );
        Ok(self.run_hook(LifecycleOp::Initialize, from, PluginState::Ready, |p| {
            p.init(&ctx)
        }))
    }
}

impl Controller for PluginController {
    fn id(&self) -> Uuid {
        self.binding.as_ref().map(|b| b.id).unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.binding
            .as_ref()
            .map(|b| b.instance_name.as_str())
            .unwrap_or_default()
    }

    fn type_name(&self) -> &str {
        self.binding
            .as_ref()
            .map(|b| b.type_name.as_str())
            .unwrap_or_default()
    }

    fn state(&self) -> PluginState {
        self.state.get()
    }

    fn last_error(&self) -> Option<Arc<LanesError>> {
        self.last_error.clone()
    }

    fn library(&self) -> Option<&str> {
        self.binding.as_ref().and_then(|b| b.library.as_deref())
    }

    fn bind(&mut self, binding: ControllerBinding) {
        self.source = format!("{}/{}", binding.channel_name, binding.instance_name);
        self.binding = Some(binding);
    }

    fn initialize(&mut self) -> Result<Transition, LanesError> {
        if self.state.get() != PluginState::Uninitialized {
            return Ok(self.ignored(LifecycleOp::Initialize));
        }
        self.do_initialize()
    }

    fn start(&mut self) -> Result<Transition, LanesError> {
        let from = self.state.get();
        match from {
            PluginState::Uninitialized => {
                // Release anything a previous, partial run may have left behind.
                if let Err(err) = self.invoke(LifecycleOp::Closing, |p| p.on_closing()) {
                    debug!(plugin = %self.source, error = %err, "pre-start cleanup failed");
                }
                let init = self.do_initialize()?;
                if init.state() != PluginState::Ready {
                    return Ok(Transition::Applied {
                        from,
                        to: init.state(),
                    });
                }
                let started = self.run_hook(
                    LifecycleOp::Start,
                    PluginState::Ready,
                    PluginState::Started,
                    |p| p.on_start(),
                );
                Ok(Transition::Applied {
                    from,
                    to: started.state(),
                })
            }
            PluginState::Ready | PluginState::Paused | PluginState::Stopped => Ok(self.run_hook(
                LifecycleOp::Start,
                from,
                PluginState::Started,
                |p| p.on_start(),
            )),
            PluginState::Started | PluginState::Error => Ok(self.ignored(LifecycleOp::Start)),
        }
    }

    fn stop(&mut self) -> Result<Transition, LanesError> {
        let from = self.state.get();
        match from {
            PluginState::Uninitialized => Err(self.not_initialized()),
            PluginState::Started | PluginState::Paused => Ok(self.run_hook(
                LifecycleOp::Stop,
                from,
                PluginState::Stopped,
                |p| p.on_stop(),
            )),
            _ => Ok(self.ignored(LifecycleOp::Stop)),
        }
    }

    fn pause(&mut self) -> Result<Transition, LanesError> {
        let from = self.state.get();
        match from {
            PluginState::Uninitialized => Err(self.not_initialized()),
            PluginState::Started => Ok(self.run_hook(
                LifecycleOp::Pause,
                from,
                PluginState::Paused,
                |p| p.on_pause(),
            )),
            _ => Ok(self.ignored(LifecycleOp::Pause)),
        }
    }

    fn closing(&mut self) -> Result<Transition, LanesError> {
        let from = self.state.get();
        if from == PluginState::Uninitialized {
            return Ok(self.ignored(LifecycleOp::Closing));
        }
        // Teardown always completes; a failing hook is only recorded.
        if let Err(err) = self.invoke(LifecycleOp::Closing, |p| p.on_closing()) {
            self.record_failure(LifecycleOp::Closing, err);
        }
        Ok(self.applied(LifecycleOp::Closing, from, PluginState::Uninitialized))
    }

    fn run(&mut self) -> Result<bool, LanesError> {
        let from = self.state.get();
        match from {
            PluginState::Uninitialized => Err(self.not_initialized()),
            PluginState::Started | PluginState::Paused => {
                match self.invoke(LifecycleOp::Run, |p| p.on_run()) {
                    Ok(proceed) => Ok(proceed),
                    Err(err) => {
                        self.fail(LifecycleOp::Run, from, err);
                        Ok(false)
                    }
                }
            }
            _ => {
                debug!(plugin = %self.source, state = %from, "run skipped");
                Ok(false)
            }
        }
    }

    fn tick(&mut self) {
        if self.state.get() != PluginState::Started {
            return;
        }
        let plugin = self.plugin.as_mut();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| plugin.on_tick())) {
            warn!(
                plugin = %self.source,
                panic = %panic_message(payload.as_ref()),
                "on_tick hook panicked"
            );
        }
    }

    fn set_error(&mut self, error: LanesError) -> Result<Transition, LanesError> {
        let from = self.state.get();
        if from == PluginState::Uninitialized {
            return Err(self.not_initialized());
        }
        Ok(self.fail(LifecycleOp::SetError, from, error))
    }

    fn reset_error(&mut self) -> Result<Transition, LanesError> {
        let from = self.state.get();
        match from {
            PluginState::Uninitialized => Err(self.not_initialized()),
            PluginState::Error => {
                let config = self.binding()?.config.clone();
                if !config.is_loaded()
                    && let Err(err) = config.load(false)
                {
                    return Ok(self.fail(LifecycleOp::ResetError, from, err));
                }
                self.last_error = None;
                Ok(self.applied(LifecycleOp::ResetError, from, PluginState::Ready))
            }
            _ => Ok(self.ignored(LifecycleOp::ResetError)),
        }
    }
}

/// Renders a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
