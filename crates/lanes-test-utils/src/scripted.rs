// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted plugin for deterministic lifecycle tests.
//!
//! `ScriptedPlugin` records every hook call into a shared [`CallLog`] and
//! can be told to fail, panic, block or hand off control on chosen hooks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lanes_core::{LanesError, Plugin, PluginContext, PluginInstance};
use lanes_plugin::{StaticUnit, TypeInfo};
use parking_lot::Mutex;

/// Qualified type name under which [`scripted_unit`] registers the plugin.
pub const SCRIPTED_TYPE: &str = "lanes::test::Scripted";

/// Plugin hooks, as recorded in a [`CallLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Init,
    Start,
    Run,
    Stop,
    Pause,
    Closing,
    Tick,
    Error,
}

/// One recorded hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub plugin: String,
    pub hook: Hook,
    /// Name of the thread the hook ran on.
    pub thread: Option<String>,
}

/// Shared, ordered record of hook calls across plugins.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, plugin: &str, hook: Hook) {
        self.calls.lock().push(Call {
            plugin: plugin.to_string(),
            hook,
            thread: std::thread::current().name().map(str::to_string),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// `(plugin, hook)` pairs in call order, ticks excluded.
    pub fn sequence(&self) -> Vec<(String, Hook)> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.hook != Hook::Tick)
            .map(|c| (c.plugin.clone(), c.hook))
            .collect()
    }

    /// Hooks called on `plugin`, ticks excluded.
    pub fn hooks_for(&self, plugin: &str) -> Vec<Hook> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.plugin == plugin && c.hook != Hook::Tick)
            .map(|c| c.hook)
            .collect()
    }

    pub fn count(&self, plugin: &str, hook: Hook) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.plugin == plugin && c.hook == hook)
            .count()
    }

    /// Plugins whose `Run` hook fired, in order.
    pub fn runs(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.hook == Hook::Run)
            .map(|c| c.plugin.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// A plugin whose behavior is set up front by the test.
pub struct ScriptedPlugin {
    label: String,
    log: CallLog,
    failing: HashSet<Hook>,
    panicking: HashSet<Hook>,
    blocking: Option<(Hook, Duration)>,
    run_result: bool,
    hand_off: bool,
    config_write: Option<(String, serde_json::Value)>,
    errors: Arc<Mutex<Vec<String>>>,
    ctx: Option<PluginContext>,
}

impl ScriptedPlugin {
    /// `label` is used in the log until `init` supplies the instance name.
    pub fn new(label: impl Into<String>, log: &CallLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            blocking: None,
            run_result: true,
            hand_off: false,
            config_write: None,
            errors: Arc::new(Mutex::new(Vec::new())),
            ctx: None,
        }
    }

    /// Makes `hook` return an error.
    pub fn failing(mut self, hook: Hook) -> Self {
        self.failing.insert(hook);
        self
    }

    /// Makes `hook` panic.
    pub fn panicking(mut self, hook: Hook) -> Self {
        self.panicking.insert(hook);
        self
    }

    /// Makes `hook` sleep the worker thread for `duration`.
    pub fn blocking(mut self, hook: Hook, duration: Duration) -> Self {
        self.blocking = Some((hook, duration));
        self
    }

    /// Value `on_run` returns.
    pub fn returning(mut self, keep_going: bool) -> Self {
        self.run_result = keep_going;
        self
    }

    /// Calls `run_next` from inside `on_run`.
    pub fn handing_off(mut self) -> Self {
        self.hand_off = true;
        self
    }

    /// Writes `key = value` to the plugin's configuration during `init`.
    pub fn writing_config(mut self, key: &str, value: serde_json::Value) -> Self {
        self.config_write = Some((key.to_string(), value));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Messages of every error passed to `on_error`.
    pub fn error_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.errors)
    }

    fn name(&self) -> String {
        self.ctx
            .as_ref()
            .map(|ctx| ctx.instance_name().to_string())
            .unwrap_or_else(|| self.label.clone())
    }

    fn hook(&mut self, hook: Hook) -> Result<(), LanesError> {
        self.log.record(&self.name(), hook);
        if let Some((blocking, duration)) = self.blocking {
            if blocking == hook {
                std::thread::sleep(duration);
            }
        }
        if self.panicking.contains(&hook) {
            panic!("scripted panic in {hook:?}");
        }
        if self.failing.contains(&hook) {
            return Err(LanesError::plugin(format!("scripted failure in {hook:?}")));
        }
        Ok(())
    }
}

impl Plugin for ScriptedPlugin {
    fn init(&mut self, ctx: &PluginContext) -> Result<(), LanesError> {
        self.ctx = Some(ctx.clone());
        self.hook(Hook::Init)?;
        if let Some((key, value)) = &self.config_write {
            ctx.config().set_value(key, value.clone())?;
        }
        Ok(())
    }

    fn on_error(&mut self, error: &LanesError) {
        self.log.record(&self.name(), Hook::Error);
        self.errors.lock().push(error.to_string());
    }

    fn on_start(&mut self) -> Result<(), LanesError> {
        self.hook(Hook::Start)
    }

    fn on_run(&mut self) -> Result<bool, LanesError> {
        self.hook(Hook::Run)?;
        if self.hand_off {
            if let Some(ctx) = &self.ctx {
                ctx.run_next()?;
            }
        }
        Ok(self.run_result)
    }

    fn on_stop(&mut self) -> Result<(), LanesError> {
        self.hook(Hook::Stop)
    }

    fn on_pause(&mut self) -> Result<(), LanesError> {
        self.hook(Hook::Pause)
    }

    fn on_closing(&mut self) -> Result<(), LanesError> {
        self.hook(Hook::Closing)
    }

    fn on_tick(&mut self) {
        self.log.record(&self.name(), Hook::Tick);
    }
}

/// A static unit exposing [`ScriptedPlugin`] as [`SCRIPTED_TYPE`].
///
/// Instances log into `log` under their instance name once initialized, and
/// as `unnamed` before that.
pub fn scripted_unit(id: &str, log: &CallLog) -> StaticUnit {
    let log = log.clone();
    StaticUnit::new(id).with_factory(
        TypeInfo::new(SCRIPTED_TYPE).with_description("Scripted test plugin"),
        move || {
            Ok(PluginInstance::Plugin(Box::new(ScriptedPlugin::new(
                "unnamed", &log,
            ))))
        },
    )
}
