// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The channel: an isolated, serialized execution lane hosting a chain of
//! plugin controllers.
//!
//! Every request is marshaled onto the channel's worker thread and executed
//! in FIFO order. Lifecycle operations are awaited against an optional
//! timeout; a timeout reports [`OperationOutcome::TimedOut`] but does not
//! retract the queued work.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use lanes_core::{
    AuditSink, ConfigStoreProvider, Controller, ControllerInfo, LanesError, LifecycleOp, Pipeline,
    Transition,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::TracingAuditSink;
use crate::controller::panic_message;
use crate::config_store::MemoryConfigStoreProvider;
use crate::report::{ChannelSnapshot, LifecycleReport, OperationOutcome};
use crate::worker::{self, ChannelCore, LaneState, Message};

/// Default time a worker waits for work before ticking started plugins.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(250);

/// Collaborators and tuning for a new channel.
#[derive(Clone)]
pub struct ChannelOptions {
    pub idle_interval: Duration,
    pub audit: Arc<dyn AuditSink>,
    pub config_stores: Arc<dyn ConfigStoreProvider>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            idle_interval: DEFAULT_IDLE_INTERVAL,
            audit: Arc::new(TracingAuditSink),
            config_stores: Arc::new(MemoryConfigStoreProvider::new()),
        }
    }
}

impl std::fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("idle_interval", &self.idle_interval)
            .finish_non_exhaustive()
    }
}

/// Identity assigned to a controller when it joins a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Library that provided the type, if any.
    pub library: Option<String>,
    /// Qualified type name.
    pub type_name: String,
    /// Channel-scoped instance name.
    pub instance_name: String,
    /// Fixed id; generated when `None`.
    pub id: Option<Uuid>,
}

impl Registration {
    pub fn new(type_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            library: None,
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            id: None,
        }
    }

    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// Read access to a channel's chain from inside a unit of work.
///
/// Only obtainable on the channel's worker, through [`Channel::call`] or
/// [`Channel::queue_action`].
pub struct Lane<'a> {
    state: &'a LaneState,
}

impl<'a> Lane<'a> {
    fn new(state: &'a LaneState) -> Self {
        Self { state }
    }

    pub fn channel_name(&self) -> &str {
        self.state.channel_name()
    }

    /// Number of hosted controllers.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instance names in chain order.
    pub fn names(&self) -> Vec<String> {
        self.state.names()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.state.cursor()
    }

    /// Name of the active plugin.
    pub fn active(&self) -> Option<String> {
        self.state.active().map(|h| h.name.clone())
    }

    /// Advances the pipeline cursor immediately.
    pub fn run_next(&self) -> Option<String> {
        self.state.advance()
    }

    pub fn controller_info(&self, name: &str) -> Option<ControllerInfo> {
        self.state.find(name).map(|h| h.info())
    }

    /// Runs `f` against the named controller.
    pub fn with_controller<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn Controller) -> R,
    ) -> Result<R, LanesError> {
        self.state.with_controller(name, f)
    }
}

/// Cloneable handle to a channel's queue, usable from any thread.
///
/// Plugins see it as their [`Pipeline`].
#[derive(Clone)]
pub struct ChannelHandle {
    core: Arc<ChannelCore>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .finish()
    }
}

impl ChannelHandle {
    pub(crate) fn new(core: Arc<ChannelCore>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Queues `work`; on the worker itself it runs before this returns.
    ///
    /// A failing or panicking unit of work is recorded as the channel's last
    /// error and does not stop the worker.
    pub fn queue_action<F>(&self, work: F) -> Result<(), LanesError>
    where
        F: FnOnce(&Lane<'_>) -> Result<(), LanesError> + Send + 'static,
    {
        self.core.queue(Box::new(move |state| work(&Lane::new(state))))
    }
}

impl Pipeline for ChannelHandle {
    fn channel_name(&self) -> &str {
        &self.core.name
    }

    fn run_next(&self) -> Result<(), LanesError> {
        if self.core.is_worker_thread() {
            return self.core.queue(Box::new(|state| {
                state.advance();
                Ok(())
            }));
        }
        self.core.claim_run_next()?;
        let queued = self.core.queue(Box::new(|state| {
            state.finish_run_next();
            Ok(())
        }));
        if queued.is_err() {
            self.core.release_run_next();
        }
        queued
    }

    fn is_worker_thread(&self) -> bool {
        self.core.is_worker_thread()
    }
}

/// A serialized execution lane with its own worker thread.
pub struct Channel {
    core: Arc<ChannelCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("closing", &self.core.is_closing())
            .finish()
    }
}

impl Channel {
    /// Creates a channel with the default collaborators.
    pub fn new(name: impl Into<String>) -> Result<Self, LanesError> {
        Self::with_options(name, ChannelOptions::default())
    }

    /// Creates a channel and starts its worker thread.
    pub fn with_options(
        name: impl Into<String>,
        options: ChannelOptions,
    ) -> Result<Self, LanesError> {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let core = Arc::new(ChannelCore::new(
            &name,
            sender,
            options.audit,
            options.config_stores,
        ));
        let worker = worker::spawn(Arc::clone(&core), receiver, options.idle_interval)?;
        info!(channel = %name, id = %core.id, "channel created");
        Ok(Self {
            core,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// A cloneable handle to this channel's queue.
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle::new(Arc::clone(&self.core))
    }

    /// This channel as a plugin sees it.
    pub fn pipeline(&self) -> Arc<dyn Pipeline> {
        Arc::new(self.handle())
    }

    /// See [`ChannelHandle::queue_action`].
    pub fn queue_action<F>(&self, work: F) -> Result<(), LanesError>
    where
        F: FnOnce(&Lane<'_>) -> Result<(), LanesError> + Send + 'static,
    {
        self.handle().queue_action(work)
    }

    /// Runs `f` on the worker and returns its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, LanesError>
    where
        R: Send + 'static,
        F: FnOnce(&Lane<'_>) -> R + Send + 'static,
    {
        self.exchange(move |state| f(&Lane::new(state))).await
    }

    async fn request<R, F>(&self, timeout: Option<Duration>, work: F) -> Result<Option<R>, LanesError>
    where
        R: Send + 'static,
        F: FnOnce(&LaneState) -> R + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        self.core.queue(Box::new(move |state| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(state)));
            state.publish();
            match outcome {
                Ok(value) => {
                    let _ = reply.send(Ok(value));
                    Ok(())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let _ = reply.send(Err(LanesError::ActionPanicked {
                        channel: state.channel_name().to_string(),
                        message: message.clone(),
                    }));
                    // Also recorded as the channel's last error.
                    Err(LanesError::ActionPanicked {
                        channel: state.channel_name().to_string(),
                        message,
                    })
                }
            }
        }))?;
        self.await_reply(receiver, timeout).await
    }

    async fn exchange<R, F>(&self, work: F) -> Result<R, LanesError>
    where
        R: Send + 'static,
        F: FnOnce(&LaneState) -> R + Send + 'static,
    {
        self.request(None, work)
            .await?
            .ok_or_else(|| self.core.closed())
    }

    async fn await_reply<R>(
        &self,
        receiver: oneshot::Receiver<Result<R, LanesError>>,
        timeout: Option<Duration>,
    ) -> Result<Option<R>, LanesError> {
        let reply = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(reply) => reply,
                Err(_) => return Ok(None),
            },
            None => receiver.await,
        };
        reply.map_err(|_| self.core.closed())?.map(Some)
    }

    async fn lifecycle(
        &self,
        op: LifecycleOp,
        timeout: Option<Duration>,
    ) -> Result<OperationOutcome, LanesError> {
        match self.request(timeout, move |state| state.apply(op)).await? {
            Some(report) => Ok(OperationOutcome::Completed(report)),
            None => {
                warn!(channel = %self.core.name, %op, ?timeout, "lifecycle operation timed out");
                Ok(OperationOutcome::TimedOut)
            }
        }
    }

    /// Initializes every hosted plugin.
    pub async fn initialize(
        &self,
        timeout: Option<Duration>,
    ) -> Result<OperationOutcome, LanesError> {
        self.lifecycle(LifecycleOp::Initialize, timeout).await
    }

    /// Starts every hosted plugin.
    pub async fn start(&self, timeout: Option<Duration>) -> Result<OperationOutcome, LanesError> {
        self.lifecycle(LifecycleOp::Start, timeout).await
    }

    /// Stops every hosted plugin.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<OperationOutcome, LanesError> {
        self.lifecycle(LifecycleOp::Stop, timeout).await
    }

    /// Pauses every hosted plugin.
    pub async fn pause(&self, timeout: Option<Duration>) -> Result<OperationOutcome, LanesError> {
        self.lifecycle(LifecycleOp::Pause, timeout).await
    }

    /// Tears down every hosted plugin; they stay hosted.
    pub async fn closing(&self, timeout: Option<Duration>) -> Result<OperationOutcome, LanesError> {
        self.lifecycle(LifecycleOp::Closing, timeout).await
    }

    /// Tears down and drops every hosted plugin and resets the cursor.
    pub async fn clear(&self, timeout: Option<Duration>) -> Result<OperationOutcome, LanesError> {
        Ok(self
            .request(timeout, |state| state.clear())
            .await?
            .map_or(OperationOutcome::TimedOut, OperationOutcome::Completed))
    }

    /// Stops and tears down every plugin, then ends the worker.
    ///
    /// If that does not finish within `timeout` the worker is abandoned and
    /// [`OperationOutcome::ForceKilled`] is returned. Threads cannot be
    /// preempted, so a hook that never returns keeps its thread alive; the
    /// plugin may be left mid-operation and the channel is unusable.
    pub async fn terminate(&self, timeout: Duration) -> Result<OperationOutcome, LanesError> {
        let Some(worker) = self.worker.lock().take() else {
            return Err(self.core.closed());
        };
        self.core.begin_closing();

        let (reply, receiver) = oneshot::channel::<LifecycleReport>();
        let queued = self
            .core
            .push(Message::Run(Box::new(move |state| {
                state.apply(LifecycleOp::Stop);
                let report = state.apply(LifecycleOp::Closing);
                state.publish();
                let _ = reply.send(report);
                Ok(())
            })))
            .and_then(|()| self.core.push(Message::Shutdown));
        if let Err(err) = queued {
            join(worker).await;
            return Err(err);
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(report)) => {
                join(worker).await;
                info!(channel = %self.core.name, "channel terminated");
                Ok(OperationOutcome::Completed(report))
            }
            Ok(Err(_)) => {
                join(worker).await;
                Err(self.core.closed())
            }
            Err(_) => {
                self.core.kill();
                drop(worker);
                warn!(
                    channel = %self.core.name,
                    ?timeout,
                    "channel did not terminate in time; worker abandoned"
                );
                Ok(OperationOutcome::ForceKilled)
            }
        }
    }

    /// Hands control to the next plugin and returns the new active plugin.
    ///
    /// Returns `None` when the cursor wrapped past the end or the chain is empty.
    pub async fn run_next(&self) -> Result<Option<String>, LanesError> {
        self.core.claim_run_next()?;
        let result = self.exchange(|state| state.finish_run_next()).await;
        if result.is_err() {
            self.core.release_run_next();
        }
        result
    }

    /// Runs the active plugin's run hook. `None` when no plugin is active.
    pub async fn run_active(&self) -> Result<Option<bool>, LanesError> {
        self.exchange(|state| state.run_active()).await?
    }

    /// Binds `controller` and appends it to the chain.
    ///
    /// Fails with [`LanesError::NameCollision`] if the instance name is taken.
    pub async fn add_controller(
        &self,
        controller: Box<dyn Controller>,
        registration: Registration,
    ) -> Result<ControllerInfo, LanesError> {
        self.exchange(move |state| state.add(controller, registration))
            .await?
    }

    /// Assigns an error to the named plugin.
    pub async fn set_plugin_error(
        &self,
        name: impl Into<String>,
        error: LanesError,
    ) -> Result<Transition, LanesError> {
        let name = name.into();
        self.exchange(move |state| state.with_controller(&name, |c| c.set_error(error)))
            .await??
    }

    /// Moves the named plugin out of `Error`.
    pub async fn reset_plugin_error(
        &self,
        name: impl Into<String>,
    ) -> Result<Transition, LanesError> {
        let name = name.into();
        self.exchange(move |state| state.with_controller(&name, |c| c.reset_error()))
            .await??
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.core.snapshot.borrow().clone()
    }

    /// Receiver notified after every unit of work.
    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.core.snapshot.subscribe()
    }

    /// Name of the active plugin.
    pub fn active_plugin(&self) -> Option<String> {
        self.core.snapshot.borrow().active.clone()
    }

    /// Instance names in chain order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.core
            .snapshot
            .borrow()
            .plugins
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn controller_info(&self, name: &str) -> Option<ControllerInfo> {
        self.core.snapshot.borrow().plugin(name).cloned()
    }

    /// Whether an instance named `name` is hosted.
    pub fn contains(&self, name: &str) -> bool {
        self.core.snapshot.borrow().plugin(name).is_some()
    }

    /// Last failure of a unit of work on this channel.
    pub fn last_error(&self) -> Option<Arc<LanesError>> {
        self.core.snapshot.borrow().last_error.clone()
    }

    /// Units of work queued and not yet picked up by the worker.
    pub fn queue_depth(&self) -> usize {
        self.core.queue_depth()
    }

    /// Whether the channel accepts no more work.
    pub fn is_closed(&self) -> bool {
        self.core.is_closing() || self.core.is_killed()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let Some(worker) = self.worker.get_mut().take() else {
            return;
        };
        // Unterminated channels tear their plugins down on the way out.
        self.core.begin_closing();
        let _ = self.core.push(Message::Run(Box::new(|state| {
            state.clear();
            Ok(())
        })));
        let _ = self.core.push(Message::Shutdown);
        drop(worker);
    }
}

async fn join(worker: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || worker.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!("channel worker panicked"),
        Err(err) => warn!(error = %err, "failed to join channel worker"),
    }
}
