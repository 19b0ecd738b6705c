// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel worker: the dedicated thread that owns a channel's chain.
//!
//! Everything that touches the chain or the pipeline cursor runs here, one
//! unit of work at a time. The chain lives in a [`LaneState`] that never
//! leaves the worker thread; work queued from the worker itself reaches it
//! through a thread-local slot and runs inline.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use lanes_core::{
    AuditSink, ConfigHandle, ConfigStoreProvider, Controller, ControllerBinding, ControllerInfo,
    LanesError, LifecycleOp, Transition,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::channel::{ChannelHandle, Registration};
use crate::controller::panic_message;
use crate::metrics;
use crate::report::{ChannelSnapshot, LifecycleReport, PluginReport};

/// A unit of work executed on the worker.
pub(crate) type Action = Box<dyn FnOnce(&LaneState) -> Result<(), LanesError> + Send + 'static>;

pub(crate) enum Message {
    Run(Action),
    /// Ends the loop once the channel is closing.
    Shutdown,
}

thread_local! {
    static CURRENT_LANE: RefCell<Option<Rc<LaneState>>> = const { RefCell::new(None) };
}

fn current_lane() -> Option<Rc<LaneState>> {
    CURRENT_LANE.with(|slot| slot.borrow().clone())
}

/// State shared between a channel's handles and its worker.
pub(crate) struct ChannelCore {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    sender: UnboundedSender<Message>,
    worker_thread: OnceLock<ThreadId>,
    closing: AtomicBool,
    killed: AtomicBool,
    run_next_pending: AtomicBool,
    queue_depth: AtomicUsize,
    pub(crate) snapshot: watch::Sender<ChannelSnapshot>,
    audit: Arc<dyn AuditSink>,
    config_stores: Arc<dyn ConfigStoreProvider>,
}

impl ChannelCore {
    pub(crate) fn new(
        name: &str,
        sender: UnboundedSender<Message>,
        audit: Arc<dyn AuditSink>,
        config_stores: Arc<dyn ConfigStoreProvider>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (snapshot, _) = watch::channel(ChannelSnapshot::empty(id, name));
        Self {
            id,
            name: name.to_string(),
            sender,
            worker_thread: OnceLock::new(),
            closing: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            run_next_pending: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            snapshot,
            audit,
            config_stores,
        }
    }

    pub(crate) fn closed(&self) -> LanesError {
        LanesError::ChannelClosed {
            name: self.name.clone(),
        }
    }

    pub(crate) fn is_worker_thread(&self) -> bool {
        self.worker_thread.get() == Some(&thread::current().id())
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    pub(crate) fn begin_closing(&self) {
        self.closing.store(true, Ordering::Release);
        self.snapshot.send_modify(|s| s.closing = true);
    }

    /// Abandons the worker: it drops remaining work at its next check.
    pub(crate) fn kill(&self) {
        self.closing.store(true, Ordering::Release);
        self.killed.store(true, Ordering::Release);
        self.snapshot.send_modify(|s| {
            s.closing = true;
            s.killed = true;
        });
    }

    /// Claims the single cross-thread run-next slot.
    pub(crate) fn claim_run_next(&self) -> Result<(), LanesError> {
        if self.run_next_pending.swap(true, Ordering::AcqRel) {
            return Err(LanesError::RunNextPending {
                channel: self.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn release_run_next(&self) {
        self.run_next_pending.store(false, Ordering::Release);
    }

    /// Queues `action`, or runs it before returning when called on the worker.
    pub(crate) fn queue(&self, action: Action) -> Result<(), LanesError> {
        if self.is_closing() || self.is_killed() {
            return Err(self.closed());
        }
        if self.is_worker_thread() {
            let lane = current_lane().ok_or_else(|| self.closed())?;
            lane.execute(action);
            return Ok(());
        }
        self.push(Message::Run(action))
    }

    /// Appends to the queue without the closing check.
    pub(crate) fn push(&self, message: Message) -> Result<(), LanesError> {
        // Counted before sending: the worker may dequeue before `send` returns.
        let depth = self.queue_depth.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if self.sender.send(message).is_err() {
            self.dequeued();
            return Err(self.closed());
        }
        metrics::set_queue_depth(&self.name, depth);
        Ok(())
    }

    fn dequeued(&self) {
        let previous = self
            .queue_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_sub(1)))
            .unwrap_or_default();
        metrics::set_queue_depth(&self.name, previous.saturating_sub(1));
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Acquire)
    }
}

/// A hosted controller plus what is needed to describe it while it is busy.
pub(crate) struct Hosted {
    pub(crate) name: String,
    controller: RefCell<Box<dyn Controller>>,
    info: RefCell<ControllerInfo>,
}

impl Hosted {
    fn new(controller: Box<dyn Controller>) -> Self {
        let info = controller.info();
        Self {
            name: info.name.clone(),
            controller: RefCell::new(controller),
            info: RefCell::new(info),
        }
    }

    /// Borrows the controller, failing if one of its own hooks is on the stack.
    pub(crate) fn with<R>(
        &self,
        channel: &str,
        f: impl FnOnce(&mut dyn Controller) -> R,
    ) -> Result<R, LanesError> {
        self.guarded(channel, "call", f)
    }

    /// Like [`Hosted::with`], turning a panic in `f` into
    /// [`LanesError::PluginPanicked`] attributed to `operation`.
    pub(crate) fn guarded<R>(
        &self,
        channel: &str,
        operation: &str,
        f: impl FnOnce(&mut dyn Controller) -> R,
    ) -> Result<R, LanesError> {
        let mut guard =
            self.controller
                .try_borrow_mut()
                .map_err(|_| LanesError::Reentrant {
                    channel: channel.to_string(),
                    name: self.name.clone(),
                })?;
        let controller = guard.as_mut();
        panic::catch_unwind(AssertUnwindSafe(|| f(controller))).map_err(|payload| {
            let err = LanesError::PluginPanicked {
                name: self.name.clone(),
                operation: operation.to_string(),
                message: panic_message(payload.as_ref()),
            };
            warn!(channel = %channel, plugin = %self.name, error = %err, "controller panicked");
            err
        })
    }

    /// Current info, or the last known one while the controller is busy.
    pub(crate) fn info(&self) -> ControllerInfo {
        match self.controller.try_borrow() {
            Ok(controller) => {
                let info = controller.info();
                *self.info.borrow_mut() = info.clone();
                info
            }
            Err(_) => self.info.borrow().clone(),
        }
    }

    fn apply(&self, channel: &str, op: LifecycleOp) -> PluginReport {
        let outcome = self.guarded(channel, op.as_ref(), |c| {
            let before = c.last_error();
            let result = match op {
                LifecycleOp::Initialize => c.initialize(),
                LifecycleOp::Start => c.start(),
                LifecycleOp::Stop => c.stop(),
                LifecycleOp::Pause => c.pause(),
                LifecycleOp::Closing => c.closing(),
                LifecycleOp::ResetError => c.reset_error(),
                // Neither changes state; running is not a fan-out operation.
                LifecycleOp::Run | LifecycleOp::SetError => Ok(Transition::Ignored {
                    state: c.state(),
                }),
            };
            let error = match (before, c.last_error()) {
                (Some(old), Some(new)) if Arc::ptr_eq(&old, &new) => None,
                (_, new) => new,
            };
            (result, error)
        });
        let (result, error) = match outcome {
            Ok((result, error)) => (result, error),
            Err(err) => (Err(err), None),
        };
        PluginReport {
            name: self.name.clone(),
            result: result.map_err(Arc::new),
            error,
        }
    }
}

/// The worker-confined part of a channel.
pub(crate) struct LaneState {
    core: Arc<ChannelCore>,
    chain: RefCell<Vec<Rc<Hosted>>>,
    cursor: Cell<Option<usize>>,
    last_error: RefCell<Option<Arc<LanesError>>>,
}

impl LaneState {
    fn new(core: Arc<ChannelCore>) -> Self {
        Self {
            core,
            chain: RefCell::new(Vec::new()),
            cursor: Cell::new(None),
            last_error: RefCell::new(None),
        }
    }

    pub(crate) fn channel_name(&self) -> &str {
        &self.core.name
    }

    /// Runs one unit of work; failures are recorded, never propagated.
    pub(crate) fn execute(&self, action: Action) {
        let failed = match panic::catch_unwind(AssertUnwindSafe(|| action(self))) {
            Ok(Ok(())) => false,
            Ok(Err(err)) => {
                self.record_failure(err);
                true
            }
            Err(payload) => {
                self.record_failure(LanesError::ActionPanicked {
                    channel: self.core.name.clone(),
                    message: panic_message(payload.as_ref()),
                });
                true
            }
        };
        metrics::record_action(&self.core.name, failed);
        self.publish();
    }

    fn record_failure(&self, err: LanesError) {
        warn!(channel = %self.core.name, error = %err, "queued action failed");
        *self.last_error.borrow_mut() = Some(Arc::new(err));
    }

    pub(crate) fn publish(&self) {
        let Ok(chain) = self.chain.try_borrow() else {
            return;
        };
        let cursor = self.cursor.get();
        let snapshot = ChannelSnapshot {
            id: self.core.id,
            name: self.core.name.clone(),
            plugins: chain.iter().map(|h| h.info()).collect(),
            cursor,
            active: cursor.and_then(|i| chain.get(i)).map(|h| h.name.clone()),
            last_error: self.last_error.borrow().clone(),
            closing: self.core.is_closing(),
            killed: self.core.is_killed(),
        };
        self.core.snapshot.send_replace(snapshot);
    }

    fn hosted(&self) -> Vec<Rc<Hosted>> {
        self.chain.borrow().clone()
    }

    pub(crate) fn find(&self, name: &str) -> Option<Rc<Hosted>> {
        self.chain.borrow().iter().find(|h| h.name == name).cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.chain.borrow().iter().map(|h| h.name.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.chain.borrow().len()
    }

    pub(crate) fn cursor(&self) -> Option<usize> {
        self.cursor.get()
    }

    pub(crate) fn active(&self) -> Option<Rc<Hosted>> {
        let index = self.cursor.get()?;
        self.chain.borrow().get(index).cloned()
    }

    /// Invokes `op` on every hosted controller in chain order.
    ///
    /// The chain is copied first so hooks may queue inline work that
    /// appends to it.
    pub(crate) fn apply(&self, op: LifecycleOp) -> LifecycleReport {
        let plugins = self
            .hosted()
            .iter()
            .map(|h| h.apply(&self.core.name, op))
            .collect();
        debug!(channel = %self.core.name, %op, "lifecycle operation applied");
        LifecycleReport {
            channel: self.core.name.clone(),
            op,
            plugins,
        }
    }

    pub(crate) fn with_controller<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut dyn Controller) -> R,
    ) -> Result<R, LanesError> {
        let hosted = self
            .find(name)
            .ok_or_else(|| LanesError::ControllerNotFound {
                channel: self.core.name.clone(),
                name: name.to_string(),
            })?;
        hosted.with(&self.core.name, f)
    }

    /// Moves the cursor one hop along the chain and returns the new active plugin.
    pub(crate) fn advance(&self) -> Option<String> {
        let chain = self.chain.borrow();
        let next = match self.cursor.get() {
            _ if chain.is_empty() => {
                debug!(channel = %self.core.name, "run_next on an empty chain");
                None
            }
            None => Some(0),
            Some(i) if i + 1 < chain.len() => Some(i + 1),
            Some(_) => None,
        };
        self.cursor.set(next);
        let active = next.and_then(|i| chain.get(i)).map(|h| h.name.clone());
        trace!(channel = %self.core.name, cursor = ?next, active = ?active, "cursor advanced");
        active
    }

    pub(crate) fn finish_run_next(&self) -> Option<String> {
        self.core.release_run_next();
        self.advance()
    }

    /// Runs the active plugin. `None` when no plugin is active.
    pub(crate) fn run_active(&self) -> Result<Option<bool>, LanesError> {
        let Some(hosted) = self.active() else {
            return Ok(None);
        };
        hosted.guarded(&self.core.name, "run", |c| c.run())?.map(Some)
    }

    /// Binds `controller` to this channel and appends it to the chain.
    pub(crate) fn add(
        &self,
        mut controller: Box<dyn Controller>,
        registration: Registration,
    ) -> Result<ControllerInfo, LanesError> {
        let channel = &self.core.name;
        let name = registration.instance_name;
        if self.find(&name).is_some() {
            return Err(LanesError::NameCollision {
                channel: channel.clone(),
                name,
            });
        }
        let config = ConfigHandle::new(
            format!("{channel}/{name}"),
            self.core.config_stores.open(channel, &name),
        );
        controller.bind(ControllerBinding {
            channel_id: self.core.id,
            channel_name: channel.clone(),
            library: registration.library,
            type_name: registration.type_name,
            instance_name: name,
            id: registration.id.unwrap_or_else(Uuid::new_v4),
            pipeline: Arc::new(ChannelHandle::new(Arc::clone(&self.core))),
            config,
            audit: Arc::clone(&self.core.audit),
        });
        let hosted = Rc::new(Hosted::new(controller));
        let info = hosted.info();
        self.chain.borrow_mut().push(hosted);
        info!(
            channel = %channel,
            plugin = %info.name,
            type_name = %info.type_name,
            id = %info.id,
            "plugin instance added"
        );
        Ok(info)
    }

    /// Tears down every controller and empties the chain.
    pub(crate) fn clear(&self) -> LifecycleReport {
        let report = self.apply(LifecycleOp::Closing);
        self.chain.borrow_mut().clear();
        self.cursor.set(None);
        report
    }

    fn tick_started(&self) {
        for hosted in self.hosted() {
            // A busy controller is mid-hook; it will be ticked next time.
            // A panicking tick is logged by the guard.
            let _ = hosted.guarded(&self.core.name, "tick", |c| c.tick());
        }
    }
}

/// Starts the worker thread for `core`.
pub(crate) fn spawn(
    core: Arc<ChannelCore>,
    receiver: UnboundedReceiver<Message>,
    idle_interval: Duration,
) -> Result<JoinHandle<()>, LanesError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|source| LanesError::Io {
            context: format!("building the runtime for channel '{}'", core.name),
            source,
        })?;
    let worker_core = Arc::clone(&core);
    let handle = thread::Builder::new()
        .name(format!("lane-{}", core.name))
        .spawn(move || run(worker_core, runtime, receiver, idle_interval))
        .map_err(|source| LanesError::Io {
            context: format!("spawning the worker for channel '{}'", core.name),
            source,
        })?;
    let _ = core.worker_thread.set(handle.thread().id());
    Ok(handle)
}

fn run(
    core: Arc<ChannelCore>,
    runtime: tokio::runtime::Runtime,
    mut receiver: UnboundedReceiver<Message>,
    idle_interval: Duration,
) {
    let lane = Rc::new(LaneState::new(Arc::clone(&core)));
    CURRENT_LANE.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&lane)));
    debug!(channel = %core.name, "worker started");

    runtime.block_on(async {
        loop {
            if core.is_killed() {
                break;
            }
            match tokio::time::timeout(idle_interval, receiver.recv()).await {
                Ok(Some(Message::Run(action))) => {
                    core.dequeued();
                    if core.is_killed() {
                        break;
                    }
                    lane.execute(action);
                }
                Ok(Some(Message::Shutdown)) => {
                    core.dequeued();
                    if core.is_closing() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => lane.tick_started(),
            }
        }
    });

    if core.is_killed() {
        warn!(channel = %core.name, "worker abandoned; discarding queued work");
    }
    CURRENT_LANE.with(|slot| slot.borrow_mut().take());
    // Controllers are dropped here, on the thread that ran them.
    lane.chain.borrow_mut().clear();
    debug!(channel = %core.name, "worker stopped");
}
