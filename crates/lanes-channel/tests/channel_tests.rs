// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for channel queueing, lifecycle fan-out and teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use lanes_channel::{Channel, ChannelOptions, OperationOutcome, PluginController, Registration};
use lanes_core::{Controller, ControllerBinding, LanesError, Pipeline, PluginState, Transition};
use lanes_test_utils::{AuditLevel, CallLog, Hook, ScriptedPlugin, TestHarness};
use parking_lot::Mutex;
use proptest::prelude::*;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

/// Waits until everything queued before it has run.
async fn flush(channel: &Channel) {
    channel.call(|_| ()).await.unwrap();
}

fn state_of(channel: &Channel, name: &str) -> PluginState {
    channel.controller_info(name).unwrap().state
}

#[tokio::test]
async fn queued_actions_run_in_fifo_order() {
    let channel = Channel::new("fifo").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..100 {
        let seen = Arc::clone(&seen);
        channel
            .queue_action(move |_| {
                seen.lock().push(i);
                Ok(())
            })
            .unwrap();
    }
    flush(&channel).await;

    assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn queue_action_on_worker_runs_inline() {
    let channel = Channel::new("inline").unwrap();
    let handle = channel.handle();
    let order = Arc::new(Mutex::new(Vec::new()));

    let inner = Arc::clone(&order);
    let on_worker = channel
        .call(move |_| {
            let nested = Arc::clone(&inner);
            handle
                .queue_action(move |_| {
                    nested.lock().push("nested");
                    Ok(())
                })
                .unwrap();
            inner.lock().push("after");
            handle.is_worker_thread()
        })
        .await
        .unwrap();

    assert!(on_worker);
    assert!(!channel.handle().is_worker_thread());
    assert_eq!(*order.lock(), vec!["nested", "after"]);
}

#[tokio::test]
async fn hooks_run_on_the_channel_worker() {
    let harness = TestHarness::builder()
        .with_channel("relay", &["only"])
        .build()
        .await
        .unwrap();
    harness.channels.start(WAIT).await;

    let calls = harness.log.calls();
    assert!(!calls.is_empty());
    assert!(
        calls
            .iter()
            .all(|c| c.thread.as_deref() == Some("lane-relay"))
    );
}

#[tokio::test]
async fn failing_start_only_affects_that_plugin() {
    let builder = TestHarness::builder();
    let plugins = vec![
        builder.plugin("p1"),
        builder.plugin("p2").failing(Hook::Start),
        builder.plugin("p3"),
    ];
    let harness = builder
        .with_scripted_channel("main", plugins)
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");

    let outcome = channel.start(WAIT).await.unwrap();
    let report = outcome.report().unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.failures().count(), 1);
    assert_eq!(report.get("p1").unwrap().state(), Some(PluginState::Started));
    assert_eq!(report.get("p2").unwrap().state(), Some(PluginState::Error));
    assert!(report.get("p2").unwrap().error.is_some());
    assert_eq!(report.get("p3").unwrap().state(), Some(PluginState::Started));

    let p2 = channel.controller_info("p2").unwrap();
    assert_eq!(p2.state, PluginState::Error);
    assert!(p2.last_error.unwrap().contains("scripted failure"));
    assert_eq!(harness.log.count("p2", Hook::Error), 1);
    assert_eq!(harness.audit.at_level(AuditLevel::Error).len(), 1);
    assert!(harness.audit.contains("main/p1", "started"));
}

#[tokio::test]
async fn plugins_are_visited_in_chain_order() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a", "b", "c"])
        .build()
        .await
        .unwrap();
    harness.channel("main").initialize(WAIT).await.unwrap();

    let inits: Vec<_> = harness
        .log
        .sequence()
        .into_iter()
        .filter(|(_, hook)| *hook == Hook::Init)
        .map(|(name, _)| name)
        .collect();
    assert_eq!(inits, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn panicking_hook_is_recorded_as_error() {
    let builder = TestHarness::builder();
    let plugins = vec![builder.plugin("bad").panicking(Hook::Start)];
    let harness = builder
        .with_scripted_channel("main", plugins)
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");

    channel.start(WAIT).await.unwrap();
    let info = channel.controller_info("bad").unwrap();
    assert_eq!(info.state, PluginState::Error);
    assert!(info.last_error.unwrap().contains("panicked"));

    // The worker survived.
    flush(channel).await;
}

#[tokio::test]
async fn panicking_action_is_recorded_on_the_channel() {
    let channel = Channel::new("panics").unwrap();
    channel
        .queue_action(|_| -> Result<(), LanesError> { panic!("boom") })
        .unwrap();
    flush(&channel).await;

    let err = channel.last_error().unwrap();
    assert!(matches!(*err, LanesError::ActionPanicked { .. }));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn failing_action_is_recorded_on_the_channel() {
    let channel = Channel::new("fails").unwrap();
    channel
        .queue_action(|_| Err(LanesError::plugin("nope")))
        .unwrap();
    flush(&channel).await;
    assert!(channel.last_error().unwrap().to_string().contains("nope"));
}

#[tokio::test]
async fn duplicate_instance_names_are_rejected() {
    let harness = TestHarness::builder()
        .with_channel("main", &["dup"])
        .build()
        .await
        .unwrap();

    let err = harness
        .add_plugin("main", ScriptedPlugin::new("dup", &harness.log))
        .await
        .unwrap_err();
    assert!(matches!(err, LanesError::NameCollision { ref name, .. } if name == "dup"));
    assert_eq!(harness.channel("main").plugin_names(), vec!["dup"]);
}

#[tokio::test]
async fn cross_thread_run_next_is_rejected_while_pending() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a", "b"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    let pipeline = channel.pipeline();

    channel
        .queue_action(|_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .unwrap();
    pipeline.run_next().unwrap();
    let err = pipeline.run_next().unwrap_err();
    assert!(matches!(err, LanesError::RunNextPending { .. }));

    flush(channel).await;
    assert_eq!(channel.active_plugin().as_deref(), Some("a"));

    // The flag clears once the request ran.
    pipeline.run_next().unwrap();
    flush(channel).await;
    assert_eq!(channel.active_plugin().as_deref(), Some("b"));
}

#[tokio::test]
async fn run_next_from_a_plugin_hands_off_control() {
    let builder = TestHarness::builder();
    let plugins = vec![builder.plugin("first").handing_off(), builder.plugin("second")];
    let harness = builder
        .with_scripted_channel("main", plugins)
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.start(WAIT).await.unwrap();

    assert_eq!(channel.run_next().await.unwrap().as_deref(), Some("first"));
    assert_eq!(channel.run_active().await.unwrap(), Some(true));
    assert_eq!(channel.active_plugin().as_deref(), Some("second"));
    assert_eq!(channel.run_active().await.unwrap(), Some(true));
    assert_eq!(harness.log.runs(), vec!["first", "second"]);
}

#[tokio::test]
async fn run_active_without_active_plugin_is_none() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a"])
        .build()
        .await
        .unwrap();
    assert_eq!(harness.channel("main").run_active().await.unwrap(), None);
}

#[tokio::test]
async fn run_in_non_started_state_does_not_call_the_hook() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.initialize(WAIT).await.unwrap();
    channel.run_next().await.unwrap();

    assert_eq!(channel.run_active().await.unwrap(), Some(false));
    assert_eq!(harness.log.count("a", Hook::Run), 0);
}

#[tokio::test]
async fn timeout_reports_incomplete_but_work_still_runs() {
    let builder = TestHarness::builder();
    let plugins = vec![
        builder
            .plugin("slow")
            .blocking(Hook::Start, Duration::from_millis(300)),
    ];
    let harness = builder
        .with_scripted_channel("main", plugins)
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");

    let outcome = channel.start(Some(Duration::from_millis(10))).await.unwrap();
    assert!(matches!(outcome, OperationOutcome::TimedOut));

    flush(channel).await;
    assert_eq!(state_of(channel, "slow"), PluginState::Started);
}

#[tokio::test]
async fn terminate_tears_down_and_closes() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a", "b"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.start(WAIT).await.unwrap();

    let outcome = channel.terminate(Duration::from_secs(5)).await.unwrap();
    let report = outcome.report().unwrap();
    assert!(report.succeeded());
    assert_eq!(
        report.get("a").unwrap().state(),
        Some(PluginState::Uninitialized)
    );
    assert!(channel.is_closed());
    assert_eq!(harness.log.count("a", Hook::Stop), 1);

    assert!(matches!(
        channel.queue_action(|_| Ok(())),
        Err(LanesError::ChannelClosed { .. })
    ));
    assert!(matches!(
        channel.start(WAIT).await,
        Err(LanesError::ChannelClosed { .. })
    ));
    assert!(channel.terminate(Duration::from_secs(1)).await.is_err());
}

#[tokio::test]
async fn terminate_kills_a_stuck_worker() {
    let builder = TestHarness::builder();
    let plugins = vec![
        builder
            .plugin("stuck")
            .blocking(Hook::Stop, Duration::from_millis(500)),
    ];
    let harness = builder
        .with_scripted_channel("main", plugins)
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.start(WAIT).await.unwrap();

    let outcome = channel.terminate(Duration::ZERO).await.unwrap();
    assert!(matches!(outcome, OperationOutcome::ForceKilled));
    assert!(channel.is_closed());
    assert!(matches!(
        channel.stop(WAIT).await,
        Err(LanesError::ChannelClosed { .. })
    ));
}

#[tokio::test]
async fn clear_tears_down_and_empties_the_chain() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a", "b"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.start(WAIT).await.unwrap();
    channel.run_next().await.unwrap();

    let outcome = channel.clear(WAIT).await.unwrap();
    assert!(outcome.succeeded());
    assert!(channel.plugin_names().is_empty());
    assert_eq!(channel.active_plugin(), None);
    assert_eq!(harness.log.count("b", Hook::Closing), 2);
}

#[tokio::test]
async fn set_and_reset_plugin_error() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.start(WAIT).await.unwrap();

    channel
        .set_plugin_error("a", LanesError::plugin("operator"))
        .await
        .unwrap();
    assert_eq!(state_of(channel, "a"), PluginState::Error);
    assert_eq!(harness.log.count("a", Hook::Error), 1);

    channel.reset_plugin_error("a").await.unwrap();
    let info = channel.controller_info("a").unwrap();
    assert_eq!(info.state, PluginState::Ready);
    assert!(info.last_error.is_none());

    let err = channel.reset_plugin_error("missing").await.unwrap_err();
    assert!(matches!(err, LanesError::ControllerNotFound { .. }));
}

#[tokio::test]
async fn snapshots_are_published_after_each_operation() {
    let harness = TestHarness::builder()
        .with_channel("main", &["a"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    let mut updates = channel.subscribe();
    let _ = updates.borrow_and_update();

    channel.start(WAIT).await.unwrap();
    assert!(updates.has_changed().unwrap());
    let snapshot = updates.borrow_and_update().clone();
    assert_eq!(snapshot.name, "main");
    assert_eq!(snapshot.plugin("a").unwrap().state, PluginState::Started);
    assert!(!snapshot.closing);
}

#[tokio::test]
async fn idle_worker_ticks_started_plugins() {
    let harness = TestHarness::builder()
        .with_idle_interval(Duration::from_millis(10))
        .with_channel("main", &["ticker", "idle"])
        .build()
        .await
        .unwrap();
    let channel = harness.channel("main");
    channel.start(WAIT).await.unwrap();
    channel
        .call(|lane| lane.with_controller("idle", |c| c.pause().map(|_| ())))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    harness.log.clear();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(harness.log.count("ticker", Hook::Tick) > 0);
    assert_eq!(harness.log.count("idle", Hook::Tick), 0);
}

#[tokio::test]
async fn configuration_writes_are_persisted() {
    let builder = TestHarness::builder();
    let plugins = vec![
        builder
            .plugin("writer")
            .writing_config("greeting", serde_json::json!("hello")),
    ];
    let harness = builder
        .with_scripted_channel("main", plugins)
        .build()
        .await
        .unwrap();
    harness.channel("main").initialize(WAIT).await.unwrap();

    let saved = harness.configs.saved("main", "writer");
    assert_eq!(saved.get("greeting"), Some(&serde_json::json!("hello")));
}

#[tokio::test]
async fn channel_set_isolates_failures() {
    let builder = TestHarness::builder();
    let failing = vec![builder.plugin("broken").failing(Hook::Start)];
    let harness = builder
        .with_scripted_channel("a", failing)
        .with_channel("b", &["fine"])
        .build()
        .await
        .unwrap();

    let report = harness.channels.start(WAIT).await;
    assert_eq!(report.len(), 2);
    assert_eq!(report.failed_channels(), vec!["a"]);
    assert_eq!(
        state_of(harness.channel("b"), "fine"),
        PluginState::Started
    );

    let report = harness.channels.terminate(Duration::from_secs(5)).await;
    assert!(report.get("a").unwrap().is_ok());
    assert!(report.get("b").unwrap().is_ok());
    assert!(harness.channels.iter().all(Channel::is_closed));
}

#[tokio::test]
async fn controllers_can_be_hosted_directly() {
    let log = CallLog::new();
    let channel = Channel::new("direct").unwrap();
    let info = channel
        .add_controller(
            Box::new(PluginController::new(Box::new(ScriptedPlugin::new(
                "solo", &log,
            )))),
            Registration::new("lanes::test::Scripted", "solo"),
        )
        .await
        .unwrap();
    assert_eq!(info.state, PluginState::Uninitialized);
    assert!(info.library.is_none());
    assert!(channel.contains("solo"));
}

/// A self-controlling type whose hooks can be made to panic.
#[derive(Default)]
struct Volatile {
    binding: Option<ControllerBinding>,
    state: Option<PluginState>,
    panic_on_start: bool,
    panic_on_tick: bool,
    ticks: Arc<AtomicUsize>,
}

impl Volatile {
    fn go(&mut self, to: PluginState) -> Result<Transition, LanesError> {
        let from = self.state();
        self.state = Some(to);
        Ok(Transition::Applied { from, to })
    }
}

impl Controller for Volatile {
    fn id(&self) -> uuid::Uuid {
        self.binding.as_ref().map(|b| b.id).unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.binding
            .as_ref()
            .map(|b| b.instance_name.as_str())
            .unwrap_or_default()
    }

    fn type_name(&self) -> &str {
        "volatile::Volatile"
    }

    fn state(&self) -> PluginState {
        self.state.unwrap_or(PluginState::Uninitialized)
    }

    fn last_error(&self) -> Option<Arc<LanesError>> {
        None
    }

    fn bind(&mut self, binding: ControllerBinding) {
        self.binding = Some(binding);
    }

    fn initialize(&mut self) -> Result<Transition, LanesError> {
        self.go(PluginState::Ready)
    }

    fn start(&mut self) -> Result<Transition, LanesError> {
        if self.panic_on_start {
            panic!("start exploded");
        }
        self.go(PluginState::Started)
    }

    fn stop(&mut self) -> Result<Transition, LanesError> {
        self.go(PluginState::Stopped)
    }

    fn pause(&mut self) -> Result<Transition, LanesError> {
        self.go(PluginState::Paused)
    }

    fn closing(&mut self) -> Result<Transition, LanesError> {
        self.go(PluginState::Uninitialized)
    }

    fn run(&mut self) -> Result<bool, LanesError> {
        Ok(false)
    }

    fn tick(&mut self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_tick {
            panic!("tick exploded");
        }
    }

    fn set_error(&mut self, _error: LanesError) -> Result<Transition, LanesError> {
        self.go(PluginState::Error)
    }

    fn reset_error(&mut self) -> Result<Transition, LanesError> {
        self.go(PluginState::Uninitialized)
    }
}

async fn host_scripted(channel: &Channel, name: &str, log: &CallLog) {
    channel
        .add_controller(
            Box::new(PluginController::new(Box::new(ScriptedPlugin::new(name, log)))),
            Registration::new("lanes::test::Scripted", name),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_producers_keep_the_queue_consistent() {
    let channel = Channel::new("crowded").unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let handle = channel.handle();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for _ in 0..250 {
                    let done = Arc::clone(&done);
                    handle
                        .queue_action(move |_| {
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    flush(&channel).await;

    assert_eq!(done.load(Ordering::SeqCst), 2000);
    assert_eq!(channel.queue_depth(), 0);
    assert!(channel.last_error().is_none());
}

#[tokio::test]
async fn controller_panicking_in_start_does_not_stop_its_siblings() {
    let log = CallLog::new();
    let channel = Channel::new("mixed").unwrap();
    host_scripted(&channel, "first", &log).await;
    channel
        .add_controller(
            Box::new(Volatile {
                panic_on_start: true,
                ..Volatile::default()
            }),
            Registration::new("volatile::Volatile", "volatile"),
        )
        .await
        .unwrap();
    host_scripted(&channel, "last", &log).await;

    let outcome = channel.start(WAIT).await.unwrap();
    let report = outcome.report().unwrap();
    let err = report.get("volatile").unwrap().result.as_ref().unwrap_err();
    assert!(matches!(
        &**err,
        LanesError::PluginPanicked { operation, .. } if operation == "start"
    ));
    assert!(report.get("first").unwrap().result.is_ok());
    assert!(report.get("last").unwrap().result.is_ok());
    assert_eq!(state_of(&channel, "first"), PluginState::Started);
    assert_eq!(state_of(&channel, "last"), PluginState::Started);
    assert!(!channel.is_closed());
    assert_eq!(channel.call(|_| 7).await.unwrap(), 7);
}

#[tokio::test]
async fn panicking_tick_leaves_the_worker_running() {
    let channel = Channel::with_options(
        "ticking",
        ChannelOptions {
            idle_interval: Duration::from_millis(10),
            ..ChannelOptions::default()
        },
    )
    .unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    channel
        .add_controller(
            Box::new(Volatile {
                panic_on_tick: true,
                ticks: Arc::clone(&ticks),
                ..Volatile::default()
            }),
            Registration::new("volatile::Volatile", "volatile"),
        )
        .await
        .unwrap();
    channel.start(WAIT).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(ticks.load(Ordering::SeqCst) > 1);
    assert!(!channel.is_closed());
    assert_eq!(channel.call(|_| 1).await.unwrap(), 1);
}

#[tokio::test]
async fn panicking_call_reports_the_panic_and_keeps_the_channel() {
    let channel = Channel::new("fragile").unwrap();

    let err = channel
        .call(|_| -> u8 { panic!("boom") })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LanesError::ActionPanicked { ref message, .. } if message.contains("boom")
    ));
    assert!(!channel.is_closed());

    assert_eq!(channel.call(|_| 1).await.unwrap(), 1);
    assert!(matches!(
        channel.last_error().as_deref(),
        Some(LanesError::ActionPanicked { .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn run_next_cycles_with_period_len_plus_one(len in 0usize..6) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let names: Vec<String> = (0..len).map(|i| format!("p{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let harness = TestHarness::builder()
                .with_channel("cycle", &refs)
                .build()
                .await
                .unwrap();
            let channel = harness.channel("cycle");

            for _round in 0..2 {
                for expected in &names {
                    let active = channel.run_next().await.unwrap();
                    assert_eq!(active.as_ref(), Some(expected));
                }
                assert_eq!(channel.run_next().await.unwrap(), None);
                assert_eq!(channel.active_plugin(), None);
            }
        });
    }
}
