// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! Without a recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge};

/// Register all Lanes metric descriptions.
///
/// Called once at startup after a recorder is installed.
pub fn register_metrics() {
    describe_counter!("lanes_actions_total", "Units of work executed by channel workers");
    describe_counter!(
        "lanes_action_failures_total",
        "Units of work that returned an error or panicked"
    );
    describe_counter!(
        "lanes_transitions_total",
        "Plugin lifecycle transitions by operation and outcome"
    );
    describe_gauge!("lanes_queue_depth", "Queued units of work per channel");
}

/// Record an executed unit of work.
pub fn record_action(channel: &str, failed: bool) {
    metrics::counter!("lanes_actions_total", "channel" => channel.to_string()).increment(1);
    if failed {
        metrics::counter!("lanes_action_failures_total", "channel" => channel.to_string())
            .increment(1);
    }
}

/// Record a lifecycle transition attempt.
pub fn record_transition(channel: &str, operation: &str, outcome: &'static str) {
    metrics::counter!(
        "lanes_transitions_total",
        "channel" => channel.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Set the number of queued units of work for a channel.
pub fn set_queue_depth(channel: &str, depth: usize) {
    metrics::gauge!("lanes_queue_depth", "channel" => channel.to_string()).set(depth as f64);
}
