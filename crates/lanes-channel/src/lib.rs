// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel execution engine for the Lanes plugin runtime.
//!
//! A [`Channel`] owns one worker thread and an ordered chain of plugin
//! controllers. All work on the chain is serialized through the channel's
//! queue; [`ChannelSet`] fans lifecycle operations out across channels.
//! [`PluginController`] is the generic lifecycle state machine wrapped
//! around every bare [`lanes_core::Plugin`].

pub mod audit;
pub mod channel;
pub mod channel_set;
pub mod config_store;
pub mod controller;
pub mod metrics;
pub mod report;
mod worker;

pub use audit::TracingAuditSink;
pub use channel::{
    Channel, ChannelHandle, ChannelOptions, DEFAULT_IDLE_INTERVAL, Lane, Registration,
};
pub use channel_set::{ChannelSet, FleetReport};
pub use config_store::{MemoryConfigStore, MemoryConfigStoreProvider};
pub use controller::PluginController;
pub use report::{ChannelSnapshot, LifecycleReport, OperationOutcome, PluginReport};
