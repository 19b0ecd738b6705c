// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions at the seams of the runtime.
//!
//! Plugins implement [`Plugin`]; the channel engine drives anything that
//! implements [`Controller`]; configuration and audit output are consumed
//! through [`ConfigStore`] and [`AuditSink`].

pub mod audit;
pub mod config_store;
pub mod controller;
pub mod pipeline;
pub mod plugin;

pub use audit::AuditSink;
pub use config_store::{ConfigStore, ConfigStoreProvider};
pub use controller::{Controller, ControllerBinding};
pub use pipeline::Pipeline;
pub use plugin::{Plugin, PluginInstance};
