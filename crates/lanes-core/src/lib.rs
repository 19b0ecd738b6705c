// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Lanes plugin runtime.
//!
//! This crate provides the foundational trait definitions, error type and
//! lifecycle types used throughout the workspace. Plugins implement
//! [`Plugin`]; the channel engine drives [`Controller`]s; configuration and
//! audit output flow through [`ConfigStore`] and [`AuditSink`].

pub mod config_handle;
pub mod context;
pub mod error;
pub mod traits;
pub mod types;

pub use config_handle::ConfigHandle;
pub use context::PluginContext;
pub use error::{BoxError, LanesError};
pub use types::{ControllerInfo, LifecycleOp, PluginState, SharedState, Transition};

pub use traits::{
    AuditSink, ConfigStore, ConfigStoreProvider, Controller, ControllerBinding, Pipeline, Plugin,
    PluginInstance,
};
