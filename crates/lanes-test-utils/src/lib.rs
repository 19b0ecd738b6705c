// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Lanes integration tests.
//!
//! Provides scripted plugins and harness infrastructure for fast,
//! deterministic lifecycle tests.
//!
//! # Components
//!
//! - [`ScriptedPlugin`] - Plugin with injectable failures, panics and hand-offs
//! - [`RecordingAuditSink`] - Audit sink capturing records for assertions
//! - [`TestHarness`] - Channels, registry and collaborators wired together

pub mod harness;
pub mod recording;
pub mod scripted;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use recording::{AuditLevel, AuditRecord, RecordingAuditSink};
pub use scripted::{CallLog, Hook, SCRIPTED_TYPE, ScriptedPlugin, scripted_unit};
