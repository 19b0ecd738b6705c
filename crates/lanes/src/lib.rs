// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lanes host: wires configuration, discovery and channels together.
//!
//! The `lanes` binary is a thin CLI over [`Host`] and the handlers in
//! [`commands`].

pub mod builtin;
pub mod commands;
pub mod host;
pub mod shutdown;

pub use builtin::builtin_unit;
pub use commands::CheckReport;
pub use host::Host;
