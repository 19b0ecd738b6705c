// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-way audit sink for lifecycle events.

/// Receives human-readable audit records for every lifecycle transition.
///
/// The sink is not part of the runtime's correctness contract: writes must not
/// fail and must not block for long, since they happen on channel workers.
pub trait AuditSink: Send + Sync {
    /// Records an informational event.
    fn write_info(&self, source: &str, message: &str);

    /// Records a warning, e.g. an ignored transition.
    fn write_warning(&self, source: &str, message: &str);

    /// Records a failure.
    fn write_error(&self, source: &str, message: &str);
}
