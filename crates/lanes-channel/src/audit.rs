// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Default audit sink that forwards records to `tracing`.

use lanes_core::AuditSink;
use tracing::{error, info, warn};

/// Writes audit records as `tracing` events under the `lanes::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn write_info(&self, source: &str, message: &str) {
        info!(target: "lanes::audit", source, "{message}");
    }

    fn write_warning(&self, source: &str, message: &str) {
        warn!(target: "lanes::audit", source, "{message}");
    }

    fn write_error(&self, source: &str, message: &str) {
        error!(target: "lanes::audit", source, "{message}");
    }
}
