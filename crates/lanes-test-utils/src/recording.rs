// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit sink that captures records for assertions.

use lanes_core::AuditSink;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub level: AuditLevel,
    pub source: String,
    pub message: String,
}

/// Keeps every audit record in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn at_level(&self, level: AuditLevel) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    /// Whether any record from `source` contains `needle`.
    pub fn contains(&self, source: &str, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|r| r.source == source && r.message.contains(needle))
    }

    fn push(&self, level: AuditLevel, source: &str, message: &str) {
        self.records.lock().push(AuditRecord {
            level,
            source: source.to_string(),
            message: message.to_string(),
        });
    }
}

impl AuditSink for RecordingAuditSink {
    fn write_info(&self, source: &str, message: &str) {
        self.push(AuditLevel::Info, source, message);
    }

    fn write_warning(&self, source: &str, message: &str) {
        self.push(AuditLevel::Warning, source, message);
    }

    fn write_error(&self, source: &str, message: &str) {
        self.push(AuditLevel::Error, source, message);
    }
}
