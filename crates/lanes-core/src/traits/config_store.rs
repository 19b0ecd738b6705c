// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-plugin configuration store collaborator.

use serde_json::Value;

use crate::error::LanesError;

/// Tabular key/value store backing one plugin instance's configuration.
///
/// Persistence format is up to the implementation. Callers normally go through
/// [`ConfigHandle`](crate::ConfigHandle), which adds typed access, auto-save
/// on mutation and batch suppression on top of this trait.
pub trait ConfigStore: Send {
    /// Loads values from the backing storage. `reload` forces a re-read of
    /// data that is already loaded.
    fn load_data(&mut self, reload: bool) -> Result<(), LanesError>;

    /// Persists current values.
    fn save_data(&mut self) -> Result<(), LanesError>;

    /// Marks the start of a batch of mutations.
    fn begin_batch(&mut self) {}

    /// Marks the end of a batch of mutations.
    fn end_batch(&mut self) {}

    /// Reads a raw value.
    fn get_value(&self, name: &str) -> Option<Value>;

    /// Writes a raw value without persisting it.
    fn set_value(&mut self, name: &str, value: Value);

    /// Whether the store is currently able to persist.
    fn can_save(&self) -> bool {
        true
    }
}

/// Opens a configuration store for a plugin instance.
pub trait ConfigStoreProvider: Send + Sync {
    /// Returns the store for `instance` hosted on `channel`.
    fn open(&self, channel: &str, instance: &str) -> Box<dyn ConfigStore>;
}
