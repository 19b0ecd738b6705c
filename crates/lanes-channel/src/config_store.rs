// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory configuration store.
//!
//! Values are kept in a working copy; `save_data` publishes the working copy
//! to a persisted map shared with the provider, so a plugin instance that is
//! re-created under the same channel and name sees what was last saved.

use std::collections::HashMap;
use std::sync::Arc;

use lanes_core::{ConfigStore, ConfigStoreProvider, LanesError};
use parking_lot::Mutex;
use serde_json::Value;

type Persisted = Arc<Mutex<HashMap<String, Value>>>;

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    working: HashMap<String, Value>,
    persisted: Persisted,
}

impl MemoryConfigStore {
    /// A standalone store with nothing persisted.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_persisted(persisted: Persisted) -> Self {
        Self {
            working: HashMap::new(),
            persisted,
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_data(&mut self, _reload: bool) -> Result<(), LanesError> {
        self.working = self.persisted.lock().clone();
        Ok(())
    }

    fn save_data(&mut self) -> Result<(), LanesError> {
        *self.persisted.lock() = self.working.clone();
        Ok(())
    }

    fn get_value(&self, name: &str) -> Option<Value> {
        self.working.get(name).cloned()
    }

    fn set_value(&mut self, name: &str, value: Value) {
        self.working.insert(name.to_string(), value);
    }
}

/// Hands out [`MemoryConfigStore`]s keyed by channel and instance name.
#[derive(Debug, Default)]
pub struct MemoryConfigStoreProvider {
    stores: Mutex<HashMap<(String, String), Persisted>>,
}

impl MemoryConfigStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved values for an instance.
    pub fn saved(&self, channel: &str, instance: &str) -> HashMap<String, Value> {
        self.stores
            .lock()
            .get(&(channel.to_string(), instance.to_string()))
            .map(|p| p.lock().clone())
            .unwrap_or_default()
    }
}

impl ConfigStoreProvider for MemoryConfigStoreProvider {
    fn open(&self, channel: &str, instance: &str) -> Box<dyn ConfigStore> {
        let persisted = Arc::clone(
            self.stores
                .lock()
                .entry((channel.to_string(), instance.to_string()))
                .or_default(),
        );
        Box::new(MemoryConfigStore::with_persisted(persisted))
    }
}
