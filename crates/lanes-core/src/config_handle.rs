// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed, shareable access to a plugin instance's configuration store.
//!
//! Mutations are saved immediately unless a batch is open; closing the
//! outermost batch saves once if anything changed. Saving is suppressed while
//! the handle is not writable, which the controller uses while the plugin is
//! in the error state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::LanesError;
use crate::traits::config_store::ConfigStore;

struct HandleInner {
    name: String,
    store: Box<dyn ConfigStore>,
    loaded: bool,
    batch_depth: usize,
    dirty: bool,
}

/// Cloneable handle to one instance's configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<Mutex<HandleInner>>,
    writable: Arc<AtomicBool>,
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConfigHandle")
            .field("name", &inner.name)
            .field("loaded", &inner.loaded)
            .field("batch_depth", &inner.batch_depth)
            .field("writable", &self.writable.load(Ordering::Acquire))
            .finish()
    }
}

impl ConfigHandle {
    /// Wraps `store`; `name` labels errors and log lines.
    pub fn new(name: impl Into<String>, store: Box<dyn ConfigStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandleInner {
                name: name.into(),
                store,
                loaded: false,
                batch_depth: 0,
                dirty: false,
            })),
            writable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Loads the store. Without `reload`, a loaded store is left untouched.
    pub fn load(&self, reload: bool) -> Result<(), LanesError> {
        let mut inner = self.inner.lock();
        if inner.loaded && !reload {
            return Ok(());
        }
        inner.store.load_data(reload)?;
        inner.loaded = true;
        inner.dirty = false;
        Ok(())
    }

    /// Whether the store has been loaded at least once.
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().loaded
    }

    /// Reads `name`, falling back to `default` when absent or of the wrong shape.
    pub fn get_value<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        let inner = self.inner.lock();
        match inner.store.get_value(name) {
            Some(value) => serde_json::from_value(value).unwrap_or(default),
            None => default,
        }
    }

    /// Writes `name`, saving immediately unless a batch is open.
    pub fn set_value<T: Serialize>(&self, name: &str, value: T) -> Result<(), LanesError> {
        let json = serde_json::to_value(value).map_err(|e| LanesError::ConfigStore {
            name: self.inner.lock().name.clone(),
            message: format!("value for '{name}' is not serializable: {e}"),
        })?;
        let mut inner = self.inner.lock();
        inner.store.set_value(name, json);
        inner.dirty = true;
        if inner.batch_depth == 0 {
            self.flush(&mut inner)?;
        }
        Ok(())
    }

    /// Opens a batch; nested batches are counted.
    pub fn begin_batch(&self) {
        let mut inner = self.inner.lock();
        inner.batch_depth += 1;
        inner.store.begin_batch();
    }

    /// Closes a batch, saving once when the outermost batch closes.
    pub fn end_batch(&self) -> Result<(), LanesError> {
        let mut inner = self.inner.lock();
        if inner.batch_depth == 0 {
            warn!(config = %inner.name, "end_batch called without an open batch");
            return Ok(());
        }
        inner.batch_depth -= 1;
        inner.store.end_batch();
        if inner.batch_depth == 0 {
            self.flush(&mut inner)?;
        }
        Ok(())
    }

    /// Saves pending changes now.
    pub fn save(&self) -> Result<(), LanesError> {
        let mut inner = self.inner.lock();
        self.flush(&mut inner)
    }

    /// Whether a save would currently be performed.
    pub fn can_save(&self) -> bool {
        self.writable.load(Ordering::Acquire) && self.inner.lock().store.can_save()
    }

    /// Enables or disables saving. Driven by the owning controller.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::Release);
    }

    /// Whether unsaved changes are pending.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    fn flush(&self, inner: &mut HandleInner) -> Result<(), LanesError> {
        if !inner.dirty {
            return Ok(());
        }
        if !self.writable.load(Ordering::Acquire) || !inner.store.can_save() {
            return Ok(());
        }
        inner.store.save_data()?;
        inner.dirty = false;
        Ok(())
    }
}
