// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Libraries: a located unit plus its probe/load state.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use lanes_core::{LanesError, PluginInstance};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::unit::{ManifestUnit, PluginUnit, TypeInfo, UnitExports};

/// Where a library's unit comes from.
#[derive(Clone)]
pub enum LibraryLocator {
    /// A manifest file describing a deployable unit.
    Path(PathBuf),
    /// An already-resolved unit, e.g. statically linked plugins.
    Unit(Arc<dyn PluginUnit>),
}

impl PartialEq for LibraryLocator {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LibraryLocator::Path(a), LibraryLocator::Path(b)) => a == b,
            (LibraryLocator::Unit(a), LibraryLocator::Unit(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl Eq for LibraryLocator {}

impl fmt::Display for LibraryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryLocator::Path(path) => write!(f, "{}", path.display()),
            LibraryLocator::Unit(unit) => write!(f, "unit:{}", unit.id()),
        }
    }
}

impl fmt::Debug for LibraryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryLocator::Path(path) => f.debug_tuple("Path").field(path).finish(),
            LibraryLocator::Unit(unit) => f.debug_tuple("Unit").field(&unit.id()).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum LibraryState {
    /// Nothing read yet.
    Unprobed,
    /// Types known, code not loaded.
    Probed,
    /// Factories active.
    Loaded,
}

/// One discovered library.
///
/// Probing and loading are each performed at most once successfully; a
/// failed activation leaves the library probed so it can be retried.
pub struct Library {
    locator: LibraryLocator,
    unit: OnceLock<Arc<dyn PluginUnit>>,
    types: OnceLock<Vec<TypeInfo>>,
    exports: OnceLock<UnitExports>,
    activation: Mutex<()>,
}

impl Library {
    pub fn new(locator: LibraryLocator) -> Self {
        let unit = OnceLock::new();
        if let LibraryLocator::Unit(resolved) = &locator {
            let _ = unit.set(Arc::clone(resolved));
        }
        Self {
            locator,
            unit,
            types: OnceLock::new(),
            exports: OnceLock::new(),
            activation: Mutex::new(()),
        }
    }

    pub fn locator(&self) -> &LibraryLocator {
        &self.locator
    }

    /// The unit id once resolved, else the locator.
    pub fn name(&self) -> String {
        match self.unit.get() {
            Some(unit) => unit.id().to_string(),
            None => self.locator.to_string(),
        }
    }

    pub fn state(&self) -> LibraryState {
        if self.exports.get().is_some() {
            LibraryState::Loaded
        } else if self.types.get().is_some() {
            LibraryState::Probed
        } else {
            LibraryState::Unprobed
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LibraryState::Loaded
    }

    /// Types found by probing; empty before the first successful probe.
    pub fn types(&self) -> &[TypeInfo] {
        self.types.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reads the library's metadata. No plugin code runs.
    pub fn probe(&self) -> Result<&[TypeInfo], LanesError> {
        if let Some(types) = self.types.get() {
            return Ok(types);
        }
        let unit = self.resolve_unit()?;
        let types = unit.probe()?;
        debug!(library = %unit.id(), types = types.len(), "library probed");
        Ok(self.types.get_or_init(|| types))
    }

    /// Activates the unit's code. Only a successful activation is memoized.
    pub fn load(&self) -> Result<&UnitExports, LanesError> {
        if let Some(exports) = self.exports.get() {
            return Ok(exports);
        }
        let _guard = self.activation.lock();
        if let Some(exports) = self.exports.get() {
            return Ok(exports);
        }

        let unit = self.resolve_unit()?;
        match unit.activate() {
            Ok(exports) => {
                info!(library = %unit.id(), types = exports.len(), "library loaded");
                Ok(self.exports.get_or_init(|| exports))
            }
            Err(err) => {
                warn!(library = %unit.id(), error = %err, "library activation failed");
                Err(err)
            }
        }
    }

    /// Loads the library if needed and runs the factory for `type_name`.
    pub fn instantiate(&self, type_name: &str) -> Result<PluginInstance, LanesError> {
        let exports = self.load()?;
        let factory = exports
            .factory(type_name)
            .ok_or_else(|| LanesError::Activation {
                library: self.name(),
                message: format!("no factory for type '{type_name}'"),
                source: None,
            })?;
        factory()
    }

    fn resolve_unit(&self) -> Result<&Arc<dyn PluginUnit>, LanesError> {
        if let Some(unit) = self.unit.get() {
            return Ok(unit);
        }
        let LibraryLocator::Path(path) = &self.locator else {
            return Err(LanesError::Internal(format!(
                "library {} has no unit",
                self.locator
            )));
        };
        let unit = ManifestUnit::open(path).map_err(|err| match err {
            err @ LanesError::Manifest { .. } => err,
            other => LanesError::Discovery {
                locator: path.display().to_string(),
                message: other.to_string(),
            },
        })?;
        let unit: Arc<dyn PluginUnit> = Arc::new(unit);
        Ok(self.unit.get_or_init(|| unit))
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("locator", &self.locator)
            .field("state", &self.state())
            .finish()
    }
}
