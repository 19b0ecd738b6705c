// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deployable units: the code behind a library.
//!
//! A unit is probed for metadata without running plugin code and activated
//! to obtain its factories. [`StaticUnit`] covers compiled-in types;
//! [`ManifestUnit`] covers libraries described by a `lanes-plugin.toml`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lanes_core::{Controller, LanesError, Plugin, PluginInstance};
use semver::Version;

use crate::manifest::LibraryManifest;

/// Creates a fresh instance of one plugin type.
pub type PluginFactory = Arc<dyn Fn() -> Result<PluginInstance, LanesError> + Send + Sync>;

/// Name of the symbol a shared object exports to hand over its unit.
pub const UNIT_ENTRY_SYMBOL: &str = "lanes_plugin_unit";

/// Signature of [`UNIT_ENTRY_SYMBOL`].
///
/// Shared objects must be built with the same compiler and `lanes-core`
/// version as the host; trait objects cross the boundary as-is, which is
/// why `improper_ctypes_definitions` is allowed here and in [`export_unit!`].
#[allow(improper_ctypes_definitions)]
pub type UnitEntryFn = unsafe extern "C" fn() -> Box<dyn PluginUnit>;

/// Metadata for one type a unit provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: String,
    pub description: Option<String>,
}

impl TypeInfo {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Factories produced by an activated unit, keyed by qualified type name.
#[derive(Clone, Default)]
pub struct UnitExports {
    factories: HashMap<String, PluginFactory>,
}

impl UnitExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(type_name.into(), factory);
    }

    pub fn factory(&self, type_name: &str) -> Option<&PluginFactory> {
        self.factories.get(type_name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for UnitExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("UnitExports").field("types", &types).finish()
    }
}

/// A deployable unit of plugin types.
pub trait PluginUnit: Send + Sync {
    /// Stable identifier; two units with the same id are the same library.
    fn id(&self) -> &str;

    /// Unit version, when known.
    fn version(&self) -> Option<&Version> {
        None
    }

    /// Lists the provided types without running plugin code.
    fn probe(&self) -> Result<Vec<TypeInfo>, LanesError>;

    /// Makes the unit's code available and returns its factories.
    fn activate(&self) -> Result<UnitExports, LanesError>;
}

struct StaticEntry {
    info: TypeInfo,
    factory: PluginFactory,
}

/// Compiled-in plugin types registered with closures.
///
/// ```ignore
/// let unit = StaticUnit::new("builtin")
///     .with_plugin::<Heartbeat>("lanes::Heartbeat", "Periodic liveness log");
/// ```
pub struct StaticUnit {
    id: String,
    version: Option<Version>,
    entries: Vec<StaticEntry>,
}

impl StaticUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            entries: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Registers a type produced by an arbitrary factory.
    pub fn with_factory<F>(mut self, info: TypeInfo, factory: F) -> Self
    where
        F: Fn() -> Result<PluginInstance, LanesError> + Send + Sync + 'static,
    {
        self.entries.push(StaticEntry {
            info,
            factory: Arc::new(factory),
        });
        self
    }

    /// Registers a bare plugin built from its `Default`.
    pub fn with_plugin<P>(self, type_name: &str, description: &str) -> Self
    where
        P: Plugin + Default,
    {
        self.with_factory(
            TypeInfo::new(type_name).with_description(description),
            || Ok(PluginInstance::Plugin(Box::new(P::default()))),
        )
    }

    /// Registers a self-controlling type built from its `Default`.
    pub fn with_controller<C>(self, type_name: &str, description: &str) -> Self
    where
        C: Controller + Default,
    {
        self.with_factory(
            TypeInfo::new(type_name).with_description(description),
            || Ok(PluginInstance::Controller(Box::new(C::default()))),
        )
    }
}

impl fmt::Debug for StaticUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticUnit")
            .field("id", &self.id)
            .field("types", &self.entries.len())
            .finish()
    }
}

impl PluginUnit for StaticUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    fn probe(&self) -> Result<Vec<TypeInfo>, LanesError> {
        Ok(self.entries.iter().map(|e| e.info.clone()).collect())
    }

    fn activate(&self) -> Result<UnitExports, LanesError> {
        let mut exports = UnitExports::new();
        for entry in &self.entries {
            exports.insert(entry.info.type_name.clone(), Arc::clone(&entry.factory));
        }
        Ok(exports)
    }
}

/// A library described by a manifest file.
///
/// Probing reads the manifest only. Activation loads the declared shared
/// object, which stays mapped for the life of the unit.
pub struct ManifestUnit {
    manifest_path: PathBuf,
    manifest: LibraryManifest,
    #[cfg(feature = "dynamic-libraries")]
    loaded: parking_lot::Mutex<Option<LoadedObject>>,
}

// Field order matters: the unit must drop before the library that holds its code.
#[cfg(feature = "dynamic-libraries")]
struct LoadedObject {
    unit: Box<dyn PluginUnit>,
    _library: libloading::Library,
}

impl ManifestUnit {
    /// Reads and parses the manifest at `path`.
    pub fn open(path: &Path) -> Result<Self, LanesError> {
        let manifest = LibraryManifest::load(path)?;
        Ok(Self {
            manifest_path: path.to_path_buf(),
            manifest,
            #[cfg(feature = "dynamic-libraries")]
            loaded: parking_lot::Mutex::new(None),
        })
    }

    pub fn manifest(&self) -> &LibraryManifest {
        &self.manifest
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    fn shared_object(&self) -> Result<PathBuf, LanesError> {
        let dir = self.manifest_path.parent().unwrap_or_else(|| Path::new("."));
        self.manifest
            .shared_object(dir)
            .ok_or_else(|| self.activation_error("manifest declares no shared object path"))
    }

    fn activation_error(&self, message: impl Into<String>) -> LanesError {
        LanesError::Activation {
            library: self.manifest.name.clone(),
            message: message.into(),
            source: None,
        }
    }

    #[cfg(feature = "dynamic-libraries")]
    fn load_shared_object(&self, path: &Path) -> Result<UnitExports, LanesError> {
        let mut loaded = self.loaded.lock();
        if let Some(object) = loaded.as_ref() {
            return object.unit.activate();
        }

        // SAFETY: loading a shared object runs its initializers and trusts the
        // entry symbol to match `UnitEntryFn`. Only manifests the operator
        // placed on a discovery path are loaded. The library handle is kept
        // alongside the unit so its code outlives every factory it returned.
        let (library, unit) = unsafe {
            let library = libloading::Library::new(path).map_err(|e| LanesError::Activation {
                library: self.manifest.name.clone(),
                message: format!("failed to load {}", path.display()),
                source: Some(Box::new(e)),
            })?;
            let unit = {
                let entry: libloading::Symbol<UnitEntryFn> = library
                    .get(UNIT_ENTRY_SYMBOL.as_bytes())
                    .map_err(|e| LanesError::Activation {
                        library: self.manifest.name.clone(),
                        message: format!("symbol '{UNIT_ENTRY_SYMBOL}' not found"),
                        source: Some(Box::new(e)),
                    })?;
                entry()
            };
            (library, unit)
        };

        let exports = unit.activate()?;
        for entry in &self.manifest.plugins {
            if exports.factory(&entry.type_name).is_none() {
                return Err(self.activation_error(format!(
                    "shared object does not provide declared type '{}'",
                    entry.type_name
                )));
            }
        }
        *loaded = Some(LoadedObject {
            unit,
            _library: library,
        });
        Ok(exports)
    }
}

impl fmt::Debug for ManifestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestUnit")
            .field("manifest_path", &self.manifest_path)
            .field("name", &self.manifest.name)
            .finish()
    }
}

impl PluginUnit for ManifestUnit {
    fn id(&self) -> &str {
        &self.manifest.name
    }

    fn version(&self) -> Option<&Version> {
        Some(&self.manifest.version)
    }

    fn probe(&self) -> Result<Vec<TypeInfo>, LanesError> {
        Ok(self
            .manifest
            .plugins
            .iter()
            .map(|p| TypeInfo {
                type_name: p.type_name.clone(),
                description: p.description.clone(),
            })
            .collect())
    }

    #[cfg(feature = "dynamic-libraries")]
    fn activate(&self) -> Result<UnitExports, LanesError> {
        let path = self.shared_object()?;
        self.load_shared_object(&path)
    }

    #[cfg(not(feature = "dynamic-libraries"))]
    fn activate(&self) -> Result<UnitExports, LanesError> {
        let path = self.shared_object()?;
        Err(self.activation_error(format!(
            "cannot load {}: built without the dynamic-libraries feature",
            path.display()
        )))
    }
}

/// Exports a unit from a plugin shared object.
///
/// ```ignore
/// lanes_plugin::export_unit!(StaticUnit::new("demo").with_plugin::<Echo>("demo::Echo", "Echo"));
/// ```
#[macro_export]
macro_rules! export_unit {
    ($unit:expr) => {
        // Rust-to-Rust only; see `UnitEntryFn`.
        #[allow(improper_ctypes_definitions)]
        #[unsafe(no_mangle)]
        pub extern "C" fn lanes_plugin_unit() -> Box<dyn $crate::PluginUnit> {
            Box::new($unit)
        }
    };
}
