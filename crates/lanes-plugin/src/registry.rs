// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin type registry.
//!
//! The `PluginRegistry` records every type discovered in manifest files and
//! resolved units, keyed by qualified name. Libraries are only probed during
//! discovery; their code is activated on the first `create_instance` that
//! needs it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lanes_channel::{Channel, PluginController, Registration};
use lanes_core::{Controller, ControllerInfo, LanesError, PluginInstance};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::PluginTypeDescriptor;
use crate::library::{Library, LibraryLocator};
use crate::unit::PluginUnit;

/// Where discovery looks for libraries.
#[derive(Clone, Default)]
pub struct DiscoverySource {
    /// Manifest files, or directories whose `*.toml` files are manifests.
    pub paths: Vec<PathBuf>,
    /// Units that are already resolved, e.g. compiled into the host.
    pub units: Vec<Arc<dyn PluginUnit>>,
    /// Log and collect failures instead of aborting discovery.
    pub ignore_errors: bool,
}

impl DiscoverySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn with_unit(mut self, unit: Arc<dyn PluginUnit>) -> Self {
        self.units.push(unit);
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }
}

impl std::fmt::Debug for DiscoverySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySource")
            .field("paths", &self.paths)
            .field("units", &self.units.iter().map(|u| u.id()).collect::<Vec<_>>())
            .field("ignore_errors", &self.ignore_errors)
            .finish()
    }
}

/// What one discovery pass found.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Libraries newly added to the registry.
    pub libraries: usize,
    /// Qualified type names newly registered.
    pub registered: Vec<String>,
    /// Type names skipped because an earlier registration owns them.
    pub duplicates: Vec<String>,
    /// Failures tolerated because `ignore_errors` was set.
    pub errors: Vec<LanesError>,
}

#[derive(Default)]
struct RegistryInner {
    descriptors: Vec<Arc<PluginTypeDescriptor>>,
    by_name: HashMap<String, usize>,
    libraries: Vec<Arc<Library>>,
}

impl RegistryInner {
    fn has_library(&self, locator: &LibraryLocator) -> bool {
        self.libraries.iter().any(|l| l.locator() == locator)
    }
}

/// Registry of discovered plugin types.
#[derive(Default)]
pub struct PluginRegistry {
    inner: RwLock<RegistryInner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes every locator in `source` and registers the types found.
    ///
    /// The first registration of a qualified name wins. Without
    /// `ignore_errors`, the first failing locator aborts the pass; types
    /// registered before it stay registered.
    pub fn discover(&self, source: &DiscoverySource) -> Result<DiscoveryReport, LanesError> {
        let mut report = DiscoveryReport::default();
        let mut locators = Vec::new();

        for path in &source.paths {
            match expand_path(path) {
                Ok(found) => locators.extend(found.into_iter().map(LibraryLocator::Path)),
                Err(err) => tolerate(err, source.ignore_errors, &mut report)?,
            }
        }
        locators.extend(source.units.iter().cloned().map(LibraryLocator::Unit));

        for locator in locators {
            if let Err(err) = self.add_library(locator, &mut report) {
                tolerate(err, source.ignore_errors, &mut report)?;
            }
        }

        info!(
            libraries = report.libraries,
            types = report.registered.len(),
            errors = report.errors.len(),
            "plugin discovery complete"
        );
        Ok(report)
    }

    /// Registers a single resolved unit.
    pub fn register_unit(&self, unit: Arc<dyn PluginUnit>) -> Result<DiscoveryReport, LanesError> {
        let mut report = DiscoveryReport::default();
        self.add_library(LibraryLocator::Unit(unit), &mut report)?;
        Ok(report)
    }

    fn add_library(
        &self,
        locator: LibraryLocator,
        report: &mut DiscoveryReport,
    ) -> Result<(), LanesError> {
        if self.inner.read().has_library(&locator) {
            debug!(library = %locator, "library already registered");
            return Ok(());
        }

        // Probed without holding the lock; another caller may race us here.
        let library = Arc::new(Library::new(locator));
        let types = library.probe()?.to_vec();

        let mut inner = self.inner.write();
        if inner.has_library(library.locator()) {
            debug!(library = %library.locator(), "library registered concurrently");
            return Ok(());
        }
        inner.libraries.push(Arc::clone(&library));
        report.libraries += 1;

        for info in types {
            if inner.by_name.contains_key(&info.type_name) {
                debug!(
                    plugin_type = %info.type_name,
                    library = %library.name(),
                    "duplicate plugin type ignored"
                );
                report.duplicates.push(info.type_name);
                continue;
            }
            let descriptor = Arc::new(PluginTypeDescriptor::new(
                info.type_name.clone(),
                info.description,
                Arc::clone(&library),
            ));
            let index = inner.descriptors.len();
            inner.descriptors.push(descriptor);
            inner.by_name.insert(info.type_name.clone(), index);
            report.registered.push(info.type_name);
        }
        Ok(())
    }

    /// Looks up a type by qualified name.
    pub fn get(&self, type_name: &str) -> Option<Arc<PluginTypeDescriptor>> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(type_name)
            .map(|&i| Arc::clone(&inner.descriptors[i]))
    }

    /// First type (in registration order) whose short name matches.
    pub fn find_by_short_name(&self, short_name: &str) -> Option<Arc<PluginTypeDescriptor>> {
        self.inner
            .read()
            .descriptors
            .iter()
            .find(|d| d.short_name() == short_name)
            .cloned()
    }

    /// All registered types in registration order.
    pub fn descriptors(&self) -> Vec<Arc<PluginTypeDescriptor>> {
        self.inner.read().descriptors.clone()
    }

    pub fn libraries(&self) -> Vec<Arc<Library>> {
        self.inner.read().libraries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().descriptors.is_empty()
    }

    /// Resolves `type_name` and builds one instance of it, loading the
    /// owning library if this is its first use.
    ///
    /// An exact qualified-name match wins. Otherwise short-name matches are
    /// tried in registration order, skipping those whose library fails to
    /// load.
    pub fn instantiate(
        &self,
        type_name: &str,
    ) -> Result<(Arc<PluginTypeDescriptor>, PluginInstance), LanesError> {
        if let Some(descriptor) = self.get(type_name) {
            let instance = descriptor.library().instantiate(descriptor.type_name())?;
            return Ok((descriptor, instance));
        }

        let candidates: Vec<_> = self
            .inner
            .read()
            .descriptors
            .iter()
            .filter(|d| d.short_name() == type_name)
            .cloned()
            .collect();

        let mut last_error = None;
        for descriptor in candidates {
            match descriptor.library().load() {
                Ok(_) => {
                    let instance = descriptor.library().instantiate(descriptor.type_name())?;
                    return Ok((descriptor, instance));
                }
                Err(err) => {
                    debug!(
                        candidate = %descriptor.type_name(),
                        error = %err,
                        "skipping unloadable candidate"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LanesError::TypeNotFound {
            name: type_name.to_string(),
        }))
    }

    /// Creates a controller for `type_name` named `instance_name` and appends
    /// it to `channel`'s chain.
    pub async fn create_instance(
        &self,
        channel: Option<&Channel>,
        type_name: &str,
        instance_name: &str,
        id: Option<Uuid>,
    ) -> Result<ControllerInfo, LanesError> {
        let channel = channel.ok_or(LanesError::ChannelMissing)?;
        if channel.contains(instance_name) {
            return Err(LanesError::NameCollision {
                channel: channel.name().to_string(),
                name: instance_name.to_string(),
            });
        }

        let (descriptor, instance) = self.instantiate(type_name)?;
        let controller: Box<dyn Controller> = match instance {
            PluginInstance::Plugin(plugin) => Box::new(PluginController::new(plugin)),
            PluginInstance::Controller(controller) => controller,
        };

        let mut registration = Registration::new(descriptor.type_name(), instance_name)
            .with_library(descriptor.library().name());
        registration.id = id;

        let info = channel.add_controller(controller, registration).await?;
        info!(
            channel = %channel.name(),
            plugin = %info.name,
            plugin_type = %info.type_name,
            id = %info.id,
            "plugin instance created"
        );
        Ok(info)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PluginRegistry")
            .field("types", &inner.descriptors.len())
            .field("libraries", &inner.libraries.len())
            .finish()
    }
}

fn tolerate(
    err: LanesError,
    ignore_errors: bool,
    report: &mut DiscoveryReport,
) -> Result<(), LanesError> {
    if !ignore_errors {
        return Err(err);
    }
    warn!(error = %err, "discovery error ignored");
    report.errors.push(err);
    Ok(())
}

/// A manifest path itself, or the sorted `*.toml` files of a directory.
fn expand_path(path: &Path) -> Result<Vec<PathBuf>, LanesError> {
    let discovery_error = |message: String| LanesError::Discovery {
        locator: path.display().to_string(),
        message,
    };

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(discovery_error("path does not exist".to_string()));
    }

    let entries = std::fs::read_dir(path).map_err(|e| discovery_error(e.to_string()))?;
    let mut manifests = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| discovery_error(e.to_string()))?;
        let candidate = entry.path();
        if candidate.is_file() && candidate.extension().is_some_and(|ext| ext == "toml") {
            manifests.push(candidate);
        }
    }
    manifests.sort();
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use lanes_core::{Plugin, PluginContext};
    use tracing_test::traced_test;

    use super::*;
    use crate::unit::StaticUnit;

    #[derive(Default)]
    struct Nop;

    impl Plugin for Nop {
        fn init(&mut self, _ctx: &PluginContext) -> Result<(), LanesError> {
            Ok(())
        }
    }

    fn unit(id: &str, types: &[&str]) -> Arc<dyn PluginUnit> {
        let mut unit = StaticUnit::new(id);
        for t in types {
            unit = unit.with_plugin::<Nop>(t, "test type");
        }
        Arc::new(unit)
    }

    fn write_manifest(dir: &Path, file: &str, name: &str, types: &[&str]) -> PathBuf {
        let mut toml = format!("[library]\nname = \"{name}\"\nversion = \"1.0.0\"\n");
        for t in types {
            toml.push_str(&format!("\n[[plugin]]\ntype = \"{t}\"\n"));
        }
        let path = dir.join(file);
        std::fs::write(&path, toml).unwrap();
        path
    }

    #[test]
    fn first_registration_wins() {
        let registry = PluginRegistry::new();
        registry.register_unit(unit("first", &["x::Echo"])).unwrap();
        let report = registry.register_unit(unit("second", &["x::Echo", "x::Sink"])).unwrap();

        assert_eq!(report.duplicates, vec!["x::Echo".to_string()]);
        assert_eq!(report.registered, vec!["x::Sink".to_string()]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("x::Echo").unwrap().library().name(), "first");
    }

    #[test]
    fn concurrent_registration_of_one_unit_adds_one_library() {
        let registry = Arc::new(PluginRegistry::new());
        let shared = unit("shared", &["s::A", "s::B"]);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || registry.register_unit(shared).unwrap())
            })
            .collect();
        let reports: Vec<DiscoveryReport> =
            threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(registry.libraries().len(), 1);
        assert_eq!(reports.iter().map(|r| r.libraries).sum::<usize>(), 1);
        assert!(reports.iter().all(|r| r.duplicates.is_empty()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn same_unit_is_registered_once() {
        let registry = PluginRegistry::new();
        registry.register_unit(unit("u", &["u::A"])).unwrap();
        let report = registry.register_unit(unit("u", &["u::A"])).unwrap();
        assert_eq!(report.libraries, 0);
        assert_eq!(registry.libraries().len(), 1);
    }

    #[test]
    fn short_name_lookup_uses_registration_order() {
        let registry = PluginRegistry::new();
        registry.register_unit(unit("a", &["a::Echo"])).unwrap();
        registry.register_unit(unit("b", &["b.Echo"])).unwrap();
        assert_eq!(
            registry.find_by_short_name("Echo").unwrap().type_name(),
            "a::Echo"
        );
        assert!(registry.find_by_short_name("Missing").is_none());
    }

    #[test]
    fn discover_scans_directories_for_manifests() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "b.toml", "beta", &["beta::Two"]);
        write_manifest(dir.path(), "a.toml", "alpha", &["alpha::One"]);
        std::fs::write(dir.path().join("README.md"), "not a manifest").unwrap();

        let registry = PluginRegistry::new();
        let report = registry
            .discover(&DiscoverySource::new().with_path(dir.path()))
            .unwrap();

        assert_eq!(report.libraries, 2);
        assert_eq!(report.registered, vec!["alpha::One", "beta::Two"]);
        let descriptor = registry.get("alpha::One").unwrap();
        assert!(!descriptor.library().is_loaded());
    }

    #[test]
    fn discovery_errors_abort_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "[library\n").unwrap();

        let registry = PluginRegistry::new();
        let err = registry
            .discover(&DiscoverySource::new().with_path(dir.path()))
            .unwrap_err();
        assert!(matches!(err, LanesError::Manifest { .. }));
    }

    #[test]
    #[traced_test]
    fn ignore_errors_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "[library\n").unwrap();
        write_manifest(dir.path(), "good.toml", "good", &["good::Type"]);

        let registry = PluginRegistry::new();
        let report = registry
            .discover(
                &DiscoverySource::new()
                    .with_path(dir.path())
                    .with_path(dir.path().join("missing"))
                    .with_unit(unit("static", &["static::Type"]))
                    .ignore_errors(true),
            )
            .unwrap();

        assert_eq!(report.errors.len(), 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("static::Type").is_some());
        assert!(logs_contain("discovery error ignored"));
    }

    #[test]
    fn instantiate_prefers_exact_then_loadable_short_name() {
        let dir = tempfile::tempdir().unwrap();
        // Manifest with no shared object: probes fine, never loads.
        let manifest = write_manifest(dir.path(), "meta.toml", "meta", &["meta::Echo"]);

        let registry = PluginRegistry::new();
        registry
            .discover(
                &DiscoverySource::new()
                    .with_path(manifest)
                    .with_unit(unit("static", &["static::Echo"])),
            )
            .unwrap();

        let (descriptor, _) = registry.instantiate("Echo").unwrap();
        assert_eq!(descriptor.type_name(), "static::Echo");

        let err = registry.instantiate("meta::Echo").unwrap_err();
        assert!(matches!(err, LanesError::Activation { .. }));

        let err = registry.instantiate("Nothing").unwrap_err();
        assert!(matches!(err, LanesError::TypeNotFound { .. }));
    }

    #[tokio::test]
    async fn create_instance_requires_channel() {
        let registry = PluginRegistry::new();
        registry.register_unit(unit("s", &["s::Nop"])).unwrap();
        let err = registry
            .create_instance(None, "s::Nop", "nop", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LanesError::ChannelMissing));
    }

    #[tokio::test]
    async fn create_instance_appends_wrapped_plugin() {
        let registry = PluginRegistry::new();
        registry.register_unit(unit("s", &["s::Nop"])).unwrap();
        let channel = Channel::new("main").unwrap();
        let id = Uuid::new_v4();

        let info = registry
            .create_instance(Some(&channel), "Nop", "first", Some(id))
            .await
            .unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.name, "first");
        assert_eq!(info.type_name, "s::Nop");
        assert_eq!(info.library.as_deref(), Some("s"));
        assert!(registry.get("s::Nop").unwrap().library().is_loaded());

        let err = registry
            .create_instance(Some(&channel), "s::Nop", "first", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LanesError::NameCollision { .. }));
        assert_eq!(channel.plugin_names(), vec!["first".to_string()]);
    }
}
