// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library manifest parsing from `lanes-plugin.toml` files.
//!
//! A manifest describes one deployable unit: the library's identity, an
//! optional shared object implementing it, and the plugin types it provides.
//! Reading a manifest never loads code.
//!
//! ```toml
//! [library]
//! name = "demo"
//! version = "0.3.1"
//! path = "libdemo.so"
//!
//! [[plugin]]
//! type = "demo::Echo"
//! description = "Echoes whatever it receives"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lanes_core::LanesError;
use semver::Version;
use serde::Deserialize;

/// Conventional manifest file name.
pub const MANIFEST_FILE_NAME: &str = "lanes-plugin.toml";

/// Parsed library manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryManifest {
    /// Library name; also the unit id.
    pub name: String,
    pub version: Version,
    pub description: Option<String>,
    /// Shared object implementing the unit, relative to the manifest directory.
    pub path: Option<PathBuf>,
    /// Declared plugin types, in file order.
    pub plugins: Vec<PluginEntry>,
}

/// One `[[plugin]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    library: LibrarySection,
    #[serde(default)]
    plugin: Vec<PluginEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LibrarySection {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Parses manifest TOML. Errors are plain messages; callers attach the path.
pub fn parse_library_manifest(toml_content: &str) -> Result<LibraryManifest, String> {
    let file: ManifestFile = toml::from_str(toml_content).map_err(|e| e.to_string())?;
    let section = file.library;

    if section.name.trim().is_empty() {
        return Err("library.name must not be empty".to_string());
    }

    let version = Version::parse(&section.version)
        .map_err(|e| format!("library.version '{}' is not semver: {e}", section.version))?;

    let mut seen = HashSet::new();
    for entry in &file.plugin {
        if entry.type_name.trim().is_empty() {
            return Err("plugin.type must not be empty".to_string());
        }
        if !seen.insert(entry.type_name.as_str()) {
            return Err(format!(
                "plugin type '{}' is declared more than once",
                entry.type_name
            ));
        }
    }

    Ok(LibraryManifest {
        name: section.name,
        version,
        description: section.description,
        path: section.path,
        plugins: file.plugin,
    })
}

impl LibraryManifest {
    /// Reads and parses the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, LanesError> {
        let content = std::fs::read_to_string(path).map_err(|source| LanesError::Io {
            context: format!("reading plugin manifest {}", path.display()),
            source,
        })?;
        parse_library_manifest(&content).map_err(|message| LanesError::Manifest {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Absolute location of the shared object, resolved against `manifest_dir`.
    pub fn shared_object(&self, manifest_dir: &Path) -> Option<PathBuf> {
        self.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                manifest_dir.join(p)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[library]
name = "demo"
version = "0.3.1"
path = "libdemo.so"

[[plugin]]
type = "demo::Echo"
description = "Echoes"

[[plugin]]
type = "demo::Sink"
"#;

    #[test]
    fn parses_valid_manifest() {
        let m = parse_library_manifest(VALID).unwrap();
        assert_eq!(m.name, "demo");
        assert_eq!(m.version, Version::new(0, 3, 1));
        assert_eq!(m.plugins.len(), 2);
        assert_eq!(m.plugins[0].type_name, "demo::Echo");
        assert_eq!(m.plugins[0].description.as_deref(), Some("Echoes"));
        assert!(m.plugins[1].description.is_none());
    }

    #[test]
    fn resolves_relative_shared_object() {
        let m = parse_library_manifest(VALID).unwrap();
        assert_eq!(
            m.shared_object(Path::new("/opt/lanes")),
            Some(PathBuf::from("/opt/lanes/libdemo.so"))
        );
    }

    #[test]
    fn rejects_missing_library_section() {
        let err = parse_library_manifest("[[plugin]]\ntype = \"a::B\"\n").unwrap_err();
        assert!(err.contains("library"), "got: {err}");
    }

    #[test]
    fn rejects_bad_version() {
        let err =
            parse_library_manifest("[library]\nname = \"x\"\nversion = \"one\"\n").unwrap_err();
        assert!(err.contains("semver"));
    }

    #[test]
    fn rejects_duplicate_types() {
        let toml = r#"
[library]
name = "x"
version = "1.0.0"
[[plugin]]
type = "x::A"
[[plugin]]
type = "x::A"
"#;
        let err = parse_library_manifest(toml).unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let toml = "[library]\nname = \"x\"\nversion = \"1.0.0\"\nauthor = \"me\"\n";
        assert!(parse_library_manifest(toml).is_err());
    }

    #[test]
    fn manifest_without_plugins_is_valid() {
        let m = parse_library_manifest("[library]\nname = \"x\"\nversion = \"1.0.0\"\n").unwrap();
        assert!(m.plugins.is_empty());
        assert!(m.path.is_none());
    }
}
