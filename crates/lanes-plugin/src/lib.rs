// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin discovery and type registry for the Lanes runtime.
//!
//! Libraries are located through manifest files or handed over as resolved
//! units, probed for the types they provide, and activated lazily when a
//! type is first instantiated onto a channel.

pub mod descriptor;
pub mod library;
pub mod manifest;
pub mod registry;
pub mod unit;

pub use descriptor::PluginTypeDescriptor;
pub use library::{Library, LibraryLocator, LibraryState};
pub use manifest::{LibraryManifest, MANIFEST_FILE_NAME, PluginEntry, parse_library_manifest};
pub use registry::{DiscoveryReport, DiscoverySource, PluginRegistry};
pub use unit::{
    ManifestUnit, PluginFactory, PluginUnit, StaticUnit, TypeInfo, UNIT_ENTRY_SYMBOL,
    UnitEntryFn, UnitExports,
};
