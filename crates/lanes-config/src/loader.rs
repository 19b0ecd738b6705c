// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lanes.toml` > `~/.config/lanes/lanes.toml` > `/etc/lanes/lanes.toml`
//! with environment variable overrides via `LANES_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::LanesConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG: &str = "/etc/lanes/lanes.toml";

/// Configuration file in the working directory.
pub const LOCAL_CONFIG: &str = "lanes.toml";

/// Path of the user configuration file, if a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lanes/lanes.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lanes/lanes.toml`
/// 3. `~/.config/lanes/lanes.toml`
/// 4. `./lanes.toml`
/// 5. `LANES_*` environment variables
pub fn load_config() -> Result<LanesConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<LanesConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LanesConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LanesConfig, figment::Error> {
    debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(LanesConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LanesConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider mapping `LANES_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys such as
/// `log_level` contain underscores themselves.
fn env_provider() -> Env {
    Env::prefixed("LANES_")
        .ignore(&["log"])
        .map(|key| {
            // Keys arrive in their original case.
            key.as_str()
                .to_ascii_lowercase()
                .replacen("runtime_", "runtime.", 1)
                .replacen("discovery_", "discovery.", 1)
                .into()
        })
}
