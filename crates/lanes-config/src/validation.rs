// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express, such as unique channel and
//! instance names. All errors are collected; validation does not fail fast.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::LanesConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validates a deserialized configuration for semantic correctness.
pub fn validate_config(config: &LanesConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.runtime.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "runtime.log_level `{}` is not one of: {}",
                config.runtime.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.runtime.idle_interval_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "runtime.idle_interval_ms must be greater than 0".to_string(),
        });
    }

    for (i, path) in config.discovery.paths.iter().enumerate() {
        if path.as_os_str().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("discovery.paths[{i}] must not be empty"),
            });
        }
    }

    let mut channel_names = HashSet::new();
    for (i, channel) in config.channels.iter().enumerate() {
        if channel.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("channel[{i}].name must not be empty"),
            });
        } else if !channel_names.insert(channel.name.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate channel name `{}` in [[channel]] array", channel.name),
            });
        }

        let mut instance_names = HashSet::new();
        for (j, plugin) in channel.plugins.iter().enumerate() {
            if plugin.type_name.trim().is_empty() {
                errors.push(ConfigError::Validation {
                    message: format!("channel[{i}].plugin[{j}].type must not be empty"),
                });
            }
            if plugin.name.trim().is_empty() {
                errors.push(ConfigError::Validation {
                    message: format!("channel[{i}].plugin[{j}].name must not be empty"),
                });
            } else if !instance_names.insert(plugin.name.as_str()) {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "duplicate plugin name `{}` on channel `{}`",
                        plugin.name, channel.name
                    ),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelConfig, PluginSpec};

    fn plugin(type_name: &str, name: &str) -> PluginSpec {
        PluginSpec {
            type_name: type_name.to_string(),
            name: name.to_string(),
            id: None,
        }
    }

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&LanesConfig::default()).is_ok());
    }

    #[test]
    fn bad_log_level_fails() {
        let mut config = LanesConfig::default();
        config.runtime.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "runtime.log_level"));
    }

    #[test]
    fn duplicate_channel_and_instance_names_are_all_reported() {
        let mut config = LanesConfig::default();
        config.channels = vec![
            ChannelConfig {
                name: "a".to_string(),
                plugins: vec![plugin("demo::Echo", "x"), plugin("demo::Echo", "x")],
            },
            ChannelConfig {
                name: "a".to_string(),
                plugins: vec![],
            },
        ];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(has_message(&errors, "duplicate channel name `a`"));
        assert!(has_message(&errors, "duplicate plugin name `x`"));
    }

    #[test]
    fn same_instance_name_on_different_channels_is_fine() {
        let mut config = LanesConfig::default();
        config.channels = vec![
            ChannelConfig {
                name: "a".to_string(),
                plugins: vec![plugin("demo::Echo", "x")],
            },
            ChannelConfig {
                name: "b".to_string(),
                plugins: vec![plugin("demo::Echo", "x")],
            },
        ];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_idle_interval_fails() {
        let mut config = LanesConfig::default();
        config.runtime.idle_interval_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "idle_interval_ms"));
    }
}
