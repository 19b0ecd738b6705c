// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lanes plugin runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error carried as the source of plugin and activation failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across the runtime, its collaborators and plugins.
///
/// Variants fall into three groups: precondition violations returned straight
/// to the caller, plugin hook failures recorded on a controller, and
/// discovery/activation failures returned to whoever ran discovery. Timeouts
/// are not errors; see `OperationOutcome` in `lanes-channel`.
#[derive(Debug, Error)]
pub enum LanesError {
    /// A plugin instance was requested without a target channel.
    #[error("no channel was supplied for the plugin instance")]
    ChannelMissing,

    /// The instance name is already used by another controller on the channel.
    #[error("plugin instance '{name}' already exists on channel '{channel}'")]
    NameCollision { channel: String, name: String },

    /// An operation other than initialize/start/closing hit an uninitialized plugin.
    #[error("plugin '{name}' is not initialized")]
    NotInitialized { name: String },

    /// No controller with the given name is hosted by the channel.
    #[error("plugin '{name}' not found on channel '{channel}'")]
    ControllerNotFound { channel: String, name: String },

    /// A channel with the same name is already part of the set.
    #[error("channel '{name}' already exists")]
    ChannelExists { name: String },

    /// The channel is closing, terminated, or its worker was killed.
    #[error("channel '{name}' is closed")]
    ChannelClosed { name: String },

    /// A cross-thread run-next request is still waiting to be executed.
    #[error("a run-next request is already pending on channel '{channel}'")]
    RunNextPending { channel: String },

    /// A controller was re-entered while one of its own hooks was running.
    #[error("plugin '{name}' is already executing on channel '{channel}'")]
    Reentrant { channel: String, name: String },

    /// A plugin hook reported a failure.
    #[error("plugin error: {message}")]
    Plugin {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A plugin hook panicked.
    #[error("plugin '{name}' panicked during {operation}: {message}")]
    PluginPanicked {
        name: String,
        operation: String,
        message: String,
    },

    /// A unit of work queued on a channel panicked.
    #[error("queued action panicked on channel '{channel}': {message}")]
    ActionPanicked { channel: String, message: String },

    /// A plugin library manifest is malformed.
    #[error("invalid plugin manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    /// A discovery locator could not be probed.
    #[error("discovery failed for {locator}: {message}")]
    Discovery { locator: String, message: String },

    /// A library could not be activated.
    #[error("failed to activate library '{library}': {message}")]
    Activation {
        library: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// No registered plugin type matches the requested name.
    #[error("plugin type '{name}' is not registered")]
    TypeNotFound { name: String },

    /// A configuration store failed to load or save.
    #[error("configuration store error for '{name}': {message}")]
    ConfigStore { name: String, message: String },

    /// Filesystem access failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LanesError {
    /// Builds a plugin failure from a message, for use inside plugin hooks.
    pub fn plugin(message: impl Into<String>) -> Self {
        LanesError::Plugin {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a plugin failure wrapping an underlying error.
    pub fn plugin_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LanesError::Plugin {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for errors raised because a caller broke an API precondition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LanesError::ChannelMissing
                | LanesError::NameCollision { .. }
                | LanesError::NotInitialized { .. }
                | LanesError::ControllerNotFound { .. }
                | LanesError::ChannelExists { .. }
                | LanesError::ChannelClosed { .. }
                | LanesError::RunNextPending { .. }
                | LanesError::Reentrant { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_collision_mentions_channel_and_name() {
        let err = LanesError::NameCollision {
            channel: "ingest".into(),
            name: "reader".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ingest"));
        assert!(msg.contains("reader"));
        assert!(err.is_precondition());
    }

    #[test]
    fn plugin_error_keeps_source() {
        let err = LanesError::plugin_with_source("disk full", std::io::Error::other("ENOSPC"));
        assert_eq!(err.to_string(), "plugin error: disk full");
        let source = std::error::Error::source(&err).expect("source should be kept");
        assert_eq!(source.to_string(), "ENOSPC");
        assert!(!err.is_precondition());
    }

    #[test]
    fn manifest_error_shows_path() {
        let err = LanesError::Manifest {
            path: PathBuf::from("/opt/plugins/bad.toml"),
            message: "missing [library] section".into(),
        };
        assert!(err.to_string().contains("/opt/plugins/bad.toml"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LanesError>();
    }
}
