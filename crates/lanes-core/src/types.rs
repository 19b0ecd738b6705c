// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle states, transition results and identity types shared across the runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a hosted plugin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Created but not initialized, or torn down by `closing`.
    Uninitialized,
    /// Initialized and configured, not yet started.
    Ready,
    /// Running.
    Started,
    /// Temporarily suspended; can be resumed with `start`.
    Paused,
    /// Stopped; can be started again.
    Stopped,
    /// A hook failed or an error was assigned. Left only via `reset_error`.
    Error,
}

impl PluginState {
    /// States in which the run hook may be invoked.
    pub fn can_run(self) -> bool {
        matches!(self, PluginState::Started | PluginState::Paused)
    }

    fn to_u8(self) -> u8 {
        match self {
            PluginState::Uninitialized => 0,
            PluginState::Ready => 1,
            PluginState::Started => 2,
            PluginState::Paused => 3,
            PluginState::Stopped => 4,
            PluginState::Error => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PluginState::Ready,
            2 => PluginState::Started,
            3 => PluginState::Paused,
            4 => PluginState::Stopped,
            5 => PluginState::Error,
            _ => PluginState::Uninitialized,
        }
    }
}

/// Lifecycle operations a controller can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOp {
    Initialize,
    Start,
    Stop,
    Pause,
    Closing,
    Run,
    SetError,
    ResetError,
}

/// Result of asking a controller to perform a lifecycle transition.
///
/// Hook failures are not represented here: they move the controller to
/// [`PluginState::Error`] and surface as `Applied { to: Error, .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The transition was legal and the hook ran.
    Applied { from: PluginState, to: PluginState },
    /// The transition is not legal from the current state; nothing happened.
    Ignored { state: PluginState },
}

impl Transition {
    /// State of the controller after the request.
    pub fn state(&self) -> PluginState {
        match *self {
            Transition::Applied { to, .. } => to,
            Transition::Ignored { state } => state,
        }
    }

    /// Whether the transition was applied and did not end in `Error`.
    pub fn succeeded(&self) -> bool {
        matches!(self, Transition::Applied { to, .. } if *to != PluginState::Error)
    }
}

/// Point-in-time description of a hosted controller, safe to hand across threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    /// Unique instance id.
    pub id: Uuid,
    /// Channel-scoped display name.
    pub name: String,
    /// Qualified type name the instance was created from.
    pub type_name: String,
    /// Name of the library that provided the type, if any.
    pub library: Option<String>,
    /// Current lifecycle state.
    pub state: PluginState,
    /// Last recorded error, rendered.
    pub last_error: Option<String>,
}

/// Lock-free cell publishing a controller's state to its plugin and observers.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    /// Creates a cell holding `state`.
    pub fn new(state: PluginState) -> Self {
        Self(Arc::new(AtomicU8::new(state.to_u8())))
    }

    /// Reads the published state.
    pub fn get(&self) -> PluginState {
        PluginState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Publishes a new state.
    pub fn set(&self, state: PluginState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(PluginState::Uninitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn plugin_state_display_round_trips() {
        for state in [
            PluginState::Uninitialized,
            PluginState::Ready,
            PluginState::Started,
            PluginState::Paused,
            PluginState::Stopped,
            PluginState::Error,
        ] {
            let text = state.to_string();
            assert_eq!(PluginState::from_str(&text).expect("parse back"), state);
        }
        assert_eq!(PluginState::Started.to_string(), "started");
    }

    #[test]
    fn shared_state_publishes_across_clones() {
        let cell = SharedState::default();
        let observer = cell.clone();
        assert_eq!(observer.get(), PluginState::Uninitialized);
        cell.set(PluginState::Paused);
        assert_eq!(observer.get(), PluginState::Paused);
    }

    #[test]
    fn transition_success_excludes_error() {
        let ok = Transition::Applied {
            from: PluginState::Ready,
            to: PluginState::Started,
        };
        let failed = Transition::Applied {
            from: PluginState::Ready,
            to: PluginState::Error,
        };
        let ignored = Transition::Ignored {
            state: PluginState::Ready,
        };
        assert!(ok.succeeded());
        assert!(!failed.succeeded());
        assert!(!ignored.succeeded());
        assert_eq!(ignored.state(), PluginState::Ready);
    }

    #[test]
    fn lifecycle_op_labels_are_snake_case() {
        assert_eq!(LifecycleOp::ResetError.to_string(), "reset_error");
        assert_eq!(LifecycleOp::Start.as_ref(), "start");
    }

    fn any_state() -> impl proptest::strategy::Strategy<Value = PluginState> {
        proptest::sample::select(vec![
            PluginState::Uninitialized,
            PluginState::Ready,
            PluginState::Started,
            PluginState::Paused,
            PluginState::Stopped,
            PluginState::Error,
        ])
    }

    proptest::proptest! {
        #[test]
        fn shared_state_keeps_the_last_write(states in proptest::collection::vec(any_state(), 1..32)) {
            let cell = SharedState::default();
            for state in &states {
                cell.set(*state);
                proptest::prop_assert_eq!(cell.get(), *state);
            }
            proptest::prop_assert_eq!(cell.get(), *states.last().unwrap());
        }

        #[test]
        fn unknown_encodings_read_as_uninitialized(raw in 6u8..) {
            proptest::prop_assert_eq!(PluginState::from_u8(raw), PluginState::Uninitialized);
        }
    }

    #[test]
    fn only_started_and_paused_can_run() {
        assert!(PluginState::Started.can_run());
        assert!(PluginState::Paused.can_run());
        assert!(!PluginState::Ready.can_run());
        assert!(!PluginState::Error.can_run());
    }
}
