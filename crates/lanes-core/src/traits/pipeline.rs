// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handle a plugin uses to relay control along its channel's chain.

use crate::error::LanesError;

/// The hosting channel as seen from inside a plugin.
///
/// Implementations are cheap to clone behind an `Arc` and may be used from any
/// thread, including callbacks the plugin owns.
pub trait Pipeline: Send + Sync {
    /// Name of the hosting channel.
    fn channel_name(&self) -> &str;

    /// Hands control to the next plugin in the chain.
    ///
    /// On the channel's own worker the cursor advances before this returns.
    /// From any other thread the advance is queued, and a second request made
    /// while the first is still queued fails with
    /// [`LanesError::RunNextPending`].
    fn run_next(&self) -> Result<(), LanesError>;

    /// Whether the calling thread is the channel's worker.
    fn is_worker_thread(&self) -> bool;
}
