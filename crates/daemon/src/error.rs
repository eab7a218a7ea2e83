// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon error taxonomy.
//!
//! Every error surfaced to the RPC boundary carries a stable `kind()`
//! discriminator; handlers translate it into the wire error code instead of
//! matching on message text.

use thiserror::Error;

use crate::store::StoreError;

/// Shared daemon result type.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors surfaced by the coordination core.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// No task/slot/worktree with the given id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not valid in the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The target already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required precondition does not hold.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A required external binary is not installed.
    #[error("{tool} not found in PATH")]
    ToolMissing { tool: String },

    /// An external tool ran and failed; `detail` carries its stderr.
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    /// Timeouts and socket errors; safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Store failures propagate unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DaemonError {
    /// Stable discriminator used as the wire error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Precondition(_) => "precondition",
            Self::ToolMissing { .. } => "external_tool_missing",
            Self::ToolFailed { .. } => "external_tool_failed",
            Self::Transient(_) => "transient",
            Self::Store(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_strings() {
        assert_eq!(DaemonError::NotFound("task-1".into()).kind(), "not_found");
        assert_eq!(DaemonError::InvalidState("x".into()).kind(), "invalid_state");
        assert_eq!(DaemonError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(DaemonError::Precondition("x".into()).kind(), "precondition");
        assert_eq!(
            DaemonError::ToolMissing { tool: "tmux".into() }.kind(),
            "external_tool_missing"
        );
        assert_eq!(
            DaemonError::ToolFailed { tool: "gh".into(), detail: "exit 1".into() }.kind(),
            "external_tool_failed"
        );
        assert_eq!(DaemonError::Transient("timeout".into()).kind(), "transient");
    }

    #[test]
    fn tool_missing_message_names_the_binary() {
        let err = DaemonError::ToolMissing { tool: "tmux".into() };
        assert_eq!(err.to_string(), "tmux not found in PATH");
    }
}
