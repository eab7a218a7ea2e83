// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-multiplexer capability interface.
//!
//! The core never knows which concrete multiplexer hosts a session. Where an
//! adapter cannot answer a query (zellij has no pane title, for instance) it
//! returns the documented "unsupported" sentinel instead of failing: an empty
//! string, `false`, or a no-op `Ok(())`.

mod tmux;
mod zellij;

pub use tmux::TmuxMultiplexer;
pub use zellij::ZellijMultiplexer;

#[cfg(test)]
mod fake;
#[cfg(test)]
pub use fake::{FakeMultiplexer, MuxCall};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Configuration applied to a session after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Slot id shown in the session's status area.
    pub label: String,
    pub mouse_enabled: bool,
    /// Command used to restart the agent in place.
    pub restart_command: String,
}

/// Capabilities the daemon needs from a terminal-session host.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// "tmux" or "zellij".
    fn name(&self) -> &'static str;

    /// Create a detached session running `command` in `workdir`.
    ///
    /// Idempotent by name: a second create for a live session fails with
    /// [`DaemonError::Conflict`].
    async fn create_session(&self, name: &str, workdir: &Path, command: &str) -> Result<()>;

    async fn kill_session(&self, name: &str) -> Result<()>;

    async fn has_session(&self, name: &str) -> bool;

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deliver `text` exactly as if typed, with no terminator.
    async fn send_text(&self, session: &str, text: &str) -> Result<()>;

    /// Deliver a single line-submit keystroke.
    async fn send_enter(&self, session: &str) -> Result<()>;

    /// Replace the process inside the session; the session survives.
    async fn respawn_pane(&self, session: &str, command: &str) -> Result<()>;

    /// Working directory of the pane, or `""` when unknown/unsupported.
    async fn pane_workdir(&self, session: &str) -> String;

    /// Pane title used as a status line; adapter-specific fallback.
    async fn pane_title(&self, session: &str) -> String;

    /// Whether the process inside the pane has exited.
    async fn pane_dead(&self, session: &str) -> bool;

    /// Last `lines` visible lines of the pane, or `""` when unsupported.
    async fn capture_visible(&self, session: &str, lines: u32) -> Result<String>;

    /// Argv an external process can exec to attach a user's terminal.
    fn attach_command(&self, session: &str) -> Vec<String>;

    async fn configure_session(&self, session: &str, opts: &SessionOptions) -> Result<()>;
}

/// Supported multiplexer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplexerKind {
    Tmux,
    Zellij,
}

mapd_core::string_enum! {
    MultiplexerKind {
        Tmux => "tmux",
        Zellij => "zellij",
    }
}

impl MultiplexerKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tmux" => Some(Self::Tmux),
            "zellij" => Some(Self::Zellij),
            _ => None,
        }
    }

    /// Kind from `MAP_MULTIPLEXER`, defaulting to tmux.
    pub fn from_env() -> Self {
        std::env::var("MAP_MULTIPLEXER")
            .ok()
            .and_then(|value| Self::parse(&value))
            .unwrap_or(Self::Tmux)
    }
}

/// Instantiate the adapter for `kind`, failing early when the host binary is
/// not installed.
pub fn new_multiplexer(kind: MultiplexerKind) -> Result<Arc<dyn Multiplexer>> {
    match kind {
        MultiplexerKind::Tmux => Ok(Arc::new(TmuxMultiplexer::new()?)),
        MultiplexerKind::Zellij => Ok(Arc::new(ZellijMultiplexer::new()?)),
    }
}

/// Check that `binary` resolves on `PATH`.
pub(crate) fn require_on_path(binary: &str) -> Result<()> {
    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Ok(());
        }
    }
    Err(DaemonError::ToolMissing { tool: binary.to_string() })
}

/// Run a multiplexer command, classifying a missing binary separately from a
/// failed one.
pub(crate) async fn run_mux(
    binary: &'static str,
    args: &[&str],
) -> Result<std::process::Output> {
    let output = tokio::process::Command::new(binary)
        .args(args)
        .output()
        .await
        .map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                DaemonError::ToolMissing { tool: binary.to_string() }
            } else {
                DaemonError::Transient(format!("spawn {binary}: {err}"))
            }
        })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_names_only() {
        assert_eq!(MultiplexerKind::parse("tmux"), Some(MultiplexerKind::Tmux));
        assert_eq!(MultiplexerKind::parse("zellij"), Some(MultiplexerKind::Zellij));
        assert_eq!(MultiplexerKind::parse("screen"), None);
    }

    #[test]
    fn kind_displays_lowercase() {
        assert_eq!(MultiplexerKind::Tmux.to_string(), "tmux");
        assert_eq!(MultiplexerKind::Zellij.to_string(), "zellij");
    }

    #[test]
    fn require_on_path_finds_sh_and_rejects_nonsense() {
        assert!(require_on_path("sh").is_ok());
        let err = require_on_path("definitely-not-a-real-binary-xyz").unwrap_err();
        assert_eq!(err.kind(), "external_tool_missing");
    }
}
