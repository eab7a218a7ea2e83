// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! zellij adapter.
//!
//! zellij exposes a smaller surface than tmux: no pane title, no pane
//! working directory, no capture, and session styling lives in its config
//! file. Those queries return the documented "unsupported" sentinels.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{DaemonError, Result};

use super::{require_on_path, run_mux, Multiplexer, SessionOptions};

/// Multiplexer backed by the `zellij` CLI.
pub struct ZellijMultiplexer;

impl ZellijMultiplexer {
    pub fn new() -> Result<Self> {
        require_on_path("zellij")?;
        Ok(Self)
    }

    async fn run_ok(&self, args: &[&str]) -> Result<()> {
        let output = run_mux("zellij", args).await?;
        if !output.status.success() {
            return Err(DaemonError::ToolFailed {
                tool: "zellij".into(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Multiplexer for ZellijMultiplexer {
    fn name(&self) -> &'static str {
        "zellij"
    }

    async fn create_session(&self, name: &str, workdir: &Path, command: &str) -> Result<()> {
        if self.has_session(name).await {
            return Err(DaemonError::Conflict(format!("session {name} already exists")));
        }

        let workdir = workdir.to_string_lossy();
        self.run_ok(&["-s", name, "options", "--default-cwd", &workdir, "--", command])
            .await
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        self.run_ok(&["kill-session", name]).await
    }

    async fn has_session(&self, name: &str) -> bool {
        self.list_sessions("")
            .await
            .map(|sessions| sessions.iter().any(|s| s == name))
            .unwrap_or(false)
    }

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>> {
        let output = run_mux("zellij", &["list-sessions", "--short"]).await?;
        if !output.status.success() {
            // No sessions is not an error.
            return Ok(Vec::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn send_text(&self, session: &str, text: &str) -> Result<()> {
        self.run_ok(&["-s", session, "action", "write-chars", text]).await
    }

    async fn send_enter(&self, session: &str) -> Result<()> {
        // 10 is the ASCII code for newline.
        self.run_ok(&["-s", session, "action", "write", "10"]).await
    }

    async fn respawn_pane(&self, session: &str, command: &str) -> Result<()> {
        // No direct respawn-pane equivalent; run the command in the session.
        self.run_ok(&["-s", session, "run", "--", command]).await
    }

    async fn pane_workdir(&self, _session: &str) -> String {
        String::new()
    }

    async fn pane_title(&self, _session: &str) -> String {
        "zellij".to_string()
    }

    async fn pane_dead(&self, session: &str) -> bool {
        // Best available signal: the session disappearing.
        !self.has_session(session).await
    }

    async fn capture_visible(&self, _session: &str, _lines: u32) -> Result<String> {
        Ok(String::new())
    }

    fn attach_command(&self, session: &str) -> Vec<String> {
        vec!["zellij".into(), "attach".into(), session.into()]
    }

    async fn configure_session(&self, _session: &str, _opts: &SessionOptions) -> Result<()> {
        // Styling and behavior live in ~/.config/zellij/config.kdl.
        Ok(())
    }
}
