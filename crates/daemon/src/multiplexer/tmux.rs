// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux adapter.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{DaemonError, Result};

use super::{require_on_path, run_mux, Multiplexer, SessionOptions};

/// Multiplexer backed by the `tmux` CLI.
pub struct TmuxMultiplexer;

impl TmuxMultiplexer {
    pub fn new() -> Result<Self> {
        require_on_path("tmux")?;
        Ok(Self)
    }

    async fn run_ok(&self, args: &[&str]) -> Result<()> {
        let output = run_mux("tmux", args).await?;
        if !output.status.success() {
            return Err(DaemonError::ToolFailed {
                tool: "tmux".into(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn display(&self, session: &str, format: &str) -> Option<String> {
        let output = run_mux("tmux", &["display-message", "-t", session, "-p", format])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    fn name(&self) -> &'static str {
        "tmux"
    }

    async fn create_session(&self, name: &str, workdir: &Path, command: &str) -> Result<()> {
        let workdir = workdir.to_string_lossy();
        let output = run_mux(
            "tmux",
            &["new-session", "-d", "-s", name, "-c", &workdir, command],
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("duplicate session") {
                return Err(DaemonError::Conflict(format!("session {name} already exists")));
            }
            return Err(DaemonError::ToolFailed { tool: "tmux".into(), detail: stderr });
        }
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        self.run_ok(&["kill-session", "-t", name]).await
    }

    async fn has_session(&self, name: &str) -> bool {
        run_mux("tmux", &["has-session", "-t", name])
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>> {
        let output = run_mux("tmux", &["list-sessions", "-F", "#{session_name}"]).await?;
        if !output.status.success() {
            // No server running means no sessions, not an error.
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
        // -l sends the text literally, without tmux key-name interpretation.
        self.run_ok(&["send-keys", "-t", session, "-l", text]).await
    }

    async fn send_enter(&self, session: &str) -> Result<()> {
        self.run_ok(&["send-keys", "-t", session, "Enter"]).await
    }

    async fn respawn_pane(&self, session: &str, command: &str) -> Result<()> {
        self.run_ok(&["respawn-pane", "-t", session, "-k", command]).await
    }

    async fn pane_workdir(&self, session: &str) -> String {
        self.display(session, "#{pane_current_path}")
            .await
            .unwrap_or_default()
    }

    async fn pane_title(&self, session: &str) -> String {
        match self.display(session, "#{pane_title}").await {
            Some(title) if !title.is_empty() => title,
            Some(_) => "idle".to_string(),
            None => "unknown".to_string(),
        }
    }

    async fn pane_dead(&self, session: &str) -> bool {
        self.display(session, "#{pane_dead}")
            .await
            .is_some_and(|value| value == "1")
    }

    async fn capture_visible(&self, session: &str, lines: u32) -> Result<String> {
        let start = format!("-{lines}");
        let output =
            run_mux("tmux", &["capture-pane", "-t", session, "-p", "-S", &start]).await?;
        if !output.status.success() {
            return Err(DaemonError::ToolFailed {
                tool: "tmux".into(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn attach_command(&self, session: &str) -> Vec<String> {
        vec!["tmux".into(), "attach".into(), "-t".into(), session.into()]
    }

    async fn configure_session(&self, session: &str, opts: &SessionOptions) -> Result<()> {
        if opts.mouse_enabled {
            let _ = run_mux("tmux", &["set-option", "-t", session, "mouse", "on"]).await;
        }

        // Keep the pane open when the agent exits so the session can be
        // inspected and respawned in place.
        let _ = run_mux("tmux", &["set-option", "-t", session, "remain-on-exit", "on"]).await;

        if !opts.restart_command.is_empty() {
            let _ = run_mux(
                "tmux",
                &["set-option", "-t", session, "@map_cli_cmd", &opts.restart_command],
            )
            .await;
            let _ = run_mux(
                "tmux",
                &["bind-key", "-t", session, "R", "respawn-pane", "-k", &opts.restart_command],
            )
            .await;
        }

        if !opts.label.is_empty() {
            let status_right = format!(" [{}] %H %H:%M %d-%b-%y", opts.label);
            let _ = run_mux(
                "tmux",
                &["set-option", "-t", session, "status-right", &status_right],
            )
            .await;
        }

        // Neutral grays that work on both dark and light terminals.
        for (option, value) in [
            ("status-style", "bg=colour240,fg=colour255"),
            ("status-left-style", "bg=colour243,fg=colour255"),
            ("status-right-style", "bg=colour243,fg=colour255"),
            ("window-status-current-style", "bg=colour245,fg=colour232,bold"),
        ] {
            let _ = run_mux("tmux", &["set-option", "-t", session, option, value]).await;
        }

        Ok(())
    }
}
