// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use mapd_core::AgentFlavor;
use serde::{Deserialize, Serialize};

/// One live agent slot, as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub agent_id: String,
    pub workdir: String,
    /// Multiplexer session a client can attach to.
    pub session: String,
    pub flavor: AgentFlavor,
    /// Human-readable status line (pane title when the adapter supplies one).
    pub status: String,
    pub created_at: u64,
    pub multiplexer: String,
    #[serde(default)]
    pub has_worktree: bool,
}

/// One tracked worktree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorktreeInfo {
    pub agent_id: String,
    pub path: String,
    pub branch: String,
    pub created_at: u64,
    #[serde(default)]
    pub repo_root: String,
}

/// Daemon status counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusInfo {
    pub running: bool,
    pub started_at: u64,
    pub connected_agents: u32,
    pub pending_tasks: u32,
    pub active_tasks: u32,
    pub multiplexer: String,
}
