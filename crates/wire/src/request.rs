// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use mapd_core::{AgentFlavor, TaskStatus};
use serde::{Deserialize, Serialize};

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a task and route it to an idle agent.
    SubmitTask {
        description: String,
        #[serde(default)]
        scope_paths: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        github_owner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        github_repo: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        github_issue_number: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_working_dir: Option<String>,
    },

    /// List tasks with optional filters.
    ListTasks {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_filter: Option<TaskStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_filter: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },

    /// Fetch a single task.
    GetTask { task_id: String },

    /// Cancel a non-terminal task.
    CancelTask { task_id: String },

    /// Find the active task whose slot's working copy contains the directory.
    GetCurrentTask { working_directory: String },

    /// Explicitly post a question for a task and mark it waiting for input.
    RequestInput { task_id: String, question: String },

    /// Ask the daemon to shut down.
    Shutdown {
        #[serde(default)]
        force: bool,
    },

    /// Daemon health and counters.
    GetStatus,

    /// Spawn one or more agent slots.
    SpawnAgent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default)]
        use_worktree: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name_prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flavor: Option<AgentFlavor>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skip_permission_prompts: Option<bool>,
    },

    /// Destroy an agent slot and its session.
    KillAgent {
        agent_id: String,
        #[serde(default)]
        force: bool,
    },

    /// List live agent slots.
    ListAgents,

    /// Restart the agent CLI inside a dead pane.
    RespawnAgent { agent_id: String },

    /// List tracked worktrees.
    ListWorktrees {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo_root: Option<String>,
    },

    /// Remove a specific agent's worktree, or sweep orphans.
    CleanupWorktrees {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default)]
        all: bool,
    },

    /// Subscribe to the event stream, optionally filtered by type tag.
    WatchEvents {
        #[serde(default)]
        type_filter: Vec<String>,
    },
}
