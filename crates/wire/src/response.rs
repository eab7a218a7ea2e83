// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use mapd_core::{Event, Task};
use serde::{Deserialize, Serialize};

use super::types::{AgentInfo, StatusInfo, WorktreeInfo};

/// Response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// A single task.
    Task { task: Task },

    /// A list of tasks.
    Tasks { tasks: Vec<Task> },

    /// An optional task (`GetCurrentTask`).
    TaskOrNone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<Box<Task>>,
    },

    /// Generic acknowledgement.
    Ack { success: bool, message: String },

    /// Daemon status counters.
    Status { status: StatusInfo },

    /// Live agent slots.
    Agents { agents: Vec<AgentInfo> },

    /// Tracked worktrees.
    Worktrees { worktrees: Vec<WorktreeInfo> },

    /// Result of a worktree cleanup.
    Cleanup {
        removed_count: u32,
        removed_paths: Vec<String>,
    },

    /// One streamed event (`WatchEvents` writes one frame per event).
    Event { event: Event },

    /// Typed failure; `kind` is the error-kind discriminator.
    Error { kind: String, message: String },
}

impl Response {
    /// Shorthand for a successful acknowledgement.
    pub fn ack(message: impl Into<String>) -> Self {
        Self::Ack { success: true, message: message.into() }
    }
}
