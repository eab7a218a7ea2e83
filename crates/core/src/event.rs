// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination events fanned out to watchers.
//!
//! Serializes with `{"type": "noun:verb", ...fields}` format. The tag
//! returned by [`EventKind::type_tag`] is the stable identifier used for
//! watch filtering and store persistence.

use serde::{Deserialize, Serialize};

use crate::task::TaskStatus;

/// Event payloads, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "task:created")]
    TaskCreated {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    #[serde(rename = "task:started")]
    TaskStarted {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    #[serde(rename = "task:waiting_input")]
    TaskWaitingInput {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    #[serde(rename = "task:input_received")]
    TaskInputReceived {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    #[serde(rename = "task:completed")]
    TaskCompleted {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    #[serde(rename = "task:failed")]
    TaskFailed {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    #[serde(rename = "task:cancelled")]
    TaskCancelled {
        task_id: String,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },

    /// An agent slot joined the fleet.
    #[serde(rename = "agent:connected")]
    AgentConnected { agent_id: String, message: String },

    /// An agent slot left the fleet.
    #[serde(rename = "agent:disconnected")]
    AgentDisconnected { agent_id: String, message: String },

    /// Free-text daemon status.
    #[serde(rename = "status")]
    Status { message: String },
}

impl EventKind {
    /// Stable tag used for watch filtering and persistence.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task:created",
            Self::TaskStarted { .. } => "task:started",
            Self::TaskWaitingInput { .. } => "task:waiting_input",
            Self::TaskInputReceived { .. } => "task:input_received",
            Self::TaskCompleted { .. } => "task:completed",
            Self::TaskFailed { .. } => "task:failed",
            Self::TaskCancelled { .. } => "task:cancelled",
            Self::AgentConnected { .. } => "agent:connected",
            Self::AgentDisconnected { .. } => "agent:disconnected",
            Self::Status { .. } => "status",
        }
    }

    /// Task id carried by task events; `None` for slot and status events.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskCreated { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskWaitingInput { task_id, .. }
            | Self::TaskInputReceived { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskCancelled { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// An immutable timestamped record of a coordination transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Seconds since the Unix epoch.
    pub at: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(id: impl Into<String>, at: u64, kind: EventKind) -> Self {
        Self { id: id.into(), at, kind }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
