// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task domain types.
//!
//! A task is a unit of work routed to one agent slot. Timestamps are
//! integer seconds since the Unix epoch; zero means "absent".

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// Terminal states are `Completed`, `Failed` and `Cancelled`; no transition
/// is permitted out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Offered,
    Accepted,
    InProgress,
    WaitingInput,
    Completed,
    Failed,
    Cancelled,
}

crate::string_enum! {
    TaskStatus {
        Pending => "pending",
        Offered => "offered",
        Accepted => "accepted",
        InProgress => "in_progress",
        WaitingInput => "waiting_input",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "offered" => Some(Self::Offered),
            "accepted" => Some(Self::Accepted),
            "in_progress" => Some(Self::InProgress),
            "waiting_input" => Some(Self::WaitingInput),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// True for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// True while the task occupies (or is being offered) a slot.
    pub fn requires_slot(&self) -> bool {
        matches!(
            self,
            Self::Offered | Self::Accepted | Self::InProgress | Self::WaitingInput
        )
    }
}

/// External issue a task was submitted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    /// A usable reference names both repo halves and a positive issue number.
    pub fn is_valid(&self) -> bool {
        !self.owner.is_empty() && !self.repo.is_empty() && self.number > 0
    }
}

/// A unit of work dispatched to an agent slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub scope_paths: Vec<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<IssueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reply_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_workdir: Option<String>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        scope_paths: Vec<String>,
        now: u64,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            scope_paths,
            status: TaskStatus::Pending,
            assigned_to: None,
            result: String::new(),
            error: String::new(),
            created_at: now,
            updated_at: now,
            issue: None,
            last_reply_id: None,
            question: None,
            waiting_since: None,
            source_workdir: None,
        }
    }

    /// Attach the external issue this task was submitted from.
    pub fn with_issue(mut self, issue: IssueRef) -> Self {
        self.issue = Some(issue);
        self
    }

    /// True when the task carries a usable external issue reference.
    pub fn has_issue(&self) -> bool {
        self.issue.as_ref().is_some_and(IssueRef::is_valid)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
