// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue-tracker capability interface.
//!
//! The bridge only needs three operations: list comments, post a comment,
//! and read the issue state. The `gh` CLI implementation shells out; tests
//! use the scripted fake.

use async_trait::async_trait;
use serde::Deserialize;

use mapd_core::IssueRef;

use crate::error::{DaemonError, Result};

/// Issue state string signifying closure.
pub const ISSUE_STATE_CLOSED: &str = "CLOSED";

/// One comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueComment {
    /// Stable opaque identifier.
    pub id: String,
    pub author: String,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub body: String,
}

/// Capabilities the bridge needs from an external issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Comments on the issue, oldest first.
    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<IssueComment>>;

    async fn post_comment(&self, issue: &IssueRef, body: &str) -> Result<()>;

    /// Enumerated state string; [`ISSUE_STATE_CLOSED`] signifies closure.
    async fn issue_state(&self, issue: &IssueRef) -> Result<String>;
}

/// Tracker backed by the `gh` CLI.
pub struct GhCli;

impl GhCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = tokio::process::Command::new("gh")
            .args(args)
            .output()
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    DaemonError::ToolMissing { tool: "gh".into() }
                } else {
                    DaemonError::Transient(format!("spawn gh: {err}"))
                }
            })?;

        if !output.status.success() {
            return Err(DaemonError::ToolFailed {
                tool: "gh".into(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueTracker for GhCli {
    async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<IssueComment>> {
        let number = issue.number.to_string();
        let repo = format!("{}/{}", issue.owner, issue.repo);
        let stdout = self
            .run(&["issue", "view", &number, "--repo", &repo, "--json", "comments"])
            .await?;
        parse_comments(&stdout)
    }

    async fn post_comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
        let number = issue.number.to_string();
        let repo = format!("{}/{}", issue.owner, issue.repo);
        self.run(&["issue", "comment", &number, "--repo", &repo, "--body", body])
            .await?;
        Ok(())
    }

    async fn issue_state(&self, issue: &IssueRef) -> Result<String> {
        let number = issue.number.to_string();
        let repo = format!("{}/{}", issue.owner, issue.repo);
        let stdout = self
            .run(&["issue", "view", &number, "--repo", &repo, "--json", "state"])
            .await?;
        parse_state(&stdout)
    }
}

#[derive(Deserialize)]
struct GhComments {
    #[serde(default)]
    comments: Vec<GhComment>,
}

#[derive(Deserialize)]
struct GhComment {
    id: serde_json::Value,
    #[serde(default)]
    author: serde_json::Value,
    #[serde(rename = "createdAt", default)]
    created_at: String,
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
struct GhIssueState {
    state: String,
}

fn parse_comments(json: &[u8]) -> Result<Vec<IssueComment>> {
    let parsed: GhComments = serde_json::from_slice(json).map_err(|err| {
        DaemonError::ToolFailed { tool: "gh".into(), detail: format!("parse comments: {err}") }
    })?;

    let mut comments = Vec::with_capacity(parsed.comments.len());
    for comment in parsed.comments {
        // gh emits string node ids for issue comments; tolerate numbers too.
        let id = match &comment.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let author = match &comment.author {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .get("login")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };

        // Comments with unparseable timestamps are skipped rather than
        // failing the whole poll.
        let Ok(created) = chrono::DateTime::parse_from_rfc3339(&comment.created_at) else {
            continue;
        };

        comments.push(IssueComment {
            id,
            author,
            created_at: created.timestamp().max(0) as u64,
            body: comment.body,
        });
    }
    Ok(comments)
}

fn parse_state(json: &[u8]) -> Result<String> {
    let parsed: GhIssueState = serde_json::from_slice(json).map_err(|err| {
        DaemonError::ToolFailed { tool: "gh".into(), detail: format!("parse state: {err}") }
    })?;
    Ok(parsed.state)
}

// Test support
#[cfg(test)]
pub use fake::FakeTracker;

#[cfg(test)]
mod fake {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    fn key(issue: &IssueRef) -> String {
        format!("{}/{}#{}", issue.owner, issue.repo, issue.number)
    }

    #[derive(Default)]
    struct FakeState {
        comments: HashMap<String, Vec<IssueComment>>,
        states: HashMap<String, String>,
        posts: Vec<(String, String)>,
        fail: bool,
    }

    /// Scripted tracker for tests; records posted comments.
    #[derive(Default)]
    pub struct FakeTracker {
        state: Mutex<FakeState>,
    }

    impl FakeTracker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_comments(&self, issue: &IssueRef, comments: Vec<IssueComment>) {
            self.state.lock().comments.insert(key(issue), comments);
        }

        pub fn push_comment(&self, issue: &IssueRef, comment: IssueComment) {
            self.state
                .lock()
                .comments
                .entry(key(issue))
                .or_default()
                .push(comment);
        }

        pub fn set_state(&self, issue: &IssueRef, state: &str) {
            self.state.lock().states.insert(key(issue), state.to_string());
        }

        /// `(issue key, body)` pairs, in post order.
        pub fn posts(&self) -> Vec<(String, String)> {
            self.state.lock().posts.clone()
        }

        /// Make every operation fail with a tool error.
        pub fn fail_all(&self, fail: bool) {
            self.state.lock().fail = fail;
        }
    }

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn list_comments(&self, issue: &IssueRef) -> Result<Vec<IssueComment>> {
            let state = self.state.lock();
            if state.fail {
                return Err(DaemonError::ToolFailed {
                    tool: "gh".into(),
                    detail: "scripted failure".into(),
                });
            }
            Ok(state.comments.get(&key(issue)).cloned().unwrap_or_default())
        }

        async fn post_comment(&self, issue: &IssueRef, body: &str) -> Result<()> {
            let mut state = self.state.lock();
            if state.fail {
                return Err(DaemonError::ToolFailed {
                    tool: "gh".into(),
                    detail: "scripted failure".into(),
                });
            }
            state.posts.push((key(issue), body.to_string()));
            Ok(())
        }

        async fn issue_state(&self, issue: &IssueRef) -> Result<String> {
            let state = self.state.lock();
            if state.fail {
                return Err(DaemonError::ToolFailed {
                    tool: "gh".into(),
                    detail: "scripted failure".into(),
                });
            }
            Ok(state
                .states
                .get(&key(issue))
                .cloned()
                .unwrap_or_else(|| "OPEN".to_string()))
        }
    }
}
