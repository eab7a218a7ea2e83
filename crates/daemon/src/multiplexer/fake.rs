// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fake multiplexer for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{DaemonError, Result};

use super::{Multiplexer, SessionOptions};

/// One recorded adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    Create { session: String, workdir: PathBuf, command: String },
    Kill { session: String },
    SendText { session: String, text: String },
    SendEnter { session: String },
    Respawn { session: String, command: String },
    Configure { session: String, opts: SessionOptions },
}

#[derive(Default)]
struct FakeState {
    sessions: HashSet<String>,
    calls: Vec<MuxCall>,
    captures: HashMap<String, String>,
    titles: HashMap<String, String>,
    dead_panes: HashSet<String>,
    fail_sends: bool,
}

/// In-memory multiplexer that records calls and scripts query answers.
#[derive(Default)]
pub struct FakeMultiplexer {
    state: Mutex<FakeState>,
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.state.lock().calls.clone()
    }

    /// All text sent to one session, in order.
    pub fn sent_texts(&self, session: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MuxCall::SendText { session: s, text } if s == session => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of enter keystrokes sent to one session.
    pub fn enters_sent(&self, session: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, MuxCall::SendEnter { session: s } if s == session))
            .count()
    }

    pub fn set_capture(&self, session: &str, content: &str) {
        self.state
            .lock()
            .captures
            .insert(session.to_string(), content.to_string());
    }

    pub fn set_title(&self, session: &str, title: &str) {
        self.state
            .lock()
            .titles
            .insert(session.to_string(), title.to_string());
    }

    pub fn set_pane_dead(&self, session: &str, dead: bool) {
        let mut state = self.state.lock();
        if dead {
            state.dead_panes.insert(session.to_string());
        } else {
            state.dead_panes.remove(session);
        }
    }

    /// Make every subsequent send fail with a tool error.
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Register a session without going through `create_session`.
    pub fn adopt_session(&self, session: &str) {
        self.state.lock().sessions.insert(session.to_string());
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_session(&self, name: &str, workdir: &Path, command: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.sessions.insert(name.to_string()) {
            return Err(DaemonError::Conflict(format!("session {name} already exists")));
        }
        state.calls.push(MuxCall::Create {
            session: name.to_string(),
            workdir: workdir.to_path_buf(),
            command: command.to_string(),
        });
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(MuxCall::Kill { session: name.to_string() });
        if !state.sessions.remove(name) {
            return Err(DaemonError::ToolFailed {
                tool: "fake".into(),
                detail: format!("no session {name}"),
            });
        }
        Ok(())
    }

    async fn has_session(&self, name: &str) -> bool {
        self.state.lock().sessions.contains(name)
    }

    async fn list_sessions(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        let mut sessions: Vec<String> = state
            .sessions
            .iter()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    async fn send_text(&self, session: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_sends || !state.sessions.contains(session) {
            return Err(DaemonError::ToolFailed {
                tool: "fake".into(),
                detail: format!("cannot send to {session}"),
            });
        }
        state.calls.push(MuxCall::SendText {
            session: session.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_enter(&self, session: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_sends || !state.sessions.contains(session) {
            return Err(DaemonError::ToolFailed {
                tool: "fake".into(),
                detail: format!("cannot send to {session}"),
            });
        }
        state.calls.push(MuxCall::SendEnter { session: session.to_string() });
        Ok(())
    }

    async fn respawn_pane(&self, session: &str, command: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.sessions.contains(session) {
            return Err(DaemonError::ToolFailed {
                tool: "fake".into(),
                detail: format!("no session {session}"),
            });
        }
        state.dead_panes.remove(session);
        state.calls.push(MuxCall::Respawn {
            session: session.to_string(),
            command: command.to_string(),
        });
        Ok(())
    }

    async fn pane_workdir(&self, _session: &str) -> String {
        String::new()
    }

    async fn pane_title(&self, session: &str) -> String {
        self.state
            .lock()
            .titles
            .get(session)
            .cloned()
            .unwrap_or_else(|| "idle".to_string())
    }

    async fn pane_dead(&self, session: &str) -> bool {
        self.state.lock().dead_panes.contains(session)
    }

    async fn capture_visible(&self, session: &str, _lines: u32) -> Result<String> {
        Ok(self
            .state
            .lock()
            .captures
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    fn attach_command(&self, session: &str) -> Vec<String> {
        vec!["fake".into(), "attach".into(), session.into()]
    }

    async fn configure_session(&self, session: &str, opts: &SessionOptions) -> Result<()> {
        self.state.lock().calls.push(MuxCall::Configure {
            session: session.to_string(),
            opts: opts.clone(),
        });
        Ok(())
    }
}
