// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent slot types: flavor selection and busy/idle state.

use serde::{Deserialize, Serialize};

/// Which agent CLI a slot hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFlavor {
    Claude,
    Codex,
}

crate::string_enum! {
    AgentFlavor {
        Claude => "claude",
        Codex => "codex",
    }
}

impl Default for AgentFlavor {
    fn default() -> Self {
        Self::Claude
    }
}

impl AgentFlavor {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            _ => None,
        }
    }

    /// Name of the CLI binary this flavor launches.
    pub fn binary(&self) -> &'static str {
        self.as_str()
    }

    /// Full launch command for a slot session.
    ///
    /// The skip flag differs per CLI and must match what the binary accepts.
    pub fn launch_command(&self, skip_permission_prompts: bool) -> String {
        match (self, skip_permission_prompts) {
            (Self::Claude, true) => "claude --dangerously-skip-permissions".to_string(),
            (Self::Claude, false) => "claude".to_string(),
            (Self::Codex, true) => {
                "codex --dangerously-bypass-approvals-and-sandbox".to_string()
            }
            (Self::Codex, false) => "codex".to_string(),
        }
    }
}

/// Busy/idle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Idle,
    Busy,
}

crate::string_enum! {
    SlotStatus {
        Idle => "idle",
        Busy => "busy",
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
