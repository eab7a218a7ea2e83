// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{AgentFlavor, SlotStatus};

#[test]
fn flavor_parse_defaults_empty_to_claude() {
    assert_eq!(AgentFlavor::parse(""), Some(AgentFlavor::Claude));
    assert_eq!(AgentFlavor::parse("claude"), Some(AgentFlavor::Claude));
    assert_eq!(AgentFlavor::parse("codex"), Some(AgentFlavor::Codex));
    assert_eq!(AgentFlavor::parse("gemini"), None);
}

#[test]
fn launch_command_carries_per_flavor_skip_flag() {
    assert_eq!(AgentFlavor::Claude.launch_command(false), "claude");
    assert_eq!(
        AgentFlavor::Claude.launch_command(true),
        "claude --dangerously-skip-permissions"
    );
    assert_eq!(AgentFlavor::Codex.launch_command(false), "codex");
    assert_eq!(
        AgentFlavor::Codex.launch_command(true),
        "codex --dangerously-bypass-approvals-and-sandbox"
    );
}

#[test]
fn flavor_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&AgentFlavor::Codex).unwrap(), "\"codex\"");
}

#[test]
fn slot_status_displays_lowercase() {
    assert_eq!(SlotStatus::Idle.to_string(), "idle");
    assert_eq!(SlotStatus::Busy.to_string(), "busy");
}
