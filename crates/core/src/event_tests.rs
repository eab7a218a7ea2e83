// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{Event, EventKind};
use crate::task::TaskStatus;

fn all_kinds() -> Vec<EventKind> {
    vec![
        EventKind::TaskCreated {
            task_id: "task-1".into(),
            status: TaskStatus::Pending,
            agent_id: None,
        },
        EventKind::TaskStarted {
            task_id: "task-1".into(),
            status: TaskStatus::InProgress,
            agent_id: Some("jacques-bernard".into()),
        },
        EventKind::TaskWaitingInput {
            task_id: "task-1".into(),
            status: TaskStatus::WaitingInput,
            agent_id: Some("jacques-bernard".into()),
        },
        EventKind::TaskInputReceived {
            task_id: "task-1".into(),
            status: TaskStatus::InProgress,
            agent_id: Some("jacques-bernard".into()),
        },
        EventKind::TaskCompleted {
            task_id: "task-1".into(),
            status: TaskStatus::Completed,
            agent_id: Some("jacques-bernard".into()),
        },
        EventKind::TaskFailed {
            task_id: "task-1".into(),
            status: TaskStatus::Failed,
            agent_id: Some("jacques-bernard".into()),
        },
        EventKind::TaskCancelled {
            task_id: "task-1".into(),
            status: TaskStatus::Cancelled,
            agent_id: None,
        },
        EventKind::AgentConnected {
            agent_id: "jacques-bernard".into(),
            message: "agent jacques-bernard connected".into(),
        },
        EventKind::AgentDisconnected {
            agent_id: "jacques-bernard".into(),
            message: "agent jacques-bernard disconnected".into(),
        },
        EventKind::Status { message: "daemon started".into() },
    ]
}

#[test]
fn every_kind_roundtrips_through_json() {
    for kind in all_kinds() {
        let json = serde_json::to_string(&kind).expect("serialize");
        let decoded: EventKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, kind, "roundtrip failed for {json}");
    }
}

#[test]
fn serialized_type_field_matches_type_tag() {
    for kind in all_kinds() {
        let value = serde_json::to_value(&kind).expect("serialize");
        assert_eq!(value["type"], kind.type_tag(), "{kind:?}");
    }
}

#[test]
fn task_id_present_only_on_task_events() {
    for kind in all_kinds() {
        let is_task_event = kind.type_tag().starts_with("task:");
        assert_eq!(kind.task_id().is_some(), is_task_event, "{kind:?}");
    }
}

#[test]
fn event_envelope_flattens_kind() {
    let event = Event::new(
        "evt-1",
        1700,
        EventKind::Status { message: "ready".into() },
    );
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["id"], "evt-1");
    assert_eq!(value["at"], 1700);
    assert_eq!(value["type"], "status");
    assert_eq!(value["message"], "ready");

    let decoded: Event = serde_json::from_value(value).expect("deserialize");
    assert_eq!(decoded, event);
}

#[test]
fn absent_agent_id_is_omitted_from_payload() {
    let kind = EventKind::TaskCreated {
        task_id: "task-9".into(),
        status: TaskStatus::Pending,
        agent_id: None,
    };
    let json = serde_json::to_string(&kind).expect("serialize");
    assert!(!json.contains("agent_id"), "{json}");
}
