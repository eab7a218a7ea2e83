// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{IssueRef, Task, TaskStatus};

const ALL_STATUSES: [TaskStatus; 8] = [
    TaskStatus::Pending,
    TaskStatus::Offered,
    TaskStatus::Accepted,
    TaskStatus::InProgress,
    TaskStatus::WaitingInput,
    TaskStatus::Completed,
    TaskStatus::Failed,
    TaskStatus::Cancelled,
];

#[test]
fn status_serializes_as_lowercase_snake_case() {
    let json = serde_json::to_string(&TaskStatus::WaitingInput).unwrap();
    assert_eq!(json, "\"waiting_input\"");
    let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
    assert_eq!(json, "\"in_progress\"");
}

#[test]
fn status_as_str_parse_roundtrip() {
    for status in ALL_STATUSES {
        assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        assert_eq!(status.to_string(), status.as_str());
    }
    assert_eq!(TaskStatus::parse("bogus"), None);
}

#[test]
fn only_completed_failed_cancelled_are_terminal() {
    for status in ALL_STATUSES {
        let expected = matches!(
            status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        );
        assert_eq!(status.is_terminal(), expected, "{status}");
    }
}

#[test]
fn slot_holding_statuses_require_a_slot() {
    for status in ALL_STATUSES {
        let expected = matches!(
            status,
            TaskStatus::Offered
                | TaskStatus::Accepted
                | TaskStatus::InProgress
                | TaskStatus::WaitingInput
        );
        assert_eq!(status.requires_slot(), expected, "{status}");
    }
}

#[test]
fn new_task_starts_pending_with_matching_timestamps() {
    let task = Task::new("task-1", "fix the login bug", vec!["/src/auth".into()], 500);
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.created_at, 500);
    assert_eq!(task.updated_at, 500);
    assert!(task.assigned_to.is_none());
    assert!(task.waiting_since.is_none());
}

#[test]
fn empty_scope_paths_roundtrip_as_empty_sequence() {
    let task = Task::new("task-2", "desc", Vec::new(), 1);
    let json = serde_json::to_string(&task).unwrap();
    let decoded: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.scope_paths, Vec::<String>::new());
}

#[test]
fn issue_ref_validity_requires_positive_number_and_both_names() {
    let good = IssueRef { owner: "acme".into(), repo: "api".into(), number: 42 };
    assert!(good.is_valid());

    let zero = IssueRef { owner: "acme".into(), repo: "api".into(), number: 0 };
    assert!(!zero.is_valid());

    let unnamed = IssueRef { owner: String::new(), repo: "api".into(), number: 7 };
    assert!(!unnamed.is_valid());
}

#[test]
fn has_issue_is_false_for_invalid_refs() {
    let task = Task::new("task-3", "desc", Vec::new(), 1).with_issue(IssueRef {
        owner: "acme".into(),
        repo: String::new(),
        number: 42,
    });
    assert!(!task.has_issue());
}

#[test]
fn task_with_issue_roundtrips_through_json() {
    let task = Task::new("task-4", "desc", vec!["a".into(), "b".into()], 9).with_issue(
        IssueRef { owner: "acme".into(), repo: "api".into(), number: 42 },
    );
    let json = serde_json::to_string(&task).unwrap();
    let decoded: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, task);
}
