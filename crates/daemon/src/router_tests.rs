// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mapd_core::{
    AgentFlavor, Event, EventKind, FakeClock, IssueRef, SeqIdGen, SlotStatus, TaskStatus,
};

use super::TaskRouter;
use crate::bridge::INPUT_REQUEST_PREFIX;
use crate::event_bus::{EventBus, Subscription};
use crate::multiplexer::{FakeMultiplexer, Multiplexer};
use crate::slots::SlotManager;
use crate::store::Store;
use crate::tracker::FakeTracker;

struct Fixture {
    store: Arc<Store>,
    slots: Arc<SlotManager<FakeClock>>,
    mux: Arc<FakeMultiplexer>,
    tracker: Arc<FakeTracker>,
    router: Arc<TaskRouter<FakeClock>>,
    events: Subscription,
    _shutdown: CancellationToken,
}

async fn fixture() -> Fixture {
    let clock = FakeClock::new();
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let mux = Arc::new(FakeMultiplexer::new());
    let tracker = Arc::new(FakeTracker::new());

    let (bus, driver) = EventBus::new(Arc::new(SeqIdGen::new()), clock.clone(), None);
    let shutdown = CancellationToken::new();
    tokio::spawn(driver.run(shutdown.clone()));
    let events = bus.subscribe();

    let slots = Arc::new(
        SlotManager::new(
            Arc::clone(&mux) as Arc<dyn Multiplexer>,
            bus.clone(),
            clock.clone(),
        )
        .with_paste_settle(Duration::from_millis(1))
        .with_binary_check(|_| Ok(())),
    );

    let router = Arc::new(
        TaskRouter::new(
            Arc::clone(&store),
            Arc::clone(&slots),
            Arc::clone(&tracker) as Arc<dyn crate::tracker::IssueTracker>,
            bus,
            Arc::new(SeqIdGen::new()),
            clock,
        )
        .with_dispatch_deadline(Duration::from_secs(5)),
    );

    // Wire the agent-available callback the way the daemon does.
    let callback_router = Arc::clone(&router);
    slots.set_on_agent_available(Arc::new(move || {
        let router = Arc::clone(&callback_router);
        tokio::spawn(async move { router.process_pending().await });
    }));

    Fixture { store, slots, mux, tracker, router, events, _shutdown: shutdown }
}

async fn spawn_slot(fx: &Fixture, agent_id: &str) {
    fx.slots
        .create_slot(agent_id, "/work".into(), AgentFlavor::Claude, true, false)
        .await
        .expect("create slot");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

async fn drain(events: &mut Subscription) -> Vec<Event> {
    settle().await;
    let mut drained = Vec::new();
    while let Ok(event) = events.receiver.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn submit_dispatches_to_the_idle_slot() {
    let mut fx = fixture().await;
    spawn_slot(&fx, "jacques-bernard").await;

    let task = fx
        .router
        .submit(
            "Fix the login bug".into(),
            vec!["/src/auth".into()],
            None,
            None,
        )
        .await
        .expect("submit");
    assert_eq!(task.status, TaskStatus::Pending);
    settle().await;

    let stored = fx.store.get_task(&task.id).expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::InProgress);
    assert_eq!(stored.assigned_to.as_deref(), Some("jacques-bernard"));

    // The session received the exact single-line prompt plus a submit.
    let session = "map-agent-jacques-bernard";
    assert_eq!(
        fx.mux.sent_texts(session),
        vec![format!(
            "[Task ID: {}]  Fix the login bug  Scope/files: /src/auth",
            task.id
        )]
    );
    assert_eq!(fx.mux.enters_sent(session), 1);

    // The slot cycled back to idle after the send.
    let slot = fx.slots.get("jacques-bernard").expect("slot");
    assert_eq!(slot.status(), SlotStatus::Idle);

    // created precedes started for the same task.
    let drained = drain(&mut fx.events).await;
    let created = drained.iter().position(|e| {
        matches!(&e.kind, EventKind::TaskCreated { task_id, .. } if task_id == &task.id)
    });
    let started = drained.iter().position(|e| {
        matches!(&e.kind, EventKind::TaskStarted { task_id, .. } if task_id == &task.id)
    });
    assert!(created.expect("created event") < started.expect("started event"));
}

#[tokio::test]
async fn submit_without_slots_leaves_task_pending() {
    let fx = fixture().await;
    let task = fx
        .router
        .submit("desc".into(), vec![], None, None)
        .await
        .expect("submit");
    settle().await;

    let stored = fx.store.get_task(&task.id).expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::Pending);
    assert!(stored.assigned_to.is_none());
}

#[tokio::test]
async fn queue_drains_oldest_first_when_a_slot_frees_up() {
    let fx = fixture().await;
    spawn_slot(&fx, "chad-sterling").await;
    spawn_slot(&fx, "jacques-bernard").await;

    // Both slots busy: everything queues.
    for agent in ["chad-sterling", "jacques-bernard"] {
        fx.slots
            .get(agent)
            .expect("slot")
            .force_state(SlotStatus::Busy, Some("warmup".into()));
    }

    let a = fx.router.submit("task A".into(), vec![], None, None).await.expect("submit");
    let b = fx.router.submit("task B".into(), vec![], None, None).await.expect("submit");
    let c = fx.router.submit("task C".into(), vec![], None, None).await.expect("submit");
    settle().await;

    for id in [&a.id, &b.id, &c.id] {
        let stored = fx.store.get_task(id).expect("get").expect("exists");
        assert_eq!(stored.status, TaskStatus::Pending, "{id}");
    }

    // One slot frees up: only the oldest pending task dispatches; the slot
    // then holds an in_progress task, so the rest stay queued.
    fx.slots
        .get("jacques-bernard")
        .expect("slot")
        .force_state(SlotStatus::Idle, None);
    fx.router.process_pending().await;
    settle().await;

    let stored_a = fx.store.get_task(&a.id).expect("get").expect("exists");
    assert_eq!(stored_a.status, TaskStatus::InProgress);
    assert_eq!(stored_a.assigned_to.as_deref(), Some("jacques-bernard"));

    for id in [&b.id, &c.id] {
        let stored = fx.store.get_task(id).expect("get").expect("exists");
        assert_eq!(stored.status, TaskStatus::Pending, "{id}");
    }
}

#[tokio::test]
async fn slot_with_active_task_is_not_reused() {
    let fx = fixture().await;
    spawn_slot(&fx, "jacques-bernard").await;

    let first = fx.router.submit("first".into(), vec![], None, None).await.expect("submit");
    settle().await;
    let second = fx.router.submit("second".into(), vec![], None, None).await.expect("submit");
    settle().await;

    let stored_first = fx.store.get_task(&first.id).expect("get").expect("exists");
    assert_eq!(stored_first.status, TaskStatus::InProgress);
    let stored_second = fx.store.get_task(&second.id).expect("get").expect("exists");
    assert_eq!(stored_second.status, TaskStatus::Pending);
}

#[tokio::test]
async fn cancelling_the_active_task_releases_the_slot() {
    let fx = fixture().await;
    spawn_slot(&fx, "jacques-bernard").await;

    let first = fx.router.submit("first".into(), vec![], None, None).await.expect("submit");
    settle().await;
    let second = fx.router.submit("second".into(), vec![], None, None).await.expect("submit");
    settle().await;

    fx.router.cancel(&first.id).await.expect("cancel");
    settle().await;

    let stored_second = fx.store.get_task(&second.id).expect("get").expect("exists");
    assert_eq!(stored_second.status, TaskStatus::InProgress);
    assert_eq!(stored_second.assigned_to.as_deref(), Some("jacques-bernard"));
}

#[tokio::test]
async fn dispatch_failure_marks_the_task_failed() {
    let mut fx = fixture().await;
    spawn_slot(&fx, "jacques-bernard").await;
    fx.mux.fail_sends(true);

    let task = fx.router.submit("doomed".into(), vec![], None, None).await.expect("submit");
    settle().await;

    let stored = fx.store.get_task(&task.id).expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.error.contains(&task.id));
    assert!(stored.updated_at >= stored.created_at);

    let drained = drain(&mut fx.events).await;
    assert!(drained.iter().any(|event| matches!(
        &event.kind,
        EventKind::TaskFailed { task_id, .. } if task_id == &task.id
    )));
}

#[tokio::test]
async fn submitted_issue_source_is_persisted() {
    let fx = fixture().await;
    let issue = IssueRef { owner: "acme".into(), repo: "api".into(), number: 42 };
    let task = fx
        .router
        .submit("desc".into(), vec![], Some(issue.clone()), Some("/repo/dir".into()))
        .await
        .expect("submit");

    let stored = fx.store.get_task(&task.id).expect("get").expect("exists");
    assert_eq!(stored.issue, Some(issue));
    assert_eq!(stored.source_workdir.as_deref(), Some("/repo/dir"));
}

#[tokio::test]
async fn invalid_issue_source_is_dropped() {
    let fx = fixture().await;
    let issue = IssueRef { owner: "acme".into(), repo: "api".into(), number: 0 };
    let task = fx
        .router
        .submit("desc".into(), vec![], Some(issue), None)
        .await
        .expect("submit");

    let stored = fx.store.get_task(&task.id).expect("get").expect("exists");
    assert!(stored.issue.is_none());
}

#[tokio::test]
async fn cancel_rejects_terminal_tasks() {
    let mut fx = fixture().await;
    let task = fx.router.submit("desc".into(), vec![], None, None).await.expect("submit");
    settle().await;
    fx.router.cancel(&task.id).await.expect("first cancel");

    let err = fx.router.cancel(&task.id).await.expect_err("second cancel");
    assert_eq!(err.kind(), "invalid_state");

    let drained = drain(&mut fx.events).await;
    assert!(drained.iter().any(|event| matches!(
        &event.kind,
        EventKind::TaskCancelled { task_id, .. } if task_id == &task.id
    )));
}

#[tokio::test]
async fn cancel_applies_to_waiting_input_tasks() {
    let fx = fixture().await;
    spawn_slot(&fx, "jacques-bernard").await;
    let task = fx.router.submit("desc".into(), vec![], None, None).await.expect("submit");
    settle().await;
    fx.store
        .set_waiting_input(&task.id, "q?", 999)
        .expect("waiting");

    let cancelled = fx.router.cancel(&task.id).await.expect("cancel");
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancel_unknown_task_is_not_found() {
    let fx = fixture().await;
    let err = fx.router.cancel("task-missing").await.expect_err("unknown");
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn request_input_posts_prefixed_question_and_flips_status() {
    let mut fx = fixture().await;
    spawn_slot(&fx, "jacques-bernard").await;
    let issue = IssueRef { owner: "acme".into(), repo: "api".into(), number: 42 };
    let task = fx
        .router
        .submit("desc".into(), vec![], Some(issue), None)
        .await
        .expect("submit");
    settle().await;

    let message = fx
        .router
        .request_input(&task.id, "Which database should I target?")
        .await
        .expect("request input");
    assert!(message.contains("acme/api#42"));

    let posts = fx.tracker.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].1,
        format!("{INPUT_REQUEST_PREFIX} Which database should I target?")
    );

    let stored = fx.store.get_task(&task.id).expect("get").expect("exists");
    assert_eq!(stored.status, TaskStatus::WaitingInput);
    assert_eq!(stored.question.as_deref(), Some("Which database should I target?"));

    let drained = drain(&mut fx.events).await;
    assert!(drained.iter().any(|event| matches!(
        &event.kind,
        EventKind::TaskWaitingInput { task_id, .. } if task_id == &task.id
    )));
}

#[tokio::test]
async fn request_input_requires_issue_and_assignment() {
    let fx = fixture().await;

    // No issue source.
    spawn_slot(&fx, "jacques-bernard").await;
    let plain = fx.router.submit("desc".into(), vec![], None, None).await.expect("submit");
    settle().await;
    let err = fx
        .router
        .request_input(&plain.id, "q?")
        .await
        .expect_err("no issue");
    assert_eq!(err.kind(), "precondition");

    // Unassigned task.
    let issue = IssueRef { owner: "acme".into(), repo: "api".into(), number: 42 };
    let queued = fx
        .router
        .submit("desc".into(), vec![], Some(issue), None)
        .await
        .expect("submit");
    // The single slot is occupied by `plain`, so `queued` stays pending.
    settle().await;
    let err = fx
        .router
        .request_input(&queued.id, "q?")
        .await
        .expect_err("unassigned");
    assert_eq!(err.kind(), "invalid_state");
}

#[tokio::test]
async fn list_and_get_delegate_to_the_store() {
    let fx = fixture().await;
    let task = fx.router.submit("desc".into(), vec![], None, None).await.expect("submit");

    let listed = fx
        .router
        .list(Some(TaskStatus::Pending), None, None)
        .expect("list");
    assert_eq!(listed.len(), 1);

    let fetched = fx.router.get(&task.id).expect("get");
    assert_eq!(fetched.id, task.id);

    let err = fx.router.get("task-missing").expect_err("unknown");
    assert_eq!(err.kind(), "not_found");
}
