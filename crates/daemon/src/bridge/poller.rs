// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound bridge loop: poll issues for human replies, inject them into the
//! blocked session, and complete tasks whose issues were closed.
//!
//! Delivery is at-least-once; the stored last-seen reply id de-duplicates.
//! Tracker errors are logged and retried on the next tick; they never mark
//! a task failed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mapd_core::{Clock, EventKind, Task, TaskStatus};

use crate::error::Result;
use crate::event_bus::EventBus;
use crate::multiplexer::Multiplexer;
use crate::slots::{collapse_newlines, SlotManager};
use crate::store::Store;
use crate::tracker::{IssueComment, IssueTracker, ISSUE_STATE_CLOSED};

use super::INPUT_REQUEST_PREFIX;

/// How often issues are polled.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Pause between paste, first submit, and second submit. Long pasted text
/// may need one keystroke to expand the placeholder and a second to submit.
const PASTE_SETTLE: Duration = Duration::from_millis(300);

/// Polls issues for replies and closure.
pub struct ReplyPoller<C: Clock> {
    store: Arc<Store>,
    slots: Arc<SlotManager<C>>,
    mux: Arc<dyn Multiplexer>,
    tracker: Arc<dyn IssueTracker>,
    bus: EventBus<C>,
    clock: C,
    interval: Duration,
    paste_settle: Duration,
}

impl<C: Clock> ReplyPoller<C> {
    pub fn new(
        store: Arc<Store>,
        slots: Arc<SlotManager<C>>,
        tracker: Arc<dyn IssueTracker>,
        bus: EventBus<C>,
        clock: C,
    ) -> Self {
        let mux = Arc::clone(slots.multiplexer());
        Self {
            store,
            slots,
            mux,
            tracker,
            bus,
            clock,
            interval: POLL_INTERVAL,
            paste_settle: PASTE_SETTLE,
        }
    }

    /// Shrink the settle pause (tests).
    pub fn with_paste_settle(mut self, settle: Duration) -> Self {
        self.paste_settle = settle;
        self
    }

    /// Poll until shutdown; the first poll happens immediately.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => self.poll().await,
            }
        }
    }

    /// One polling pass.
    pub async fn poll(&self) {
        match self.store.list_waiting_input_with_issue() {
            Ok(waiting) => {
                for task in waiting {
                    if let Err(err) = self.check_for_reply(&task).await {
                        warn!(task_id = %task.id, error = %err, "reply poll failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to list waiting tasks"),
        }

        match self.store.list_in_progress_with_issue() {
            Ok(active) => {
                for task in active {
                    if let Err(err) = self.check_issue_closed(&task).await {
                        warn!(task_id = %task.id, error = %err, "issue state poll failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to list active tasks"),
        }
    }

    async fn check_for_reply(&self, task: &Task) -> Result<()> {
        let Some(issue) = task.issue.as_ref().filter(|issue| issue.is_valid()) else {
            return Ok(());
        };

        let comments = self.tracker.list_comments(issue).await?;
        let Some(reply) = select_reply(task, &comments) else {
            return Ok(());
        };

        let Some(agent_id) = task.assigned_to.as_deref() else {
            debug!(task_id = %task.id, "waiting task has no assigned agent");
            return Ok(());
        };
        let Some(slot) = self.slots.get(agent_id) else {
            debug!(task_id = %task.id, agent_id, "no live slot for waiting task");
            return Ok(());
        };

        let message = format!("User response to your question:\n\n{}", reply.body);
        let line = collapse_newlines(&message);

        self.mux.send_text(&slot.session, &line).await?;
        tokio::time::sleep(self.paste_settle).await;
        self.mux.send_enter(&slot.session).await?;
        // A long paste collapses to a placeholder: the first Enter expands
        // it, the second submits.
        tokio::time::sleep(self.paste_settle).await;
        self.mux.send_enter(&slot.session).await?;

        self.store
            .clear_waiting_input(&task.id, &reply.id, self.clock.epoch_secs())?;
        self.bus.emit(EventKind::TaskInputReceived {
            task_id: task.id.clone(),
            status: TaskStatus::InProgress,
            agent_id: Some(agent_id.to_string()),
        });
        info!(
            task_id = %task.id,
            agent_id,
            reply_id = %reply.id,
            author = %reply.author,
            "delivered reply to agent"
        );
        Ok(())
    }

    async fn check_issue_closed(&self, task: &Task) -> Result<()> {
        let Some(issue) = task.issue.as_ref().filter(|issue| issue.is_valid()) else {
            return Ok(());
        };

        let state = self.tracker.issue_state(issue).await?;
        if state != ISSUE_STATE_CLOSED {
            return Ok(());
        }

        self.store
            .set_status(&task.id, TaskStatus::Completed, self.clock.epoch_secs())?;
        self.bus.emit(EventKind::TaskCompleted {
            task_id: task.id.clone(),
            status: TaskStatus::Completed,
            agent_id: task.assigned_to.clone(),
        });
        info!(task_id = %task.id, "task completed: issue closed");

        // Completion released the slot; pending tasks can dispatch.
        self.slots.notify_available();
        Ok(())
    }
}

/// Pick the reply to deliver: the first comment (oldest first) that is not
/// a bot-posted question, not older than the wait, and not already seen.
fn select_reply<'a>(task: &Task, comments: &'a [IssueComment]) -> Option<&'a IssueComment> {
    let waiting_since = task.waiting_since.unwrap_or(0);
    comments.iter().find(|comment| {
        if comment.body.starts_with(INPUT_REQUEST_PREFIX) {
            return false;
        }
        if comment.created_at < waiting_since {
            return false;
        }
        if Some(comment.id.as_str()) == task.last_reply_id.as_deref() {
            return false;
        }
        true
    })
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
