// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task routing: submit, dispatch to idle slots, cancel.
//!
//! The router owns no durable state; it coordinates the store and the slot
//! manager. A single async mutex serializes dispatch decisions so two
//! agent-available callbacks can never double-dispatch a task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use mapd_core::{Clock, EventKind, IdGen, IssueRef, Task, TaskStatus};

use crate::bridge::INPUT_REQUEST_PREFIX;
use crate::error::{DaemonError, Result};
use crate::event_bus::EventBus;
use crate::slots::SlotManager;
use crate::store::Store;
use crate::tracker::IssueTracker;

/// Deadline for delivering one task prompt into a session. Generous:
/// minutes, not seconds, so a wedged terminal cannot hang dispatch forever.
const DISPATCH_DEADLINE: Duration = Duration::from_secs(30 * 60);

pub struct TaskRouter<C: Clock> {
    store: Arc<Store>,
    slots: Arc<SlotManager<C>>,
    tracker: Arc<dyn IssueTracker>,
    bus: EventBus<C>,
    ids: Arc<dyn IdGen>,
    clock: C,
    dispatch_lock: tokio::sync::Mutex<()>,
    dispatch_deadline: Duration,
}

impl<C: Clock + 'static> TaskRouter<C> {
    pub fn new(
        store: Arc<Store>,
        slots: Arc<SlotManager<C>>,
        tracker: Arc<dyn IssueTracker>,
        bus: EventBus<C>,
        ids: Arc<dyn IdGen>,
        clock: C,
    ) -> Self {
        Self {
            store,
            slots,
            tracker,
            bus,
            ids,
            clock,
            dispatch_lock: tokio::sync::Mutex::new(()),
            dispatch_deadline: DISPATCH_DEADLINE,
        }
    }

    /// Shrink the dispatch deadline (tests).
    pub fn with_dispatch_deadline(mut self, deadline: Duration) -> Self {
        self.dispatch_deadline = deadline;
        self
    }

    /// Persist a new pending task, emit its created event, then attempt one
    /// immediate dispatch in the background.
    pub async fn submit(
        self: &Arc<Self>,
        description: String,
        scope_paths: Vec<String>,
        issue: Option<IssueRef>,
        source_workdir: Option<String>,
    ) -> Result<Task> {
        let now = self.clock.epoch_secs();
        let mut task = Task::new(
            self.ids.generate("task-"),
            description,
            scope_paths,
            now,
        );
        task.issue = issue.filter(IssueRef::is_valid);
        task.source_workdir = source_workdir;

        self.store.create_task(&task)?;
        self.bus.emit(EventKind::TaskCreated {
            task_id: task.id.clone(),
            status: TaskStatus::Pending,
            agent_id: None,
        });
        info!(task_id = %task.id, "task submitted");

        let router = Arc::clone(self);
        tokio::spawn(async move { router.process_pending().await });

        Ok(task)
    }

    /// Dispatch pending tasks, oldest first, while idle slots remain.
    ///
    /// Serialized: concurrent callers queue on the dispatch lock, so each
    /// decision sees a consistent slot-availability snapshot.
    pub async fn process_pending(&self) {
        let _guard = self.dispatch_lock.lock().await;

        let pending = match self.store.list_tasks(Some(TaskStatus::Pending), None, None) {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "failed to list pending tasks");
                return;
            }
        };

        // The store lists newest first; dispatch oldest first.
        for task in pending.into_iter().rev() {
            let Some(slot) = self.acquire_slot() else { return };
            self.dispatch_one(task, &slot).await;
        }
    }

    /// Pick the next idle slot that is not already occupied by an active
    /// task. Delivering a prompt returns a slot to idle, but the slot stays
    /// reserved until its task leaves in_progress/waiting_input.
    fn acquire_slot(&self) -> Option<String> {
        let mut tried = std::collections::HashSet::new();
        loop {
            let slot = self.slots.find_idle()?;
            if !tried.insert(slot.agent_id.clone()) {
                // Wrapped around: every idle slot is occupied.
                return None;
            }
            match self.store.find_task_by_slot(&slot.agent_id) {
                Ok(None) => return Some(slot.agent_id.clone()),
                Ok(Some(_)) => continue,
                Err(err) => {
                    warn!(error = %err, "failed to check slot occupancy");
                    return None;
                }
            }
        }
    }

    /// Assign one task to one slot and deliver its prompt.
    async fn dispatch_one(&self, task: Task, agent_id: &str) {
        let now = self.clock.epoch_secs();
        if let Err(err) = self.store.assign(&task.id, agent_id, now) {
            warn!(task_id = %task.id, error = %err, "failed to assign task");
            return;
        }
        if let Err(err) = self
            .store
            .set_status(&task.id, TaskStatus::InProgress, now)
        {
            warn!(task_id = %task.id, error = %err, "failed to start task");
            return;
        }

        self.bus.emit(EventKind::TaskStarted {
            task_id: task.id.clone(),
            status: TaskStatus::InProgress,
            agent_id: Some(agent_id.to_string()),
        });

        let dispatched = self
            .slots
            .execute_task(
                agent_id,
                &task.id,
                &task.description,
                &task.scope_paths,
                self.dispatch_deadline,
            )
            .await;

        // The task stays in_progress until an external signal ends it; only
        // a failed delivery moves it to failed here.
        if let Err(err) = dispatched {
            warn!(task_id = %task.id, agent_id, error = %err, "dispatch failed");
            self.mark_failed(&task.id, agent_id, &err.to_string());
        }
    }

    fn mark_failed(&self, task_id: &str, agent_id: &str, error: &str) {
        let loaded = match self.store.get_task(task_id) {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(err) => {
                warn!(task_id, error = %err, "failed to load task after dispatch error");
                return;
            }
        };

        let mut task = loaded;
        task.status = TaskStatus::Failed;
        task.error = format!("task {task_id}: {error}");
        task.updated_at = self.clock.epoch_secs();
        if let Err(err) = self.store.update_task(&task) {
            warn!(task_id, error = %err, "failed to record dispatch failure");
            return;
        }

        self.bus.emit(EventKind::TaskFailed {
            task_id: task_id.to_string(),
            status: TaskStatus::Failed,
            agent_id: Some(agent_id.to_string()),
        });
    }

    /// Cancel a non-terminal task. The agent session is left untouched for
    /// the user to supervise.
    pub async fn cancel(self: &Arc<Self>, task_id: &str) -> Result<Task> {
        let mut task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| DaemonError::NotFound(format!("task not found: {task_id}")))?;

        if task.status.is_terminal() {
            return Err(DaemonError::InvalidState(format!(
                "cannot cancel task {task_id} in status {}",
                task.status
            )));
        }

        task.status = TaskStatus::Cancelled;
        task.updated_at = self.clock.epoch_secs();
        self.store.update_task(&task)?;

        self.bus.emit(EventKind::TaskCancelled {
            task_id: task.id.clone(),
            status: TaskStatus::Cancelled,
            agent_id: task.assigned_to.clone(),
        });
        info!(task_id, "task cancelled");

        // Cancelling may have released a slot.
        let router = Arc::clone(self);
        tokio::spawn(async move { router.process_pending().await });

        Ok(task)
    }

    /// Explicit bridge trigger: post a question for an assigned task and
    /// flip it to waiting_input.
    pub async fn request_input(&self, task_id: &str, question: &str) -> Result<String> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| DaemonError::NotFound(format!("task not found: {task_id}")))?;

        if task.status.is_terminal() {
            return Err(DaemonError::InvalidState(format!(
                "cannot request input for task {task_id} in status {}",
                task.status
            )));
        }
        let Some(agent_id) = task.assigned_to.clone() else {
            return Err(DaemonError::InvalidState(format!(
                "task {task_id} has no assigned agent"
            )));
        };
        let Some(issue) = task.issue.filter(|issue| issue.is_valid()) else {
            return Err(DaemonError::Precondition(format!(
                "task {task_id} has no external issue source"
            )));
        };

        self.tracker
            .post_comment(&issue, &format!("{INPUT_REQUEST_PREFIX} {question}"))
            .await
            .map_err(|err| match err {
                DaemonError::ToolFailed { tool, detail } => DaemonError::ToolFailed {
                    tool,
                    detail: format!("task {task_id}: {detail}"),
                },
                other => other,
            })?;

        self.store
            .set_waiting_input(task_id, question, self.clock.epoch_secs())?;
        self.bus.emit(EventKind::TaskWaitingInput {
            task_id: task_id.to_string(),
            status: TaskStatus::WaitingInput,
            agent_id: Some(agent_id),
        });

        Ok(format!(
            "question posted to {}/{}#{}",
            issue.owner, issue.repo, issue.number
        ))
    }

    pub fn get(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)?
            .ok_or_else(|| DaemonError::NotFound(format!("task not found: {task_id}")))
    }

    pub fn list(
        &self,
        status: Option<TaskStatus>,
        agent: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks(status, agent, limit)?)
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
