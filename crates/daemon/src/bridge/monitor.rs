// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound bridge loop: watch assigned sessions for agents blocking on a
//! question and post that question to the task's issue.
//!
//! A session counts as blocked when its visible content has not changed for
//! the idle threshold, no "actively working" pattern matches, and a
//! question pattern does. One post per in_progress → waiting_input
//! transition; captures while already waiting are skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mapd_core::{Clock, EventKind, TaskStatus};

use crate::error::Result;
use crate::event_bus::EventBus;
use crate::multiplexer::Multiplexer;
use crate::slots::{AgentSlot, SlotManager};
use crate::store::Store;
use crate::tracker::IssueTracker;

use super::INPUT_REQUEST_PREFIX;

/// How often sessions are inspected.
const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// How long a capture must stay unchanged before the agent counts as
/// blocked. Heuristic; varies by agent CLI.
const IDLE_THRESHOLD: Duration = Duration::from_secs(10);

/// Visible lines captured per inspection.
const CAPTURE_LINES: u32 = 50;

/// How many trailing lines are checked for activity markers.
const ACTIVE_WINDOW: usize = 10;

/// How many trailing lines are searched for a question.
const QUESTION_WINDOW: usize = 20;

/// Longest question block extracted, in lines.
const MAX_QUESTION_LINES: usize = 5;

/// Compiled detection patterns.
pub(crate) struct Patterns {
    question: Vec<Regex>,
    active: Vec<Regex>,
}

impl Patterns {
    pub(crate) fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static pattern"))
                .collect()
        };

        Self {
            question: compile(&[
                // Common question endings
                r"\?\s*$",
                // Agent CLI request phrasings
                r"(?i)please (choose|select|specify|confirm|provide)",
                r"(?i)would you like",
                r"(?i)do you want",
                r"(?i)should I",
                r"(?i)which (one|option)",
                r"(?i)what (should|would)",
                // Input prompts
                r"\[Y/n\]",
                r"\[y/N\]",
                r"\(y/n\)",
                r"Enter .+:",
            ]),
            active: compile(&[
                r"(?i)reading|writing|searching|analyzing|processing",
                r"(?i)running|executing|building|compiling",
                // Spinner characters
                r"⠋|⠙|⠹|⠸|⠼|⠴|⠦|⠧|⠇|⠏",
                // Ellipsis indicating progress
                r"\.\.\.",
            ]),
        }
    }
}

struct CaptureState {
    content: String,
    changed_at: Instant,
}

/// Watches each assigned slot's session output for questions.
pub struct InputMonitor<C: Clock> {
    store: Arc<Store>,
    slots: Arc<SlotManager<C>>,
    mux: Arc<dyn Multiplexer>,
    tracker: Arc<dyn IssueTracker>,
    bus: EventBus<C>,
    clock: C,
    patterns: Patterns,
    interval: Duration,
    idle_threshold: Duration,
    captures: Mutex<HashMap<String, CaptureState>>,
}

impl<C: Clock> InputMonitor<C> {
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
            patterns: Patterns::new(),
            interval: MONITOR_INTERVAL,
            idle_threshold: IDLE_THRESHOLD,
            captures: Mutex::new(HashMap::new()),
        }
    }

    /// Shrink the idle threshold (tests).
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Tick until shutdown. Cancellation is a close-of-signal; latency is
    /// at most one tick.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => self.check_all().await,
            }
        }
    }

    /// One inspection pass over every live slot.
    pub async fn check_all(&self) {
        for slot in self.slots.list() {
            if let Err(err) = self.check_slot(&slot).await {
                // Tracker and adapter hiccups retry on the next tick.
                warn!(agent_id = %slot.agent_id, error = %err, "input monitor pass failed");
            }
        }
    }

    async fn check_slot(&self, slot: &AgentSlot) -> Result<()> {
        let Some(task) = self.store.find_task_by_slot(&slot.agent_id)? else {
            return Ok(());
        };
        if !task.has_issue() {
            return Ok(());
        }
        // One post per transition: while waiting, captures are skipped.
        if task.status != TaskStatus::InProgress {
            return Ok(());
        }

        let content = self.mux.capture_visible(&slot.session, CAPTURE_LINES).await?;
        let content = content.trim().to_string();
        if content.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        {
            let mut captures = self.captures.lock();
            match captures.entry(slot.agent_id.clone()) {
                std::collections::hash_map::Entry::Occupied(mut occupied) => {
                    if occupied.get().content != content {
                        occupied.insert(CaptureState {
                            content: content.clone(),
                            changed_at: now,
                        });
                        return Ok(()); // changed, not idle yet
                    }
                    if now.duration_since(occupied.get().changed_at) < self.idle_threshold {
                        return Ok(());
                    }
                }
                std::collections::hash_map::Entry::Vacant(vacant) => {
                    vacant.insert(CaptureState {
                        content: content.clone(),
                        changed_at: now,
                    });
                    return Ok(());
                }
            }
        }

        if is_actively_working(&self.patterns, &content) {
            return Ok(());
        }
        let Some(question) = extract_question(&self.patterns, &content) else {
            return Ok(());
        };

        let Some(issue) = task.issue.as_ref() else { return Ok(()) };
        self.tracker
            .post_comment(issue, &format!("{INPUT_REQUEST_PREFIX} {question}"))
            .await?;

        self.store
            .set_waiting_input(&task.id, &question, self.clock.epoch_secs())?;
        self.captures.lock().remove(&slot.agent_id);

        self.bus.emit(EventKind::TaskWaitingInput {
            task_id: task.id.clone(),
            status: TaskStatus::WaitingInput,
            agent_id: Some(slot.agent_id.clone()),
        });
        info!(
            task_id = %task.id,
            agent_id = %slot.agent_id,
            issue = %format!("{}/{}#{}", issue.owner, issue.repo, issue.number),
            "posted question to issue"
        );
        Ok(())
    }
}

/// Whether the trailing lines carry progress markers.
pub(crate) fn is_actively_working(patterns: &Patterns, content: &str) -> bool {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(ACTIVE_WINDOW);
    let recent = lines[start..].join("\n");
    patterns.active.iter().any(|p| p.is_match(&recent))
}

/// Extract a contiguous block ending at a question-matched line from the
/// trailing capture, at most [`MAX_QUESTION_LINES`] lines.
pub(crate) fn extract_question(patterns: &Patterns, content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(QUESTION_WINDOW);
    let recent = &lines[start..];

    let mut question_lines: Vec<&str> = Vec::new();
    let mut found = false;

    for line in recent.iter().rev() {
        let line = line.trim();
        if line.is_empty() {
            if found {
                break; // stop at the blank line above the question block
            }
            continue;
        }

        if !found && patterns.question.iter().any(|p| p.is_match(line)) {
            found = true;
        }
        if found {
            question_lines.insert(0, line);
        }
        if question_lines.len() >= MAX_QUESTION_LINES {
            break;
        }
    }

    if question_lines.is_empty() {
        None
    } else {
        Some(question_lines.join("\n"))
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
