// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent slot pool.
//!
//! Each slot is one agent CLI hosted in one multiplexer session, cycling
//! between idle and busy. The pool map is guarded by a reader/writer lock;
//! each slot's status lives behind its own mutex. Discovery releases the
//! map lock before touching any slot lock.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use mapd_core::{AgentFlavor, Clock, EventKind, SlotStatus};

use crate::config::SESSION_PREFIX;
use crate::error::{DaemonError, Result};
use crate::event_bus::EventBus;
use crate::multiplexer::{require_on_path, Multiplexer, SessionOptions};
use crate::store::AgentRecord;

/// Pause between pasting text into a session and submitting it, so the
/// terminal can expand the paste placeholder.
const PASTE_SETTLE: Duration = Duration::from_millis(300);

/// Pause after session creation before the first prompt is delivered.
const STARTUP_SETTLE: Duration = Duration::from_millis(500);

/// Callback fired whenever a slot becomes available for dispatch.
pub type AvailableCallback = Arc<dyn Fn() + Send + Sync>;

/// Pluggable PATH probe for the agent binary (tests stub it out).
type BinaryCheck = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

#[derive(Debug)]
struct SlotState {
    status: SlotStatus,
    current_task: Option<String>,
}

/// One live agent slot.
#[derive(Debug)]
pub struct AgentSlot {
    pub agent_id: String,
    pub workdir: PathBuf,
    pub session: String,
    pub flavor: AgentFlavor,
    pub created_at: u64,
    pub has_worktree: bool,
    state: Mutex<SlotState>,
}

impl AgentSlot {
    pub fn status(&self) -> SlotStatus {
        self.state.lock().status
    }

    pub fn current_task(&self) -> Option<String> {
        self.state.lock().current_task.clone()
    }

    /// Force a slot's state (tests).
    #[cfg(test)]
    pub fn force_state(&self, status: SlotStatus, current_task: Option<String>) {
        let mut state = self.state.lock();
        state.status = status;
        state.current_task = current_task;
    }
}

/// Session name a slot's terminal lives in.
pub fn session_name(agent_id: &str) -> String {
    format!("{SESSION_PREFIX}{agent_id}")
}

/// Owns the live slot map and orchestrates the multiplexer.
pub struct SlotManager<C: Clock> {
    mux: Arc<dyn Multiplexer>,
    bus: EventBus<C>,
    clock: C,
    slots: RwLock<HashMap<String, Arc<AgentSlot>>>,
    last_assigned: Mutex<Option<String>>,
    on_available: RwLock<Option<AvailableCallback>>,
    paste_settle: Duration,
    startup_settle: Duration,
    binary_check: BinaryCheck,
}

impl<C: Clock> SlotManager<C> {
    pub fn new(mux: Arc<dyn Multiplexer>, bus: EventBus<C>, clock: C) -> Self {
        Self {
            mux,
            bus,
            clock,
            slots: RwLock::new(HashMap::new()),
            last_assigned: Mutex::new(None),
            on_available: RwLock::new(None),
            paste_settle: PASTE_SETTLE,
            startup_settle: STARTUP_SETTLE,
            binary_check: Arc::new(|binary| require_on_path(binary)),
        }
    }

    /// Shrink the settle pauses (tests).
    pub fn with_paste_settle(mut self, settle: Duration) -> Self {
        self.paste_settle = settle;
        self.startup_settle = settle;
        self
    }

    /// Replace the PATH probe for the agent binary (tests).
    pub fn with_binary_check(
        mut self,
        check: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.binary_check = Arc::new(check);
        self
    }

    /// Register the callback invoked (asynchronously) whenever a slot
    /// becomes available for dispatch.
    pub fn set_on_agent_available(&self, callback: AvailableCallback) {
        *self.on_available.write() = Some(callback);
    }

    /// Fire the agent-available callback asynchronously. Public so the
    /// bridge can signal capacity when an external completion frees a slot.
    pub fn notify_available(&self) {
        let callback = self.on_available.read().clone();
        if let Some(callback) = callback {
            tokio::spawn(async move { callback() });
        }
    }

    pub fn multiplexer(&self) -> &Arc<dyn Multiplexer> {
        &self.mux
    }

    /// Create a slot: session, configuration, registration, notification.
    pub async fn create_slot(
        &self,
        agent_id: &str,
        workdir: PathBuf,
        flavor: AgentFlavor,
        skip_permission_prompts: bool,
        has_worktree: bool,
    ) -> Result<Arc<AgentSlot>> {
        if self.slots.read().contains_key(agent_id) {
            return Err(DaemonError::Conflict(format!("agent {agent_id} already exists")));
        }

        (self.binary_check)(flavor.binary())?;

        let launch = flavor.launch_command(skip_permission_prompts);
        let session = session_name(agent_id);
        self.mux.create_session(&session, &workdir, &launch).await?;

        let options = SessionOptions {
            label: agent_id.to_string(),
            mouse_enabled: true,
            restart_command: launch.clone(),
        };
        if let Err(err) = self.mux.configure_session(&session, &options).await {
            warn!(agent_id, error = %err, "failed to configure session");
        }

        let slot = Arc::new(AgentSlot {
            agent_id: agent_id.to_string(),
            workdir,
            session: session.clone(),
            flavor,
            created_at: self.clock.epoch_secs(),
            has_worktree,
            state: Mutex::new(SlotState {
                status: SlotStatus::Idle,
                current_task: None,
            }),
        });

        let duplicate = {
            let mut slots = self.slots.write();
            if slots.contains_key(agent_id) {
                true
            } else {
                slots.insert(agent_id.to_string(), Arc::clone(&slot));
                false
            }
        };
        if duplicate {
            let _ = self.mux.kill_session(&session).await;
            return Err(DaemonError::Conflict(format!(
                "agent {agent_id} already exists"
            )));
        }

        self.bus.emit(EventKind::AgentConnected {
            agent_id: agent_id.to_string(),
            message: format!("agent {agent_id} connected (session: {session})"),
        });
        info!(agent_id, %session, flavor = %flavor, "created agent slot");

        self.notify_available();
        Ok(slot)
    }

    /// Re-register a slot recovered from the store whose session survived a
    /// daemon restart. Returns false when the session is gone.
    pub async fn adopt_slot(&self, record: &AgentRecord) -> bool {
        if record.session.is_empty() || !self.mux.has_session(&record.session).await {
            return false;
        }
        if self.slots.read().contains_key(&record.agent_id) {
            return false;
        }

        let slot = Arc::new(AgentSlot {
            agent_id: record.agent_id.clone(),
            workdir: PathBuf::from(&record.workdir),
            session: record.session.clone(),
            flavor: record.flavor,
            created_at: record.created_at,
            has_worktree: record.worktree_path.is_some(),
            state: Mutex::new(SlotState {
                status: SlotStatus::Idle,
                current_task: None,
            }),
        });
        self.slots
            .write()
            .insert(record.agent_id.clone(), slot);

        self.bus.emit(EventKind::AgentConnected {
            agent_id: record.agent_id.clone(),
            message: format!(
                "agent {} re-adopted (session: {})",
                record.agent_id, record.session
            ),
        });
        self.notify_available();
        true
    }

    /// Dispatch a task prompt into a slot's session.
    ///
    /// The slot atomically flips to busy for the duration of the send and
    /// always returns to idle afterwards, success or not.
    pub async fn execute_task(
        &self,
        agent_id: &str,
        task_id: &str,
        description: &str,
        scope_paths: &[String],
        deadline: Duration,
    ) -> Result<String> {
        let slot = self
            .get(agent_id)
            .ok_or_else(|| DaemonError::NotFound(format!("agent {agent_id} not found")))?;

        {
            let mut state = slot.state.lock();
            if state.status == SlotStatus::Busy {
                return Err(DaemonError::InvalidState(format!("agent {agent_id} is busy")));
            }
            state.status = SlotStatus::Busy;
            state.current_task = Some(task_id.to_string());
        }

        info!(agent_id, task_id, "dispatching task to session");
        let prompt = compose_prompt(task_id, description, scope_paths);
        let result = tokio::time::timeout(deadline, self.deliver_line(&slot.session, &prompt))
            .await
            .unwrap_or_else(|_| {
                Err(DaemonError::Transient(format!(
                    "dispatch to agent {agent_id} timed out"
                )))
            });

        {
            let mut state = slot.state.lock();
            state.status = SlotStatus::Idle;
            state.current_task = None;
        }
        self.notify_available();

        match result {
            Ok(()) => Ok(
                "Task sent to agent's session. Use 'map agent watch' to interact.".to_string()
            ),
            Err(err) => Err(wrap_slot_error(agent_id, err)),
        }
    }

    /// Deliver a prompt to a freshly spawned slot (used for spawn-time
    /// prompts; waits for the agent CLI to come up first).
    pub async fn send_prompt(&self, agent_id: &str, prompt: &str) -> Result<()> {
        let slot = self
            .get(agent_id)
            .ok_or_else(|| DaemonError::NotFound(format!("agent {agent_id} not found")))?;

        tokio::time::sleep(self.startup_settle).await;
        let line = collapse_newlines(prompt);
        self.deliver_line(&slot.session, &line)
            .await
            .map_err(|err| wrap_slot_error(agent_id, err))
    }

    /// Send one line of text followed by a submit keystroke, with a settle
    /// pause in between so the terminal can process the paste.
    async fn deliver_line(&self, session: &str, line: &str) -> Result<()> {
        self.mux.send_text(session, line).await?;
        tokio::time::sleep(self.paste_settle).await;
        self.mux.send_enter(session).await?;
        Ok(())
    }

    /// Round-robin over slot ids sorted lexicographically, starting just
    /// after the last assigned id, returning the first idle slot.
    pub fn find_idle(&self) -> Option<Arc<AgentSlot>> {
        let mut entries: Vec<(String, Arc<AgentSlot>)> = {
            let slots = self.slots.read();
            if slots.is_empty() {
                return None;
            }
            slots
                .iter()
                .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut last_assigned = self.last_assigned.lock();
        let start = match last_assigned.as_deref() {
            Some(last) => entries
                .iter()
                .position(|(id, _)| id == last)
                .map(|idx| (idx + 1) % entries.len())
                .unwrap_or(0),
            None => 0,
        };

        for offset in 0..entries.len() {
            let (id, slot) = &entries[(start + offset) % entries.len()];
            let state = slot.state.lock();
            if state.status == SlotStatus::Idle {
                drop(state);
                *last_assigned = Some(id.clone());
                return Some(Arc::clone(slot));
            }
        }
        None
    }

    /// Drop a slot and kill its session (best-effort). Returns the removed
    /// slot, or None when the id is unknown.
    pub async fn remove(&self, agent_id: &str) -> Option<Arc<AgentSlot>> {
        let slot = self.slots.write().remove(agent_id)?;

        if let Err(err) = self.mux.kill_session(&slot.session).await {
            warn!(agent_id, error = %err, "failed to kill session");
        }

        self.bus.emit(EventKind::AgentDisconnected {
            agent_id: agent_id.to_string(),
            message: format!("agent {agent_id} disconnected"),
        });
        info!(agent_id, session = %slot.session, "removed agent slot");
        Some(slot)
    }

    /// Remove every slot (fleet shutdown).
    pub async fn kill_all(&self) {
        let ids: Vec<String> = self.slots.read().keys().cloned().collect();
        for id in ids {
            self.remove(&id).await;
        }
    }

    /// Restart the agent CLI inside a dead pane.
    pub async fn respawn(&self, agent_id: &str, skip_permission_prompts: bool) -> Result<()> {
        let slot = self
            .get(agent_id)
            .ok_or_else(|| DaemonError::NotFound(format!("agent {agent_id} not found")))?;

        if !self.mux.has_session(&slot.session).await {
            return Err(DaemonError::NotFound(format!(
                "session {} not found",
                slot.session
            )));
        }
        if !self.mux.pane_dead(&slot.session).await {
            return Err(DaemonError::InvalidState(format!(
                "agent {agent_id} pane is still running - cannot respawn"
            )));
        }

        let launch = slot.flavor.launch_command(skip_permission_prompts);
        self.mux
            .respawn_pane(&slot.session, &launch)
            .await
            .map_err(|err| wrap_slot_error(agent_id, err))?;
        info!(agent_id, "respawned agent in pane");
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentSlot>> {
        self.slots.read().get(agent_id).cloned()
    }

    /// All slots, sorted by id.
    pub fn list(&self) -> Vec<Arc<AgentSlot>> {
        let mut slots: Vec<Arc<AgentSlot>> = self.slots.read().values().cloned().collect();
        slots.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        slots
    }

    /// Ids of all live slots (for the orphan sweep).
    pub fn live_ids(&self) -> HashSet<String> {
        self.slots.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

/// Compose the single-line prompt delivered for a task.
fn compose_prompt(task_id: &str, description: &str, scope_paths: &[String]) -> String {
    let mut prompt = format!("[Task ID: {task_id}]\n\n{description}");
    if !scope_paths.is_empty() {
        prompt.push_str(&format!("\n\nScope/files: {}", scope_paths.join(", ")));
    }
    collapse_newlines(&prompt)
}

/// send-text treats its argument as one paste, so internal newlines become
/// single spaces.
pub(crate) fn collapse_newlines(text: &str) -> String {
    text.replace('\n', " ")
}

fn wrap_slot_error(agent_id: &str, err: DaemonError) -> DaemonError {
    match err {
        DaemonError::ToolFailed { tool, detail } => DaemonError::ToolFailed {
            tool,
            detail: format!("agent {agent_id}: {detail}"),
        },
        other => other,
    }
}

#[cfg(test)]
#[path = "slots_tests.rs"]
mod tests;
