// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket listener: translates wire requests into calls on the
//! coordination components and streams events to watchers.
//!
//! One task per connection; a connection carries exactly one request.
//! Unary requests get one response frame; `WatchEvents` streams
//! `Response::Event` frames until the client disconnects or the daemon
//! shuts down.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mapd_core::id::short;
use mapd_core::{Clock, IdGen, IssueRef, NamePool, Task, TaskStatus};
use mapd_wire::{
    read_request, write_response, AgentInfo, ProtocolError, Request, Response, StatusInfo,
    WorktreeInfo,
};

use crate::config::Config;
use crate::error::{DaemonError, Result};
use crate::event_bus::EventBus;
use crate::router::TaskRouter;
use crate::slots::{AgentSlot, SlotManager};
use crate::store::{AgentRecord, Store};
use crate::worktree::WorktreeManager;

/// Shared daemon context for all request handlers.
pub struct ListenCtx<C: Clock> {
    pub config: Config,
    pub store: Arc<Store>,
    pub slots: Arc<SlotManager<C>>,
    pub worktrees: Arc<WorktreeManager>,
    pub router: Arc<TaskRouter<C>>,
    pub names: Arc<NamePool>,
    pub bus: EventBus<C>,
    pub ids: Arc<dyn IdGen>,
    pub clock: C,
    pub started_at: u64,
    pub shutdown: CancellationToken,
    /// Set when a client asked for a forced (non-graceful) shutdown.
    pub force_shutdown: AtomicBool,
}

/// Listener task accepting socket connections.
pub struct Listener<C: Clock> {
    unix: UnixListener,
    ctx: Arc<ListenCtx<C>>,
}

impl<C: Clock + 'static> Listener<C> {
    /// Bind the socket, unlinking any pre-existing file at the path.
    pub fn bind(path: &Path, ctx: Arc<ListenCtx<C>>) -> Result<Self> {
        let _ = std::fs::remove_file(path);
        let unix = UnixListener::bind(path).map_err(|err| {
            DaemonError::Transient(format!("bind {}: {err}", path.display()))
        })?;
        info!(socket = %path.display(), "mapd listening");
        Ok(Self { unix, ctx })
    }

    /// Accept connections until shutdown, spawning a task per connection.
    pub async fn run(self) {
        loop {
            tokio::select! {
                () = self.ctx.shutdown.cancelled() => return,
                accepted = self.unix.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, ctx).await {
                                    log_connection_error(&err);
                                }
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    }
                }
            }
        }
    }
}

fn log_connection_error(err: &ProtocolError) {
    match err {
        // Clients hanging up mid-frame are routine.
        ProtocolError::Io(_) => debug!(error = %err, "connection closed"),
        other => warn!(error = %other, "connection error"),
    }
}

async fn handle_connection<C: Clock + 'static>(
    stream: UnixStream,
    ctx: Arc<ListenCtx<C>>,
) -> std::result::Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = read_request(&mut reader).await?;

    match request {
        Request::WatchEvents { type_filter } => {
            stream_events(&mut writer, &ctx, type_filter).await
        }
        other => {
            let response = dispatch(other, &ctx).await;
            write_response(&mut writer, &response).await
        }
    }
}

/// Stream events matching the filter until client EOF or shutdown.
async fn stream_events<C: Clock>(
    writer: &mut OwnedWriteHalf,
    ctx: &ListenCtx<C>,
    type_filter: Vec<String>,
) -> std::result::Result<(), ProtocolError> {
    let mut subscription = ctx.bus.subscribe();

    loop {
        tokio::select! {
            () = ctx.shutdown.cancelled() => return Ok(()),
            received = subscription.receiver.recv() => {
                let Some(event) = received else { return Ok(()) };
                if !type_filter.is_empty()
                    && !type_filter.iter().any(|t| t == event.kind.type_tag())
                {
                    continue;
                }
                // A failed write means the watcher went away.
                write_response(writer, &Response::Event { event }).await?;
            }
        }
    }
}

fn error_response(err: &DaemonError) -> Response {
    Response::Error { kind: err.kind().to_string(), message: err.to_string() }
}

fn ok_or_error<T>(result: Result<T>, into: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => into(value),
        Err(err) => error_response(&err),
    }
}

async fn dispatch<C: Clock + 'static>(request: Request, ctx: &Arc<ListenCtx<C>>) -> Response {
    match request {
        Request::SubmitTask {
            description,
            scope_paths,
            github_owner,
            github_repo,
            github_issue_number,
            source_working_dir,
        } => {
            let issue = match (github_owner, github_repo, github_issue_number) {
                (Some(owner), Some(repo), Some(number)) => {
                    Some(IssueRef { owner, repo, number })
                }
                _ => None,
            };
            ok_or_error(
                ctx.router
                    .submit(description, scope_paths, issue, source_working_dir)
                    .await,
                |task| Response::Task { task },
            )
        }

        Request::ListTasks { status_filter, agent_filter, limit } => ok_or_error(
            ctx.router.list(status_filter, agent_filter.as_deref(), limit),
            |tasks| Response::Tasks { tasks },
        ),

        Request::GetTask { task_id } => {
            ok_or_error(ctx.router.get(&task_id), |task| Response::Task { task })
        }

        Request::CancelTask { task_id } => ok_or_error(
            ctx.router.cancel(&task_id).await,
            |task| Response::Task { task },
        ),

        Request::GetCurrentTask { working_directory } => ok_or_error(
            current_task_for_dir(ctx, &working_directory),
            |task| Response::TaskOrNone { task: task.map(Box::new) },
        ),

        Request::RequestInput { task_id, question } => ok_or_error(
            ctx.router.request_input(&task_id, &question).await,
            |message| Response::Ack { success: true, message },
        ),

        Request::Shutdown { force } => {
            ctx.force_shutdown.store(force, Ordering::SeqCst);
            let shutdown = ctx.shutdown.clone();
            tokio::spawn(async move {
                // Let the acknowledgement flush before teardown starts.
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                shutdown.cancel();
            });
            Response::ack("shutdown initiated")
        }

        Request::GetStatus => status(ctx),

        Request::SpawnAgent {
            count,
            branch,
            use_worktree,
            name_prefix,
            prompt,
            flavor,
            skip_permission_prompts,
        } => {
            let count = count.unwrap_or(1).max(1);
            let flavor = flavor.unwrap_or_default();
            // Prompts are skipped by default; worktree spawns always skip
            // them (the isolated checkout is the sandbox), even when the
            // caller passed an explicit false.
            let skip = skip_permission_prompts.unwrap_or(true) || use_worktree;

            let mut agents = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match spawn_agent(
                    ctx,
                    branch.as_deref(),
                    use_worktree,
                    name_prefix.as_deref(),
                    prompt.as_deref(),
                    flavor,
                    skip,
                )
                .await
                {
                    Ok(info) => agents.push(info),
                    Err(err) => return error_response(&err),
                }
            }
            Response::Agents { agents }
        }

        Request::KillAgent { agent_id, force: _ } => {
            ok_or_error(kill_agent(ctx, &agent_id).await, |message| Response::Ack {
                success: true,
                message,
            })
        }

        Request::ListAgents => {
            let mut agents = Vec::new();
            for slot in ctx.slots.list() {
                agents.push(agent_info(ctx, &slot).await);
            }
            Response::Agents { agents }
        }

        Request::RespawnAgent { agent_id } => {
            let skip = ctx
                .slots
                .get(&agent_id)
                .map(|slot| slot.has_worktree)
                .unwrap_or(false);
            ok_or_error(ctx.slots.respawn(&agent_id, skip).await, |()| {
                Response::Ack {
                    success: true,
                    message: format!("respawned agent {agent_id}"),
                }
            })
        }

        Request::ListWorktrees { repo_root } => {
            let worktrees = ctx
                .worktrees
                .list()
                .into_iter()
                .filter(|wt| {
                    repo_root
                        .as_deref()
                        .is_none_or(|root| wt.repo_root == Path::new(root))
                })
                .map(|wt| WorktreeInfo {
                    agent_id: wt.agent_id,
                    path: wt.path.to_string_lossy().into_owned(),
                    branch: wt.branch,
                    created_at: wt.created_at,
                    repo_root: wt.repo_root.to_string_lossy().into_owned(),
                })
                .collect();
            Response::Worktrees { worktrees }
        }

        Request::CleanupWorktrees { agent_id, all } => {
            if let Some(agent_id) = agent_id {
                let path = ctx.worktrees.get(&agent_id).map(|wt| wt.path);
                return ok_or_error(ctx.worktrees.remove(&agent_id).await, |()| {
                    Response::Cleanup {
                        removed_count: 1,
                        removed_paths: path
                            .map(|p| vec![p.to_string_lossy().into_owned()])
                            .unwrap_or_default(),
                    }
                });
            }

            let live = if all { Default::default() } else { ctx.slots.live_ids() };
            ok_or_error(ctx.worktrees.sweep(&live).await, |removed| Response::Cleanup {
                removed_count: removed.len() as u32,
                removed_paths: removed
                    .into_iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect(),
            })
        }

        // Handled by the streaming path before dispatch.
        Request::WatchEvents { .. } => Response::Error {
            kind: "invalid_state".into(),
            message: "watch_events is a streaming request".into(),
        },
    }
}

fn status<C: Clock>(ctx: &ListenCtx<C>) -> Response {
    let (pending, active) = match ctx.store.counts() {
        Ok(counts) => counts,
        Err(err) => return error_response(&err.into()),
    };

    Response::Status {
        status: StatusInfo {
            running: true,
            started_at: ctx.started_at,
            connected_agents: ctx.slots.len() as u32,
            pending_tasks: pending as u32,
            active_tasks: active as u32,
            multiplexer: ctx.slots.multiplexer().name().to_string(),
        },
    }
}

/// The active task whose slot's working copy contains `dir`.
fn current_task_for_dir<C: Clock>(
    ctx: &ListenCtx<C>,
    dir: &str,
) -> Result<Option<Task>> {
    // Exact match first, then the prefix scan for subdirectories.
    let record = match ctx.store.find_agent_by_worktree(dir)? {
        Some(record) => Some(record),
        None => {
            let dir = Path::new(dir);
            let records = ctx.store.list_agents(None)?;

            // Longest matching working copy wins when worktrees nest.
            let mut best: Option<&AgentRecord> = None;
            for candidate in &records {
                let Some(worktree_path) = candidate.worktree_path.as_deref() else {
                    continue;
                };
                if !dir.starts_with(worktree_path) {
                    continue;
                }
                if best.is_none_or(|b| {
                    b.worktree_path.as_deref().unwrap_or("").len() < worktree_path.len()
                }) {
                    best = Some(candidate);
                }
            }
            best.cloned()
        }
    };

    let Some(record) = record else { return Ok(None) };
    let task = ctx.store.find_task_by_slot(&record.agent_id)?;
    Ok(task.filter(|task| {
        matches!(task.status, TaskStatus::InProgress | TaskStatus::WaitingInput)
    }))
}

async fn spawn_agent<C: Clock + 'static>(
    ctx: &Arc<ListenCtx<C>>,
    branch: Option<&str>,
    use_worktree: bool,
    name_prefix: Option<&str>,
    prompt: Option<&str>,
    flavor: mapd_core::AgentFlavor,
    skip_permission_prompts: bool,
) -> Result<AgentInfo> {
    let agent_id = match name_prefix {
        Some(prefix) if !prefix.is_empty() => {
            format!("{prefix}-{}", short(&ctx.ids.generate(""), 8))
        }
        _ => ctx.names.generate(flavor),
    };

    let mut worktree_path = None;
    let workdir = if use_worktree {
        let worktree = match ctx
            .worktrees
            .create(&agent_id, branch, ctx.clock.epoch_secs())
            .await
        {
            Ok(worktree) => worktree,
            Err(err) => {
                ctx.names.release(&agent_id);
                return Err(err);
            }
        };
        worktree_path = Some(worktree.path.clone());
        worktree.path
    } else {
        match ctx.worktrees.repo_root() {
            Some(root) => root.to_path_buf(),
            None => std::env::current_dir().map_err(|err| {
                DaemonError::Transient(format!("get working directory: {err}"))
            })?,
        }
    };

    let slot = match ctx
        .slots
        .create_slot(
            &agent_id,
            workdir.clone(),
            flavor,
            skip_permission_prompts,
            worktree_path.is_some(),
        )
        .await
    {
        Ok(slot) => slot,
        Err(err) => {
            if worktree_path.is_some() {
                let _ = ctx.worktrees.remove(&agent_id).await;
            }
            ctx.names.release(&agent_id);
            return Err(err);
        }
    };

    let now = ctx.clock.epoch_secs();
    let record = AgentRecord {
        agent_id: agent_id.clone(),
        workdir: workdir.to_string_lossy().into_owned(),
        worktree_path: worktree_path.map(|p| p.to_string_lossy().into_owned()),
        session: slot.session.clone(),
        flavor,
        branch: branch.unwrap_or_default().to_string(),
        prompt: prompt.unwrap_or_default().to_string(),
        status: "idle".into(),
        created_at: now,
        updated_at: now,
    };
    if let Err(err) = ctx.store.create_agent(&record) {
        warn!(agent_id, error = %err, "failed to persist agent record");
    }

    if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
        if let Err(err) = ctx.slots.send_prompt(&agent_id, prompt).await {
            warn!(agent_id, error = %err, "failed to send initial prompt");
        }
    }

    info!(agent_id, flavor = %flavor, workdir = %workdir.display(), "spawned agent");
    Ok(agent_info(ctx, &slot).await)
}

async fn agent_info<C: Clock>(ctx: &ListenCtx<C>, slot: &Arc<AgentSlot>) -> AgentInfo {
    let mux = ctx.slots.multiplexer();
    AgentInfo {
        agent_id: slot.agent_id.clone(),
        workdir: slot.workdir.to_string_lossy().into_owned(),
        session: slot.session.clone(),
        flavor: slot.flavor,
        status: mux.pane_title(&slot.session).await,
        created_at: slot.created_at,
        multiplexer: mux.name().to_string(),
        has_worktree: slot.has_worktree,
    }
}

async fn kill_agent<C: Clock + 'static>(
    ctx: &Arc<ListenCtx<C>>,
    agent_id: &str,
) -> Result<String> {
    let slot = ctx
        .slots
        .get(agent_id)
        .ok_or_else(|| DaemonError::NotFound(format!("agent {agent_id} not found")))?;

    if slot.has_worktree {
        if let Err(err) = ctx.worktrees.remove(agent_id).await {
            warn!(agent_id, error = %err, "failed to remove worktree");
        }
    }

    if let Err(err) = ctx
        .store
        .update_agent_status(agent_id, "removed", ctx.clock.epoch_secs())
    {
        warn!(agent_id, error = %err, "failed to update agent record");
    }

    ctx.names.release(agent_id);
    ctx.slots.remove(agent_id).await;

    Ok(format!("agent {agent_id} removed"))
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
