// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Construction happens in dependency order (store → multiplexer →
//! worktrees → slots → router → bridge → listener); teardown runs in
//! reverse: stop accepting, cancel streams and loops, kill sessions,
//! sweep orphan worktrees, close the store, unlink the socket.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fs2::FileExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mapd_core::{Clock, EventKind, NamePool, NanoIdGen, SystemClock};

use crate::bridge::{InputMonitor, ReplyPoller};
use crate::config::Config;
use crate::error::{DaemonError, Result};
use crate::event_bus::EventBus;
use crate::listener::{ListenCtx, Listener};
use crate::multiplexer::new_multiplexer;
use crate::router::TaskRouter;
use crate::slots::SlotManager;
use crate::store::Store;
use crate::tracker::GhCli;
use crate::worktree::WorktreeManager;

/// A fully constructed daemon, ready to serve.
pub struct Daemon {
    ctx: Arc<ListenCtx<SystemClock>>,
    listener: Listener<SystemClock>,
    _lock_file: std::fs::File,
}

/// Build every component and bind the socket.
pub async fn startup(config: Config) -> Result<Daemon> {
    let clock = SystemClock;

    std::fs::create_dir_all(&config.data_dir).map_err(|err| {
        DaemonError::Transient(format!(
            "create data dir {}: {err}",
            config.data_dir.display()
        ))
    })?;

    // One daemon per data directory.
    let lock_path = config.lock_path();
    let mut lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|err| {
            DaemonError::Transient(format!("open lock {}: {err}", lock_path.display()))
        })?;
    lock_file.try_lock_exclusive().map_err(|_| {
        DaemonError::Precondition(format!(
            "another mapd instance holds {}",
            lock_path.display()
        ))
    })?;
    lock_file.set_len(0).ok();
    let _ = writeln!(lock_file, "{}", std::process::id());

    let store = Arc::new(Store::open(config.db_path())?);

    let mux = new_multiplexer(config.multiplexer)?;
    info!(multiplexer = mux.name(), "using terminal multiplexer");

    let ids = Arc::new(NanoIdGen);
    let (bus, fan_out) = EventBus::new(
        ids.clone() as Arc<dyn mapd_core::IdGen>,
        clock.clone(),
        Some(Arc::clone(&store)),
    );

    let cwd = std::env::current_dir()
        .map_err(|err| DaemonError::Transient(format!("get working directory: {err}")))?;
    let worktrees = Arc::new(WorktreeManager::new(&config.data_dir, &cwd).await?);

    let slots = Arc::new(SlotManager::new(Arc::clone(&mux), bus.clone(), clock.clone()));
    let names = Arc::new(NamePool::new());
    let tracker = Arc::new(GhCli::new());

    let router = Arc::new(TaskRouter::new(
        Arc::clone(&store),
        Arc::clone(&slots),
        Arc::clone(&tracker) as Arc<dyn crate::tracker::IssueTracker>,
        bus.clone(),
        ids.clone() as Arc<dyn mapd_core::IdGen>,
        clock.clone(),
    ));

    // One-way notification: slot released → router re-scans pending tasks.
    let callback_router = Arc::clone(&router);
    slots.set_on_agent_available(Arc::new(move || {
        let router = Arc::clone(&callback_router);
        tokio::spawn(async move { router.process_pending().await });
    }));

    let shutdown = CancellationToken::new();
    tokio::spawn(fan_out.run(shutdown.clone()));

    let monitor = Arc::new(InputMonitor::new(
        Arc::clone(&store),
        Arc::clone(&slots),
        Arc::clone(&tracker) as Arc<dyn crate::tracker::IssueTracker>,
        bus.clone(),
        clock.clone(),
    ));
    tokio::spawn(monitor.run(shutdown.clone()));

    let poller = Arc::new(ReplyPoller::new(
        Arc::clone(&store),
        Arc::clone(&slots),
        Arc::clone(&tracker) as Arc<dyn crate::tracker::IssueTracker>,
        bus.clone(),
        clock.clone(),
    ));
    tokio::spawn(poller.run(shutdown.clone()));

    let ctx = Arc::new(ListenCtx {
        started_at: clock.epoch_secs(),
        config: config.clone(),
        store,
        slots,
        worktrees,
        router,
        names,
        bus,
        ids: Arc::new(NanoIdGen),
        clock,
        shutdown,
        force_shutdown: AtomicBool::new(false),
    });

    recover_slots(&ctx).await;

    let listener = Listener::bind(&config.socket_path, Arc::clone(&ctx))?;
    ctx.bus.emit(EventKind::Status { message: "daemon started".into() });

    Ok(Daemon { ctx, listener, _lock_file: lock_file })
}

impl Daemon {
    pub fn ctx(&self) -> &Arc<ListenCtx<SystemClock>> {
        &self.ctx
    }

    /// Serve until a shutdown request or signal, then tear down.
    pub async fn run(self) -> Result<()> {
        let signal_shutdown = self.ctx.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("signal received, shutting down");
            signal_shutdown.cancel();
        });

        self.listener.run().await;
        teardown(&self.ctx).await;
        Ok(())
    }
}

/// Re-adopt slots whose sessions survived a daemon restart; records whose
/// sessions are gone are marked removed.
async fn recover_slots<C: Clock>(ctx: &Arc<ListenCtx<C>>) {
    let records = match ctx.store.list_agents(Some("idle")) {
        Ok(records) => records,
        Err(err) => {
            warn!(error = %err, "failed to list agent records for recovery");
            return;
        }
    };

    for record in records {
        if ctx.slots.adopt_slot(&record).await {
            ctx.names.mark_used(&record.agent_id);
            info!(agent_id = %record.agent_id, "recovered agent slot");
        } else if let Err(err) = ctx.store.update_agent_status(
            &record.agent_id,
            "removed",
            ctx.clock.epoch_secs(),
        ) {
            warn!(agent_id = %record.agent_id, error = %err, "failed to retire agent record");
        }
    }

    // Sessions carrying our prefix with no adopted slot are leftovers from
    // a previous run; kill them so they cannot shadow future slot names.
    let mux = ctx.slots.multiplexer();
    let live = ctx.slots.live_ids();
    match mux.list_sessions(crate::config::SESSION_PREFIX).await {
        Ok(sessions) => {
            for session in sessions {
                let agent_id = session
                    .strip_prefix(crate::config::SESSION_PREFIX)
                    .unwrap_or(&session);
                if live.contains(agent_id) {
                    continue;
                }
                warn!(%session, "killing orphan session");
                if let Err(err) = mux.kill_session(&session).await {
                    warn!(%session, error = %err, "failed to kill orphan session");
                }
            }
        }
        Err(err) => warn!(error = %err, "failed to list sessions"),
    }
}

async fn teardown<C: Clock>(ctx: &Arc<ListenCtx<C>>) {
    info!("mapd shutting down");

    // Sessions die best-effort either way; the sweep is skipped on a
    // forced shutdown to exit quickly.
    ctx.slots.kill_all().await;
    if !ctx.force_shutdown.load(Ordering::SeqCst) {
        match ctx.worktrees.sweep(&Default::default()).await {
            Ok(removed) if !removed.is_empty() => {
                info!(count = removed.len(), "swept worktrees")
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "worktree sweep failed"),
        }
    }

    let _ = std::fs::remove_file(&ctx.config.socket_path);
    info!("mapd stopped");
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
