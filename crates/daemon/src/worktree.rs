// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-slot isolated checkouts.
//!
//! Each spawned agent may get its own worktree under
//! `{data_dir}/worktrees/{slot_id}`, detached at the commit its source
//! branch pointed to at creation time, so no two agents ever share a HEAD.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{DaemonError, Result};

/// A tracked checkout, one-to-one with a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub agent_id: String,
    pub path: PathBuf,
    pub branch: String,
    pub created_at: u64,
    /// Source repository the checkout was created from.
    pub repo_root: PathBuf,
}

/// Creates, lists and removes per-slot worktrees.
pub struct WorktreeManager {
    repo_root: Option<PathBuf>,
    worktree_dir: PathBuf,
    worktrees: RwLock<HashMap<String, Worktree>>,
}

impl WorktreeManager {
    /// Resolve the source repository from `cwd` (absence is tolerated until
    /// a worktree operation actually needs it) and ensure the worktree
    /// directory exists.
    pub async fn new(data_dir: &Path, cwd: &Path) -> Result<Self> {
        let repo_root = discover_repo_root(cwd).await;

        let worktree_dir = data_dir.join("worktrees");
        tokio::fs::create_dir_all(&worktree_dir)
            .await
            .map_err(|err| {
                DaemonError::Transient(format!(
                    "create worktree dir {}: {err}",
                    worktree_dir.display()
                ))
            })?;

        Ok(Self {
            repo_root,
            worktree_dir,
            worktrees: RwLock::new(HashMap::new()),
        })
    }

    pub fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    pub fn worktree_dir(&self) -> &Path {
        &self.worktree_dir
    }

    /// Create a detached checkout for a slot from the default repository.
    pub async fn create(
        &self,
        agent_id: &str,
        branch: Option<&str>,
        now: u64,
    ) -> Result<Worktree> {
        let repo_root = self
            .repo_root
            .clone()
            .ok_or_else(|| DaemonError::Precondition("not inside a git repository".into()))?;
        self.create_from_repo(agent_id, branch, &repo_root, now).await
    }

    /// Create a detached checkout for a slot from a specific repository.
    pub async fn create_from_repo(
        &self,
        agent_id: &str,
        branch: Option<&str>,
        repo_root: &Path,
        now: u64,
    ) -> Result<Worktree> {
        let branch = match branch {
            Some(branch) if !branch.is_empty() => branch.to_string(),
            _ => current_branch(repo_root).await?,
        };

        let path = self.worktree_dir.join(agent_id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DaemonError::Conflict(format!(
                "worktree already exists for agent {agent_id}"
            )));
        }

        // Detach at the branch's current commit so the agent's checkout
        // never contends for the branch ref.
        let commit = resolve_commit(repo_root, &branch).await?;
        let path_str = path.to_string_lossy().to_string();
        run_git(repo_root, &["worktree", "add", "--detach", &path_str, &commit]).await?;

        let worktree = Worktree {
            agent_id: agent_id.to_string(),
            path,
            branch,
            created_at: now,
            repo_root: repo_root.to_path_buf(),
        };
        self.worktrees
            .write()
            .insert(agent_id.to_string(), worktree.clone());
        Ok(worktree)
    }

    /// Remove a slot's worktree. Removing an absent worktree is a no-op.
    pub async fn remove(&self, agent_id: &str) -> Result<()> {
        let tracked = self.worktrees.write().remove(agent_id);
        let path = tracked
            .as_ref()
            .map(|wt| wt.path.clone())
            .unwrap_or_else(|| self.worktree_dir.join(agent_id));

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        let repo_root = tracked
            .map(|wt| wt.repo_root)
            .or_else(|| self.repo_root.clone());
        remove_checkout(repo_root.as_deref(), &path).await
    }

    pub fn get(&self, agent_id: &str) -> Option<Worktree> {
        self.worktrees.read().get(agent_id).cloned()
    }

    pub fn list(&self) -> Vec<Worktree> {
        let mut listed: Vec<Worktree> = self.worktrees.read().values().cloned().collect();
        listed.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        listed
    }

    /// Delete every on-disk checkout whose slot id is not in `live`.
    /// Returns the removed paths.
    pub async fn sweep(&self, live: &HashSet<String>) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.worktree_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(DaemonError::Transient(format!(
                    "read worktree dir {}: {err}",
                    self.worktree_dir.display()
                )))
            }
        };

        let mut removed = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await.map_err(|err| {
            warn!(error = %err, "failed to enumerate worktree dir");
            err
        }) {
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_dir() {
                continue;
            }

            let agent_id = entry.file_name().to_string_lossy().to_string();
            if live.contains(&agent_id) {
                continue;
            }

            let path = entry.path();
            if remove_checkout(self.repo_root.as_deref(), &path).await.is_err() {
                warn!(path = %path.display(), "failed to remove orphan worktree");
                continue;
            }

            self.worktrees.write().remove(&agent_id);
            removed.push(path);
        }

        Ok(removed)
    }
}

/// Remove a checkout with `git worktree remove`, falling back to recursive
/// deletion when git refuses or no repository is known.
async fn remove_checkout(repo_root: Option<&Path>, path: &Path) -> Result<()> {
    if let Some(repo_root) = repo_root {
        let path_str = path.to_string_lossy().to_string();
        if run_git(repo_root, &["worktree", "remove", "--force", &path_str])
            .await
            .is_ok()
        {
            return Ok(());
        }
    }

    tokio::fs::remove_dir_all(path).await.map_err(|err| {
        DaemonError::Transient(format!("remove worktree {}: {err}", path.display()))
    })
}

/// Root of the repository containing `dir`, if any.
pub async fn discover_repo_root(dir: &Path) -> Option<PathBuf> {
    run_git(dir, &["rev-parse", "--show-toplevel"])
        .await
        .ok()
        .map(|root| PathBuf::from(root.trim()))
}

/// Current branch name, or the HEAD commit when detached.
async fn current_branch(repo_root: &Path) -> Result<String> {
    let branch = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    let branch = branch.trim().to_string();
    if branch == "HEAD" {
        let head = run_git(repo_root, &["rev-parse", "HEAD"]).await?;
        return Ok(head.trim().to_string());
    }
    Ok(branch)
}

/// Resolve a ref to an immutable commit id.
async fn resolve_commit(repo_root: &Path, reference: &str) -> Result<String> {
    let commit = run_git(repo_root, &["rev-parse", reference]).await?;
    Ok(commit.trim().to_string())
}

async fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                DaemonError::ToolMissing { tool: "git".into() }
            } else {
                DaemonError::Transient(format!("spawn git: {err}"))
            }
        })?;

    if !output.status.success() {
        return Err(DaemonError::ToolFailed {
            tool: "git".into(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
