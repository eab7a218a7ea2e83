// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed persistence for tasks, agent records and events.
//!
//! A single connection behind a mutex gives single-writer semantics; WAL
//! journal mode keeps concurrent readers cheap. Timestamps are integer
//! seconds since the Unix epoch, zero meaning "absent". Scope paths are
//! stored as a JSON array column.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use mapd_core::{AgentFlavor, Event, IssueRef, Task, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("invalid {what} in store: {value}")]
    Invalid { what: &'static str, value: String },
}

/// Durable record of a spawned agent slot.
///
/// Live slot state (busy/idle, current task) belongs to the slot manager;
/// this row is what survives a daemon restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub agent_id: String,
    pub workdir: String,
    pub worktree_path: Option<String>,
    pub session: String,
    pub flavor: AgentFlavor,
    pub branch: String,
    pub prompt: String,
    pub status: String,
    pub created_at: u64,
    pub updated_at: u64,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    scope_paths TEXT,
    status TEXT DEFAULT 'pending',
    assigned_to TEXT,
    result TEXT,
    error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    github_owner TEXT,
    github_repo TEXT,
    github_issue_number INTEGER,
    last_comment_id TEXT,
    waiting_input_question TEXT,
    waiting_input_since INTEGER,
    source_workdir TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_assigned_to ON tasks(assigned_to);
CREATE INDEX IF NOT EXISTS idx_tasks_github
    ON tasks(github_owner, github_repo, github_issue_number);

CREATE TABLE IF NOT EXISTS events (
    event_id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    payload TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);
CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);

CREATE TABLE IF NOT EXISTS agents (
    agent_id TEXT PRIMARY KEY,
    workdir TEXT,
    worktree_path TEXT,
    session TEXT,
    flavor TEXT DEFAULT 'claude',
    branch TEXT,
    prompt TEXT,
    status TEXT DEFAULT 'idle',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);
";

/// Columns added after the first released schema. Errors are ignored —
/// the column may already exist.
const MIGRATIONS: &[&str] = &[
    "ALTER TABLE tasks ADD COLUMN github_owner TEXT",
    "ALTER TABLE tasks ADD COLUMN github_repo TEXT",
    "ALTER TABLE tasks ADD COLUMN github_issue_number INTEGER",
    "ALTER TABLE tasks ADD COLUMN last_comment_id TEXT",
    "ALTER TABLE tasks ADD COLUMN waiting_input_question TEXT",
    "ALTER TABLE tasks ADD COLUMN waiting_input_since INTEGER",
    "ALTER TABLE tasks ADD COLUMN source_workdir TEXT",
    "ALTER TABLE agents ADD COLUMN session TEXT",
    "ALTER TABLE agents ADD COLUMN flavor TEXT DEFAULT 'claude'",
];

const TASK_COLUMNS: &str = "task_id, description, scope_paths, status, assigned_to, result, \
     error, created_at, updated_at, github_owner, github_repo, github_issue_number, \
     last_comment_id, waiting_input_question, waiting_input_since, source_workdir";

const AGENT_COLUMNS: &str =
    "agent_id, workdir, worktree_path, session, flavor, branch, prompt, status, \
     created_at, updated_at";

/// SQLite store for the daemon.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // WAL for concurrent readers; a busy timeout so a slow checkpoint
        // never turns into an immediate SQLITE_BUSY for a writer.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        for migration in MIGRATIONS {
            // Ignore errors - column may already exist
            let _ = conn.execute(migration, []);
        }

        Ok(Self { conn: Mutex::new(conn) })
    }

    // --- Task operations ---

    pub fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let scope_json = serde_json::to_string(&task.scope_paths)?;
        let (owner, repo, number) = issue_columns(task.issue.as_ref());

        self.conn.lock().execute(
            &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"),
            params![
                task.id,
                task.description,
                scope_json,
                task.status.as_str(),
                task.assigned_to,
                task.result,
                task.error,
                task.created_at as i64,
                task.updated_at as i64,
                owner,
                repo,
                number,
                task.last_reply_id,
                task.question,
                task.waiting_since.unwrap_or(0) as i64,
                task.source_workdir,
            ],
        )?;
        Ok(())
    }

    pub fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let scope_json = serde_json::to_string(&task.scope_paths)?;
        let (owner, repo, number) = issue_columns(task.issue.as_ref());

        self.conn.lock().execute(
            "UPDATE tasks SET description = ?1, scope_paths = ?2, status = ?3, \
                 assigned_to = ?4, result = ?5, error = ?6, updated_at = ?7, \
                 github_owner = ?8, github_repo = ?9, github_issue_number = ?10, \
                 last_comment_id = ?11, waiting_input_question = ?12, \
                 waiting_input_since = ?13, source_workdir = ?14 \
             WHERE task_id = ?15",
            params![
                task.description,
                scope_json,
                task.status.as_str(),
                task.assigned_to,
                task.result,
                task.error,
                task.updated_at as i64,
                owner,
                repo,
                number,
                task.last_reply_id,
                task.question,
                task.waiting_since.unwrap_or(0) as i64,
                task.source_workdir,
                task.id,
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
                params![task_id],
                raw_task,
            )
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    /// List tasks, newest first, with optional status/slot filters.
    pub fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        agent: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(status) = status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(agent) = agent {
            sql.push_str(&format!(" AND assigned_to = ?{}", args.len() + 1));
            args.push(Value::Text(agent.to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT ?{}", args.len() + 1));
            args.push(Value::Integer(i64::from(limit)));
        }

        self.query_tasks(&sql, args)
    }

    pub fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        now: u64,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![status.as_str(), now as i64, task_id],
        )?;
        Ok(())
    }

    /// Bind a task to a slot; the task moves to `accepted`.
    pub fn assign(&self, task_id: &str, agent_id: &str, now: u64) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE tasks SET assigned_to = ?1, status = 'accepted', updated_at = ?2 \
             WHERE task_id = ?3",
            params![agent_id, now as i64, task_id],
        )?;
        Ok(())
    }

    /// Record a detected question; the task moves to `waiting_input`.
    pub fn set_waiting_input(
        &self,
        task_id: &str,
        question: &str,
        now: u64,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE tasks SET status = 'waiting_input', waiting_input_question = ?1, \
                 waiting_input_since = ?2, updated_at = ?2 \
             WHERE task_id = ?3",
            params![question, now as i64, task_id],
        )?;
        Ok(())
    }

    /// Record a delivered reply; the task returns to `in_progress`.
    pub fn clear_waiting_input(
        &self,
        task_id: &str,
        reply_id: &str,
        now: u64,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE tasks SET status = 'in_progress', waiting_input_question = NULL, \
                 waiting_input_since = 0, last_comment_id = ?1, updated_at = ?2 \
             WHERE task_id = ?3",
            params![reply_id, now as i64, task_id],
        )?;
        Ok(())
    }

    /// Tasks blocked on input that have a usable external issue, oldest wait
    /// first.
    pub fn list_waiting_input_with_issue(&self) -> Result<Vec<Task>, StoreError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE status = 'waiting_input' AND github_owner != '' \
                     AND github_repo != '' AND github_issue_number > 0 \
                 ORDER BY waiting_input_since ASC"
            ),
            Vec::new(),
        )
    }

    /// In-progress tasks with a usable external issue (for close detection).
    pub fn list_in_progress_with_issue(&self) -> Result<Vec<Task>, StoreError> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE status = 'in_progress' AND github_owner != '' \
                     AND github_repo != '' AND github_issue_number > 0 \
                 ORDER BY updated_at ASC"
            ),
            Vec::new(),
        )
    }

    /// The task a slot is currently working or waiting on, if any.
    pub fn find_task_by_slot(&self, agent_id: &str) -> Result<Option<Task>, StoreError> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE assigned_to = ?1 AND status IN ('in_progress', 'waiting_input') \
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![agent_id],
                raw_task,
            )
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    /// Aggregate counters: (pending, active) where active is
    /// accepted + in_progress.
    pub fn counts(&self) -> Result<(u64, u64), StoreError> {
        let conn = self.conn.lock();
        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status IN ('accepted', 'in_progress')",
            [],
            |row| row.get(0),
        )?;
        Ok((pending as u64, active as u64))
    }

    fn query_tasks(&self, sql: &str, args: Vec<Value>) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args), raw_task)?;

        let mut tasks = Vec::new();
        for raw in rows {
            tasks.push(raw?.into_task()?);
        }
        Ok(tasks)
    }

    // --- Agent operations ---

    pub fn create_agent(&self, record: &AgentRecord) -> Result<(), StoreError> {
        self.conn.lock().execute(
            &format!("INSERT INTO agents ({AGENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                record.agent_id,
                record.workdir,
                record.worktree_path,
                record.session,
                record.flavor.as_str(),
                record.branch,
                record.prompt,
                record.status,
                record.created_at as i64,
                record.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE agent_id = ?1"),
                params![agent_id],
                raw_agent,
            )
            .optional()?;
        raw.map(RawAgent::into_record).transpose()
    }

    pub fn list_agents(&self, status: Option<&str>) -> Result<Vec<AgentRecord>, StoreError> {
        let conn = self.conn.lock();
        let (sql, args) = match status {
            Some(status) => (
                format!(
                    "SELECT {AGENT_COLUMNS} FROM agents WHERE status = ?1 \
                     ORDER BY created_at DESC"
                ),
                vec![Value::Text(status.to_string())],
            ),
            None => (
                format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at DESC"),
                Vec::new(),
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), raw_agent)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.into_record()?);
        }
        Ok(records)
    }

    pub fn update_agent_status(
        &self,
        agent_id: &str,
        status: &str,
        now: u64,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "UPDATE agents SET status = ?1, updated_at = ?2 WHERE agent_id = ?3",
            params![status, now as i64, agent_id],
        )?;
        Ok(())
    }

    pub fn delete_agent(&self, agent_id: &str) -> Result<(), StoreError> {
        self.conn
            .lock()
            .execute("DELETE FROM agents WHERE agent_id = ?1", params![agent_id])?;
        Ok(())
    }

    /// The agent record whose worktree sits at exactly this path.
    pub fn find_agent_by_worktree(&self, path: &str) -> Result<Option<AgentRecord>, StoreError> {
        let raw = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE worktree_path = ?1"),
                params![path],
                raw_agent,
            )
            .optional()?;
        raw.map(RawAgent::into_record).transpose()
    }

    // --- Event operations ---

    pub fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        self.conn.lock().execute(
            "INSERT INTO events (event_id, type, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![event.id, event.kind.type_tag(), payload, event.at as i64],
        )?;
        Ok(())
    }

    pub fn recent_events(&self, limit: u32) -> Result<Vec<Event>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT payload FROM events ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![i64::from(limit)], |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for payload in rows {
            events.push(serde_json::from_str(&payload?)?);
        }
        Ok(events)
    }
}

fn issue_columns(issue: Option<&IssueRef>) -> (String, String, i64) {
    match issue {
        Some(issue) => (issue.owner.clone(), issue.repo.clone(), issue.number as i64),
        None => (String::new(), String::new(), 0),
    }
}

/// Raw task row; converted after scanning so JSON/status parse failures
/// surface as store errors rather than sqlite ones.
struct RawTask {
    task_id: String,
    description: String,
    scope_json: Option<String>,
    status: String,
    assigned_to: Option<String>,
    result: Option<String>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
    github_owner: Option<String>,
    github_repo: Option<String>,
    github_issue_number: Option<i64>,
    last_comment_id: Option<String>,
    question: Option<String>,
    waiting_since: Option<i64>,
    source_workdir: Option<String>,
}

fn raw_task(row: &Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        task_id: row.get(0)?,
        description: row.get(1)?,
        scope_json: row.get(2)?,
        status: row.get(3)?,
        assigned_to: row.get(4)?,
        result: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        github_owner: row.get(9)?,
        github_repo: row.get(10)?,
        github_issue_number: row.get(11)?,
        last_comment_id: row.get(12)?,
        question: row.get(13)?,
        waiting_since: row.get(14)?,
        source_workdir: row.get(15)?,
    })
}

impl RawTask {
    fn into_task(self) -> Result<Task, StoreError> {
        let status = TaskStatus::parse(&self.status).ok_or(StoreError::Invalid {
            what: "task status",
            value: self.status.clone(),
        })?;

        let scope_paths = match self.scope_json.as_deref() {
            None | Some("") => Vec::new(),
            Some(json) => serde_json::from_str(json)?,
        };

        let issue = match (self.github_owner, self.github_repo, self.github_issue_number) {
            (Some(owner), Some(repo), Some(number))
                if !owner.is_empty() && !repo.is_empty() && number > 0 =>
            {
                Some(IssueRef { owner, repo, number: number as u64 })
            }
            _ => None,
        };

        Ok(Task {
            id: self.task_id,
            description: self.description,
            scope_paths,
            status,
            assigned_to: none_if_empty(self.assigned_to),
            result: self.result.unwrap_or_default(),
            error: self.error.unwrap_or_default(),
            created_at: self.created_at.max(0) as u64,
            updated_at: self.updated_at.max(0) as u64,
            issue,
            last_reply_id: none_if_empty(self.last_comment_id),
            question: none_if_empty(self.question),
            waiting_since: match self.waiting_since {
                Some(secs) if secs > 0 => Some(secs as u64),
                _ => None,
            },
            source_workdir: none_if_empty(self.source_workdir),
        })
    }
}

struct RawAgent {
    agent_id: String,
    workdir: Option<String>,
    worktree_path: Option<String>,
    session: Option<String>,
    flavor: Option<String>,
    branch: Option<String>,
    prompt: Option<String>,
    status: String,
    created_at: i64,
    updated_at: i64,
}

fn raw_agent(row: &Row<'_>) -> rusqlite::Result<RawAgent> {
    Ok(RawAgent {
        agent_id: row.get(0)?,
        workdir: row.get(1)?,
        worktree_path: row.get(2)?,
        session: row.get(3)?,
        flavor: row.get(4)?,
        branch: row.get(5)?,
        prompt: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl RawAgent {
    fn into_record(self) -> Result<AgentRecord, StoreError> {
        let flavor_str = self.flavor.unwrap_or_default();
        let flavor = AgentFlavor::parse(&flavor_str).ok_or(StoreError::Invalid {
            what: "agent flavor",
            value: flavor_str,
        })?;

        Ok(AgentRecord {
            agent_id: self.agent_id,
            workdir: self.workdir.unwrap_or_default(),
            worktree_path: none_if_empty(self.worktree_path),
            session: self.session.unwrap_or_default(),
            flavor,
            branch: self.branch.unwrap_or_default(),
            prompt: self.prompt.unwrap_or_default(),
            status: self.status,
            created_at: self.created_at.max(0) as u64,
            updated_at: self.updated_at.max(0) as u64,
        })
    }
}

fn none_if_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
