// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: socket path, data directory, multiplexer choice.

use std::path::{Path, PathBuf};

use crate::multiplexer::MultiplexerKind;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mapd.sock";
pub const DEFAULT_DATA_DIR: &str = "~/.mapd";

/// Prefix for all sessions the daemon owns, to avoid collisions with user
/// sessions and to find orphans after a crash.
pub const SESSION_PREFIX: &str = "map-agent-";

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub multiplexer: MultiplexerKind,
}

impl Config {
    /// Build a config, falling back to defaults and the `MAP_MULTIPLEXER`
    /// environment variable where arguments are absent.
    pub fn new(
        socket_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        multiplexer: Option<MultiplexerKind>,
    ) -> Self {
        Self {
            socket_path: socket_path.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH)),
            data_dir: data_dir
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| expand_home(Path::new(DEFAULT_DATA_DIR))),
            multiplexer: multiplexer.unwrap_or_else(MultiplexerKind::from_env),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("mapd.db")
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.data_dir.join("worktrees")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("mapd.lock")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config::new(None, None, Some(MultiplexerKind::Tmux));
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert!(!config.data_dir.to_string_lossy().starts_with('~'));
        assert_eq!(config.multiplexer, MultiplexerKind::Tmux);
    }

    #[test]
    fn derived_paths_live_under_the_data_dir() {
        let config = Config::new(
            Some("/tmp/test.sock".into()),
            Some("/data/mapd".into()),
            Some(MultiplexerKind::Tmux),
        );
        assert_eq!(config.db_path(), PathBuf::from("/data/mapd/mapd.db"));
        assert_eq!(config.worktrees_dir(), PathBuf::from("/data/mapd/worktrees"));
        assert_eq!(config.lock_path(), PathBuf::from("/data/mapd/mapd.lock"));
    }

    #[test]
    fn expand_home_only_touches_tilde_prefix() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/x")), home.join("x"));
        }
    }
}
