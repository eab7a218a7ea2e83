// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions
//!
//! Generated IDs are `{prefix}{nanoid}` where the prefix is a short type
//! indicator (e.g. "task-", "evt-") and the nanoid is 19 random characters
//! from a lowercase alphanumeric alphabet.

use std::sync::atomic::{AtomicU64, Ordering};

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const ID_RANDOM_LEN: usize = 19;

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Generator for opaque record identifiers.
pub trait IdGen: Send + Sync {
    fn generate(&self, prefix: &str) -> String;
}

/// Random nanoid-backed generator used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct NanoIdGen;

impl IdGen for NanoIdGen {
    fn generate(&self, prefix: &str) -> String {
        format!("{prefix}{}", nanoid::nanoid!(ID_RANDOM_LEN, &ID_ALPHABET))
    }
}

/// Deterministic sequential generator for tests.
#[derive(Debug, Default)]
pub struct SeqIdGen {
    counter: AtomicU64,
}

impl SeqIdGen {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGen for SeqIdGen {
    fn generate(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}{n}")
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
