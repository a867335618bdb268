use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub prepare_count: u64,
    pub execute_count: u64,
    pub tx_begin_count: u64,
    pub tx_commit_count: u64,
    pub tx_rollback_count: u64,
    pub prepare_cache_hits: u64,
    pub prepare_cache_misses: u64,
}

/// Statement and transaction counters for one connection.
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    prepares: AtomicU64,
    executes: AtomicU64,
    tx_begin: AtomicU64,
    tx_commit: AtomicU64,
    tx_rollback: AtomicU64,
    prepare_cache_hits: AtomicU64,
    prepare_cache_misses: AtomicU64,
}

impl ConnectionMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            prepare_count: self.prepares.load(Ordering::Relaxed),
            execute_count: self.executes.load(Ordering::Relaxed),
            tx_begin_count: self.tx_begin.load(Ordering::Relaxed),
            tx_commit_count: self.tx_commit.load(Ordering::Relaxed),
            tx_rollback_count: self.tx_rollback.load(Ordering::Relaxed),
            prepare_cache_hits: self.prepare_cache_hits.load(Ordering::Relaxed),
            prepare_cache_misses: self.prepare_cache_misses.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.prepares,
            &self.executes,
            &self.tx_begin,
            &self.tx_commit,
            &self.tx_rollback,
            &self.prepare_cache_hits,
            &self.prepare_cache_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_prepare(&self) {
        self.prepares.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one execution; transaction statements are classified by their
    /// leading keyword.
    pub fn record_execute(&self, sql: &str) {
        self.executes.fetch_add(1, Ordering::Relaxed);
        let Some(keyword) = leading_keyword(sql) else {
            return;
        };
        if keyword.eq_ignore_ascii_case("BEGIN") {
            self.tx_begin.fetch_add(1, Ordering::Relaxed);
        } else if keyword.eq_ignore_ascii_case("COMMIT") {
            self.tx_commit.fetch_add(1, Ordering::Relaxed);
        } else if keyword.eq_ignore_ascii_case("ROLLBACK") {
            self.tx_rollback.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache(&self, observation: CacheObservation) {
        match observation {
            CacheObservation::Hit => {
                self.prepare_cache_hits.fetch_add(1, Ordering::Relaxed);
            }
            CacheObservation::Miss => {
                self.prepare_cache_misses.fetch_add(1, Ordering::Relaxed);
                self.record_prepare();
            }
        }
    }
}

pub fn leading_keyword(sql: &str) -> Option<&str> {
    let trimmed = sql.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed
        .find(|c: char| c.is_ascii_whitespace() || c == ';')
        .unwrap_or(trimmed.len());
    Some(&trimmed[..end])
}

/// Remembers which statement texts were already handed to the statement cache.
#[derive(Debug, Default)]
pub struct StatementTracker {
    seen: Mutex<AHashSet<String>>,
}

impl StatementTracker {
    pub fn observe(&self, sql: &str) -> CacheObservation {
        if self.seen.lock().insert(sql.trim().to_string()) {
            CacheObservation::Miss
        } else {
            CacheObservation::Hit
        }
    }

    pub fn forget_all(&self) {
        self.seen.lock().clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheObservation {
    Hit,
    Miss,
}
