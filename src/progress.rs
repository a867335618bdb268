//! Progress reporting for reset, backup and restore.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

/// Rows processed for the relation currently being handled.
#[derive(Debug, Clone, Serialize)]
pub struct RelationProgress {
    pub relation: String,
    pub current: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl RelationProgress {
    pub fn progress_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.current == 0 || self.current >= self.total {
            return None;
        }
        let per_row = self.elapsed.as_secs_f64() / self.current as f64;
        Some(Duration::from_secs_f64(
            per_row * (self.total - self.current) as f64,
        ))
    }
}

pub type RelationListener = Box<dyn FnMut(&RelationProgress)>;

pub struct RelationStatus {
    relation: String,
    total: usize,
    current: usize,
    started: Instant,
    listeners: Vec<RelationListener>,
}

impl RelationStatus {
    pub fn new<N: Into<String>>(relation: N, total: usize) -> Self {
        Self {
            relation: relation.into(),
            total,
            current: 0,
            started: Instant::now(),
            listeners: Vec::new(),
        }
    }

    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&RelationProgress) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn snapshot(&self) -> RelationProgress {
        RelationProgress {
            relation: self.relation.clone(),
            current: self.current,
            total: self.total,
            elapsed: self.started.elapsed(),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn set_total(&mut self, total: usize) {
        if self.total != total {
            self.total = total;
            self.notify();
        }
    }

    pub fn set_current(&mut self, current: usize) {
        if self.current != current {
            self.current = current;
            self.notify();
        }
    }

    pub fn advance(&mut self, rows: usize) {
        self.set_current(self.current + rows);
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let progress = self.snapshot();
        for listener in &mut self.listeners {
            listener(&progress);
        }
    }
}

/// Position in the list of relations a bulk operation walks through.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalProgress {
    pub relation: String,
    pub current_relation: usize,
    pub total_relations: usize,
}

pub type GlobalListener = Box<dyn FnMut(&GlobalProgress)>;

pub struct GlobalStatus {
    relation: String,
    current_relation: usize,
    total_relations: usize,
    listeners: Vec<GlobalListener>,
}

impl GlobalStatus {
    pub fn new(total_relations: usize) -> Self {
        Self {
            relation: String::new(),
            current_relation: 0,
            total_relations,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&GlobalProgress) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn snapshot(&self) -> GlobalProgress {
        GlobalProgress {
            relation: self.relation.clone(),
            current_relation: self.current_relation,
            total_relations: self.total_relations,
        }
    }

    pub fn set_total(&mut self, total_relations: usize) {
        if self.total_relations != total_relations {
            self.total_relations = total_relations;
            self.notify();
        }
    }

    /// Moves on to `relation`, counting it as the next one.
    pub fn begin_relation<N: Into<String>>(&mut self, relation: N) {
        self.relation = relation.into();
        self.current_relation += 1;
        self.notify();
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let progress = self.snapshot();
        for listener in &mut self.listeners {
            listener(&progress);
        }
    }
}

/// Logs every `interval` rows and once the relation completes.
pub fn log_relation_progress(interval: usize) -> impl FnMut(&RelationProgress) {
    let interval = interval.max(1);
    move |progress| {
        if progress.is_complete() {
            info!(
                relation = %progress.relation,
                rows = progress.total,
                elapsed_ms = progress.elapsed.as_millis() as u64,
                "relation done"
            );
        } else if progress.current % interval == 0 {
            info!(
                relation = %progress.relation,
                current = progress.current,
                total = progress.total,
                "{:.0}%",
                progress.progress_percent()
            );
        }
    }
}

pub fn log_global_progress(operation: &'static str) -> impl FnMut(&GlobalProgress) {
    move |progress| {
        info!(
            operation,
            relation = %progress.relation,
            "[{}/{}]",
            progress.current_relation,
            progress.total_relations
        );
    }
}
