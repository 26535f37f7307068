//! Execution counters

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of the [`ExecutionCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Executions in progress
    pub active_scripts: usize,
    /// Executions started
    pub scripts_run: u64,
    /// Cached-function executions that needed no compilation
    pub scripts_run_from_cache: u64,
    /// Executions and global scripts that failed
    pub error_count: u64,
    /// Cached functions compiled into instances
    pub functions_compiled: u64,
    /// Instances constructed by the pool
    pub instances_created: u64,
    /// Instances dropped because they were left mid-execution
    pub instances_discarded: u64,
}

impl Statistics {
    /// Share of runs served from the function cache, in percent
    pub fn cache_hit_percentage(&self) -> f64 {
        if self.scripts_run == 0 {
            return 0.0;
        }
        self.scripts_run_from_cache as f64 / self.scripts_run as f64 * 100.0
    }

    /// JSON rendering of the snapshot
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Counters shared by every execution of one engine, under one lock
#[derive(Debug, Default)]
pub struct ExecutionCounters {
    stats: Mutex<Statistics>,
}

impl ExecutionCounters {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a started execution; it stays active until the guard drops
    pub fn begin(&self) -> ActiveGuard<'_> {
        let mut stats = self.stats.lock();
        stats.active_scripts += 1;
        stats.scripts_run += 1;
        ActiveGuard { counters: self }
    }

    pub(crate) fn record_from_cache(&self) {
        self.stats.lock().scripts_run_from_cache += 1;
    }

    pub(crate) fn record_error(&self) {
        self.stats.lock().error_count += 1;
    }

    pub(crate) fn record_compiled(&self) {
        self.stats.lock().functions_compiled += 1;
    }

    pub(crate) fn record_instance_created(&self) {
        self.stats.lock().instances_created += 1;
    }

    pub(crate) fn record_instance_discarded(&self) {
        self.stats.lock().instances_discarded += 1;
    }

    /// Current values
    pub fn snapshot(&self) -> Statistics {
        *self.stats.lock()
    }

    /// Zero every counter except the active executions
    pub fn reset(&self) {
        let mut stats = self.stats.lock();
        *stats = Statistics {
            active_scripts: stats.active_scripts,
            ..Statistics::default()
        };
    }
}

/// Marks one execution as active
#[must_use = "the execution is only active while the guard lives"]
pub struct ActiveGuard<'a> {
    counters: &'a ExecutionCounters,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut stats = self.counters.stats.lock();
        stats.active_scripts = stats.active_scripts.saturating_sub(1);
    }
}
