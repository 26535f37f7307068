//! Performance counters
//!
//! Each script carries a [`PerformanceStatistics`] with one stopwatch per
//! [`PerformanceCounter`]. Counters are disabled by default; while disabled
//! starting a stopwatch costs one atomic load.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// What a stopwatch measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerformanceCounter {
    /// Compiling source into bytecode
    Compilation,
    /// Running outermost script calls
    Execution,
    /// Building interop descriptors for host types
    AdaptersCompilation,
}

impl PerformanceCounter {
    /// Every counter, in report order
    pub const ALL: [PerformanceCounter; 3] = [
        PerformanceCounter::Compilation,
        PerformanceCounter::Execution,
        PerformanceCounter::AdaptersCompilation,
    ];

    fn index(self) -> usize {
        match self {
            PerformanceCounter::Compilation => 0,
            PerformanceCounter::Execution => 1,
            PerformanceCounter::AdaptersCompilation => 2,
        }
    }
}

/// Accumulated measurements of one counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceResult {
    /// Counter measured
    pub counter: PerformanceCounter,
    /// Number of measured intervals
    pub instances: u64,
    /// Total time across all intervals
    pub elapsed: Duration,
}

impl fmt::Display for PerformanceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} : {} times / {} ms",
            self.counter,
            self.instances,
            self.elapsed.as_millis()
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CounterState {
    instances: u64,
    elapsed: Duration,
}

/// Per-script performance counters
#[derive(Debug, Default)]
pub struct PerformanceStatistics {
    enabled: AtomicBool,
    counters: Mutex<[CounterState; 3]>,
}

impl PerformanceStatistics {
    /// Counters, disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn measuring on or off; turning it off discards collected data
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            *self.counters.lock() = Default::default();
        }
    }

    /// True while measuring
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Start timing `counter`; the interval ends when the guard drops.
    /// Returns `None` while disabled.
    pub fn start_stopwatch(&self, counter: PerformanceCounter) -> Option<Stopwatch<'_>> {
        if !self.is_enabled() {
            return None;
        }
        Some(Stopwatch {
            stats: self,
            counter,
            started: Instant::now(),
        })
    }

    /// Measurements of `counter`, `None` while disabled
    pub fn result(&self, counter: PerformanceCounter) -> Option<PerformanceResult> {
        if !self.is_enabled() {
            return None;
        }
        let state = self.counters.lock()[counter.index()];
        Some(PerformanceResult {
            counter,
            instances: state.instances,
            elapsed: state.elapsed,
        })
    }

    /// One line per counter
    pub fn performance_log(&self) -> String {
        PerformanceCounter::ALL
            .iter()
            .filter_map(|c| self.result(*c))
            .map(|r| format!("{}\n", r))
            .collect()
    }

    fn record(&self, counter: PerformanceCounter, elapsed: Duration) {
        let mut counters = self.counters.lock();
        let state = &mut counters[counter.index()];
        state.instances += 1;
        state.elapsed += elapsed;
    }
}

/// Running interval of a [`PerformanceStatistics`] counter
pub struct Stopwatch<'a> {
    stats: &'a PerformanceStatistics,
    counter: PerformanceCounter,
    started: Instant,
}

impl Drop for Stopwatch<'_> {
    fn drop(&mut self) {
        self.stats.record(self.counter, self.started.elapsed());
    }
}
