//! Performance counters
//!
//! Instrumentation seam used around command execution and client calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Counter sink.
pub trait Counters: Send + Sync {
    fn increment(&self, name: &str, by: i64);

    /// Record an elapsed interval in milliseconds.
    fn record_interval(&self, name: &str, elapsed_ms: f64);

    fn increment_one(&self, name: &str) {
        self.increment(name, 1);
    }
}

/// In-flight timing. Records once, on `end_timing` or drop.
pub struct CounterTiming {
    counters: Option<Arc<dyn Counters>>,
    name: String,
    start: Instant,
}

impl CounterTiming {
    /// Start timing `name`; the interval is recorded when the guard ends.
    pub fn begin(counters: &Arc<dyn Counters>, name: &str) -> Self {
        Self {
            counters: Some(counters.clone()),
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn end_timing(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(counters) = self.counters.take() {
            let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
            counters.record_interval(&self.name, elapsed);
        }
    }
}

impl Drop for CounterTiming {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCounters;

impl Counters for NullCounters {
    fn increment(&self, _name: &str, _by: i64) {}
    fn record_interval(&self, _name: &str, _elapsed_ms: f64) {}
}

/// Snapshot of one counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counter {
    pub count: i64,
    pub last: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub total: f64,
}

/// Keeps counters in memory.
#[derive(Debug, Default)]
pub struct CachedCounters {
    counters: Mutex<HashMap<String, Counter>>,
}

impl CachedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Counter> {
        self.lock().get(name).cloned()
    }

    pub fn count(&self, name: &str) -> i64 {
        self.get(name).map(|c| c.count).unwrap_or(0)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Counter>> {
        // A poisoned map still holds usable numbers
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Counters for CachedCounters {
    fn increment(&self, name: &str, by: i64) {
        self.lock().entry(name.to_string()).or_default().count += by;
    }

    fn record_interval(&self, name: &str, elapsed_ms: f64) {
        let mut counters = self.lock();
        let counter = counters.entry(name.to_string()).or_default();
        counter.count += 1;
        counter.last = Some(elapsed_ms);
        counter.total += elapsed_ms;
        counter.min = Some(counter.min.map_or(elapsed_ms, |m| m.min(elapsed_ms)));
        counter.max = Some(counter.max.map_or(elapsed_ms, |m| m.max(elapsed_ms)));
    }
}
