//! Process-wide atomic counters.
//!
//! Counters are bumped silently at the call site; [`Metrics::flush`] emits
//! the current values as one `info!` event, typically at the end of a suite.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by every orchestrator in the process.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters. Readers may see values from an in-flight run.
pub struct Metrics {
    runs: AtomicU64,
    rounds: AtomicU64,
    excused_divergences: AtomicU64,
    unexcused_divergences: AtomicU64,
    timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
            excused_divergences: AtomicU64::new(0),
            unexcused_divergences: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// A request started its first round.
    pub fn inc_runs(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs", "counter incremented");
    }

    /// The primary compiler finished one round.
    pub fn inc_rounds(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds", "counter incremented");
    }

    /// An oracle divergence was covered by a registry entry.
    pub fn inc_excused(&self) {
        self.excused_divergences.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "excused_divergences", "counter incremented");
    }

    /// An oracle divergence failed its run.
    pub fn inc_unexcused(&self) {
        self.unexcused_divergences.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "unexcused_divergences", "counter incremented");
    }

    /// A compiled program was killed for exceeding its time limit.
    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    /// Current values, read counter by counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs: self.runs(),
            rounds: self.rounds(),
            excused_divergences: self.excused_divergences(),
            unexcused_divergences: self.unexcused_divergences(),
            timeouts: self.timeouts(),
        }
    }

    /// Emit the snapshot as one `info!` event. Called once a suite ends.
    pub fn flush(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            metric = "flush",
            runs = snapshot.runs,
            rounds = snapshot.rounds,
            excused_divergences = snapshot.excused_divergences,
            unexcused_divergences = snapshot.unexcused_divergences,
            timeouts = snapshot.timeouts,
        );
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    pub fn excused_divergences(&self) -> u64 {
        self.excused_divergences.load(Ordering::Relaxed)
    }

    pub fn unexcused_divergences(&self) -> u64 {
        self.unexcused_divergences.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Zero every counter. Only tests use this.
    pub fn reset(&self) {
        self.runs.store(0, Ordering::Relaxed);
        self.rounds.store(0, Ordering::Relaxed);
        self.excused_divergences.store(0, Ordering::Relaxed);
        self.unexcused_divergences.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs: u64,
    pub rounds: u64,
    pub excused_divergences: u64,
    pub unexcused_divergences: u64,
    pub timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_runs();
        m.inc_rounds();
        m.inc_rounds();
        m.inc_excused();
        m.inc_timeouts();
        assert_eq!(m.runs(), 1);
        assert_eq!(m.rounds(), 2);
        assert_eq!(m.excused_divergences(), 1);
        assert_eq!(m.unexcused_divergences(), 0);
        assert_eq!(m.timeouts(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_runs();
        m.inc_unexcused();
        assert_eq!(m.snapshot().unexcused_divergences, 1);
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
        assert_eq!(m.runs(), 0);
        assert_eq!(m.unexcused_divergences(), 0);
    }
}
