//! Structured lifecycle events for harness runs.
//!
//! - `run_span` tags everything inside a run with its id
//! - `emit_*` functions log one event each at `info!`
//!
//! Excused divergences are always emitted, even though they do not fail a
//! run, so that excuse entries can be audited for staleness.

use tracing::{info, warn};

use crate::domain::result::Stage;
use crate::oracle::excuse::{ExcuseReason, ExcuseStatus};

/// The `dcch.run` span, tagged with the run id and request name.
///
/// Attached to a run future with `Instrument::instrument` so every event of
/// the run carries both fields.
pub fn run_span(run_id: &str, request: &str) -> tracing::Span {
    tracing::info_span!("dcch.run", run_id = %run_id, request = %request)
}

pub fn emit_run_started(run_id: &str, request: &str, rounds: usize, oracle: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        request = %request,
        rounds = rounds,
        oracle = oracle,
    );
}

/// One compile finished.
pub fn emit_round_compiled(run_id: &str, round: usize, diagnostics: usize, log_digest: &str, duration_ms: u64) {
    info!(
        event = "round.compiled",
        run_id = %run_id,
        round = round,
        diagnostics = diagnostics,
        log_digest = %log_digest,
        duration_ms = duration_ms,
    );
}

pub fn emit_stage_transition(run_id: &str, round: usize, from: Stage, to: Stage) {
    tracing::debug!(
        event = "round.stage",
        run_id = %run_id,
        round = round,
        from = %from,
        to = %to,
    );
}

pub fn emit_excused_divergence(
    run_id: &str,
    round: usize,
    excuse_id: &str,
    reason: ExcuseReason,
    status: ExcuseStatus,
    divergence: &dyn std::fmt::Display,
) {
    info!(
        event = "oracle.excused",
        run_id = %run_id,
        round = round,
        excuse_id = %excuse_id,
        reason = %reason,
        open = status == ExcuseStatus::Open,
        divergence = %divergence,
    );
}

pub fn emit_unexcused_divergence(run_id: &str, round: usize, divergence: &dyn std::fmt::Display) {
    warn!(
        event = "oracle.unexcused",
        run_id = %run_id,
        round = round,
        divergence = %divergence,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, failures: usize, passed: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failures = failures,
        passed = passed,
    );
}

/// Fatal error; the run stops with no further stages.
pub fn emit_run_aborted(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.aborted", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = run_span("test-run-id", "flow/test001").entered();
        emit_stage_transition("test-run-id", 1, Stage::Built, Stage::Compiled);
    }
}
