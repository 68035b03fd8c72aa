//! Run results, pipeline stages and comparison failures.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compare::Diff;
use crate::executor::ExecutionOutput;
use crate::oracle::{Divergence, OracleOutcome};

/// Pipeline states a round moves through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Built,
    Compiled,
    Executed,
    LogCompared,
    OracleChecked,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Built => "built",
            Stage::Compiled => "compiled",
            Stage::Executed => "executed",
            Stage::LogCompared => "log_compared",
            Stage::OracleChecked => "oracle_checked",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparison-class failure. These are collected, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// Canonical log differs from the expected one.
    DiagnosticMismatch { round: usize, diff: Diff },
    /// A conformant round produced error diagnostics; nothing was run.
    UnexpectedCompileErrors { round: usize, log: String },
    /// Runtime output or exit status differs.
    ExecutionMismatch {
        round: usize,
        expected_exit_code: i32,
        exit_code: i32,
        stdout_diff: Option<Diff>,
        stderr_diff: Option<Diff>,
        stderr: String,
    },
    ExecutionTimeout { round: usize, timeout_ms: u64 },
    /// The oracle disagrees and no registered excuse applies.
    UnexcusedOracleDivergence { round: usize, divergence: Divergence },
    /// A `require_verbatim` excuse expected a divergence that did not occur.
    MissingRequiredDivergence { round: usize, excuse_id: String },
}

impl Failure {
    pub fn round(&self) -> usize {
        match self {
            Failure::DiagnosticMismatch { round, .. }
            | Failure::UnexpectedCompileErrors { round, .. }
            | Failure::ExecutionMismatch { round, .. }
            | Failure::ExecutionTimeout { round, .. }
            | Failure::UnexcusedOracleDivergence { round, .. }
            | Failure::MissingRequiredDivergence { round, .. } => *round,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Failure::DiagnosticMismatch { .. } => "diagnostic_mismatch",
            Failure::UnexpectedCompileErrors { .. } => "unexpected_compile_errors",
            Failure::ExecutionMismatch { .. } => "execution_mismatch",
            Failure::ExecutionTimeout { .. } => "execution_timeout",
            Failure::UnexcusedOracleDivergence { .. } => "unexcused_oracle_divergence",
            Failure::MissingRequiredDivergence { .. } => "missing_required_divergence",
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::DiagnosticMismatch { round, diff } => {
                write!(f, "round {round}: diagnostic log mismatch\n{diff}")
            }
            Failure::UnexpectedCompileErrors { round, log } => {
                write!(f, "round {round}: expected a clean compile, got\n{log}")
            }
            Failure::ExecutionMismatch {
                round,
                expected_exit_code,
                exit_code,
                stdout_diff,
                stderr_diff,
                stderr,
            } => {
                write!(f, "round {round}: execution mismatch")?;
                if exit_code != expected_exit_code {
                    write!(f, " (exit code {exit_code}, expected {expected_exit_code})")?;
                }
                if let Some(diff) = stdout_diff {
                    write!(f, "\nstdout:\n{diff}")?;
                }
                if let Some(diff) = stderr_diff {
                    write!(f, "\nstderr:\n{diff}")?;
                } else if !stderr.is_empty() {
                    write!(f, "\nstderr was:\n{stderr}")?;
                }
                Ok(())
            }
            Failure::ExecutionTimeout { round, timeout_ms } => {
                write!(f, "round {round}: execution timed out after {timeout_ms}ms")
            }
            Failure::UnexcusedOracleDivergence { round, divergence } => {
                write!(f, "round {round}: unexcused oracle divergence: {divergence}")
            }
            Failure::MissingRequiredDivergence { round, excuse_id } => write!(
                f,
                "round {round}: excuse '{excuse_id}' requires a divergence that no longer occurs"
            ),
        }
    }
}

/// Everything observed for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub index: usize,
    pub canonical_log: String,
    /// SHA-256 of the canonical log, hex encoded.
    pub log_digest: String,
    pub artifact_dir: Option<PathBuf>,
    pub execution: Option<ExecutionOutput>,
    pub oracle: Option<OracleOutcome>,
    /// Oracle diagnostics in the oracle's own format.
    #[serde(default)]
    pub oracle_log: Option<String>,
    /// States visited, in order.
    pub stages: Vec<Stage>,
}

impl RoundResult {
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Built)
    }
}

/// Outcome of one [`crate::domain::request::RunRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub request: String,
    pub run_id: String,
    pub rounds: Vec<RoundResult>,
    pub failures: Vec<Failure>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Canonical log of the last round that was compiled.
    pub fn canonical_log(&self) -> &str {
        self.rounds
            .last()
            .map(|r| r.canonical_log.as_str())
            .unwrap_or("")
    }

    /// Oracle outcomes that were excused rather than agreeing outright.
    pub fn excused_divergences(&self) -> impl Iterator<Item = &OracleOutcome> {
        self.rounds
            .iter()
            .filter_map(|r| r.oracle.as_ref())
            .filter(|o| matches!(o, OracleOutcome::ExcusedDivergence { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(stages: Vec<Stage>) -> RoundResult {
        RoundResult {
            index: 1,
            canonical_log: String::new(),
            log_digest: String::new(),
            artifact_dir: None,
            execution: None,
            oracle: None,
            oracle_log: None,
            stages,
        }
    }

    #[test]
    fn test_failure_round_and_kind() {
        let f = Failure::ExecutionTimeout {
            round: 2,
            timeout_ms: 500,
        };
        assert_eq!(f.round(), 2);
        assert_eq!(f.kind(), "execution_timeout");
        assert!(f.to_string().contains("500ms"));
    }

    #[test]
    fn test_failure_serde_tag() {
        let f = Failure::MissingRequiredDivergence {
            round: 1,
            excuse_id: "javac-7".into(),
        };
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["kind"], "missing_required_divergence");
    }

    #[test]
    fn test_round_final_stage() {
        assert_eq!(round(vec![]).final_stage(), Stage::Built);
        let r = round(vec![Stage::Built, Stage::Compiled, Stage::LogCompared, Stage::Done]);
        assert_eq!(r.final_stage(), Stage::Done);
    }

    #[test]
    fn test_run_result_passed() {
        let mut result = RunResult {
            request: "r".into(),
            run_id: "id".into(),
            rounds: vec![round(vec![Stage::Built])],
            failures: vec![],
            duration_ms: 1,
        };
        assert!(result.passed());
        result.failures.push(Failure::ExecutionTimeout {
            round: 1,
            timeout_ms: 10,
        });
        assert!(!result.passed());
    }
}
