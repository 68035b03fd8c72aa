//! Run orchestrator: sequences the pipeline for one request.
//!
//! Per round the states are
//! `Built → Compiled → {Executed → LogCompared | LogCompared} → [OracleChecked] → Done`,
//! with `Failed` reachable from any of them. Rounds run strictly in order
//! because a reusing round compiles against the previous round's output.
//! The oracle compile is the only step that may overlap another one: it
//! runs alongside execution on conformant rounds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::OptionFuture;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::canonical::{log_digest, Canonicalizer};
use crate::compare::Comparator;
use crate::compiler::{ArtifactChain, Compiler, CompilerInvoker, ResolvedClasspath};
use crate::config::HarnessConfig;
use crate::domain::request::{Expectation, Round, RunRequest};
use crate::domain::result::{Failure, RoundResult, RunResult, Stage};
use crate::error::{HarnessError, Result};
use crate::executor::{ArtifactExecutor, ExecutionResult};
use crate::metrics::METRICS;
use crate::obs;
use crate::oracle::{CrossCheck, CrossValidator, OracleOutcome};
use crate::suite::CancelToken;
use crate::workspace::Workspace;

/// Records the states a round visits.
struct StageTracker<'a> {
    run_id: &'a str,
    round: usize,
    stages: Vec<Stage>,
}

impl<'a> StageTracker<'a> {
    fn new(run_id: &'a str, round: usize) -> Self {
        Self {
            run_id,
            round,
            stages: vec![Stage::Built],
        }
    }

    fn advance(&mut self, to: Stage) {
        let from = self.stages.last().copied().unwrap_or(Stage::Built);
        obs::emit_stage_transition(self.run_id, self.round, from, to);
        self.stages.push(to);
    }
}

/// What one round leaves behind for the next.
struct RoundOutcome {
    result: RoundResult,
    failures: Vec<Failure>,
    chain: ArtifactChain,
    oracle_chain: ArtifactChain,
    halt: bool,
}

/// Drives requests through the pipeline.
///
/// Holds only shared, read-only state; one orchestrator serves any number
/// of concurrent requests.
pub struct Orchestrator {
    primary: Arc<dyn Compiler>,
    invoker: CompilerInvoker,
    validator: CrossValidator,
    executor: ArtifactExecutor,
    canonicalizer: Canonicalizer,
    comparator: Comparator,
    root: PathBuf,
    keep_workspaces: bool,
}

impl Orchestrator {
    pub fn new(config: &HarnessConfig, primary: Arc<dyn Compiler>) -> Self {
        let invoker = config.invoker();
        Self {
            primary,
            validator: CrossValidator::new(invoker.clone()),
            invoker,
            executor: ArtifactExecutor::new(config.runtime.clone()),
            canonicalizer: Canonicalizer::default(),
            comparator: Comparator::default(),
            root: config.root.clone(),
            keep_workspaces: config.keep_workspaces,
        }
    }

    /// Render and compare paths as if `separator` were the host one.
    pub fn with_path_separator(mut self, separator: char) -> Self {
        self.canonicalizer = Canonicalizer::with_separator(separator);
        self.comparator = Comparator::with_separator(separator);
        self
    }

    pub fn keep_workspaces(mut self, keep: bool) -> Self {
        self.keep_workspaces = keep;
        self
    }

    pub fn primary(&self) -> &dyn Compiler {
        self.primary.as_ref()
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunResult> {
        self.run_cancellable(request, &CancelToken::new()).await
    }

    /// Run `request`, abandoning it as a whole if `cancel` fires.
    ///
    /// A cancelled run yields [`HarnessError::Cancelled`] and no partial
    /// result. Child processes of an abandoned run are killed.
    pub async fn run_cancellable(&self, request: &RunRequest, cancel: &CancelToken) -> Result<RunResult> {
        request.validate()?;
        if cancel.is_cancelled() {
            return Err(HarnessError::Cancelled);
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let workspace = Workspace::create(&self.root, &request.name)?;
        let span = obs::run_span(&run_id, &request.name);

        let outcome = tokio::select! {
            result = self.drive(&run_id, request, &workspace).instrument(span) => result,
            _ = cancel.cancelled() => Err(HarnessError::Cancelled),
        };

        if let Err(e) = &outcome {
            obs::emit_run_aborted(&run_id, e);
        }
        if !self.keep_workspaces {
            let root = workspace.root().to_path_buf();
            if let Err(e) = workspace.remove() {
                warn!(workspace = %root.display(), error = %e, "Failed to remove workspace");
            }
        }
        outcome
    }

    async fn drive(&self, run_id: &str, request: &RunRequest, workspace: &Workspace) -> Result<RunResult> {
        let start = Instant::now();
        METRICS.inc_runs();
        obs::emit_run_started(run_id, &request.name, request.rounds.len(), request.oracle.is_some());

        let mut rounds = Vec::with_capacity(request.rounds.len());
        let mut failures = Vec::new();
        let mut chain = ArtifactChain::empty();
        let mut oracle_chain = ArtifactChain::empty();

        for (i, round) in request.rounds.iter().enumerate() {
            let outcome = self
                .run_round(run_id, request, workspace, i + 1, round, &chain, &oracle_chain)
                .await?;
            rounds.push(outcome.result);
            failures.extend(outcome.failures);
            chain = outcome.chain;
            oracle_chain = outcome.oracle_chain;
            if outcome.halt {
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(run_id, duration_ms, failures.len(), failures.is_empty());
        Ok(RunResult {
            request: request.name.clone(),
            run_id: run_id.to_string(),
            rounds,
            failures,
            duration_ms,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_round(
        &self,
        run_id: &str,
        request: &RunRequest,
        workspace: &Workspace,
        index: usize,
        round: &Round,
        chain: &ArtifactChain,
        oracle_chain: &ArtifactChain,
    ) -> Result<RoundOutcome> {
        let (prior, oracle_prior) = if round.reuse_output {
            (chain.clone(), oracle_chain.clone())
        } else {
            (ArtifactChain::empty(), ArtifactChain::empty())
        };
        let flush = round.flushes_output();
        if index > 1 && flush {
            workspace.reset_sources()?;
        }
        let sources = workspace.build(&round.units, &round.modules, flush)?;
        let mut tracker = StageTracker::new(run_id, index);

        let output_dir = workspace.round_output_dir(index);
        let compile = self
            .invoker
            .compile(
                self.primary.as_ref(),
                &sources,
                &request.options,
                &prior,
                &round.extra_classpath,
                &output_dir,
            )
            .await?;
        METRICS.inc_rounds();

        let log = self.canonicalizer.render(&compile.diagnostics, &sources);
        let digest = log_digest(&log);
        obs::emit_round_compiled(run_id, index, compile.diagnostics.len(), &digest, compile.duration_ms);
        tracker.advance(Stage::Compiled);

        let oracle_dir = workspace.oracle_output_dir(index);
        let oracle_check: OptionFuture<_> = request
            .oracle
            .as_ref()
            .map(|oracle| {
                self.validator.cross_check(
                    &request.name,
                    oracle,
                    &sources,
                    &request.options,
                    &oracle_prior,
                    &round.extra_classpath,
                    &oracle_dir,
                    &compile.diagnostics,
                )
            })
            .into();

        let mut failures = Vec::new();
        let mut execution = None;
        let mut cross: Option<CrossCheck> = None;
        let mut halt = false;

        match &round.expectation {
            Expectation::Negative { expected_log } => {
                if let Some(diff) = self.comparator.compare(&log, expected_log) {
                    failures.push(Failure::DiagnosticMismatch { round: index, diff });
                }
                tracker.advance(Stage::LogCompared);
                cross = oracle_check.await.transpose()?;
            }
            Expectation::Conformant { .. } if compile.has_errors() => {
                drop(oracle_check);
                failures.push(Failure::UnexpectedCompileErrors {
                    round: index,
                    log: log.clone(),
                });
                tracker.advance(Stage::Failed);
                halt = true;
            }
            Expectation::Conformant {
                entry_point,
                expected_output,
                vm_args,
                expected_exit_code,
                expected_stderr,
            } => {
                let classpath = ResolvedClasspath {
                    mode: compile.classpath.mode,
                    entries: std::iter::once(output_dir.clone())
                        .chain(compile.classpath.entries.iter().cloned())
                        .collect(),
                };
                let run = self
                    .executor
                    .run(&classpath, entry_point, vm_args, &request.options);
                let (run, checked) = tokio::join!(run, oracle_check);
                cross = checked.transpose()?;
                tracker.advance(Stage::Executed);

                match run? {
                    ExecutionResult::TimedOut { timeout_ms } => {
                        METRICS.inc_timeouts();
                        failures.push(Failure::ExecutionTimeout {
                            round: index,
                            timeout_ms,
                        });
                    }
                    ExecutionResult::Completed(output) => {
                        let stdout_diff = self.comparator.compare_output(&output.stdout, expected_output);
                        let stderr_diff = expected_stderr
                            .as_deref()
                            .and_then(|expected| self.comparator.compare_output(&output.stderr, expected));
                        if stdout_diff.is_some()
                            || stderr_diff.is_some()
                            || output.exit_code != *expected_exit_code
                        {
                            failures.push(Failure::ExecutionMismatch {
                                round: index,
                                expected_exit_code: *expected_exit_code,
                                exit_code: output.exit_code,
                                stdout_diff,
                                stderr_diff,
                                stderr: output.stderr.clone(),
                            });
                        }
                        execution = Some(output);
                    }
                }
                tracker.advance(Stage::LogCompared);
            }
        }

        if let Some(check) = &cross {
            match &check.outcome {
                OracleOutcome::Agree { .. } => {}
                OracleOutcome::ExcusedDivergence {
                    excuse_id,
                    reason,
                    status,
                    divergence,
                } => {
                    METRICS.inc_excused();
                    obs::emit_excused_divergence(run_id, index, excuse_id, *reason, *status, divergence);
                }
                OracleOutcome::UnexcusedDivergence { divergence } => {
                    METRICS.inc_unexcused();
                    obs::emit_unexcused_divergence(run_id, index, divergence);
                    failures.push(Failure::UnexcusedOracleDivergence {
                        round: index,
                        divergence: divergence.clone(),
                    });
                }
                OracleOutcome::MissingRequiredDivergence { excuse_id } => {
                    failures.push(Failure::MissingRequiredDivergence {
                        round: index,
                        excuse_id: excuse_id.clone(),
                    });
                }
            }
            tracker.advance(Stage::OracleChecked);
        }
        if !halt {
            tracker.advance(if failures.is_empty() { Stage::Done } else { Stage::Failed });
        }

        let next_chain = match &compile.artifact_dir {
            Some(dir) => prior.extended(dir.clone()),
            None => prior,
        };
        let next_oracle_chain = match cross.as_ref().and_then(|c| c.compile.artifact_dir.clone()) {
            Some(dir) => oracle_prior.extended(dir),
            None => oracle_prior,
        };

        Ok(RoundOutcome {
            result: RoundResult {
                index,
                canonical_log: log,
                log_digest: digest,
                artifact_dir: compile.artifact_dir.clone(),
                execution,
                oracle: cross.as_ref().map(|c| c.outcome.clone()),
                oracle_log: cross.map(|c| c.oracle_log),
                stages: tracker.stages,
            },
            failures,
            chain: next_chain,
            oracle_chain: next_oracle_chain,
            halt,
        })
    }
}
