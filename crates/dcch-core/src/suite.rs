//! Suite runner: many independent requests, bounded parallelism.
//!
//! Requests own disjoint workspaces, so they run concurrently without
//! locking. Cancellation is all-or-nothing per request: a request that is
//! cut off reports [`RunStatus::Cancelled`] with no rounds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::request::RunRequest;
use crate::domain::result::{Failure, RoundResult, RunResult};
use crate::error::{HarnessError, Result};
use crate::metrics::METRICS;
use crate::oracle::OracleOutcome;
use crate::orchestrator::Orchestrator;

/// Shared cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    /// A fatal harness error (environment, compiler fault, configuration).
    Errored,
    Cancelled,
}

/// Report entry for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub request: String,
    pub status: RunStatus,
    pub run_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub rounds: Vec<RoundResult>,
    pub failures: Vec<Failure>,
    /// Excused oracle divergences, kept for staleness audits.
    pub excused: Vec<OracleOutcome>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn from_outcome(
        request: &str,
        started_at: DateTime<Utc>,
        outcome: Result<RunResult>,
    ) -> Self {
        let finished_at = Utc::now();
        let elapsed = (finished_at - started_at).num_milliseconds().max(0) as u64;
        match outcome {
            Ok(result) => Self {
                request: request.to_string(),
                status: if result.passed() {
                    RunStatus::Passed
                } else {
                    RunStatus::Failed
                },
                run_id: Some(result.run_id.clone()),
                started_at,
                finished_at,
                duration_ms: result.duration_ms,
                excused: result.excused_divergences().cloned().collect(),
                rounds: result.rounds,
                failures: result.failures,
                error: None,
            },
            Err(e) => Self {
                request: request.to_string(),
                status: if matches!(e, HarnessError::Cancelled) {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Errored
                },
                run_id: None,
                started_at,
                finished_at,
                duration_ms: elapsed,
                rounds: Vec::new(),
                failures: Vec::new(),
                excused: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Machine-readable outcome of a suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub harness_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In submission order.
    pub runs: Vec<RunRecord>,
}

impl RunReport {
    pub fn count(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|r| r.status == status).count()
    }

    pub fn all_passed(&self) -> bool {
        self.runs.iter().all(|r| r.status == RunStatus::Passed)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} runs: {} passed, {} failed, {} errored, {} cancelled",
            self.runs.len(),
            self.count(RunStatus::Passed),
            self.count(RunStatus::Failed),
            self.count(RunStatus::Errored),
            self.count(RunStatus::Cancelled),
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run `requests` with at most `parallelism` in flight.
pub async fn run_suite(
    orchestrator: Arc<Orchestrator>,
    requests: Vec<RunRequest>,
    parallelism: usize,
    cancel: CancelToken,
) -> RunReport {
    let started_at = Utc::now();
    let sem = Arc::new(Semaphore::new(parallelism.max(1)));
    let names: Vec<String> = requests.iter().map(|r| r.name.clone()).collect();
    let mut join_set = JoinSet::new();

    info!(requests = requests.len(), parallelism, "Starting suite");
    for (idx, request) in requests.into_iter().enumerate() {
        let orchestrator = Arc::clone(&orchestrator);
        let sem = Arc::clone(&sem);
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let started = Utc::now();
            let outcome = orchestrator.run_cancellable(&request, &cancel).await;
            (idx, RunRecord::from_outcome(&request.name, started, outcome))
        });
    }

    let mut slots: Vec<Option<RunRecord>> = vec![None; names.len()];
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, record)) => slots[idx] = Some(record),
            Err(e) => warn!(error = %e, "Run task failed to join"),
        }
    }

    let runs = slots
        .into_iter()
        .zip(names)
        .map(|(slot, name)| {
            slot.unwrap_or_else(|| {
                RunRecord::from_outcome(
                    &name,
                    started_at,
                    Err(HarnessError::Environment {
                        path: Default::default(),
                        reason: "run task panicked".into(),
                    }),
                )
            })
        })
        .collect();

    METRICS.flush();
    let report = RunReport {
        harness_version: crate::VERSION.to_string(),
        started_at,
        finished_at: Utc::now(),
        runs,
    };
    info!(summary = %report.summary(), "Suite finished");
    report
}
