//! Suite runner: ordering, parallelism and cancellation.

use std::sync::Arc;
use std::time::Duration;

use dcch_core::fakes::ToyCompiler;
use dcch_core::{
    run_suite, CancelToken, HarnessConfig, LanguageLevel, OptionConfiguration, Orchestrator,
    Round, RunRequest, RunStatus, RuntimeConfig,
};

fn orchestrator(dir: &tempfile::TempDir) -> Arc<Orchestrator> {
    let config = HarnessConfig {
        root: dir.path().to_path_buf(),
        runtime: RuntimeConfig {
            program: "sh".to_string(),
            timeout_secs: 30,
            ..RuntimeConfig::default()
        },
        ..HarnessConfig::default()
    };
    Arc::new(Orchestrator::new(&config, Arc::new(ToyCompiler::new())).with_path_separator('/'))
}

fn negative(name: &str, source: &str, expected: &str) -> RunRequest {
    RunRequest::builder(name, OptionConfiguration::for_level(LanguageLevel::V1_8))
        .round(
            Round::builder()
                .unit("X.java", source)
                .expect_log(expected)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn sleeper(name: &str) -> RunRequest {
    RunRequest::builder(name, OptionConfiguration::for_level(LanguageLevel::V1_8))
        .round(
            Round::builder()
                .unit("X.java", "class X {}")
                .vm_arg("-c")
                .vm_arg("sleep 20")
                .vm_arg("launcher")
                .expect_output("X", "")
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn report_keeps_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let requests = vec![
        negative("a", "class X {}", ""),
        negative("b", "class X { void m() { while (false); } }", ""),
        negative("c", "class X {}", ""),
        negative("d", "class X { /*toy:crash*/ }", ""),
    ];

    let report = run_suite(orchestrator(&dir), requests, 2, CancelToken::new()).await;
    let names: Vec<_> = report.runs.iter().map(|r| r.request.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    let statuses: Vec<_> = report.runs.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            RunStatus::Passed,
            RunStatus::Failed,
            RunStatus::Passed,
            RunStatus::Errored
        ]
    );
    assert!(!report.all_passed());
    assert_eq!(report.summary(), "4 runs: 2 passed, 1 failed, 1 errored, 0 cancelled");
    assert!(report.runs[3].error.as_deref().unwrap().contains("compiler fault"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["runs"][1]["status"], "failed");
    assert_eq!(json["harness_version"], dcch_core::VERSION);
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let report = run_suite(
        orchestrator(&dir),
        vec![negative("a", "class X {}", ""), negative("b", "class X {}", "")],
        4,
        cancel,
    )
    .await;
    assert_eq!(report.count(RunStatus::Cancelled), 2);
    assert!(report.runs.iter().all(|r| r.rounds.is_empty()));
}

#[tokio::test]
async fn cancellation_stops_running_requests() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        })
    };

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        run_suite(
            orchestrator(&dir),
            vec![sleeper("slow-1"), sleeper("slow-2"), sleeper("slow-3")],
            2,
            cancel,
        ),
    )
    .await
    .expect("suite should stop soon after cancellation");
    trigger.await.unwrap();

    assert_eq!(report.count(RunStatus::Cancelled), 3);
    for run in &report.runs {
        assert!(run.rounds.is_empty());
        assert!(run.run_id.is_none());
    }
    // Cancelled runs still clean up their workspaces.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
