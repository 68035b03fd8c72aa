//! DCCH - Differential Compiler Conformance Harness CLI
//!
//! The `dcch` command drives fixture files through the harness.
//!
//! ## Commands
//!
//! - `run`: Run fixtures against the configured compiler (and oracle)
//! - `render`: Render a diagnostics JSON file as a canonical log
//! - `excuses`: List the entries of an excuse registry for auditing

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use dcch_core::fakes::ToyCompiler;
use dcch_core::{
    run_suite, CancelToken, Canonicalizer, CompilationUnit, Compiler, DiagnosticRecord,
    ExcuseRegistry, Fixture, HarnessConfig, ModuleMap, OracleConfig, Orchestrator, RunReport,
    RunStatus, Workspace,
};

#[derive(Parser)]
#[command(name = "dcch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Differential Compiler Conformance Harness", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fixture files
    Run {
        /// Fixture files (TOML)
        #[arg(required = true)]
        fixtures: Vec<PathBuf>,

        /// Harness configuration (TOML)
        #[arg(short, long, env = "DCCH_CONFIG")]
        config: Option<PathBuf>,

        /// Excuse registry for oracle divergences (TOML)
        #[arg(short, long)]
        excuses: Option<PathBuf>,

        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Use the built-in toy compiler as the compiler under test
        #[arg(long)]
        toy: bool,
    },

    /// Render a canonical diagnostic log
    Render {
        /// JSON array of diagnostic records
        diagnostics: PathBuf,

        /// Directory the records' unit paths are relative to
        #[arg(short, long)]
        source: PathBuf,

        /// Path separator to render with (default: host)
        #[arg(long)]
        separator: Option<char>,
    },

    /// List excuse registry entries
    Excuses {
        /// Excuse registry file (TOML)
        file: PathBuf,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    dcch_core::init_tracing(cli.log_json, level);

    match cli.command {
        Commands::Run {
            fixtures,
            config,
            excuses,
            json,
            report,
            toy,
        } => {
            let report_data =
                cmd_run(&fixtures, config.as_deref(), excuses.as_deref(), toy).await?;
            if let Some(path) = &report {
                std::fs::write(path, report_data.to_json()?)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                info!(report = %path.display(), "Wrote run report");
            }
            if json {
                println!("{}", report_data.to_json()?);
            } else {
                print!("{}", format_report(&report_data));
            }
            if !report_data.all_passed() {
                bail!("{}", report_data.summary());
            }
            Ok(())
        }
        Commands::Render {
            diagnostics,
            source,
            separator,
        } => {
            print!("{}", cmd_render(&diagnostics, &source, separator)?);
            Ok(())
        }
        Commands::Excuses { file, json } => {
            let registry = ExcuseRegistry::load(&file)
                .with_context(|| format!("Failed to load excuses from {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(registry.entries())?);
            } else {
                print!("{}", format_excuses(&registry));
            }
            Ok(())
        }
    }
}

/// Load configuration and fixtures, then run them as one suite.
async fn cmd_run(
    fixtures: &[PathBuf],
    config_path: Option<&Path>,
    excuses_path: Option<&Path>,
    toy: bool,
) -> Result<RunReport> {
    let config = match config_path {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    let primary: Arc<dyn Compiler> = if toy {
        Arc::new(ToyCompiler::new())
    } else {
        match config.primary_compiler() {
            Some(compiler) => Arc::new(compiler),
            None => bail!("No primary compiler configured; set [primary] in the config or pass --toy"),
        }
    };

    let oracle = match config.oracle_compiler() {
        Some(compiler) => {
            let excuses = match excuses_path {
                Some(path) => ExcuseRegistry::load(path)
                    .with_context(|| format!("Failed to load excuses from {}", path.display()))?,
                None => ExcuseRegistry::empty(),
            };
            Some(OracleConfig {
                compiler: Arc::new(compiler),
                excuses: Arc::new(excuses),
            })
        }
        None => {
            if excuses_path.is_some() {
                warn!("Excuse registry given but no oracle compiler is configured");
            }
            None
        }
    };

    let mut requests = Vec::with_capacity(fixtures.len());
    for path in fixtures {
        let fixture = Fixture::load(path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?;
        requests.push(fixture.to_request(oracle.as_ref())?);
    }

    let orchestrator = Arc::new(Orchestrator::new(&config, primary));
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling runs");
                cancel.cancel();
            }
        });
    }

    Ok(run_suite(orchestrator, requests, config.parallelism, cancel).await)
}

/// Human-readable report: one line per run, failures indented below.
fn format_report(report: &RunReport) -> String {
    let mut out = String::new();
    for run in &report.runs {
        let tag = match run.status {
            RunStatus::Passed => "PASS",
            RunStatus::Failed => "FAIL",
            RunStatus::Errored => "ERROR",
            RunStatus::Cancelled => "CANCELLED",
        };
        out.push_str(&format!("{tag:<9} {} ({}ms)\n", run.request, run.duration_ms));
        for failure in &run.failures {
            for line in failure.to_string().lines() {
                out.push_str(&format!("    {line}\n"));
            }
        }
        if let Some(error) = &run.error {
            out.push_str(&format!("    {error}\n"));
        }
        if !run.excused.is_empty() {
            out.push_str(&format!("    {} excused oracle divergence(s)\n", run.excused.len()));
        }
    }
    out.push_str(&report.summary());
    out.push('\n');
    out
}

/// Render the records in `diagnostics_path` against sources under `source_dir`.
fn cmd_render(diagnostics_path: &Path, source_dir: &Path, separator: Option<char>) -> Result<String> {
    let text = std::fs::read_to_string(diagnostics_path)
        .with_context(|| format!("Failed to read {}", diagnostics_path.display()))?;
    let diagnostics: Vec<DiagnosticRecord> =
        serde_json::from_str(&text).context("Failed to parse diagnostics as JSON")?;

    // Units in order of first mention.
    let mut seen = BTreeSet::new();
    let mut units = Vec::new();
    for record in &diagnostics {
        record.validate()?;
        if !seen.insert(record.path.as_str()) {
            continue;
        }
        let file = record
            .path
            .split('/')
            .fold(source_dir.to_path_buf(), |acc, seg| acc.join(seg));
        let source = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read source {}", file.display()))?;
        units.push(CompilationUnit::new(&record.path, source)?);
    }

    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let workspace = Workspace::create(scratch.path(), "render")?;
    let sources = workspace.build(&units, &ModuleMap::new(), false)?;
    let canonicalizer = separator
        .map(Canonicalizer::with_separator)
        .unwrap_or_default();
    Ok(canonicalizer.render(&diagnostics, &sources))
}

fn format_excuses(registry: &ExcuseRegistry) -> String {
    let mut out = String::new();
    for entry in registry.entries() {
        out.push_str(&format!(
            "{} [{} / {}] fixture={} mismatch={} rule={:?}",
            entry.id,
            entry.reason,
            match entry.reason.status() {
                dcch_core::ExcuseStatus::Known => "known",
                dcch_core::ExcuseStatus::Open => "open",
            },
            entry.fixture.as_deref().unwrap_or_default(),
            entry.mismatch.as_str(),
            entry.rule,
        ));
        if let Some(tracking) = &entry.tracking {
            out.push_str(&format!(" tracking={tracking}"));
        }
        out.push('\n');
        if !entry.description.is_empty() {
            out.push_str(&format!("    {}\n", entry.description));
        }
    }
    let open = registry
        .entries()
        .iter()
        .filter(|e| e.reason.status() == dcch_core::ExcuseStatus::Open)
        .count();
    out.push_str(&format!("{} excuses, {} open\n", registry.len(), open));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
name = "flow/unreachable"

[options]
level = "1.4"

[[round]]
expected_log = """
1. ERROR in p1/Test.java (at line 4)
			while (false);
	               ^
Unreachable code
----------
"""

[[round.unit]]
path = "p1/Test.java"
text = "package p1;\npublic class Test {\n\tpublic void foo() {\n\t\twhile (false);\n\t}\n}\n"
"#;

    #[tokio::test]
    async fn test_run_toy_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("unreachable.toml");
        std::fs::write(&fixture, FIXTURE).unwrap();
        let config = dir.path().join("dcch.toml");
        std::fs::write(
            &config,
            format!("root = {:?}\n", dir.path().join("work").display().to_string()),
        )
        .unwrap();

        let report = cmd_run(&[fixture], Some(&config), None, true).await.unwrap();
        assert!(report.all_passed(), "{}", format_report(&report));
        assert!(format_report(&report).starts_with("PASS      flow/unreachable"));
    }

    #[tokio::test]
    async fn test_run_without_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("f.toml");
        std::fs::write(&fixture, FIXTURE).unwrap();
        let err = cmd_run(&[fixture], None, None, false).await.unwrap_err();
        assert!(err.to_string().contains("No primary compiler"));
    }

    #[test]
    fn test_render_from_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/p")).unwrap();
        std::fs::write(dir.path().join("src/p/A.java"), "class A {\n\tint x;\n}\n").unwrap();
        let diagnostics = dir.path().join("diags.json");
        std::fs::write(
            &diagnostics,
            r#"[{"severity":"warning","path":"p/A.java","line":2,"start_column":6,"end_column":6,"message":"unused"}]"#,
        )
        .unwrap();

        let log = cmd_render(&diagnostics, &dir.path().join("src"), Some('/')).unwrap();
        assert_eq!(
            log,
            "1. WARNING in p/A.java (at line 2)\n\t\tint x;\n\t     ^\nunused\n----------\n"
        );
    }

    #[test]
    fn test_format_excuses_marks_open_entries() {
        let registry = ExcuseRegistry::from_toml(
            r#"
            [[excuse]]
            id = "a"
            reason = "oracle_bug"
            fixture = "flow/test001"
            mismatch = "errors_differ"
            tracking = "DCCH-7"

            [[excuse]]
            id = "b"
            reason = "open_question"
            fixture = "scope/*"
            mismatch = "oracle_errors_primary_none"
            description = "variable scope in for-each"
            "#,
        )
        .unwrap();
        let listing = format_excuses(&registry);
        assert!(listing.contains("a [oracle_bug / known] fixture=flow/test001 mismatch=errors_differ"));
        assert!(listing.contains("tracking=DCCH-7"));
        assert!(listing.contains("b [open_question / open] fixture=scope/*"));
        assert!(listing.ends_with("2 excuses, 1 open\n"));
    }
}
