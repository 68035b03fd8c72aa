//! DCCH Core Library
//!
//! Differential compiler conformance harness: materializes source sets,
//! drives a compiler under test through one or more rounds, renders its
//! diagnostics as a canonical log, runs the produced artifacts, and
//! cross-checks an oracle compiler against an auditable excuse registry.

pub mod canonical;
pub mod catalog;
pub mod compare;
pub mod compiler;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod fixture;
pub mod metrics;
pub mod obs;
pub mod oracle;
pub mod orchestrator;
pub mod suite;
pub mod telemetry;
pub mod workspace;

pub use canonical::{caret_line, log_digest, sort_diagnostics, Canonicalizer, SEPARATOR_LINE};
pub use catalog::LibraryCatalog;
pub use compare::{Comparator, Diff};
pub use compiler::{
    collect_artifacts, parse_canonical_log, parse_javac_output, ArtifactChain, ClasspathMode,
    CompileInvocation, CompileOutcome, CompileOutput, Compiler, CompilerInvoker, OptionDialect,
    OutputFormat, ProcessCompiler, ProcessCompilerConfig, ResolvedClasspath,
};
pub use config::{CompileConfig, HarnessConfig, RuntimeConfig};
pub use domain::{
    CompilationUnit, DiagnosticRecord, Expectation, Failure, LanguageLevel, ModuleMap,
    OptionConfiguration, OracleConfig, Round, RoundResult, RunRequest, RunResult, Severity,
    SeverityLevel, Stage,
};
pub use error::{HarnessError, Result};
pub use executor::{ArtifactExecutor, ExecutionOutput, ExecutionResult};
pub use fixture::Fixture;
pub use oracle::excuse::{ExcuseEntry, ExcuseReason, ExcuseRegistry, ExcuseStatus, MatchRule};
pub use oracle::render::render_oracle_log;
pub use oracle::{CrossValidator, Divergence, MismatchKind, OracleOutcome};
pub use orchestrator::Orchestrator;
pub use suite::{run_suite, CancelToken, RunRecord, RunReport, RunStatus};
pub use workspace::{SourceSet, Workspace};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// DCCH version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
