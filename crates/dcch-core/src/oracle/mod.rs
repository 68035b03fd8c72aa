//! Oracle cross-validation.
//!
//! The oracle compiles the same source set through its own option dialect.
//! Its diagnostics are compared with the primary's semantically: two
//! diagnostics agree when they name the same unit, the same line and the
//! same error-or-not class. Message texts and columns are ignored.
//!
//! - [`excuse`]: registry of tolerated divergences
//! - [`render`]: oracle-side textual log for reports

pub mod excuse;
pub mod render;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::{ArtifactChain, CompileOutcome, CompilerInvoker};
use crate::domain::diagnostic::{DiagnosticRecord, Severity};
use crate::domain::options::OptionConfiguration;
use crate::domain::request::OracleConfig;
use crate::error::Result;
use crate::workspace::SourceSet;

use excuse::{ExcuseReason, ExcuseRegistry, ExcuseStatus};

/// Which compiler reported a divergent diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Primary,
    Oracle,
}

/// Shape of a disagreement, used to key excuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    PrimaryErrorsOracleNone,
    PrimaryErrorsOracleWarnings,
    OracleErrorsPrimaryNone,
    OracleErrorsPrimaryWarnings,
    /// Both report errors, at different places.
    ErrorsDiffer,
    PrimaryWarningsOracleNone,
    OracleWarningsPrimaryNone,
}

impl MismatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MismatchKind::PrimaryErrorsOracleNone => "primary_errors_oracle_none",
            MismatchKind::PrimaryErrorsOracleWarnings => "primary_errors_oracle_warnings",
            MismatchKind::OracleErrorsPrimaryNone => "oracle_errors_primary_none",
            MismatchKind::OracleErrorsPrimaryWarnings => "oracle_errors_primary_warnings",
            MismatchKind::ErrorsDiffer => "errors_differ",
            MismatchKind::PrimaryWarningsOracleNone => "primary_warnings_oracle_none",
            MismatchKind::OracleWarningsPrimaryNone => "oracle_warnings_primary_none",
        }
    }
}

/// A diagnostic reported by one side only.
///
/// Non-error diagnostics are recorded with [`Severity::Warning`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DivergentEntry {
    pub path: String,
    pub line: u32,
    pub side: Side,
    pub severity: Severity,
}

impl fmt::Display for DivergentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Primary => "primary",
            Side::Oracle => "oracle",
        };
        write!(f, "{side} {} at {}:{}", self.severity, self.path, self.line)
    }
}

/// Classified disagreement between the two compilers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Divergence {
    pub kind: MismatchKind,
    /// One-sided diagnostics, sorted.
    pub entries: Vec<DivergentEntry>,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        for (i, entry) in self.entries.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{entry}")?;
        }
        Ok(())
    }
}

/// Verdict of one cross-check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OracleOutcome {
    Agree {
        diagnostics: usize,
    },
    ExcusedDivergence {
        excuse_id: String,
        reason: ExcuseReason,
        status: ExcuseStatus,
        divergence: Divergence,
    },
    UnexcusedDivergence {
        divergence: Divergence,
    },
    /// The compilers agree, but a verbatim excuse says they should not.
    MissingRequiredDivergence {
        excuse_id: String,
    },
}

impl OracleOutcome {
    /// Whether this outcome fails the run.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OracleOutcome::UnexcusedDivergence { .. } | OracleOutcome::MissingRequiredDivergence { .. }
        )
    }
}

type Key = (String, u32, bool);

/// Diagnostics per key, so repeated reports on one line are not collapsed.
fn keys(diagnostics: &[DiagnosticRecord]) -> BTreeMap<Key, usize> {
    let mut counts = BTreeMap::new();
    for d in diagnostics {
        *counts
            .entry((d.path.clone(), d.line, d.severity.is_error()))
            .or_insert(0) += 1;
    }
    counts
}

/// Keys `a` reports more often than `b`, with the surplus count.
fn surplus<'a>(
    a: &'a BTreeMap<Key, usize>,
    b: &'a BTreeMap<Key, usize>,
) -> impl Iterator<Item = (&'a Key, usize)> + 'a {
    a.iter().filter_map(move |(key, &n)| {
        let other = b.get(key).copied().unwrap_or(0);
        n.checked_sub(other).filter(|&extra| extra > 0).map(|extra| (key, extra))
    })
}

/// Compare two diagnostic lists. `None` means they agree.
pub fn classify(primary: &[DiagnosticRecord], oracle: &[DiagnosticRecord]) -> Option<Divergence> {
    let p = keys(primary);
    let o = keys(oracle);
    if p == o {
        return None;
    }

    let p_err = p.keys().any(|k| k.2);
    let o_err = o.keys().any(|k| k.2);
    let o_warn = o.keys().any(|k| !k.2);
    let p_warn = p.keys().any(|k| !k.2);
    let errors_differ = surplus(&p, &o).chain(surplus(&o, &p)).any(|(k, _)| k.2);

    let kind = match (p_err, o_err) {
        (true, false) if o_warn => MismatchKind::PrimaryErrorsOracleWarnings,
        (true, false) => MismatchKind::PrimaryErrorsOracleNone,
        (false, true) if p_warn => MismatchKind::OracleErrorsPrimaryWarnings,
        (false, true) => MismatchKind::OracleErrorsPrimaryNone,
        _ if errors_differ => MismatchKind::ErrorsDiffer,
        _ if surplus(&p, &o).next().is_some() => MismatchKind::PrimaryWarningsOracleNone,
        _ => MismatchKind::OracleWarningsPrimaryNone,
    };

    let entry = |side: Side, (path, line, error): &Key| DivergentEntry {
        path: path.clone(),
        line: *line,
        side,
        severity: if *error { Severity::Error } else { Severity::Warning },
    };
    let mut entries: Vec<DivergentEntry> = surplus(&p, &o)
        .flat_map(|(k, n)| std::iter::repeat(entry(Side::Primary, k)).take(n))
        .chain(surplus(&o, &p).flat_map(|(k, n)| std::iter::repeat(entry(Side::Oracle, k)).take(n)))
        .collect();
    entries.sort();

    Some(Divergence { kind, entries })
}

/// Apply the excuse policy to a classification.
pub fn judge(fixture: &str, divergence: Option<Divergence>, excuses: &ExcuseRegistry, agreed: usize) -> OracleOutcome {
    match divergence {
        Some(divergence) => match excuses.find_match(fixture, &divergence) {
            Some(excuse) => OracleOutcome::ExcusedDivergence {
                excuse_id: excuse.id.clone(),
                reason: excuse.reason,
                status: excuse.reason.status(),
                divergence,
            },
            None => OracleOutcome::UnexcusedDivergence { divergence },
        },
        None => match excuses.required_for(fixture).next() {
            Some(excuse) => OracleOutcome::MissingRequiredDivergence {
                excuse_id: excuse.id.clone(),
            },
            None => OracleOutcome::Agree { diagnostics: agreed },
        },
    }
}

/// Oracle-side result of one round.
#[derive(Debug, Clone)]
pub struct CrossCheck {
    pub outcome: OracleOutcome,
    pub compile: CompileOutcome,
    /// Oracle diagnostics rendered in the oracle's own format.
    pub oracle_log: String,
}

/// Recompiles a round through the oracle and judges the result.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    invoker: CompilerInvoker,
}

impl CrossValidator {
    pub fn new(invoker: CompilerInvoker) -> Self {
        Self { invoker }
    }

    /// `prior` is the oracle's own artifact chain; it never sees the
    /// primary compiler's output.
    #[allow(clippy::too_many_arguments)]
    pub async fn cross_check(
        &self,
        fixture: &str,
        oracle: &OracleConfig,
        source_set: &SourceSet,
        options: &OptionConfiguration,
        prior: &ArtifactChain,
        extras: &[PathBuf],
        output_dir: &Path,
        primary: &[DiagnosticRecord],
    ) -> Result<CrossCheck> {
        let compile = self
            .invoker
            .compile(oracle.compiler.as_ref(), source_set, options, prior, extras, output_dir)
            .await?;
        let divergence = classify(primary, &compile.diagnostics);
        debug!(
            compiler = oracle.compiler.name(),
            oracle_diagnostics = compile.diagnostics.len(),
            diverged = divergence.is_some(),
            "Oracle compile finished"
        );
        let outcome = judge(fixture, divergence, &oracle.excuses, primary.len());
        let oracle_log = render::render_oracle_log(&compile.diagnostics, source_set);
        Ok(CrossCheck {
            outcome,
            compile,
            oracle_log,
        })
    }
}
