//! Excuse registry: the explicit table of known primary/oracle divergences.
//!
//! ```toml
//! [[excuse]]
//! id = "unreachable-after-while-false"
//! reason = "oracle_bug"
//! fixture = "flow/test001"
//! mismatch = "primary_errors_oracle_none"
//! rule = "require_verbatim"
//! entries = [
//!   { side = "primary", severity = "error", path = "p1/Test.java", line = 4 },
//! ]
//! ```
//!
//! Entries are consulted in file order. The registry is loaded once and
//! never mutated afterwards.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{DivergentEntry, Divergence, MismatchKind};
use crate::error::{HarnessError, Result};

/// Why a divergence is tolerated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExcuseReason {
    /// Both compilers are right; their default severities differ.
    KnownSeverityConfig,
    OracleBug,
    PrimaryBug,
    /// Intended semantics are undecided; kept open until resolved.
    OpenQuestion,
}

impl ExcuseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExcuseReason::KnownSeverityConfig => "known_severity_config",
            ExcuseReason::OracleBug => "oracle_bug",
            ExcuseReason::PrimaryBug => "primary_bug",
            ExcuseReason::OpenQuestion => "open_question",
        }
    }

    pub fn status(self) -> ExcuseStatus {
        match self {
            ExcuseReason::OpenQuestion => ExcuseStatus::Open,
            _ => ExcuseStatus::Known,
        }
    }
}

impl fmt::Display for ExcuseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit status derived from the reason.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExcuseStatus {
    Known,
    Open,
}

/// How strictly an excuse matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Scope and mismatch kind must match.
    #[default]
    Ignore,
    /// Scope, kind and the exact divergent entries must match, and the
    /// divergence must actually occur.
    RequireVerbatim,
}

/// One registered divergence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcuseEntry {
    pub id: String,
    pub reason: ExcuseReason,
    #[serde(default)]
    pub description: String,
    /// Fixture name or `prefix*`. Required, so no excuse covers every fixture.
    #[serde(default)]
    pub fixture: Option<String>,
    pub mismatch: MismatchKind,
    #[serde(default)]
    pub rule: MatchRule,
    #[serde(default)]
    pub entries: Vec<DivergentEntry>,
    /// Issue or ticket tracking the divergence.
    #[serde(default)]
    pub tracking: Option<String>,
}

impl ExcuseEntry {
    pub fn applies_to(&self, fixture: &str) -> bool {
        match self.fixture.as_deref() {
            None | Some("*") => true,
            Some(scope) => match scope.strip_suffix('*') {
                Some(prefix) => fixture.starts_with(prefix),
                None => scope == fixture,
            },
        }
    }

    /// Names a fixture or a non-empty fixture prefix.
    pub fn is_scoped(&self) -> bool {
        self.fixture
            .as_deref()
            .map(|scope| scope.trim_end_matches('*'))
            .is_some_and(|prefix| !prefix.trim().is_empty())
    }

    pub fn matches(&self, fixture: &str, divergence: &Divergence) -> bool {
        if !self.applies_to(fixture) || self.mismatch != divergence.kind {
            return false;
        }
        match self.rule {
            MatchRule::Ignore => true,
            MatchRule::RequireVerbatim => {
                let mut expected = self.entries.clone();
                expected.sort();
                expected == divergence.entries
            }
        }
    }

    /// A verbatim excuse scoped to exactly this fixture.
    pub fn requires_divergence_in(&self, fixture: &str) -> bool {
        self.rule == MatchRule::RequireVerbatim && self.fixture.as_deref() == Some(fixture)
    }
}

#[derive(Debug, Deserialize)]
struct ExcuseFile {
    #[serde(default)]
    excuse: Vec<ExcuseEntry>,
}

/// Ordered, immutable set of excuses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcuseRegistry {
    entries: Vec<ExcuseEntry>,
}

impl ExcuseRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ExcuseEntry>) -> Result<Self> {
        let mut ids = HashSet::new();
        for entry in &entries {
            if entry.id.trim().is_empty() {
                return Err(HarnessError::ExcuseRegistry("excuse with empty id".into()));
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(HarnessError::ExcuseRegistry(format!(
                    "duplicate excuse id '{}'",
                    entry.id
                )));
            }
            match entry.rule {
                MatchRule::RequireVerbatim if entry.entries.is_empty() => {
                    return Err(HarnessError::ExcuseRegistry(format!(
                        "excuse '{}' requires verbatim entries but lists none",
                        entry.id
                    )));
                }
                MatchRule::RequireVerbatim
                    if entry.fixture.as_deref().map_or(true, |f| f.contains('*') || f.trim().is_empty()) =>
                {
                    return Err(HarnessError::ExcuseRegistry(format!(
                        "excuse '{}' requires a divergence and must name one fixture",
                        entry.id
                    )));
                }
                MatchRule::Ignore if !entry.is_scoped() => {
                    return Err(HarnessError::ExcuseRegistry(format!(
                        "excuse '{}' must be scoped to a fixture or a fixture prefix",
                        entry.id
                    )));
                }
                MatchRule::Ignore if !entry.entries.is_empty() => {
                    return Err(HarnessError::ExcuseRegistry(format!(
                        "excuse '{}' lists entries but its rule ignores them",
                        entry.id
                    )));
                }
                _ => {}
            }
        }
        Ok(Self { entries })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ExcuseFile =
            toml::from_str(text).map_err(|e| HarnessError::ExcuseRegistry(e.to_string()))?;
        Self::from_entries(file.excuse)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::environment(path, e))?;
        Self::from_toml(&text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ExcuseEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ExcuseEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// First excuse covering `divergence` in `fixture`.
    pub fn find_match(&self, fixture: &str, divergence: &Divergence) -> Option<&ExcuseEntry> {
        self.entries.iter().find(|e| e.matches(fixture, divergence))
    }

    /// Verbatim excuses that expect a divergence in `fixture`.
    pub fn required_for<'a>(&'a self, fixture: &'a str) -> impl Iterator<Item = &'a ExcuseEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.requires_divergence_in(fixture))
    }
}
