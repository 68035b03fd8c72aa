//! Diagnostic records as reported by a compiler.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Upper-case label used in the canonical log.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "INFO" => Some(Severity::Info),
            "WARNING" => Some(Severity::Warning),
            "ERROR" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single diagnostic with a 1-based, inclusive column span on one line.
///
/// Columns count Unicode scalar values; a tab is one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DiagnosticRecord {
    pub severity: Severity,
    /// Virtual, `/`-separated unit path.
    pub path: String,
    pub line: u32,
    pub start_column: u32,
    pub end_column: u32,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn new(
        severity: Severity,
        path: impl Into<String>,
        line: u32,
        start_column: u32,
        end_column: u32,
        message: impl Into<String>,
    ) -> Result<Self> {
        let record = Self {
            severity,
            path: path.into(),
            line,
            start_column,
            end_column,
            message: message.into(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn error(
        path: impl Into<String>,
        line: u32,
        start_column: u32,
        end_column: u32,
        message: impl Into<String>,
    ) -> Result<Self> {
        Self::new(Severity::Error, path, line, start_column, end_column, message)
    }

    pub fn warning(
        path: impl Into<String>,
        line: u32,
        start_column: u32,
        end_column: u32,
        message: impl Into<String>,
    ) -> Result<Self> {
        Self::new(Severity::Warning, path, line, start_column, end_column, message)
    }

    /// Positions are 1-based and the span must not run backwards.
    pub fn validate(&self) -> Result<()> {
        if self.line == 0 || self.start_column == 0 {
            return Err(HarnessError::InvalidDiagnostic(format!(
                "{}: line and column are 1-based (line {}, column {})",
                self.path, self.line, self.start_column
            )));
        }
        if self.end_column < self.start_column {
            return Err(HarnessError::InvalidDiagnostic(format!(
                "{}:{}: end column {} precedes start column {}",
                self.path, self.line, self.end_column, self.start_column
            )));
        }
        Ok(())
    }

    /// Number of caret characters the span renders as.
    pub fn span_width(&self) -> u32 {
        self.end_column - self.start_column + 1
    }
}
