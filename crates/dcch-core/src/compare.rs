//! Expectation comparator.
//!
//! Comparison is exact string equality after one normalization pass that
//! rewrites the host path separator to `/` in the path of each canonical
//! header line, on both sides. Echoed source, messages and program output
//! are compared verbatim. A mismatch yields
//! a [`Diff`] with the first differing line and a unified diff for reports.

use std::fmt;
use std::path::MAIN_SEPARATOR;

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::compiler::parse::canonical_header;

/// Lines of context kept around the first difference.
const CONTEXT_LINES: usize = 2;

/// Structured description of a mismatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diff {
    /// 1-based line number of the first difference.
    pub first_line: usize,
    /// Expected text at that line; `None` past the end.
    pub expected_line: Option<String>,
    /// Actual text at that line; `None` past the end.
    pub actual_line: Option<String>,
    /// Actual lines surrounding the difference.
    pub context: Vec<String>,
    pub unified: String,
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "first difference at line {}", self.first_line)?;
        writeln!(f, "  expected: {}", show(self.expected_line.as_deref()))?;
        writeln!(f, "  actual:   {}", show(self.actual_line.as_deref()))?;
        write!(f, "{}", self.unified)
    }
}

fn show(line: Option<&str>) -> String {
    match line {
        Some(l) => format!("{l:?}"),
        None => "<end of text>".to_string(),
    }
}

/// Compares actual against expected text.
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    separator: char,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::with_separator(MAIN_SEPARATOR)
    }
}

impl Comparator {
    /// Treat `separator` as the host path separator.
    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }

    pub fn normalize(&self, text: &str) -> String {
        if self.separator == '/' {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let body = line.trim_end_matches(|c| c == '\n' || c == '\r');
            match canonical_header().captures(body).and_then(|caps| caps.name("path")) {
                Some(path) => {
                    out.push_str(&line[..path.start()]);
                    out.push_str(&path.as_str().replace(self.separator, "/"));
                    out.push_str(&line[path.end()..]);
                }
                None => out.push_str(line),
            }
        }
        out
    }

    /// `None` when equal after normalization.
    pub fn compare(&self, actual: &str, expected: &str) -> Option<Diff> {
        let actual = self.normalize(actual);
        let expected = self.normalize(expected);
        if actual == expected {
            return None;
        }
        Some(build_diff(&actual, &expected))
    }

    /// Runtime output comparison: a single trailing newline is dropped from
    /// each side first.
    pub fn compare_output(&self, actual: &str, expected: &str) -> Option<Diff> {
        self.compare(strip_trailing_newline(actual), strip_trailing_newline(expected))
    }
}

/// Drop one trailing `\n` or `\r\n`.
pub fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

fn build_diff(actual: &str, expected: &str) -> Diff {
    let actual_lines: Vec<&str> = actual.split('\n').collect();
    let expected_lines: Vec<&str> = expected.split('\n').collect();

    let index = actual_lines
        .iter()
        .zip(expected_lines.iter())
        .position(|(a, e)| a != e)
        .unwrap_or_else(|| actual_lines.len().min(expected_lines.len()));

    let lo = index.saturating_sub(CONTEXT_LINES);
    let hi = (index + CONTEXT_LINES + 1).min(actual_lines.len());
    let context = actual_lines
        .get(lo..hi)
        .unwrap_or(&[])
        .iter()
        .map(|l| l.to_string())
        .collect();

    let unified = TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header("expected", "actual")
        .to_string();

    Diff {
        first_line: index + 1,
        expected_line: expected_lines.get(index).map(|l| l.to_string()),
        actual_line: actual_lines.get(index).map(|l| l.to_string()),
        context,
        unified,
    }
}
