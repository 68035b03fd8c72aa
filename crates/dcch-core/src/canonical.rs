//! Diagnostic canonicalizer: renders diagnostic records into the exact
//! textual log used for comparison.
//!
//! Each record becomes one numbered block:
//!
//! ```text
//! 1. ERROR in p1/Test.java (at line 4)
//! <TAB>while (false);
//! <TAB>             ^
//! Unreachable code
//! ----------
//! ```
//!
//! Numbering restarts at 1 on every call. Source lines are echoed
//! verbatim, tabs included; the caret line has `start_column - 1` spaces and
//! one caret per column of the inclusive span. An empty record list renders
//! as an empty string.

use std::fmt::Write as _;
use std::path::MAIN_SEPARATOR;

use sha2::{Digest, Sha256};

use crate::domain::diagnostic::DiagnosticRecord;
use crate::workspace::SourceSet;

/// Delimiter line closing every block.
pub const SEPARATOR_LINE: &str = "----------";

/// Sort records by unit submission order, then line, then start column.
///
/// The sort is stable, so records at the same position keep the order the
/// compiler reported them in. Records for unknown units go last.
pub fn sort_diagnostics(sources: &SourceSet, diagnostics: &mut [DiagnosticRecord]) {
    diagnostics.sort_by_key(|d| {
        (
            sources.position(&d.path).unwrap_or(usize::MAX),
            d.line,
            d.start_column,
        )
    });
}

/// Hex SHA-256 of a rendered log.
pub fn log_digest(log: &str) -> String {
    hex::encode(Sha256::digest(log.as_bytes()))
}

/// Renders canonical logs with a given path separator.
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer {
    separator: char,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::with_separator(MAIN_SEPARATOR)
    }
}

impl Canonicalizer {
    /// Render paths with `separator` instead of the host one.
    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Render `diagnostics` against the unit texts in `sources`.
    pub fn render(&self, diagnostics: &[DiagnosticRecord], sources: &SourceSet) -> String {
        let mut ordered = diagnostics.to_vec();
        sort_diagnostics(sources, &mut ordered);

        let mut out = String::new();
        for (index, record) in ordered.iter().enumerate() {
            let source_line = sources
                .unit(&record.path)
                .and_then(|u| u.line(record.line))
                .unwrap_or("");
            self.render_block(&mut out, index + 1, record, source_line);
        }
        out
    }

    fn render_block(&self, out: &mut String, n: usize, record: &DiagnosticRecord, line: &str) {
        let path: String = record
            .path
            .chars()
            .map(|c| if c == '/' { self.separator } else { c })
            .collect();

        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{n}. {} in {path} (at line {})",
            record.severity.label(),
            record.line
        );
        let _ = writeln!(out, "\t{line}");
        let _ = writeln!(out, "\t{}", caret_line(record.start_column, record.end_column));
        let _ = writeln!(out, "{}", record.message);
        let _ = writeln!(out, "{SEPARATOR_LINE}");
    }
}

/// `start - 1` spaces followed by `end - start + 1` carets.
pub fn caret_line(start_column: u32, end_column: u32) -> String {
    let lead = start_column.saturating_sub(1) as usize;
    let width = end_column.saturating_sub(start_column) as usize + 1;
    let mut line = String::with_capacity(lead + width);
    line.extend(std::iter::repeat(' ').take(lead));
    line.extend(std::iter::repeat('^').take(width));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diagnostic::Severity;
    use crate::domain::unit::{CompilationUnit, ModuleMap};
    use crate::workspace::Workspace;

    fn sources(units: &[(&str, &str)]) -> (tempfile::TempDir, SourceSet) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path(), "canon").unwrap();
        let units: Vec<_> = units
            .iter()
            .map(|(p, t)| CompilationUnit::new(*p, *t).unwrap())
            .collect();
        let set = ws.build(&units, &ModuleMap::new(), false).unwrap();
        (dir, set)
    }

    #[test]
    fn test_empty_log_is_empty_string() {
        let (_d, set) = sources(&[("X.java", "class X {}")]);
        assert_eq!(Canonicalizer::default().render(&[], &set), "");
    }

    #[test]
    fn test_single_block_format() {
        let (_d, set) = sources(&[("p1/X.java", "class X {\n\tint i = ;\n}")]);
        let rec = DiagnosticRecord::error("p1/X.java", 2, 9, 9, "Syntax error").unwrap();
        let log = Canonicalizer::with_separator('/').render(&[rec], &set);
        assert_eq!(
            log,
            "1. ERROR in p1/X.java (at line 2)\n\
             \t\tint i = ;\n\
             \t        ^\n\
             Syntax error\n\
             ----------\n"
        );
    }

    #[test]
    fn test_host_separator_in_path() {
        let (_d, set) = sources(&[("p1/X.java", "class X {}")]);
        let rec = DiagnosticRecord::warning("p1/X.java", 1, 1, 5, "w").unwrap();
        let log = Canonicalizer::with_separator('\\').render(&[rec], &set);
        assert!(log.starts_with("1. WARNING in p1\\X.java (at line 1)\n"));
    }

    #[test]
    fn test_caret_line_counts() {
        assert_eq!(caret_line(1, 1), "^");
        assert_eq!(caret_line(3, 5), "  ^^^");
        let line = caret_line(7, 12);
        assert_eq!(line.chars().take_while(|c| *c == ' ').count(), 6);
        assert_eq!(line.chars().filter(|c| *c == '^').count(), 6);
    }

    #[test]
    fn test_multibyte_line_echoed_verbatim() {
        let text = "class X {\n\tString s = \"héllo wörld\"; int = 1;\n}";
        let (_d, set) = sources(&[("X.java", text)]);
        let rec = DiagnosticRecord::error("X.java", 2, 31, 33, "Syntax error").unwrap();
        let log = Canonicalizer::with_separator('/').render(&[rec], &set);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[1], "\t\tString s = \"héllo wörld\"; int = 1;");
        let caret = lines[2].strip_prefix('\t').unwrap();
        assert_eq!(caret.chars().take_while(|c| *c == ' ').count(), 30);
        assert_eq!(caret.chars().filter(|c| *c == '^').count(), 3);
    }

    #[test]
    fn test_ordering_and_numbering() {
        let (_d, set) = sources(&[("B.java", "b1\nb2"), ("A.java", "a1\na2")]);
        let records = vec![
            DiagnosticRecord::error("A.java", 1, 1, 2, "a-first").unwrap(),
            DiagnosticRecord::error("B.java", 2, 1, 2, "b-second").unwrap(),
            DiagnosticRecord::warning("B.java", 1, 2, 2, "b-first").unwrap(),
        ];
        let log = Canonicalizer::with_separator('/').render(&records, &set);
        let headers: Vec<&str> = log.lines().filter(|l| l.contains(" in ")).collect();
        assert_eq!(
            headers,
            vec![
                "1. WARNING in B.java (at line 1)",
                "2. ERROR in B.java (at line 2)",
                "3. ERROR in A.java (at line 1)",
            ]
        );
    }

    #[test]
    fn test_same_line_diagnostics_are_not_merged() {
        let (_d, set) = sources(&[("X.java", "int a, b;")]);
        let records = vec![
            DiagnosticRecord::warning("X.java", 1, 5, 5, "unused a").unwrap(),
            DiagnosticRecord::warning("X.java", 1, 8, 8, "unused b").unwrap(),
        ];
        let log = Canonicalizer::with_separator('/').render(&records, &set);
        assert_eq!(log.matches(SEPARATOR_LINE).count(), 2);
        assert!(log.contains("1. WARNING"));
        assert!(log.contains("2. WARNING"));
    }

    #[test]
    fn test_numbering_restarts_per_call() {
        let (_d, set) = sources(&[("X.java", "x")]);
        let rec = DiagnosticRecord::new(Severity::Info, "X.java", 1, 1, 1, "i").unwrap();
        let c = Canonicalizer::with_separator('/');
        let first = c.render(std::slice::from_ref(&rec), &set);
        let second = c.render(&[rec], &set);
        assert!(first.starts_with("1. INFO"));
        assert!(second.starts_with("1. INFO"));
        assert_eq!(log_digest(&first), log_digest(&second));
    }

    #[test]
    fn test_missing_source_line_renders_empty_echo() {
        let (_d, set) = sources(&[("X.java", "x")]);
        let rec = DiagnosticRecord::error("X.java", 9, 1, 1, "eof").unwrap();
        let log = Canonicalizer::with_separator('/').render(&[rec], &set);
        assert_eq!(log.lines().nth(1), Some("\t"));
    }
}
