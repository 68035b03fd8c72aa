//! Reading diagnostics back out of compiler output.
//!
//! Two output shapes are understood: the numbered block format the
//! canonicalizer itself produces (batch compilers print it natively), and
//! the `path:line: kind: message` format of the reference compiler.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::canonical::SEPARATOR_LINE;
use crate::domain::diagnostic::{DiagnosticRecord, Severity};
use crate::error::{HarnessError, Result};
use crate::workspace::SourceSet;

/// Which parser to run over a compiler's output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Canonical,
    Javac,
}

impl OutputFormat {
    pub fn parse(self, text: &str, sources: &SourceSet) -> Result<Vec<DiagnosticRecord>> {
        match self {
            OutputFormat::Canonical => parse_canonical_log(text, sources),
            OutputFormat::Javac => parse_javac_output(text, sources),
        }
    }
}

pub(crate) fn canonical_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<n>\d+)\. (?P<sev>ERROR|WARNING|INFO) in (?P<path>.+) \(at line (?P<line>\d+)\)$")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

fn javac_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<path>.+?):(?P<line>\d+): (?P<kind>error|warning): (?P<msg>.*)$")
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

fn malformed(line_no: usize, detail: impl std::fmt::Display) -> HarnessError {
    HarnessError::InvalidDiagnostic(format!("output line {line_no}: {detail}"))
}

/// Parse a numbered block log back into records.
///
/// Batch compilers echo the offending source line with its leading
/// whitespace trimmed; when the echoed text is a trimmed form of the real
/// line, columns are shifted back onto the real line.
pub fn parse_canonical_log(text: &str, sources: &SourceSet) -> Result<Vec<DiagnosticRecord>> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.strip_suffix('\r').unwrap_or(l)))
        .collect();
    let mut records = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let (line_no, current) = lines[i];
        let Some(caps) = canonical_header().captures(current) else {
            // Separators, summaries and banners outside a block.
            i += 1;
            continue;
        };

        let severity = Severity::from_label(&caps["sev"])
            .ok_or_else(|| malformed(line_no, "unknown severity"))?;
        let path = relativize(&caps["path"], sources);
        let line: u32 = caps["line"]
            .parse()
            .map_err(|e| malformed(line_no, format!("line number: {e}")))?;

        let echoed = lines
            .get(i + 1)
            .map(|(_, l)| l.strip_prefix('\t').unwrap_or(l))
            .ok_or_else(|| malformed(line_no, "block ends after header"))?;
        let caret = lines
            .get(i + 2)
            .map(|(_, l)| l.strip_prefix('\t').unwrap_or(l))
            .ok_or_else(|| malformed(line_no, "block has no caret line"))?;

        let lead = caret.chars().take_while(|c| *c == ' ').count() as u32;
        let width = caret.chars().filter(|c| *c == '^').count() as u32;
        if width == 0 {
            return Err(malformed(line_no + 2, "caret line has no carets"));
        }

        let shift = sources
            .unit(&path)
            .and_then(|u| u.line(line))
            .map(|actual| trimmed_offset(actual, echoed))
            .unwrap_or(0);
        let start_column = lead + 1 + shift;
        let end_column = start_column + width - 1;

        let mut message = Vec::new();
        let mut j = i + 3;
        while j < lines.len() && lines[j].1 != SEPARATOR_LINE {
            message.push(lines[j].1);
            j += 1;
        }
        if j == lines.len() {
            return Err(malformed(line_no, "block is not terminated"));
        }

        records.push(DiagnosticRecord::new(
            severity,
            path,
            line,
            start_column,
            end_column,
            message.join("\n"),
        )?);
        i = j + 1;
    }
    Ok(records)
}

/// Columns lost when `echoed` is `actual` with leading whitespace removed.
fn trimmed_offset(actual: &str, echoed: &str) -> u32 {
    if actual == echoed {
        return 0;
    }
    let actual_lead = actual.chars().take_while(|c| c.is_whitespace()).count();
    let echoed_lead = echoed.chars().take_while(|c| c.is_whitespace()).count();
    if actual.trim_start() == echoed.trim_start() && actual_lead > echoed_lead {
        (actual_lead - echoed_lead) as u32
    } else {
        0
    }
}

/// Parse `path:line: error: message` output.
///
/// The caret under the echoed source line gives the column; indented lines
/// after it (`symbol:`, `location:`) continue the message. Count summaries
/// and notes are skipped.
pub fn parse_javac_output(text: &str, sources: &SourceSet) -> Result<Vec<DiagnosticRecord>> {
    struct Pending {
        severity: Severity,
        path: String,
        line: u32,
        column: Option<u32>,
        message: String,
        seen_echo: bool,
    }

    fn finish(pending: Pending) -> Result<DiagnosticRecord> {
        let column = pending.column.unwrap_or(1);
        DiagnosticRecord::new(
            pending.severity,
            pending.path,
            pending.line,
            column,
            column,
            pending.message,
        )
    }

    let mut records = Vec::new();
    let mut pending: Option<Pending> = None;

    for (idx, raw) in text.lines().enumerate() {
        let current = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(caps) = javac_header().captures(current) {
            if let Some(done) = pending.take() {
                records.push(finish(done)?);
            }
            let line: u32 = caps["line"]
                .parse()
                .map_err(|e| malformed(idx + 1, format!("line number: {e}")))?;
            pending = Some(Pending {
                severity: if &caps["kind"] == "error" {
                    Severity::Error
                } else {
                    Severity::Warning
                },
                path: relativize(&caps["path"], sources),
                line,
                column: None,
                message: caps["msg"].to_string(),
                seen_echo: false,
            });
            continue;
        }

        let Some(p) = pending.as_mut() else {
            continue;
        };
        if !p.seen_echo {
            p.seen_echo = true;
        } else if p.column.is_none() && is_caret_line(current) {
            let before = current.chars().take_while(|c| *c != '^').count() as u32;
            p.column = Some(before + 1);
        } else if p.column.is_some() && current.starts_with("  ") {
            p.message.push('\n');
            p.message.push_str(current.trim());
        } else {
            // Summary ("1 error"), notes, or unrelated trailer.
            if let Some(done) = pending.take() {
                records.push(finish(done)?);
            }
        }
    }
    if let Some(done) = pending {
        records.push(finish(done)?);
    }
    Ok(records)
}

fn is_caret_line(line: &str) -> bool {
    line.trim_end().ends_with('^') && line.chars().all(|c| c == ' ' || c == '\t' || c == '^')
}

/// Map a path printed by a compiler back to its virtual unit path.
///
/// Absolute paths under the source root are stripped; anything else is
/// matched by suffix against the submitted units. Backslashes become `/`.
pub fn relativize(raw: &str, sources: &SourceSet) -> String {
    if let Ok(rel) = Path::new(raw).strip_prefix(sources.src_root()) {
        let joined: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        return joined.join("/");
    }

    let normalized = raw.replace('\\', "/");
    if sources.unit(&normalized).is_some() {
        return normalized;
    }
    sources
        .units()
        .iter()
        .map(|m| m.unit.path())
        .find(|p| normalized.ends_with(&format!("/{p}")))
        .map(str::to_string)
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Canonicalizer;
    use crate::domain::unit::{CompilationUnit, ModuleMap};
    use crate::workspace::Workspace;

    fn sources(dir: &Path, units: &[(&str, &str)]) -> SourceSet {
        let ws = Workspace::create(dir, "parse").unwrap();
        let units: Vec<_> = units
            .iter()
            .map(|(p, t)| CompilationUnit::new(*p, *t).unwrap())
            .collect();
        ws.build(&units, &ModuleMap::new(), false).unwrap()
    }

    #[test]
    fn test_parse_rendered_log_recovers_records() {
        let dir = tempfile::tempdir().unwrap();
        let set = sources(
            dir.path(),
            &[("p1/Test.java", "class Test {\n\tvoid m() {\n\t\tint x = ;\n\t}\n}")],
        );
        let records = vec![
            DiagnosticRecord::error("p1/Test.java", 3, 11, 11, "Syntax error on token \"=\"")
                .unwrap(),
            DiagnosticRecord::warning("p1/Test.java", 2, 2, 5, "first line\nsecond line").unwrap(),
        ];
        let log = Canonicalizer::with_separator('/').render(&records, &set);
        let parsed = parse_canonical_log(&log, &set).unwrap();
        assert_eq!(parsed, vec![records[1].clone(), records[0].clone()]);
    }

    #[test]
    fn test_parse_realigns_trimmed_echo() {
        let dir = tempfile::tempdir().unwrap();
        let set = sources(dir.path(), &[("X.java", "class X {\n\t\twhile (false);\n}")]);
        let abs = set.src_root().join("X.java");
        let log = format!(
            "----------\n1. ERROR in {} (at line 2)\n\twhile (false);\n\t             ^\nUnreachable code\n----------\n1 problem (1 error)\n",
            abs.display()
        );
        let parsed = parse_canonical_log(&log, &set).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].path, "X.java");
        assert_eq!(parsed[0].start_column, 16);
        assert_eq!(parsed[0].end_column, 16);
    }

    #[test]
    fn test_parse_rejects_unterminated_block() {
        let dir = tempfile::tempdir().unwrap();
        let set = sources(dir.path(), &[("X.java", "x")]);
        let err = parse_canonical_log("1. ERROR in X.java (at line 1)\n\tx\n\t^\nmsg\n", &set)
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidDiagnostic(_)));
    }

    #[test]
    fn test_parse_javac_output() {
        let dir = tempfile::tempdir().unwrap();
        let set = sources(
            dir.path(),
            &[("p1/A.java", "package p1;\nclass A {\n    Foo f;\n    int x = 1\n}")],
        );
        let abs = set.src_root().join("p1").join("A.java");
        let out = format!(
            "{p}:3: error: cannot find symbol\n    Foo f;\n    ^\n  symbol:   class Foo\n  location: class A\n\
             {p}:4: warning: something odd\n    int x = 1\n             ^\n\
             Note: Some input files use unchecked operations.\n1 error\n1 warning\n",
            p = abs.display()
        );
        let parsed = parse_javac_output(&out, &set).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].path, "p1/A.java");
        assert_eq!(parsed[0].severity, Severity::Error);
        assert_eq!(parsed[0].line, 3);
        assert_eq!(parsed[0].start_column, 5);
        assert_eq!(
            parsed[0].message,
            "cannot find symbol\nsymbol:   class Foo\nlocation: class A"
        );
        assert_eq!(parsed[1].severity, Severity::Warning);
        assert_eq!(parsed[1].start_column, 14);
        assert_eq!(parsed[1].message, "something odd");
    }

    #[test]
    fn test_relativize_by_suffix_and_separator() {
        let dir = tempfile::tempdir().unwrap();
        let set = sources(dir.path(), &[("p1/A.java", "x")]);
        assert_eq!(relativize("C:\\work\\src\\p1\\A.java", &set), "p1/A.java");
        assert_eq!(relativize("p1/A.java", &set), "p1/A.java");
        assert_eq!(relativize("Other.java", &set), "Other.java");
    }
}
