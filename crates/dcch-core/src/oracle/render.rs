//! Oracle-side log rendering.
//!
//! The oracle log is for humans reading a report; it is never compared
//! textually. Layout follows the reference compiler:
//!
//! ```text
//! p1/Test.java:4: error: unreachable statement
//!         while (false);
//!                      ^
//! 1 error
//! ```

use std::fmt::Write as _;

use crate::canonical::sort_diagnostics;
use crate::domain::diagnostic::{DiagnosticRecord, Severity};
use crate::workspace::SourceSet;

pub fn render_oracle_log(diagnostics: &[DiagnosticRecord], sources: &SourceSet) -> String {
    let mut ordered = diagnostics.to_vec();
    sort_diagnostics(sources, &mut ordered);

    let mut out = String::new();
    let mut errors = 0usize;
    let mut warnings = 0usize;
    for record in &ordered {
        let kind = match record.severity {
            Severity::Error => {
                errors += 1;
                "error"
            }
            Severity::Warning => {
                warnings += 1;
                "warning"
            }
            Severity::Info => "note",
        };
        let _ = writeln!(out, "{}:{}: {kind}: {}", record.path, record.line, record.message);
        if let Some(line) = sources.unit(&record.path).and_then(|u| u.line(record.line)) {
            let _ = writeln!(out, "{line}");
            let _ = writeln!(out, "{}^", " ".repeat(record.start_column as usize - 1));
        }
    }
    if errors > 0 {
        let _ = writeln!(out, "{errors} error{}", if errors == 1 { "" } else { "s" });
    }
    if warnings > 0 {
        let _ = writeln!(out, "{warnings} warning{}", if warnings == 1 { "" } else { "s" });
    }
    out
}
