//! In-process compilers for tests and dry runs.
//!
//! - `ToyCompiler`: a tiny analyser for a Java-shaped subset. It diagnoses
//!   `while (false);`, unresolved types and unused locals, resolves types
//!   against earlier round output, and writes one `.class` file per type.
//! - `ScriptedCompiler`: replays a fixed diagnostic list and records what it
//!   was invoked with.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use regex::Regex;

use crate::compiler::{collect_artifacts, CompileInvocation, CompileOutput, Compiler, ResolvedClasspath};
use crate::domain::diagnostic::{DiagnosticRecord, Severity};
use crate::domain::options::SeverityLevel;
use crate::error::{HarnessError, Result};
use crate::workspace::MaterializedUnit;

/// Units containing this marker make [`ToyCompiler`] fail as a crash would.
pub const CRASH_MARKER: &str = "/*toy:crash*/";

/// Types every program may use without declaring them.
const BUILTIN_TYPES: &[&str] = &["Object", "String", "Thread", "Exception", "RuntimeException"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| unreachable!("static regex: {e}")))
}

fn class_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b(?:class|interface|enum)\s+([A-Z]\w*)")
}

fn package_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?m)^\s*package\s+([\w.]+)\s*;")
}

fn type_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b(?:new\s+|extends\s+|implements\s+)([A-Z]\w*)")
}

fn local_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b(?:int|long|boolean|String)\s+([a-z]\w*)\s*=")
}

fn println() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"System\.out\.println\("([^"]*)"\)"#)
}

const UNREACHABLE: &str = "while (false);";

/// 1-based column of the character starting at byte offset `byte`.
fn column(line: &str, byte: usize) -> u32 {
    line[..byte].chars().count() as u32 + 1
}

/// A deterministic stand-in compiler.
///
/// Each `.class` file it writes holds the lines the type's unit prints with
/// `System.out.println`, so a launcher that prints the file plays the part
/// of running the program.
#[derive(Debug, Clone)]
pub struct ToyCompiler {
    name: String,
}

impl Default for ToyCompiler {
    fn default() -> Self {
        Self::named("toy")
    }
}

impl ToyCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn analyse(
        &self,
        unit: &MaterializedUnit,
        known: &HashSet<String>,
        unused_local: Option<Severity>,
        out: &mut Vec<DiagnosticRecord>,
    ) -> Result<()> {
        let path = unit.unit.path();
        let text = unit.unit.text();

        for (i, raw) in text.split('\n').enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            let line_no = i as u32 + 1;

            for (offset, _) in line.match_indices(UNREACHABLE) {
                let semi = column(line, offset + UNREACHABLE.len() - 1);
                out.push(DiagnosticRecord::error(path, line_no, semi, semi, "Unreachable code")?);
            }

            for caps in type_ref().captures_iter(line) {
                let Some(name) = caps.get(1) else { continue };
                if known.contains(name.as_str()) {
                    continue;
                }
                let start = column(line, name.start());
                let end = start + name.as_str().chars().count() as u32 - 1;
                out.push(DiagnosticRecord::error(
                    path,
                    line_no,
                    start,
                    end,
                    format!("{} cannot be resolved to a type", name.as_str()),
                )?);
            }

            if let Some(severity) = unused_local {
                for caps in local_decl().captures_iter(line) {
                    let Some(name) = caps.get(1) else { continue };
                    let uses = Regex::new(&format!(r"\b{}\b", regex::escape(name.as_str())))
                        .map(|re| re.find_iter(text).count())
                        .unwrap_or(0);
                    if uses > 1 {
                        continue;
                    }
                    let start = column(line, name.start());
                    let end = start + name.as_str().chars().count() as u32 - 1;
                    out.push(DiagnosticRecord::new(
                        severity,
                        path,
                        line_no,
                        start,
                        end,
                        format!("The value of the local variable {} is not used", name.as_str()),
                    )?);
                }
            }
        }
        Ok(())
    }

    fn emit_classes(&self, unit: &MaterializedUnit, output_dir: &std::path::Path) -> Result<()> {
        let text = unit.unit.text();
        let package_dir = package_decl()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|p| p.as_str().split('.').fold(output_dir.to_path_buf(), |acc, seg| acc.join(seg)))
            .unwrap_or_else(|| output_dir.to_path_buf());
        fs::create_dir_all(&package_dir).map_err(|e| HarnessError::environment(&package_dir, e))?;

        let printed: String = println()
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| format!("{}\n", m.as_str()))
            .collect();

        for (i, caps) in class_decl().captures_iter(text).enumerate() {
            let Some(name) = caps.get(1) else { continue };
            let file = package_dir.join(format!("{}.class", name.as_str()));
            let body = if i == 0 { printed.as_str() } else { "" };
            fs::write(&file, body).map_err(|e| HarnessError::environment(&file, e))?;
        }
        Ok(())
    }
}

/// Simple names of every `.class` file below the classpath directories.
fn binary_types(classpath: &ResolvedClasspath) -> Result<HashSet<String>> {
    let mut names = HashSet::new();
    for entry in classpath.entries.iter().filter(|e| e.is_dir()) {
        for file in collect_artifacts(entry)? {
            if file.extension().is_some_and(|ext| ext == "class") {
                if let Some(stem) = file.file_stem() {
                    names.insert(stem.to_string_lossy().into_owned());
                }
            }
        }
    }
    Ok(names)
}

#[async_trait]
impl Compiler for ToyCompiler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compile(&self, invocation: &CompileInvocation<'_>) -> Result<CompileOutput> {
        let units = invocation.source_set.units();
        if units.iter().any(|u| u.unit.text().contains(CRASH_MARKER)) {
            return Err(HarnessError::compiler_fault(&self.name, "internal compiler error"));
        }

        let mut known: HashSet<String> = BUILTIN_TYPES.iter().map(|s| s.to_string()).collect();
        known.extend(binary_types(invocation.classpath)?);
        for unit in units {
            for caps in class_decl().captures_iter(unit.unit.text()) {
                if let Some(name) = caps.get(1) {
                    known.insert(name.as_str().to_string());
                }
            }
        }

        let unused_local = match invocation.options.effective_severity("unusedLocal") {
            None | Some(SeverityLevel::Ignore) => None,
            Some(SeverityLevel::Info) => Some(Severity::Info),
            Some(SeverityLevel::Warning) => Some(Severity::Warning),
            Some(SeverityLevel::Error) => Some(Severity::Error),
        };

        let mut diagnostics = Vec::new();
        for unit in units {
            self.analyse(unit, &known, unused_local, &mut diagnostics)?;
        }

        if !diagnostics.iter().any(|d| d.severity.is_error()) {
            for unit in units {
                self.emit_classes(unit, invocation.output_dir)?;
            }
        }

        Ok(CompileOutput {
            diagnostics,
            artifacts: collect_artifacts(invocation.output_dir)?,
        })
    }
}

/// What a [`ScriptedCompiler`] saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub units: Vec<String>,
    pub classpath: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

/// Replays canned diagnostics.
#[derive(Debug, Default)]
pub struct ScriptedCompiler {
    name: String,
    diagnostics: Vec<DiagnosticRecord>,
    fault: Option<String>,
    calls: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedCompiler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<DiagnosticRecord>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Fail every call with a compiler fault.
    pub fn failing(mut self, detail: impl Into<String>) -> Self {
        self.fault = Some(detail.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedInvocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compile(&self, invocation: &CompileInvocation<'_>) -> Result<CompileOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedInvocation {
                units: invocation
                    .source_set
                    .units()
                    .iter()
                    .map(|u| u.unit.path().to_string())
                    .collect(),
                classpath: invocation.classpath.entries.clone(),
                output_dir: invocation.output_dir.to_path_buf(),
            });
        if let Some(detail) = &self.fault {
            return Err(HarnessError::compiler_fault(&self.name, detail.clone()));
        }
        Ok(CompileOutput {
            diagnostics: self.diagnostics.clone(),
            artifacts: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ClasspathMode;
    use crate::domain::options::{LanguageLevel, OptionConfiguration};
    use crate::domain::unit::{CompilationUnit, ModuleMap};
    use crate::workspace::Workspace;

    async fn compile(
        units: &[(&str, &str)],
        options: &OptionConfiguration,
        classpath: Vec<PathBuf>,
    ) -> (tempfile::TempDir, Result<CompileOutput>) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path(), "toy").unwrap();
        let units: Vec<_> = units
            .iter()
            .map(|(p, t)| CompilationUnit::new(*p, *t).unwrap())
            .collect();
        let set = ws.build(&units, &ModuleMap::new(), false).unwrap();
        let cp = ResolvedClasspath {
            mode: ClasspathMode::ClassPath,
            entries: classpath,
        };
        let out = ws.round_output_dir(1);
        fs::create_dir_all(&out).unwrap();
        let result = ToyCompiler::new()
            .compile(&CompileInvocation {
                source_set: &set,
                options,
                classpath: &cp,
                output_dir: &out,
            })
            .await;
        (dir, result)
    }

    #[tokio::test]
    async fn test_unreachable_after_while_false() {
        let options = OptionConfiguration::for_level(LanguageLevel::V1_4);
        let (_d, out) = compile(
            &[("p1/Test.java", "class Test {\n\tvoid m() {\n\t\twhile (false);\n\t}\n}")],
            &options,
            vec![],
        )
        .await;
        let out = out.unwrap();
        assert_eq!(out.diagnostics.len(), 1);
        let d = &out.diagnostics[0];
        assert_eq!((d.line, d.start_column, d.end_column), (3, 16, 16));
        assert_eq!(d.message, "Unreachable code");
        assert!(out.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_type_and_class_output() {
        let options = OptionConfiguration::for_level(LanguageLevel::V1_8);
        let (_d, out) = compile(&[("B.java", "class B extends A {}")], &options, vec![]).await;
        let out = out.unwrap();
        assert_eq!(out.diagnostics[0].message, "A cannot be resolved to a type");
        assert_eq!(out.diagnostics[0].start_column, 17);

        let (_d, out) = compile(
            &[("p/Main.java", "package p;\nclass Main {\n  void main() { System.out.println(\"hi\"); }\n}")],
            &options,
            vec![],
        )
        .await;
        let out = out.unwrap();
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.artifacts.len(), 1);
        assert!(out.artifacts[0].ends_with("p/Main.class"));
        assert_eq!(fs::read_to_string(&out.artifacts[0]).unwrap(), "hi\n");
    }

    #[tokio::test]
    async fn test_unused_local_follows_severity_option() {
        let src = [("X.java", "class X {\n  void m() { int unused = 1; }\n}")];
        let warn = OptionConfiguration::for_level(LanguageLevel::V1_8);
        let (_d, out) = compile(&src, &warn, vec![]).await;
        let out = out.unwrap();
        assert_eq!(out.diagnostics[0].severity, Severity::Warning);
        assert_eq!(out.diagnostics[0].start_column, 18);
        assert_eq!(out.diagnostics[0].end_column, 23);

        let ignore = warn.clone().with_severity("unusedLocal", SeverityLevel::Ignore);
        let (_d, out) = compile(&src, &ignore, vec![]).await;
        assert!(out.unwrap().diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_crash_marker_faults() {
        let options = OptionConfiguration::for_level(LanguageLevel::V1_8);
        let (_d, out) = compile(&[("X.java", "class X { /*toy:crash*/ }")], &options, vec![]).await;
        assert!(matches!(out.unwrap_err(), HarnessError::CompilerFault { .. }));
    }

    #[tokio::test]
    async fn test_scripted_records_calls() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path(), "scripted").unwrap();
        let set = ws
            .build(&[CompilationUnit::new("X.java", "x").unwrap()], &ModuleMap::new(), false)
            .unwrap();
        let options = OptionConfiguration::for_level(LanguageLevel::V1_8);
        let cp = ResolvedClasspath {
            mode: ClasspathMode::ClassPath,
            entries: vec![PathBuf::from("lib")],
        };
        let out = ws.round_output_dir(1);
        let compiler = ScriptedCompiler::new("scripted")
            .with_diagnostics(vec![DiagnosticRecord::warning("X.java", 1, 1, 1, "w").unwrap()]);
        let output = compiler
            .compile(&CompileInvocation {
                source_set: &set,
                options: &options,
                classpath: &cp,
                output_dir: &out,
            })
            .await
            .unwrap();
        assert_eq!(output.diagnostics.len(), 1);
        let calls = compiler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].units, vec!["X.java"]);
        assert_eq!(calls[0].classpath, vec![PathBuf::from("lib")]);
    }
}
