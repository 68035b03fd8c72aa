//! The compiler seam.
//!
//! Any compiler that can report diagnostics with 1-based line/column spans
//! fits behind [`Compiler`]. The system under test and the oracle are both
//! plain implementations of this trait; shared pipeline stages never branch
//! on which one they hold.
//!
//! - [`invoker`]: classpath resolution and round-aware invocation
//! - [`dialect`]: option translation into compiler argument vocabularies
//! - [`parse`]: reading diagnostics back from compiler output
//! - [`process`]: external-process backed implementation

pub mod dialect;
pub mod invoker;
pub mod parse;
pub mod process;

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::diagnostic::DiagnosticRecord;
use crate::domain::options::OptionConfiguration;
use crate::error::{HarnessError, Result};
use crate::workspace::SourceSet;

pub use dialect::OptionDialect;
pub use invoker::{ArtifactChain, CompileOutcome, CompilerInvoker};
pub use parse::{parse_canonical_log, parse_javac_output, OutputFormat};
pub use process::{ProcessCompiler, ProcessCompilerConfig};

/// Whether dependencies are passed as a class path or a module path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClasspathMode {
    ClassPath,
    ModulePath,
}

/// Fully resolved dependency path for one invocation, in lookup order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedClasspath {
    pub mode: ClasspathMode,
    pub entries: Vec<PathBuf>,
}

impl ResolvedClasspath {
    /// Entries joined with the host path-list separator.
    pub fn joined(&self) -> Result<String> {
        let joined = std::env::join_paths(&self.entries).map_err(|e| {
            HarnessError::InvalidConfiguration(format!("classpath entry cannot be joined: {e}"))
        })?;
        Ok(joined.to_string_lossy().into_owned())
    }
}

/// Everything a compiler needs for one round.
#[derive(Debug, Clone, Copy)]
pub struct CompileInvocation<'a> {
    pub source_set: &'a SourceSet,
    pub options: &'a OptionConfiguration,
    pub classpath: &'a ResolvedClasspath,
    pub output_dir: &'a Path,
}

/// What a compiler reports back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileOutput {
    pub diagnostics: Vec<DiagnosticRecord>,
    /// Files written under the output directory.
    pub artifacts: Vec<PathBuf>,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }
}

/// A compiler implementation.
///
/// Returning `Err` means the compiler itself broke (crash, unreadable
/// output). A program with compile errors is a normal `Ok` result.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Identifier used in logs and reports.
    fn name(&self) -> &str;

    async fn compile(&self, invocation: &CompileInvocation<'_>) -> Result<CompileOutput>;
}

/// All regular files below `dir`, sorted.
pub fn collect_artifacts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| HarnessError::environment(&current, e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| HarnessError::environment(&current, e))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_artifacts_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("p1")).unwrap();
        fs::write(dir.path().join("p1").join("B.class"), b"b").unwrap();
        fs::write(dir.path().join("A.class"), b"a").unwrap();

        let artifacts = collect_artifacts(dir.path()).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].ends_with("A.class"));
        assert!(artifacts[1].ends_with("p1/B.class"));
    }

    #[test]
    fn test_collect_artifacts_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = collect_artifacts(&dir.path().join("absent")).unwrap();
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_classpath_joined() {
        let cp = ResolvedClasspath {
            mode: ClasspathMode::ClassPath,
            entries: vec![PathBuf::from("a"), PathBuf::from("b")],
        };
        let sep = if cfg!(windows) { ";" } else { ":" };
        assert_eq!(cp.joined().unwrap(), format!("a{sep}b"));
    }
}
