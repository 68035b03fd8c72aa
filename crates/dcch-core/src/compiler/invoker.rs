//! Compiler invoker: resolves the dependency path for a round and runs a
//! [`Compiler`] against a source set.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::{ClasspathMode, CompileInvocation, Compiler, ResolvedClasspath};
use crate::canonical::sort_diagnostics;
use crate::catalog::LibraryCatalog;
use crate::domain::diagnostic::DiagnosticRecord;
use crate::domain::options::{LanguageLevel, OptionConfiguration};
use crate::error::{HarnessError, Result};
use crate::workspace::SourceSet;

/// Output directories of earlier rounds, most recent first.
///
/// Threaded by value from round to round; a flushing round starts from
/// [`ArtifactChain::empty`] again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactChain {
    dirs: Vec<PathBuf>,
}

impl ArtifactChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new chain with `dir` in front.
    pub fn extended(&self, dir: PathBuf) -> Self {
        let mut dirs = Vec::with_capacity(self.dirs.len() + 1);
        dirs.push(dir);
        dirs.extend(self.dirs.iter().cloned());
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

/// Result of one invocation.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    /// Diagnostics in stable order: submission order, then position.
    pub diagnostics: Vec<DiagnosticRecord>,
    /// Set only when no error was reported.
    pub artifact_dir: Option<PathBuf>,
    pub artifacts: Vec<PathBuf>,
    pub classpath: ResolvedClasspath,
    pub duration_ms: u64,
}

impl CompileOutcome {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }
}

/// Resolves classpaths and drives a compiler implementation.
///
/// Holds only read-only state, so one invoker serves many parallel requests.
#[derive(Debug, Clone)]
pub struct CompilerInvoker {
    catalog: Arc<LibraryCatalog>,
    latest: LanguageLevel,
}

impl CompilerInvoker {
    pub fn new(catalog: Arc<LibraryCatalog>, latest: LanguageLevel) -> Self {
        Self { catalog, latest }
    }

    /// Dependency path for a round.
    ///
    /// Order: earlier round outputs (most recent first), then the default
    /// libraries for the compliance level, then caller-supplied extras.
    pub fn resolve_classpath(
        &self,
        options: &OptionConfiguration,
        source_set: &SourceSet,
        prior: &ArtifactChain,
        extras: &[PathBuf],
    ) -> Result<ResolvedClasspath> {
        let mode = if source_set.modules().is_empty() {
            ClasspathMode::ClassPath
        } else if options.compliance.supports_modules() {
            ClasspathMode::ModulePath
        } else {
            return Err(HarnessError::InvalidConfiguration(format!(
                "modules require compliance 9 or later, got {}",
                options.compliance
            )));
        };

        let mut entries: Vec<PathBuf> = prior.dirs().to_vec();
        entries.extend(self.catalog.libraries_for(options.compliance).iter().cloned());
        entries.extend(extras.iter().cloned());

        Ok(ResolvedClasspath { mode, entries })
    }

    /// Compile `source_set` into `output_dir`.
    ///
    /// A compile with errors is a normal outcome; only a compiler fault or
    /// an environment failure is returned as `Err`.
    pub async fn compile(
        &self,
        compiler: &dyn Compiler,
        source_set: &SourceSet,
        options: &OptionConfiguration,
        prior: &ArtifactChain,
        extras: &[PathBuf],
        output_dir: &Path,
    ) -> Result<CompileOutcome> {
        options.validate(self.latest)?;
        let classpath = self.resolve_classpath(options, source_set, prior, extras)?;
        fs::create_dir_all(output_dir).map_err(|e| HarnessError::environment(output_dir, e))?;

        let start = Instant::now();
        let invocation = CompileInvocation {
            source_set,
            options,
            classpath: &classpath,
            output_dir,
        };
        debug!(
            compiler = compiler.name(),
            units = source_set.units().len(),
            classpath_entries = classpath.entries.len(),
            "Invoking compiler"
        );
        let output = compiler.compile(&invocation).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut diagnostics = output.diagnostics;
        for record in &diagnostics {
            record.validate().map_err(|e| {
                HarnessError::compiler_fault(compiler.name(), format!("reported {e}"))
            })?;
        }
        sort_diagnostics(source_set, &mut diagnostics);

        let has_errors = diagnostics.iter().any(|d| d.severity.is_error());
        if has_errors && !output.artifacts.is_empty() {
            warn!(
                compiler = compiler.name(),
                artifacts = output.artifacts.len(),
                "Compiler wrote artifacts despite reporting errors"
            );
        }

        Ok(CompileOutcome {
            diagnostics,
            artifact_dir: (!has_errors).then(|| output_dir.to_path_buf()),
            artifacts: output.artifacts,
            classpath,
            duration_ms,
        })
    }
}
