//! Source set builder: materializes compilation units on disk.
//!
//! Layout of a per-request workspace:
//!
//! ```text
//! <root>/<request>-<uuid>/
//!     src/<unit path>          sources of the current round
//!     bin/round-<n>/           compiler output of round n
//!     oracle/round-<n>/        oracle compiler output of round n
//! ```
//!
//! Directory names are unique per request so independent requests can run
//! in parallel without locking.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::domain::unit::{CompilationUnit, ModuleMap};
use crate::error::{HarnessError, Result};

/// A unit together with where it was written.
#[derive(Debug, Clone)]
pub struct MaterializedUnit {
    pub unit: CompilationUnit,
    pub file: PathBuf,
}

/// The units of one round, as written into a workspace.
///
/// Immutable once built; both the primary and the oracle compiler read it.
#[derive(Debug, Clone)]
pub struct SourceSet {
    src_root: PathBuf,
    units: Vec<MaterializedUnit>,
    modules: ModuleMap,
}

impl SourceSet {
    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    /// Units in submission order.
    pub fn units(&self) -> &[MaterializedUnit] {
        &self.units
    }

    pub fn modules(&self) -> &ModuleMap {
        &self.modules
    }

    pub fn unit(&self, path: &str) -> Option<&CompilationUnit> {
        self.units.iter().map(|m| &m.unit).find(|u| u.path() == path)
    }

    /// Submission index of `path`, used to order diagnostics.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.units.iter().position(|m| m.unit.path() == path)
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.units.iter().map(|m| m.file.as_path())
    }
}

/// A per-request directory tree.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a uniquely named workspace under `parent`.
    pub fn create(parent: &Path, request_name: &str) -> Result<Self> {
        let dir_name = format!("{}-{}", sanitize(request_name), Uuid::new_v4().simple());
        let root = parent.join(dir_name);
        fs::create_dir_all(root.join("src")).map_err(|e| HarnessError::environment(&root, e))?;
        fs::create_dir_all(root.join("bin")).map_err(|e| HarnessError::environment(&root, e))?;
        debug!(workspace = %root.display(), "Created workspace");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Output directory for the primary compiler in round `round` (1-based).
    pub fn round_output_dir(&self, round: usize) -> PathBuf {
        self.root.join("bin").join(format!("round-{round}"))
    }

    /// Output directory for the oracle compiler in round `round`.
    pub fn oracle_output_dir(&self, round: usize) -> PathBuf {
        self.root.join("oracle").join(format!("round-{round}"))
    }

    /// Write `units` under `src/`.
    ///
    /// When `flush` is set, a file already present at a unit's path is
    /// removed before the new text is written.
    pub fn build(
        &self,
        units: &[CompilationUnit],
        modules: &ModuleMap,
        flush: bool,
    ) -> Result<SourceSet> {
        let src_root = self.src_dir();
        let mut materialized = Vec::with_capacity(units.len());

        for unit in units {
            let file = unit
                .path()
                .split('/')
                .fold(src_root.clone(), |acc, seg| acc.join(seg));

            if flush && file.exists() {
                fs::remove_file(&file).map_err(|e| HarnessError::environment(&file, e))?;
            }
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent).map_err(|e| HarnessError::environment(parent, e))?;
            }
            fs::write(&file, unit.text()).map_err(|e| HarnessError::environment(&file, e))?;

            materialized.push(MaterializedUnit {
                unit: unit.clone(),
                file,
            });
        }

        debug!(units = materialized.len(), flush, "Materialized source set");
        Ok(SourceSet {
            src_root,
            units: materialized,
            modules: modules.clone(),
        })
    }

    /// Drop every source written by earlier rounds.
    pub fn reset_sources(&self) -> Result<()> {
        let src = self.src_dir();
        if src.exists() {
            fs::remove_dir_all(&src).map_err(|e| HarnessError::environment(&src, e))?;
        }
        fs::create_dir_all(&src).map_err(|e| HarnessError::environment(&src, e))
    }

    /// Remove the workspace tree.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root).map_err(|e| HarnessError::environment(&self.root, e))
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(48)
        .collect();
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}
