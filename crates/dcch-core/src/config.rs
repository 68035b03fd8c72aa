//! Harness configuration, loaded once from TOML and shared read-only.
//!
//! ```toml
//! root = "/var/tmp/dcch"
//! latest_level = "21"
//! parallelism = 8
//!
//! [libraries]
//! "1.4" = ["jre/1.4/rt.jar"]
//! "11"  = ["jdk/11/jrt-fs.jar"]
//!
//! [runtime]
//! program = "java"
//! max_level = "21"
//! timeout_secs = 30
//!
//! [primary]
//! name = "batch"
//! program = "ecj"
//! dialect = "batch"
//! format = "canonical"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::LibraryCatalog;
use crate::compiler::{CompilerInvoker, ProcessCompiler, ProcessCompilerConfig};
use crate::domain::options::LanguageLevel;
use crate::error::{HarnessError, Result};

/// How compiled artifacts are launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Launcher binary.
    pub program: String,
    /// Flag enabling preview features at run time.
    pub preview_flag: String,
    /// Newest target level the launcher can execute.
    pub max_level: LanguageLevel,
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            preview_flag: "--enable-preview".to_string(),
            max_level: LanguageLevel::V21,
            timeout_secs: 30,
        }
    }
}

impl RuntimeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Limits for process-backed compilers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompileConfig {
    pub timeout_secs: u64,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Parent of all per-request workspaces.
    pub root: PathBuf,
    /// Newest language level known; the only level preview is valid at.
    pub latest_level: LanguageLevel,
    pub libraries: LibraryCatalog,
    pub runtime: RuntimeConfig,
    pub compile: CompileConfig,
    /// Maximum concurrently running requests.
    pub parallelism: usize,
    /// Keep workspaces after a run.
    pub keep_workspaces: bool,
    pub primary: Option<ProcessCompilerConfig>,
    pub oracle: Option<ProcessCompilerConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("dcch"),
            latest_level: LanguageLevel::V21,
            libraries: LibraryCatalog::default(),
            runtime: RuntimeConfig::default(),
            compile: CompileConfig::default(),
            parallelism: 4,
            keep_workspaces: false,
            primary: None,
            oracle: None,
        }
    }
}

impl HarnessConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::environment(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(HarnessError::InvalidConfiguration(
                "parallelism must be at least 1".into(),
            ));
        }
        if self.runtime.timeout_secs == 0 || self.compile.timeout_secs == 0 {
            return Err(HarnessError::InvalidConfiguration(
                "timeouts must be positive".into(),
            ));
        }
        if self.runtime.max_level > self.latest_level {
            return Err(HarnessError::InvalidConfiguration(format!(
                "runtime max_level {} is newer than latest_level {}",
                self.runtime.max_level, self.latest_level
            )));
        }
        for compiler in [&self.primary, &self.oracle].into_iter().flatten() {
            if compiler.program.trim().is_empty() {
                return Err(HarnessError::InvalidConfiguration(format!(
                    "compiler '{}' has an empty program",
                    compiler.name
                )));
            }
        }
        Ok(())
    }

    pub fn invoker(&self) -> CompilerInvoker {
        CompilerInvoker::new(Arc::new(self.libraries.clone()), self.latest_level)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile.timeout_secs)
    }

    pub fn primary_compiler(&self) -> Option<ProcessCompiler> {
        self.primary
            .clone()
            .map(|c| ProcessCompiler::new(c, self.compile_timeout()))
    }

    pub fn oracle_compiler(&self) -> Option<ProcessCompiler> {
        self.oracle
            .clone()
            .map(|c| ProcessCompiler::new(c, self.compile_timeout()))
    }
}
