//! A [`Compiler`] backed by an external process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{collect_artifacts, CompileInvocation, CompileOutput, Compiler, OptionDialect, OutputFormat};
use crate::error::{HarnessError, Result};

/// How to launch one external compiler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessCompilerConfig {
    pub name: String,
    pub program: String,
    /// Fixed arguments placed before the translated options.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub dialect: OptionDialect,
    #[serde(default)]
    pub format: OutputFormat,
}

/// Runs a compiler binary and parses its diagnostics.
///
/// Exit status 0 means no errors. The dialect's error statuses mean errors
/// were reported. Any other status, a signal, a timeout, or an error status
/// with no parsed error is a compiler fault.
#[derive(Debug, Clone)]
pub struct ProcessCompiler {
    config: ProcessCompilerConfig,
    timeout: Duration,
}

impl ProcessCompiler {
    pub fn new(config: ProcessCompilerConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn config(&self) -> &ProcessCompilerConfig {
        &self.config
    }

    fn fault(&self, detail: impl Into<String>) -> HarnessError {
        HarnessError::compiler_fault(&self.config.name, detail)
    }
}

#[async_trait]
impl Compiler for ProcessCompiler {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn compile(&self, invocation: &CompileInvocation<'_>) -> Result<CompileOutput> {
        let mut args = self.config.args.clone();
        args.extend(self.config.dialect.arguments(invocation)?);
        debug!(compiler = %self.config.name, program = %self.config.program, ?args, "Spawning compiler");

        let child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(invocation.source_set.src_root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.fault(format!("failed to launch {}: {e}", self.config.program)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| self.fault(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| self.fault(format!("failed to collect output: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{stdout}\n{stderr}");

        let diagnostics = self
            .config
            .format
            .parse(&combined, invocation.source_set)
            .map_err(|e| self.fault(format!("unreadable diagnostics: {e}")))?;
        let has_errors = diagnostics.iter().any(|d| d.severity.is_error());

        let error_statuses = self.config.dialect.error_statuses();
        match output.status.code() {
            Some(0) => {}
            Some(code) if error_statuses.contains(&code) && has_errors => {}
            Some(code) if error_statuses.contains(&code) => {
                return Err(self.fault(format!(
                    "exit status {code} without a parsed error; stderr: {}",
                    stderr.trim()
                )))
            }
            Some(code) => {
                return Err(self.fault(format!("exit status {code}; stderr: {}", stderr.trim())))
            }
            None => return Err(self.fault("terminated by signal")),
        }

        Ok(CompileOutput {
            diagnostics,
            artifacts: collect_artifacts(invocation.output_dir)?,
        })
    }
}
