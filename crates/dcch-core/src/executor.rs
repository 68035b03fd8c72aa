//! Artifact executor: launches compiled output in a subprocess.

use std::process::Stdio;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::compiler::{ClasspathMode, ResolvedClasspath};
use crate::config::RuntimeConfig;
use crate::domain::options::OptionConfiguration;
use crate::error::{HarnessError, Result};

/// Captured result of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was ended by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// A run either completes or exceeds its time limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Completed(ExecutionOutput),
    TimedOut { timeout_ms: u64 },
}

/// Launches entry points against a resolved classpath.
#[derive(Debug, Clone)]
pub struct ArtifactExecutor {
    config: RuntimeConfig,
}

impl ArtifactExecutor {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Launcher arguments for one run.
    ///
    /// The preview flag is added when `options` enabled preview at compile
    /// time. Passing it by hand while preview is off, or targeting a level
    /// the runtime cannot load, is a configuration error.
    pub fn arguments(
        &self,
        classpath: &ResolvedClasspath,
        entry_point: &str,
        vm_args: &[String],
        options: &OptionConfiguration,
    ) -> Result<Vec<String>> {
        if entry_point.trim().is_empty() {
            return Err(HarnessError::InvalidRequest("empty entry point".into()));
        }
        if options.target > self.config.max_level {
            return Err(HarnessError::InvalidConfiguration(format!(
                "target level {} cannot run on a runtime limited to {}",
                options.target, self.config.max_level
            )));
        }
        let flag = self.config.preview_flag.as_str();
        let has_flag = vm_args.iter().any(|a| a == flag);
        if has_flag && !options.preview {
            return Err(HarnessError::InvalidConfiguration(format!(
                "runtime flag {flag} given but preview was disabled at compile time"
            )));
        }

        let mut args = Vec::with_capacity(vm_args.len() + 5);
        if options.preview && !has_flag {
            args.push(flag.to_string());
        }
        args.extend(vm_args.iter().cloned());
        match classpath.mode {
            ClasspathMode::ClassPath => {
                if !classpath.entries.is_empty() {
                    args.push("-cp".to_string());
                    args.push(classpath.joined()?);
                }
                args.push(entry_point.to_string());
            }
            ClasspathMode::ModulePath => {
                args.push("--module-path".to_string());
                args.push(classpath.joined()?);
                args.push("-m".to_string());
                args.push(entry_point.to_string());
            }
        }
        Ok(args)
    }

    /// Run `entry_point` and capture its output.
    pub async fn run(
        &self,
        classpath: &ResolvedClasspath,
        entry_point: &str,
        vm_args: &[String],
        options: &OptionConfiguration,
    ) -> Result<ExecutionResult> {
        let args = self.arguments(classpath, entry_point, vm_args, options)?;
        debug!(program = %self.config.program, ?args, "Launching artifact");

        let start = Instant::now();
        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::environment(&self.config.program, e))?;

        let timeout = self.config.timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| HarnessError::environment(&self.config.program, e))?,
            Err(_) => {
                warn!(entry_point, timeout_secs = self.config.timeout_secs, "Execution timed out");
                return Ok(ExecutionResult::TimedOut {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        Ok(ExecutionResult::Completed(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        }))
    }
}
