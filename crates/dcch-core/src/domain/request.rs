//! Run requests: what a fixture asks the harness to do.
//!
//! A request is a non-empty sequence of rounds sharing one option
//! configuration. Each round carries exactly one expectation shape, so a
//! round can never ask for both a clean compile-and-run and a negative
//! diagnostic log.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compiler::Compiler;
use crate::domain::options::OptionConfiguration;
use crate::domain::unit::{CompilationUnit, ModuleMap};
use crate::error::{HarnessError, Result};
use crate::oracle::excuse::ExcuseRegistry;

/// What a round is expected to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Expectation {
    /// Compile and compare the canonical diagnostic log.
    Negative { expected_log: String },
    /// Compile cleanly (no errors), run `entry_point`, compare stdout.
    Conformant {
        entry_point: String,
        expected_output: String,
        #[serde(default)]
        vm_args: Vec<String>,
        #[serde(default)]
        expected_exit_code: i32,
        #[serde(default)]
        expected_stderr: Option<String>,
    },
}

impl Expectation {
    pub fn negative(expected_log: impl Into<String>) -> Self {
        Expectation::Negative {
            expected_log: expected_log.into(),
        }
    }

    pub fn conformant(entry_point: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Expectation::Conformant {
            entry_point: entry_point.into(),
            expected_output: expected_output.into(),
            vm_args: Vec::new(),
            expected_exit_code: 0,
            expected_stderr: None,
        }
    }

    /// Pick the shape from optional fixture fields.
    ///
    /// Supplying both an expected log and an expected output is rejected;
    /// the harness never silently prefers one.
    pub fn from_parts(
        expected_log: Option<String>,
        expected_output: Option<String>,
        entry_point: Option<String>,
        vm_args: Vec<String>,
    ) -> Result<Self> {
        match (expected_log, expected_output) {
            (Some(_), Some(_)) => Err(HarnessError::InvalidRequest(
                "a round cannot expect both a diagnostic log and a runtime output".into(),
            )),
            (None, None) => Err(HarnessError::InvalidRequest(
                "a round must expect either a diagnostic log or a runtime output".into(),
            )),
            (Some(log), None) => {
                if !vm_args.is_empty() {
                    return Err(HarnessError::InvalidRequest(
                        "runtime arguments are only meaningful for conformant rounds".into(),
                    ));
                }
                Ok(Expectation::negative(log))
            }
            (None, Some(output)) => {
                let entry_point = entry_point.ok_or_else(|| {
                    HarnessError::InvalidRequest(
                        "a conformant round needs an entry point to run".into(),
                    )
                })?;
                Ok(Expectation::Conformant {
                    entry_point,
                    expected_output: output,
                    vm_args,
                    expected_exit_code: 0,
                    expected_stderr: None,
                })
            }
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Expectation::Negative { .. })
    }
}

/// One compile invocation within a request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Round {
    pub units: Vec<CompilationUnit>,
    pub modules: ModuleMap,
    /// Extra libraries appended after the default runtime set.
    pub extra_classpath: Vec<PathBuf>,
    /// Keep earlier rounds' output directories on the classpath.
    pub reuse_output: bool,
    pub expectation: Expectation,
}

impl Round {
    pub fn builder() -> RoundBuilder {
        RoundBuilder::default()
    }

    /// Whether this round asked for a fresh output directory, in which case
    /// sources left by earlier rounds are replaced rather than overwritten.
    pub fn flushes_output(&self) -> bool {
        !self.reuse_output
    }
}

/// Incremental constructor for a [`Round`].
#[derive(Debug, Default)]
pub struct RoundBuilder {
    units: Vec<(String, String)>,
    modules: ModuleMap,
    extra_classpath: Vec<PathBuf>,
    reuse_output: bool,
    expected_log: Option<String>,
    expected_output: Option<String>,
    entry_point: Option<String>,
    vm_args: Vec<String>,
    expected_exit_code: i32,
    expected_stderr: Option<String>,
}

impl RoundBuilder {
    pub fn unit(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.units.push((path.into(), text.into()));
        self
    }

    pub fn module(mut self, unit_path: impl Into<String>, module: impl Into<String>) -> Self {
        self.modules.insert(unit_path, module);
        self
    }

    pub fn classpath(mut self, entry: impl Into<PathBuf>) -> Self {
        self.extra_classpath.push(entry.into());
        self
    }

    pub fn reuse_output(mut self, reuse: bool) -> Self {
        self.reuse_output = reuse;
        self
    }

    pub fn expect_log(mut self, log: impl Into<String>) -> Self {
        self.expected_log = Some(log.into());
        self
    }

    pub fn expect_output(
        mut self,
        entry_point: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.entry_point = Some(entry_point.into());
        self.expected_output = Some(output.into());
        self
    }

    pub fn vm_arg(mut self, arg: impl Into<String>) -> Self {
        self.vm_args.push(arg.into());
        self
    }

    pub fn expect_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    pub fn expect_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.expected_stderr = Some(stderr.into());
        self
    }

    pub fn build(self) -> Result<Round> {
        let mut seen = HashSet::new();
        let mut units = Vec::with_capacity(self.units.len());
        for (path, text) in self.units {
            if !seen.insert(path.clone()) {
                return Err(HarnessError::InvalidRequest(format!(
                    "duplicate compilation unit path in round: {path}"
                )));
            }
            units.push(CompilationUnit::new(path, text)?);
        }
        if units.is_empty() {
            return Err(HarnessError::InvalidRequest(
                "a round needs at least one compilation unit".into(),
            ));
        }

        let mut expectation = Expectation::from_parts(
            self.expected_log,
            self.expected_output,
            self.entry_point,
            self.vm_args,
        )?;
        if let Expectation::Conformant {
            expected_exit_code,
            expected_stderr,
            ..
        } = &mut expectation
        {
            *expected_exit_code = self.expected_exit_code;
            *expected_stderr = self.expected_stderr;
        } else if self.expected_exit_code != 0 || self.expected_stderr.is_some() {
            return Err(HarnessError::InvalidRequest(
                "exit code and stderr expectations need a conformant round".into(),
            ));
        }

        Ok(Round {
            units,
            modules: self.modules,
            extra_classpath: self.extra_classpath,
            reuse_output: self.reuse_output,
            expectation,
        })
    }
}

/// Oracle compiler plus the excuse policy its divergences are judged by.
#[derive(Clone)]
pub struct OracleConfig {
    pub compiler: Arc<dyn Compiler>,
    pub excuses: Arc<ExcuseRegistry>,
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("compiler", &self.compiler.name())
            .field("excuses", &self.excuses.len())
            .finish()
    }
}

/// A complete request, consumed once by the orchestrator.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub name: String,
    pub options: OptionConfiguration,
    pub rounds: Vec<Round>,
    pub oracle: Option<OracleConfig>,
}

impl RunRequest {
    pub fn builder(name: impl Into<String>, options: OptionConfiguration) -> RunRequestBuilder {
        RunRequestBuilder {
            name: name.into(),
            options,
            rounds: Vec::new(),
            oracle: None,
        }
    }

    /// Structural checks that do not depend on harness configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::InvalidRequest("request name must not be empty".into()));
        }
        let first = self.rounds.first().ok_or_else(|| {
            HarnessError::InvalidRequest(format!("request '{}' has no rounds", self.name))
        })?;
        if first.reuse_output {
            return Err(HarnessError::InvalidRequest(format!(
                "request '{}': the first round has no earlier output to reuse",
                self.name
            )));
        }
        Ok(())
    }
}

/// Incremental constructor for a [`RunRequest`].
#[derive(Debug)]
pub struct RunRequestBuilder {
    name: String,
    options: OptionConfiguration,
    rounds: Vec<Round>,
    oracle: Option<OracleConfig>,
}

impl RunRequestBuilder {
    pub fn round(mut self, round: Round) -> Self {
        self.rounds.push(round);
        self
    }

    pub fn oracle(mut self, compiler: Arc<dyn Compiler>, excuses: Arc<ExcuseRegistry>) -> Self {
        self.oracle = Some(OracleConfig { compiler, excuses });
        self
    }

    pub fn build(self) -> Result<RunRequest> {
        let request = RunRequest {
            name: self.name,
            options: self.options,
            rounds: self.rounds,
            oracle: self.oracle,
        };
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::LanguageLevel;

    fn options() -> OptionConfiguration {
        OptionConfiguration::for_level(LanguageLevel::V1_8)
    }

    #[test]
    fn test_flush_follows_reuse_flag() {
        let build = |reuse| {
            Round::builder()
                .unit("X.java", "class X {}")
                .reuse_output(reuse)
                .expect_log("")
                .build()
                .unwrap()
        };
        assert!(build(false).flushes_output());
        assert!(!build(true).flushes_output());
    }

    #[test]
    fn test_round_rejects_both_expectations() {
        let err = Round::builder()
            .unit("X.java", "class X {}")
            .expect_log("")
            .expect_output("X", "hello")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_round_requires_an_expectation() {
        let err = Round::builder().unit("X.java", "class X {}").build().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidRequest(_)));
    }

    #[test]
    fn test_round_rejects_duplicate_units() {
        let err = Round::builder()
            .unit("X.java", "class X {}")
            .unit("X.java", "class X {}")
            .expect_log("")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_vm_args_need_conformant_shape() {
        let err = Round::builder()
            .unit("X.java", "class X {}")
            .expect_log("")
            .vm_arg("-Xmx64m")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("runtime arguments"));
    }

    #[test]
    fn test_conformant_round_carries_exit_code() {
        let round = Round::builder()
            .unit("X.java", "class X {}")
            .expect_output("X", "done")
            .vm_arg("-ea")
            .expect_exit_code(3)
            .build()
            .unwrap();
        match round.expectation {
            Expectation::Conformant {
                entry_point,
                vm_args,
                expected_exit_code,
                ..
            } => {
                assert_eq!(entry_point, "X");
                assert_eq!(vm_args, vec!["-ea".to_string()]);
                assert_eq!(expected_exit_code, 3);
            }
            other => panic!("expected conformant, got {other:?}"),
        }
    }

    #[test]
    fn test_request_rejects_reuse_on_first_round() {
        let round = Round::builder()
            .unit("X.java", "class X {}")
            .expect_log("")
            .reuse_output(true)
            .build()
            .unwrap();
        let err = RunRequest::builder("reuse", options())
            .round(round)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("first round"));
    }

    #[test]
    fn test_request_needs_rounds() {
        assert!(RunRequest::builder("empty", options()).build().is_err());
    }

    #[test]
    fn test_expectation_serde_tagged() {
        let exp = Expectation::negative("1. ERROR");
        let json = serde_json::to_value(&exp).unwrap();
        assert_eq!(json["shape"], "negative");
    }
}
