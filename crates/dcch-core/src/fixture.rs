//! Fixture files: run requests written as TOML.
//!
//! ```toml
//! name = "flow/unreachable_while"
//! oracle = true
//!
//! [options]
//! level = "1.4"
//! severities = { unusedLocal = "ignore" }
//!
//! [[round]]
//! expected_log = """..."""
//!
//! [[round.unit]]
//! path = "p1/Test.java"
//! text = """..."""
//! ```
//!
//! `level` fills whichever of `source`, `compliance` and `target` are not
//! given. A round names exactly one of `expected_log` and `expected_output`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::domain::options::{LanguageLevel, OptionConfiguration, SeverityLevel};
use crate::domain::request::{OracleConfig, Round, RunRequest};
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureOptions {
    pub level: Option<LanguageLevel>,
    pub source: Option<LanguageLevel>,
    pub compliance: Option<LanguageLevel>,
    pub target: Option<LanguageLevel>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub severities: BTreeMap<String, SeverityLevel>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl FixtureOptions {
    pub fn resolve(&self) -> Result<OptionConfiguration> {
        let pick = |field: Option<LanguageLevel>, name: &str| {
            field.or(self.level).ok_or_else(|| {
                HarnessError::InvalidRequest(format!("fixture options need `{name}` or `level`"))
            })
        };
        Ok(OptionConfiguration {
            source: pick(self.source, "source")?,
            compliance: pick(self.compliance, "compliance")?,
            target: pick(self.target, "target")?,
            preview: self.preview,
            severities: self.severities.clone(),
            extras: self.extras.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureUnit {
    pub path: String,
    pub text: String,
    /// Owning module, for modular source sets.
    pub module: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureRound {
    #[serde(rename = "unit", default)]
    pub units: Vec<FixtureUnit>,
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    #[serde(default)]
    pub reuse_output: bool,
    pub expected_log: Option<String>,
    pub expected_output: Option<String>,
    pub entry_point: Option<String>,
    #[serde(default)]
    pub vm_args: Vec<String>,
    #[serde(default)]
    pub expected_exit_code: i32,
    pub expected_stderr: Option<String>,
}

impl FixtureRound {
    fn to_round(&self, base: &Path) -> Result<Round> {
        let mut builder = Round::builder().reuse_output(self.reuse_output);
        for unit in &self.units {
            builder = builder.unit(&unit.path, &unit.text);
            if let Some(module) = &unit.module {
                builder = builder.module(&unit.path, module);
            }
        }
        for entry in &self.classpath {
            builder = builder.classpath(if entry.is_absolute() {
                entry.clone()
            } else {
                base.join(entry)
            });
        }
        if let Some(log) = &self.expected_log {
            builder = builder.expect_log(log);
        }
        if let Some(output) = &self.expected_output {
            let entry = self
                .entry_point
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| {
                    HarnessError::InvalidRequest("expected_output needs an entry_point".into())
                })?;
            builder = builder.expect_output(entry, output);
        }
        for arg in &self.vm_args {
            builder = builder.vm_arg(arg);
        }
        if self.expected_exit_code != 0 {
            builder = builder.expect_exit_code(self.expected_exit_code);
        }
        if let Some(stderr) = &self.expected_stderr {
            builder = builder.expect_stderr(stderr);
        }
        builder.build()
    }
}

/// One fixture file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub name: String,
    /// Cross-check against the oracle compiler when one is configured.
    #[serde(default)]
    pub oracle: bool,
    #[serde(default)]
    pub options: FixtureOptions,
    #[serde(rename = "round", default)]
    pub rounds: Vec<FixtureRound>,
    /// Directory relative classpath entries are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Fixture {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HarnessError::environment(path, e))?;
        let mut fixture = Self::from_toml(&text).map_err(|e| {
            HarnessError::InvalidRequest(format!("{}: {e}", path.display()))
        })?;
        fixture.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(fixture)
    }

    /// Build the request, attaching `oracle` if the fixture asks for one.
    pub fn to_request(&self, oracle: Option<&OracleConfig>) -> Result<RunRequest> {
        let mut builder = RunRequest::builder(&self.name, self.options.resolve()?);
        for (i, round) in self.rounds.iter().enumerate() {
            let round = round.to_round(&self.base_dir).map_err(|e| {
                HarnessError::InvalidRequest(format!("{} round {}: {e}", self.name, i + 1))
            })?;
            builder = builder.round(round);
        }
        match (self.oracle, oracle) {
            (true, Some(oracle)) => {
                builder = builder.oracle(oracle.compiler.clone(), oracle.excuses.clone());
            }
            (true, None) => warn!(fixture = %self.name, "Fixture asks for an oracle but none is configured"),
            (false, _) => {}
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::Expectation;
    use crate::fakes::ToyCompiler;
    use crate::oracle::excuse::ExcuseRegistry;
    use std::sync::Arc;

    const NEGATIVE: &str = r#"
name = "flow/unreachable"
oracle = true

[options]
level = "1.4"
source = "1.3"
severities = { unusedLocal = "ignore" }

[[round]]
expected_log = ""

[[round.unit]]
path = "p1/Test.java"
text = "class Test {}"
"#;

    #[test]
    fn test_negative_fixture_to_request() {
        let fixture = Fixture::from_toml(NEGATIVE).unwrap();
        let request = fixture.to_request(None).unwrap();
        assert_eq!(request.name, "flow/unreachable");
        assert_eq!(request.options.compliance, LanguageLevel::V1_4);
        assert_eq!(request.options.source, LanguageLevel::V1_3);
        assert_eq!(
            request.options.effective_severity("unusedLocal"),
            Some(SeverityLevel::Ignore)
        );
        assert_eq!(request.rounds.len(), 1);
        assert!(request.rounds[0].expectation.is_negative());
        assert!(request.oracle.is_none());
    }

    #[test]
    fn test_oracle_attached_when_requested() {
        let fixture = Fixture::from_toml(NEGATIVE).unwrap();
        let oracle = OracleConfig {
            compiler: Arc::new(ToyCompiler::named("oracle")),
            excuses: Arc::new(ExcuseRegistry::empty()),
        };
        let request = fixture.to_request(Some(&oracle)).unwrap();
        assert_eq!(request.oracle.unwrap().compiler.name(), "oracle");
    }

    #[test]
    fn test_conformant_round_with_modules_and_classpath() {
        let text = r#"
name = "run/hello"

[options]
level = "11"

[[round]]
classpath = ["lib/dep.jar"]
expected_output = "hello"
entry_point = "app/p.Main"
vm_args = ["-ea"]
expected_exit_code = 2

[[round.unit]]
path = "app/module-info.java"
text = "module app {}"
module = "app"

[[round.unit]]
path = "app/p/Main.java"
text = "package p; class Main {}"
module = "app"
"#;
        let mut fixture = Fixture::from_toml(text).unwrap();
        fixture.base_dir = PathBuf::from("/fixtures");
        let request = fixture.to_request(None).unwrap();
        let round = &request.rounds[0];
        assert_eq!(round.extra_classpath, vec![PathBuf::from("/fixtures/lib/dep.jar")]);
        assert_eq!(round.modules.module_of("app/p/Main.java"), Some("app"));
        match &round.expectation {
            Expectation::Conformant {
                entry_point,
                expected_exit_code,
                ..
            } => {
                assert_eq!(entry_point, "app/p.Main");
                assert_eq!(*expected_exit_code, 2);
            }
            other => panic!("expected conformant, got {other:?}"),
        }
    }

    #[test]
    fn test_round_with_both_expectations_is_rejected() {
        let text = r#"
name = "bad"
[options]
level = "1.8"
[[round]]
expected_log = ""
expected_output = "x"
entry_point = "X"
[[round.unit]]
path = "X.java"
text = "class X {}"
"#;
        let err = Fixture::from_toml(text)
            .unwrap()
            .to_request(None)
            .unwrap_err();
        assert!(err.to_string().contains("round 1"));
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_expected_output_without_entry_point_is_rejected() {
        let text = r#"
name = "run/no-main"
[options]
level = "1.8"
[[round]]
expected_output = "hello"
[[round.unit]]
path = "X.java"
text = "class X {}"
"#;
        let err = Fixture::from_toml(text)
            .unwrap()
            .to_request(None)
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidRequest(_)));
        assert!(err.to_string().contains("entry_point"));
    }

    #[test]
    fn test_missing_level_is_rejected() {
        let text = r#"
name = "bad"
[[round]]
expected_log = ""
[[round.unit]]
path = "X.java"
text = "class X {}"
"#;
        let err = Fixture::from_toml(text)
            .unwrap()
            .to_request(None)
            .unwrap_err();
        assert!(err.to_string().contains("level"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(Fixture::from_toml("name = \"x\"\nexpected = 1\n").is_err());
    }
}
