//! Option dialects: how an [`OptionConfiguration`] is spelled on a compiler
//! command line.

use serde::{Deserialize, Serialize};

use super::{ClasspathMode, CompileInvocation};
use crate::domain::options::{LanguageLevel, SeverityLevel};
use crate::error::Result;

/// Runtime flag enabling preview features, shared by both dialects.
pub const PREVIEW_FLAG: &str = "--enable-preview";

/// Argument vocabulary of a compiler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptionDialect {
    /// Batch-compiler style: `-1.4`, `-warn:+key`, `-proceedOnError`.
    #[default]
    Batch,
    /// Reference-compiler style: `--release`, `-Xlint:key`.
    Javac,
}

impl OptionDialect {
    /// Exit statuses that mean the compile finished and reported errors.
    /// The batch compiler exits with -1, seen as 255 on Unix.
    pub fn error_statuses(self) -> &'static [i32] {
        match self {
            OptionDialect::Batch => &[1, 255, -1],
            OptionDialect::Javac => &[1],
        }
    }

    /// Full argument list, source files last.
    pub fn arguments(self, invocation: &CompileInvocation<'_>) -> Result<Vec<String>> {
        let mut args = match self {
            OptionDialect::Batch => batch_options(invocation),
            OptionDialect::Javac => javac_options(invocation),
        };

        if !invocation.classpath.entries.is_empty() {
            let flag = match (self, invocation.classpath.mode) {
                (_, ClasspathMode::ModulePath) => "--module-path",
                (OptionDialect::Batch, ClasspathMode::ClassPath) => "-classpath",
                (OptionDialect::Javac, ClasspathMode::ClassPath) => "-cp",
            };
            args.push(flag.to_string());
            args.push(invocation.classpath.joined()?);
        }
        if self == OptionDialect::Javac && !invocation.source_set.modules().is_empty() {
            args.push("--module-source-path".to_string());
            args.push(invocation.source_set.src_root().display().to_string());
        }

        args.push("-d".to_string());
        args.push(invocation.output_dir.display().to_string());
        args.push("-encoding".to_string());
        args.push("UTF-8".to_string());
        if self == OptionDialect::Batch {
            args.push("-proceedOnError".to_string());
        }

        args.extend(
            invocation
                .source_set
                .files()
                .map(|f| f.display().to_string()),
        );
        Ok(args)
    }
}

fn batch_options(invocation: &CompileInvocation<'_>) -> Vec<String> {
    let options = invocation.options;
    let mut args = vec![
        format!("-{}", options.compliance),
        "-source".to_string(),
        options.source.to_string(),
        "-target".to_string(),
        options.target.to_string(),
    ];
    if options.preview {
        args.push(PREVIEW_FLAG.to_string());
    }
    for (key, level) in &options.severities {
        args.push(match level {
            SeverityLevel::Ignore => format!("-warn:-{key}"),
            SeverityLevel::Info => format!("-info:+{key}"),
            SeverityLevel::Warning => format!("-warn:+{key}"),
            SeverityLevel::Error => format!("-err:+{key}"),
        });
    }
    for (key, value) in &options.extras {
        if value.is_empty() {
            args.push(key.clone());
        } else {
            args.push(format!("{key}={value}"));
        }
    }
    args
}

fn javac_options(invocation: &CompileInvocation<'_>) -> Vec<String> {
    let options = invocation.options;
    let uniform = options.source == options.compliance && options.target == options.compliance;

    let mut args = Vec::new();
    if uniform && options.compliance >= LanguageLevel::V9 {
        args.push("--release".to_string());
        args.push(options.compliance.to_string());
    } else {
        args.push("-source".to_string());
        args.push(options.source.to_string());
        args.push("-target".to_string());
        args.push(options.target.to_string());
    }
    if options.preview {
        args.push(PREVIEW_FLAG.to_string());
    }
    for (key, level) in &options.severities {
        let Some(lint) = javac_lint_name(key) else {
            continue;
        };
        match level {
            SeverityLevel::Ignore => args.push(format!("-Xlint:-{lint}")),
            _ => args.push(format!("-Xlint:{lint}")),
        }
    }
    args
}

/// Lint category for a severity key, where the reference compiler has one.
fn javac_lint_name(key: &str) -> Option<&'static str> {
    match key {
        "rawTypeReference" => Some("rawtypes"),
        "uncheckedTypeOperation" => Some("unchecked"),
        "missingSerialVersion" => Some("serial"),
        "deprecation" => Some("deprecation"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ResolvedClasspath;
    use crate::domain::options::OptionConfiguration;
    use crate::domain::unit::{CompilationUnit, ModuleMap};
    use crate::workspace::{SourceSet, Workspace};
    use std::path::{Path, PathBuf};

    fn source_set(dir: &Path, modules: ModuleMap) -> SourceSet {
        let ws = Workspace::create(dir, "dialect").unwrap();
        ws.build(
            &[CompilationUnit::new("p1/Test.java", "class Test {}").unwrap()],
            &modules,
            false,
        )
        .unwrap()
    }

    fn classpath(entries: &[&str]) -> ResolvedClasspath {
        ResolvedClasspath {
            mode: ClasspathMode::ClassPath,
            entries: entries.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_batch_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let set = source_set(dir.path(), ModuleMap::new());
        let options = OptionConfiguration::for_level(LanguageLevel::V1_4)
            .with_severity("deadCode", SeverityLevel::Error)
            .with_severity("unusedLocal", SeverityLevel::Ignore);
        let cp = classpath(&["rt.jar"]);
        let out = dir.path().join("bin");
        let args = OptionDialect::Batch
            .arguments(&CompileInvocation {
                source_set: &set,
                options: &options,
                classpath: &cp,
                output_dir: &out,
            })
            .unwrap();

        assert_eq!(&args[..5], &["-1.4", "-source", "1.4", "-target", "1.4"]);
        assert!(args.contains(&"-err:+deadCode".to_string()));
        assert!(args.contains(&"-warn:-unusedLocal".to_string()));
        assert!(args.contains(&"-classpath".to_string()));
        assert!(args.contains(&"-proceedOnError".to_string()));
        assert!(args.last().unwrap().ends_with("Test.java"));
        assert!(!args.contains(&PREVIEW_FLAG.to_string()));
    }

    #[test]
    fn test_javac_uses_release_for_uniform_modern_levels() {
        let dir = tempfile::tempdir().unwrap();
        let set = source_set(dir.path(), ModuleMap::new());
        let options = OptionConfiguration::for_level(LanguageLevel::V21)
            .with_preview(true)
            .with_severity("rawTypeReference", SeverityLevel::Ignore)
            .with_severity("unusedLocal", SeverityLevel::Warning);
        let cp = classpath(&[]);
        let out = dir.path().join("bin");
        let args = OptionDialect::Javac
            .arguments(&CompileInvocation {
                source_set: &set,
                options: &options,
                classpath: &cp,
                output_dir: &out,
            })
            .unwrap();

        assert_eq!(&args[..2], &["--release", "21"]);
        assert!(args.contains(&PREVIEW_FLAG.to_string()));
        assert!(args.contains(&"-Xlint:-rawtypes".to_string()));
        assert!(!args.iter().any(|a| a.contains("unusedLocal")));
        assert!(!args.contains(&"-cp".to_string()));
    }

    #[test]
    fn test_javac_legacy_levels_use_source_target() {
        let dir = tempfile::tempdir().unwrap();
        let set = source_set(dir.path(), ModuleMap::new());
        let options = OptionConfiguration::for_level(LanguageLevel::V1_8);
        let cp = classpath(&["lib.jar"]);
        let out = dir.path().join("bin");
        let args = OptionDialect::Javac
            .arguments(&CompileInvocation {
                source_set: &set,
                options: &options,
                classpath: &cp,
                output_dir: &out,
            })
            .unwrap();
        assert_eq!(&args[..4], &["-source", "1.8", "-target", "1.8"]);
        assert!(args.contains(&"-cp".to_string()));
    }

    #[test]
    fn test_module_path_and_source_path() {
        let dir = tempfile::tempdir().unwrap();
        let set = source_set(dir.path(), ModuleMap::new().with("p1/Test.java", "m"));
        let options = OptionConfiguration::for_level(LanguageLevel::V11);
        let cp = ResolvedClasspath {
            mode: ClasspathMode::ModulePath,
            entries: vec![PathBuf::from("mods")],
        };
        let out = dir.path().join("bin");
        let args = OptionDialect::Javac
            .arguments(&CompileInvocation {
                source_set: &set,
                options: &options,
                classpath: &cp,
                output_dir: &out,
            })
            .unwrap();
        assert!(args.contains(&"--module-path".to_string()));
        assert!(args.contains(&"--module-source-path".to_string()));
    }
}
