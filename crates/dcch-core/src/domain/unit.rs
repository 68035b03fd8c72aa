//! Compilation units and module association.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// A single virtual source file submitted to the compiler.
///
/// The path is always `/`-separated and relative; it is rendered with the
/// host separator only when diagnostics are canonicalized.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompilationUnit {
    path: String,
    text: String,
}

impl CompilationUnit {
    /// Create a unit, rejecting paths that would escape the workspace.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_virtual_path(&path)?;
        Ok(Self {
            path,
            text: text.into(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The 1-based `line` of this unit, without its terminator.
    ///
    /// Lines are split on `\n`; a preceding `\r` is dropped so CRLF sources
    /// echo the same way as LF ones.
    pub fn line(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.text
            .split('\n')
            .nth(line as usize - 1)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}

fn validate_virtual_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(HarnessError::InvalidRequest(
            "compilation unit path must not be empty".into(),
        ));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(HarnessError::InvalidRequest(format!(
            "compilation unit path must be relative and '/'-separated: {path}"
        )));
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(HarnessError::InvalidRequest(format!(
            "compilation unit path has an invalid segment: {path}"
        )));
    }
    Ok(())
}

/// Lookup table from unit path to module name.
///
/// The builder only records the association; module semantics are applied
/// by the compiler invoker when it picks class path vs. module path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleMap {
    entries: BTreeMap<String, String>,
}

impl ModuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `unit_path` with `module` (builder pattern).
    pub fn with(mut self, unit_path: impl Into<String>, module: impl Into<String>) -> Self {
        self.entries.insert(unit_path.into(), module.into());
        self
    }

    pub fn insert(&mut self, unit_path: impl Into<String>, module: impl Into<String>) {
        self.entries.insert(unit_path.into(), module.into());
    }

    pub fn module_of(&self, unit_path: &str) -> Option<&str> {
        self.entries.get(unit_path).map(String::as_str)
    }

    /// Distinct module names, sorted.
    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
