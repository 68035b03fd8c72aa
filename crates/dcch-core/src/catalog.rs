//! Default runtime library sets per compliance level.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::options::LanguageLevel;

/// Compliance level → default runtime libraries.
///
/// Loaded once with the harness configuration and shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LibraryCatalog {
    levels: BTreeMap<LanguageLevel, Vec<PathBuf>>,
}

impl LibraryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LanguageLevel, libraries: Vec<PathBuf>) -> Self {
        self.levels.insert(level, libraries);
        self
    }

    /// Libraries of the greatest configured level not newer than `compliance`.
    pub fn libraries_for(&self, compliance: LanguageLevel) -> &[PathBuf] {
        self.levels
            .range(..=compliance)
            .next_back()
            .map(|(_, libs)| libs.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
