//! Compiler option configuration: language levels, preview flag, severity
//! overrides and free-form extras.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// A language version marker such as `1.4`, `1.8` or `21`.
///
/// Levels up to 8 are written `1.x`; later ones as the bare major number.
/// `1.9` and above are accepted as aliases of the bare form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageLevel(u32);

impl LanguageLevel {
    pub const V1_3: LanguageLevel = LanguageLevel(3);
    pub const V1_4: LanguageLevel = LanguageLevel(4);
    pub const V1_5: LanguageLevel = LanguageLevel(5);
    pub const V1_7: LanguageLevel = LanguageLevel(7);
    pub const V1_8: LanguageLevel = LanguageLevel(8);
    pub const V9: LanguageLevel = LanguageLevel(9);
    pub const V11: LanguageLevel = LanguageLevel(11);
    pub const V17: LanguageLevel = LanguageLevel(17);
    pub const V21: LanguageLevel = LanguageLevel(21);

    pub fn major(self) -> u32 {
        self.0
    }

    /// First level with a module system.
    pub fn supports_modules(self) -> bool {
        self >= LanguageLevel::V9
    }
}

impl FromStr for LanguageLevel {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let major = match raw.strip_prefix("1.") {
            Some(minor) => minor.parse::<u32>().ok(),
            None => raw.parse::<u32>().ok().filter(|m| *m >= 9),
        };
        match major {
            Some(m) if m >= 1 => Ok(LanguageLevel(m)),
            _ => Err(HarnessError::InvalidConfiguration(format!(
                "unrecognised language level '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for LanguageLevel {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LanguageLevel> for String {
    fn from(level: LanguageLevel) -> Self {
        level.to_string()
    }
}

impl fmt::Display for LanguageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 <= 8 {
            write!(f, "1.{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Severity a diagnostic key is configured to report at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Ignore,
    Info,
    Warning,
    Error,
}

impl SeverityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLevel::Ignore => "ignore",
            SeverityLevel::Info => "info",
            SeverityLevel::Warning => "warning",
            SeverityLevel::Error => "error",
        }
    }
}

/// Catalogue default for a severity key at a compliance level.
///
/// Returns `None` for keys the catalogue does not know; those are left to
/// the compiler's own defaults.
pub fn default_severity(key: &str, compliance: LanguageLevel) -> Option<SeverityLevel> {
    let generics = compliance >= LanguageLevel::V1_5;
    let level = match key {
        "unusedLocal" | "unusedImport" | "unusedPrivateMember" => SeverityLevel::Warning,
        "deadCode" | "nullReference" | "unusedLambdaParameter" => SeverityLevel::Warning,
        "rawTypeReference" | "uncheckedTypeOperation" if generics => SeverityLevel::Warning,
        "rawTypeReference" | "uncheckedTypeOperation" => SeverityLevel::Ignore,
        "missingOverrideAnnotation" | "redundantSuperinterface" => SeverityLevel::Ignore,
        "reportPreviewFeatures" => SeverityLevel::Warning,
        "forbiddenReference" => SeverityLevel::Error,
        "discouragedReference" => SeverityLevel::Warning,
        _ => return None,
    };
    Some(level)
}

/// The full option set a compiler is invoked with.
///
/// Two configurations are equal iff every field matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionConfiguration {
    pub source: LanguageLevel,
    pub compliance: LanguageLevel,
    pub target: LanguageLevel,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub severities: BTreeMap<String, SeverityLevel>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl OptionConfiguration {
    /// Source, compliance and target all set to `level`; no overrides.
    pub fn for_level(level: LanguageLevel) -> Self {
        Self {
            source: level,
            compliance: level,
            target: level,
            preview: false,
            severities: BTreeMap::new(),
            extras: BTreeMap::new(),
        }
    }

    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.preview = enabled;
        self
    }

    pub fn with_severity(mut self, key: impl Into<String>, level: SeverityLevel) -> Self {
        self.severities.insert(key.into(), level);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Override if present, else the compliance-level catalogue default.
    pub fn effective_severity(&self, key: &str) -> Option<SeverityLevel> {
        self.severities
            .get(key)
            .copied()
            .or_else(|| default_severity(key, self.compliance))
    }

    /// Check the version triple and preview flag for consistency.
    ///
    /// `latest` is the newest level the harness knows; preview features are
    /// only meaningful there.
    pub fn validate(&self, latest: LanguageLevel) -> Result<()> {
        if self.source > self.compliance {
            return Err(HarnessError::InvalidConfiguration(format!(
                "source level {} exceeds compliance level {}",
                self.source, self.compliance
            )));
        }
        if self.target < self.source {
            return Err(HarnessError::InvalidConfiguration(format!(
                "target level {} is below source level {}",
                self.target, self.source
            )));
        }
        if self.compliance > latest {
            return Err(HarnessError::InvalidConfiguration(format!(
                "compliance level {} is newer than the latest known level {}",
                self.compliance, latest
            )));
        }
        if self.preview && self.compliance != latest {
            return Err(HarnessError::InvalidConfiguration(format!(
                "preview features require compliance {latest}, got {}",
                self.compliance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("1.4".parse::<LanguageLevel>().unwrap(), LanguageLevel::V1_4);
        assert_eq!("1.8".parse::<LanguageLevel>().unwrap().to_string(), "1.8");
        assert_eq!("9".parse::<LanguageLevel>().unwrap(), LanguageLevel::V9);
        assert_eq!("1.9".parse::<LanguageLevel>().unwrap().to_string(), "9");
        assert_eq!("21".parse::<LanguageLevel>().unwrap().major(), 21);
        assert!("8".parse::<LanguageLevel>().is_err());
        assert!("abc".parse::<LanguageLevel>().is_err());
        assert!("1.0".parse::<LanguageLevel>().is_err());
    }

    #[test]
    fn test_level_ordering() {
        assert!(LanguageLevel::V1_4 < LanguageLevel::V1_8);
        assert!(LanguageLevel::V1_8 < LanguageLevel::V9);
        assert!(!LanguageLevel::V1_8.supports_modules());
        assert!(LanguageLevel::V11.supports_modules());
    }

    #[test]
    fn test_level_serde_as_string() {
        let json = serde_json::to_string(&LanguageLevel::V1_4).unwrap();
        assert_eq!(json, "\"1.4\"");
        let back: LanguageLevel = serde_json::from_str("\"17\"").unwrap();
        assert_eq!(back, LanguageLevel::V17);
    }

    #[test]
    fn test_effective_severity_defaults_by_compliance() {
        let old = OptionConfiguration::for_level(LanguageLevel::V1_4);
        let new = OptionConfiguration::for_level(LanguageLevel::V1_8);
        assert_eq!(old.effective_severity("rawTypeReference"), Some(SeverityLevel::Ignore));
        assert_eq!(new.effective_severity("rawTypeReference"), Some(SeverityLevel::Warning));
        assert_eq!(new.effective_severity("noSuchKey"), None);

        let overridden = new.with_severity("rawTypeReference", SeverityLevel::Error);
        assert_eq!(
            overridden.effective_severity("rawTypeReference"),
            Some(SeverityLevel::Error)
        );
    }

    #[test]
    fn test_configuration_equality_is_fieldwise() {
        let a = OptionConfiguration::for_level(LanguageLevel::V17);
        let b = OptionConfiguration::for_level(LanguageLevel::V17);
        assert_eq!(a, b);
        assert_ne!(a.clone(), b.clone().with_extra("k", "v"));
        assert_ne!(a, b.with_preview(true));
    }

    #[test]
    fn test_validate_triple() {
        let latest = LanguageLevel::V21;
        let mut cfg = OptionConfiguration::for_level(LanguageLevel::V1_8);
        assert!(cfg.validate(latest).is_ok());

        cfg.source = LanguageLevel::V11;
        assert!(cfg.validate(latest).is_err());

        let mut cfg = OptionConfiguration::for_level(LanguageLevel::V11);
        cfg.target = LanguageLevel::V1_8;
        assert!(cfg.validate(latest).is_err());
    }

    #[test]
    fn test_validate_preview_requires_latest() {
        let latest = LanguageLevel::V21;
        let ok = OptionConfiguration::for_level(latest).with_preview(true);
        assert!(ok.validate(latest).is_ok());
        let bad = OptionConfiguration::for_level(LanguageLevel::V17).with_preview(true);
        assert!(matches!(
            bad.validate(latest),
            Err(HarnessError::InvalidConfiguration(_))
        ));
    }
}
