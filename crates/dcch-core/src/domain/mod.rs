//! Harness data model.
//!
//! - [`unit`]: `CompilationUnit`, `ModuleMap`
//! - [`options`]: `LanguageLevel`, `OptionConfiguration`, severity catalogue
//! - [`diagnostic`]: `Severity`, `DiagnosticRecord`
//! - [`request`]: `RunRequest`, `Round`, `Expectation`, `OracleConfig`
//! - [`result`]: `RunResult`, `RoundResult`, `Stage`, `Failure`

pub mod diagnostic;
pub mod options;
pub mod request;
pub mod result;
pub mod unit;

pub use diagnostic::{DiagnosticRecord, Severity};
pub use options::{default_severity, LanguageLevel, OptionConfiguration, SeverityLevel};
pub use request::{Expectation, OracleConfig, Round, RoundBuilder, RunRequest, RunRequestBuilder};
pub use result::{Failure, RoundResult, RunResult, Stage};
pub use unit::{CompilationUnit, ModuleMap};
