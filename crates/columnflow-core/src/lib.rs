//! columnflow core
//!
//! Stable domain model for column-level lineage: dependency sets, lineage
//! results, diagnostics, configuration, and the batch report.
//! Never rename diagnostic codes - they are part of the public API.

pub mod config;
pub mod diagnostic;
pub mod graph;
pub mod lineage;
pub mod report;

pub use config::{Config, ConfigError, DialectConfig, OutputConfig};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use graph::{NodeId, Ordering, StatementGraph};
pub use lineage::{
    is_placeholder, ColumnDict, DependencySet, InputTableDict, LineageResult, StatementRecord,
    STAR_SUFFIX,
};
pub use report::{LineageReport, ReportSummary, ReportVersion, UnprocessedStatement};
