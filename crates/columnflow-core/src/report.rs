//! Lineage report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use crate::diagnostic::{Diagnostic, Severity};
use crate::lineage::StatementRecord;
use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Statements handed to the batch
    pub statements_total: usize,

    /// Statements resolved and emitted
    pub statements_processed: usize,

    /// Statements skipped because of a parse or resolution error
    pub statements_unprocessed: usize,

    /// Synthesized leaf records
    pub base_tables: usize,

    /// Number of warnings
    pub warnings: usize,

    /// Number of errors
    pub errors: usize,
}

/// A statement that was excluded from the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprocessedStatement {
    /// Statement name
    pub name: String,

    /// Why it was skipped
    pub reason: String,
}

/// Batch lineage report (lineage.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// One record per processed statement, in resolution order
    pub statements: Vec<StatementRecord>,

    /// Leaf records for base tables
    pub base_tables: Vec<StatementRecord>,

    /// Statements excluded from the output
    pub unprocessed: Vec<UnprocessedStatement>,

    /// All diagnostics raised during the batch
    pub diagnostics: Vec<Diagnostic>,
}

impl LineageReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            statements: Vec::new(),
            base_tables: Vec::new(),
            unprocessed: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Add a processed statement record
    pub fn add_statement(&mut self, record: StatementRecord) {
        self.summary.statements_total += 1;
        self.summary.statements_processed += 1;
        self.statements.push(record);
    }

    /// Record a skipped statement
    pub fn add_unprocessed(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.summary.statements_total += 1;
        self.summary.statements_unprocessed += 1;
        self.unprocessed.push(UnprocessedStatement {
            name: name.into(),
            reason: reason.into(),
        });
    }

    /// Add a synthesized base-table record
    pub fn add_base_table(&mut self, record: StatementRecord) {
        self.summary.base_tables += 1;
        self.base_tables.push(record);
    }

    /// Add a diagnostic to the report
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => {}
        }

        self.diagnostics.push(diagnostic);
    }

    /// Look up a processed statement or base table by name
    pub fn record(&self, table_name: &str) -> Option<&StatementRecord> {
        self.statements
            .iter()
            .chain(self.base_tables.iter())
            .find(|record| record.table_name == table_name)
    }

    /// Check if any statement was skipped
    pub fn has_unprocessed(&self) -> bool {
        self.summary.statements_unprocessed > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Statement and base-table records as one JSON object keyed by table name
    ///
    /// This is the shape downstream graph builders consume.
    pub fn to_lineage_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .statements
            .iter()
            .chain(self.base_tables.iter())
            .filter_map(|record| {
                serde_json::to_value(record)
                    .ok()
                    .map(|value| (record.table_name.clone(), value))
            })
            .collect();
        serde_json::Value::Object(map)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for LineageReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;

    #[test]
    fn empty_report() {
        let report = LineageReport::new();
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.statements_total, 0);
        assert!(!report.has_unprocessed());
    }

    #[test]
    fn summary_counts() {
        let mut report = LineageReport::new();
        report.add_statement(StatementRecord::base_table("a", Vec::new()));
        report.add_unprocessed("b", "SQL parse error");
        report.add_diagnostic(Diagnostic::new(
            DiagnosticCode::SqlParseError,
            Severity::Error,
            "no dialect accepted the statement",
        ));
        report.add_diagnostic(Diagnostic::new(DiagnosticCode::Info, Severity::Info, "ok"));

        assert_eq!(report.summary.statements_total, 2);
        assert_eq!(report.summary.statements_processed, 1);
        assert_eq!(report.summary.statements_unprocessed, 1);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.warnings, 0);
        assert!(report.has_unprocessed());
    }

    #[test]
    fn lineage_json_is_keyed_by_table_name() {
        let mut report = LineageReport::new();
        report.add_base_table(StatementRecord::base_table("raw.users", vec!["id".to_string()]));

        let json = report.to_lineage_json();
        assert_eq!(json["raw.users"]["table_name"], "raw.users");
        assert!(report.record("raw.users").is_some());
    }

    #[test]
    fn report_serialization() {
        let report = LineageReport::new();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"unprocessed\""));
    }
}
