//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // SQL resolution issues (3xxx)
    /// No dialect in the fallback list could parse the statement
    SqlParseError,

    /// A resolution phase failed and the statement was skipped
    SqlResolutionError,

    /// Statement kind carries no lineage (DELETE, GRANT, ...)
    SqlUnsupportedStatement,

    /// `*` could not be expanded because the relation's columns are unknown
    SqlSelectStarUnexpandable,

    /// An unqualified column matched zero or several candidate relations
    SqlAmbiguousColumn,

    /// Set-operation branches produce different column counts
    SqlSetOperationArity,

    /// Statement exceeded its wall-clock resolution budget
    SqlBudgetExceeded,

    // Catalog issues (4xxx)
    /// Catalog lookup failed or returned no columns
    CatalogLookupFailed,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::SqlResolutionError => "SQL_RESOLUTION_ERROR",
            Self::SqlUnsupportedStatement => "SQL_UNSUPPORTED_STATEMENT",
            Self::SqlSelectStarUnexpandable => "SQL_SELECT_STAR_UNEXPANDABLE",
            Self::SqlAmbiguousColumn => "SQL_AMBIGUOUS_COLUMN",
            Self::SqlSetOperationArity => "SQL_SET_OPERATION_ARITY",
            Self::SqlBudgetExceeded => "SQL_BUDGET_EXCEEDED",
            Self::CatalogLookupFailed => "CATALOG_LOOKUP_FAILED",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - precision was degraded but the statement was processed
    Warn,

    /// Error - the statement was excluded from the output
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Name of the statement the diagnostic belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,

    /// Relation the diagnostic is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,

    /// Column the diagnostic is about, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            statement: None,
            relation: None,
            column: None,
        }
    }

    /// Attach the statement name
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Attach the relation name
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Attach the column name
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::SqlParseError.as_str(), "SQL_PARSE_ERROR");
        assert_eq!(DiagnosticCode::SqlSetOperationArity.as_str(), "SQL_SET_OPERATION_ARITY");
        assert_eq!(DiagnosticCode::CatalogLookupFailed.as_str(), "CATALOG_LOOKUP_FAILED");
    }

    #[test]
    fn serde_name_matches_as_str() {
        let json = serde_json::to_string(&DiagnosticCode::SqlSelectStarUnexpandable).unwrap();
        assert_eq!(json, "\"SQL_SELECT_STAR_UNEXPANDABLE\"");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            DiagnosticCode::SqlAmbiguousColumn,
            Severity::Info,
            "Column 'id' matches more than one relation",
        )
        .with_statement("orders_summary")
        .with_column("id");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("SQL_AMBIGUOUS_COLUMN"));
        assert!(json.contains("\"info\""));
        assert!(json.contains("orders_summary"));
        assert!(!json.contains("relation"));
    }
}
