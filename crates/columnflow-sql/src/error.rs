//! Resolution error types

use crate::parser::ParseError;
use crate::phase::RunPhase;
use columnflow_core::{Diagnostic, DiagnosticCode, Severity};

/// A failure inside one of the resolution phases
///
/// Any of these marks the statement unprocessed; sibling statements in a
/// batch are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("Unsupported query construct: {0}")]
    UnsupportedSyntax(String),

    #[error("Relation '{0}' is already registered")]
    DuplicateRelation(String),

    #[error("Set operation branches produce {left} and {right} columns")]
    SetOperationArity { left: usize, right: usize },

    #[error("Phase {to} cannot follow {from}")]
    PhaseOrder { from: RunPhase, to: RunPhase },

    #[error("Statement exceeded its budget of {budget_ms} ms")]
    BudgetExceeded { budget_ms: u128 },
}

impl ResolutionError {
    /// Stable diagnostic code for this error
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::UnsupportedStatement(_) => DiagnosticCode::SqlUnsupportedStatement,
            Self::SetOperationArity { .. } => DiagnosticCode::SqlSetOperationArity,
            Self::BudgetExceeded { .. } => DiagnosticCode::SqlBudgetExceeded,
            Self::UnsupportedSyntax(_) | Self::DuplicateRelation(_) | Self::PhaseOrder { .. } => {
                DiagnosticCode::SqlResolutionError
            }
        }
    }
}

/// Anything that keeps a statement out of the output
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl LineageError {
    /// Convert to an error-severity diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Parse(err) => err.to_diagnostic(),
            Self::Resolution(err) => Diagnostic::new(err.code(), Severity::Error, err.to_string()),
        }
    }
}
