//! Dialect-tolerant SQL parsing
//!
//! Tries an ordered list of grammar dialects and keeps the first parse that
//! succeeds, so scripts written for one warehouse still parse when the hint
//! is wrong or missing.

use columnflow_core::{Config, Diagnostic, DiagnosticCode, DialectConfig, Severity};
use sqlparser::ast::{ObjectName, Query, Statement};
use sqlparser::dialect::{
    BigQueryDialect, Dialect, DuckDbDialect, GenericDialect, HiveDialect, MySqlDialect,
    PostgreSqlDialect, RedshiftSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;

/// Build the sqlparser dialect for a configured dialect
pub fn dialect_for(dialect: DialectConfig) -> Box<dyn Dialect> {
    match dialect {
        DialectConfig::Postgres => Box::new(PostgreSqlDialect {}),
        DialectConfig::Generic => Box::new(GenericDialect {}),
        DialectConfig::BigQuery => Box::new(BigQueryDialect {}),
        DialectConfig::Snowflake => Box::new(SnowflakeDialect {}),
        DialectConfig::MySql => Box::new(MySqlDialect {}),
        DialectConfig::Hive => Box::new(HiveDialect {}),
        DialectConfig::DuckDb => Box::new(DuckDbDialect {}),
        DialectConfig::Redshift => Box::new(RedshiftSqlDialect {}),
    }
}

/// SQL parser with an ordered dialect fallback list
#[derive(Debug, Clone)]
pub struct SqlParser {
    dialects: Vec<DialectConfig>,
}

impl SqlParser {
    /// Postgres first, then the default fallbacks
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Use the config's dialect followed by its fallbacks
    pub fn from_config(config: &Config) -> Self {
        Self {
            dialects: config.dialect_order(),
        }
    }

    /// Try exactly these dialects, in order
    pub fn with_dialects(dialects: Vec<DialectConfig>) -> Self {
        Self { dialects }
    }

    /// Parser that only accepts a single dialect
    pub fn single(dialect: DialectConfig) -> Self {
        Self::with_dialects(vec![dialect])
    }

    /// Dialects tried when no hint is given
    pub fn dialects(&self) -> &[DialectConfig] {
        &self.dialects
    }

    /// Parse one statement, trying `hint` before the configured dialects
    pub fn parse(&self, sql: &str, hint: Option<DialectConfig>) -> Result<ParsedSql, ParseError> {
        let mut attempted = Vec::new();
        let mut last_error = String::new();

        for dialect in hint.into_iter().chain(self.dialects.iter().copied()) {
            if attempted.contains(&dialect) {
                continue;
            }
            attempted.push(dialect);

            match Parser::parse_sql(&*dialect_for(dialect), sql) {
                Ok(mut statements) => {
                    return match statements.len() {
                        0 => Err(ParseError::Empty),
                        1 => {
                            let statement = statements.remove(0);
                            tracing::trace!(%dialect, "parsed statement");
                            Ok(ParsedSql {
                                sql: sql.to_string(),
                                statement,
                                dialect,
                            })
                        }
                        count => Err(ParseError::MultipleStatements(count)),
                    };
                }
                Err(e) => {
                    tracing::trace!(%dialect, error = %e, "dialect rejected statement");
                    last_error = e.to_string();
                }
            }
        }

        Err(ParseError::NoDialect {
            attempted,
            message: last_error,
        })
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Original SQL string
    pub sql: String,

    /// The parsed statement
    pub statement: Statement,

    /// Dialect that accepted the statement
    pub dialect: DialectConfig,
}

impl ParsedSql {
    /// Get the query if this is a plain SELECT statement
    pub fn as_query(&self) -> Option<&Query> {
        match &self.statement {
            Statement::Query(query) => Some(query.as_ref()),
            _ => None,
        }
    }

    /// Relation written by the statement, if any
    pub fn target(&self) -> Option<String> {
        statement_target(&self.statement)
    }
}

/// Relation written by `CREATE TABLE .. AS`, `CREATE VIEW .. AS` or `INSERT .. SELECT`
pub fn statement_target(statement: &Statement) -> Option<String> {
    match statement {
        Statement::CreateTable(create) => Some(object_name(&create.name)),
        Statement::CreateView { name, .. } => Some(object_name(name)),
        Statement::Insert(insert) => Some(object_name(&insert.table_name)),
        _ => None,
    }
}

/// Dotted name built from identifier values (quotes stripped)
pub fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// SQL parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("SQL parse error (tried {}): {message}", dialect_list(.attempted))]
    NoDialect {
        attempted: Vec<DialectConfig>,
        message: String,
    },

    #[error("Input contains no SQL statement")]
    Empty,

    #[error("Expected one statement, found {0}")]
    MultipleStatements(usize),
}

fn dialect_list(dialects: &[DialectConfig]) -> String {
    dialects
        .iter()
        .map(DialectConfig::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ParseError {
    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(DiagnosticCode::SqlParseError, Severity::Error, self.to_string())
    }

    /// Check if this is an unsupported syntax error
    pub fn is_unsupported_syntax(&self) -> bool {
        match self {
            Self::NoDialect { message, .. } => {
                let message = message.to_lowercase();
                message.contains("expected") || message.contains("unexpected")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_select() {
        let parser = SqlParser::new();
        let parsed = parser.parse("SELECT id, name FROM users WHERE active = true", None).unwrap();

        assert_eq!(parsed.dialect, DialectConfig::Postgres);
        assert!(parsed.as_query().is_some());
        assert_eq!(parsed.target(), None);
    }

    #[test]
    fn hint_is_tried_first() {
        let parser = SqlParser::new();
        let parsed = parser.parse("SELECT id FROM users", Some(DialectConfig::Snowflake)).unwrap();

        assert_eq!(parsed.dialect, DialectConfig::Snowflake);
    }

    #[test]
    fn falls_back_to_another_dialect() {
        // Backtick identifiers are rejected by the Postgres grammar
        let parser = SqlParser::with_dialects(vec![DialectConfig::Postgres, DialectConfig::MySql]);
        let parsed = parser.parse("SELECT `id` FROM `users`", None).unwrap();

        assert_eq!(parsed.dialect, DialectConfig::MySql);
    }

    #[test]
    fn parse_invalid_sql() {
        let parser = SqlParser::new();
        let err = parser.parse("SELECT FROM WHERE", None).unwrap_err();

        match &err {
            ParseError::NoDialect { attempted, .. } => {
                assert_eq!(attempted.len(), parser.dialects().len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_unsupported_syntax());

        let diag = err.to_diagnostic();
        assert_eq!(diag.code, DiagnosticCode::SqlParseError);
        assert_eq!(diag.severity, Severity::Error);
    }

    #[test]
    fn multiple_statements_are_rejected() {
        let parser = SqlParser::new();
        let err = parser.parse("SELECT 1; SELECT 2", None).unwrap_err();

        assert!(matches!(err, ParseError::MultipleStatements(2)));
    }

    #[test]
    fn empty_input_is_rejected() {
        let parser = SqlParser::new();
        assert!(matches!(parser.parse("  ", None), Err(ParseError::Empty)));
    }

    #[test]
    fn targets_of_ddl_and_dml() {
        let parser = SqlParser::new();

        let create = parser.parse("CREATE TABLE analytics.daily AS SELECT 1 AS x", None).unwrap();
        assert_eq!(create.target().as_deref(), Some("analytics.daily"));

        let view = parser.parse("CREATE VIEW v AS SELECT a FROM t", None).unwrap();
        assert_eq!(view.target().as_deref(), Some("v"));

        let insert = parser.parse("INSERT INTO sink SELECT a FROM t", None).unwrap();
        assert_eq!(insert.target().as_deref(), Some("sink"));
    }
}
