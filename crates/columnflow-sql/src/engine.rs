//! Statement-level lineage resolution
//!
//! [`LineageEngine`] is the public entry point. Each call builds a fresh
//! [`StatementResolver`] that owns all run-scoped state, drives the phase
//! state machine, and is dropped when the statement is done.

use crate::context::{ResolutionContext, Scope};
use crate::error::{LineageError, ResolutionError};
use crate::parser::{statement_target, SqlParser};
use crate::phase::{RunPhase, RunState};
use crate::registry::RelationEntry;
use columnflow_catalog::{CatalogProvider, PartitionResolver};
use columnflow_core::{ColumnDict, Config, DialectConfig, InputTableDict, LineageResult};
use sqlparser::ast::{Expr, OrderBy, Query, Select, SetExpr, Statement};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Column lineage resolver for single statements
#[derive(Clone)]
pub struct LineageEngine {
    parser: SqlParser,
    catalog: Option<Arc<dyn CatalogProvider>>,
    partitions: Option<Arc<dyn PartitionResolver>>,
    budget: Option<Duration>,
}

impl LineageEngine {
    /// Engine with the default dialect order and no collaborators
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Engine using the config's dialects and statement budget
    pub fn from_config(config: &Config) -> Self {
        Self {
            parser: SqlParser::from_config(config),
            catalog: None,
            partitions: None,
            budget: config.statement_budget(),
        }
    }

    /// Consult `catalog` for relations missing from the input tables
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogProvider>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Fold partition children onto their parents
    pub fn with_partitions(mut self, partitions: Arc<dyn PartitionResolver>) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Abort statements that take longer than `budget`
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn parser(&self) -> &SqlParser {
        &self.parser
    }

    pub fn catalog(&self) -> Option<&dyn CatalogProvider> {
        self.catalog.as_deref()
    }

    /// Parse and resolve one SQL statement
    pub fn resolve_sql(
        &self,
        sql: &str,
        hint: Option<DialectConfig>,
        inputs: &InputTableDict,
    ) -> Result<LineageResult, LineageError> {
        let parsed = self.parser.parse(sql, hint)?;
        Ok(self.resolve_statement(&parsed.statement, inputs)?)
    }

    /// Resolve an already-parsed statement
    pub fn resolve_statement(
        &self,
        statement: &Statement,
        inputs: &InputTableDict,
    ) -> Result<LineageResult, ResolutionError> {
        let ctx = ResolutionContext::new(inputs, self.catalog.as_deref(), self.partitions.as_deref());
        StatementResolver::new(ctx, self.budget).run(statement)
    }
}

impl Default for LineageEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// What resolving one query body produced
#[derive(Debug, Clone, Default)]
pub(crate) struct RelationOutput {
    pub columns: ColumnDict,
    pub base_tables: BTreeSet<String>,
    /// First projection item is an aggregate call
    pub first_is_aggregate: bool,
    /// Row-gating columns harvested from the body's own clauses
    pub harvested: BTreeSet<String>,
}

impl RelationOutput {
    /// Registry entry, renaming columns positionally when `renames` is non-empty
    pub fn into_entry(self, renames: &[String]) -> RelationEntry {
        RelationEntry {
            columns: rename_columns(self.columns, renames),
            base_tables: self.base_tables,
        }
    }
}

/// Rename the leading columns to `renames`; extra names are ignored
pub(crate) fn rename_columns(columns: ColumnDict, renames: &[String]) -> ColumnDict {
    if renames.is_empty() {
        return columns;
    }
    let mut renamed = ColumnDict::new();
    for (index, (name, deps)) in columns.into_iter().enumerate() {
        let name = renames.get(index).cloned().unwrap_or(name);
        renamed.insert(name, deps);
    }
    renamed
}

/// One statement's resolution run
pub(crate) struct StatementResolver<'a> {
    pub(crate) ctx: ResolutionContext<'a>,
    /// Innermost SELECT last
    pub(crate) scopes: Vec<Scope>,
    /// Visible CTE name -> registry name, innermost WITH last
    pub(crate) cte_frames: Vec<IndexMap<String, String>>,
    pub(crate) run: RunState,
}

impl<'a> StatementResolver<'a> {
    pub(crate) fn new(ctx: ResolutionContext<'a>, budget: Option<Duration>) -> Self {
        Self {
            ctx,
            scopes: Vec::new(),
            cte_frames: Vec::new(),
            run: RunState::new(budget),
        }
    }

    pub(crate) fn run(mut self, statement: &Statement) -> Result<LineageResult, ResolutionError> {
        match self.run_phases(statement) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::debug!(phase = %self.run.phase(), error = %e, "statement unprocessed");
                self.run.fail();
                Err(e)
            }
        }
    }

    fn run_phases(&mut self, statement: &Statement) -> Result<LineageResult, ResolutionError> {
        let (query, renames) = statement_query(statement)?;
        let output = self.resolve_query(query, true)?;
        self.run.advance(RunPhase::Done)?;

        Ok(LineageResult {
            table_list: output.base_tables,
            column_dict: rename_columns(output.columns, &renames),
            target: statement_target(statement),
            diagnostics: std::mem::take(&mut self.ctx.diagnostics),
        })
    }

    /// Resolve a full query: its WITH clause, then its body
    ///
    /// `track` drives the run state machine and is only set for the
    /// statement's outermost query.
    pub(crate) fn resolve_query(&mut self, query: &Query, track: bool) -> Result<RelationOutput, ResolutionError> {
        self.run.check_budget()?;

        if track {
            self.run.advance(RunPhase::CteResolution)?;
        }
        let pushed = match &query.with {
            Some(with) => {
                self.resolve_with(with)?;
                true
            }
            None => false,
        };

        let output = self.resolve_body(&query.body, query.order_by.as_ref(), track);

        if pushed {
            self.cte_frames.pop();
        }
        output
    }

    fn resolve_body(
        &mut self,
        body: &SetExpr,
        order_by: Option<&OrderBy>,
        track: bool,
    ) -> Result<RelationOutput, ResolutionError> {
        if let SetExpr::Select(select) = body {
            return self.resolve_select(select, order_by, track);
        }

        if track {
            self.run.advance(RunPhase::SubqueryHoisting)?;
            self.run.advance(RunPhase::TableResolution)?;
            self.run.advance(RunPhase::SharedConditionHarvest)?;
        }
        let output = match body {
            SetExpr::SetOperation { .. } => self.merge_set_operation(body, order_by)?,
            SetExpr::Query(inner) => self.resolve_query(inner, false)?,
            SetExpr::Values(values) => self.resolve_values(&values.rows)?,
            other => {
                return Err(ResolutionError::UnsupportedSyntax(format!(
                    "query body {}",
                    other
                )))
            }
        };
        if track {
            self.run.advance(RunPhase::ProjectionResolution)?;
        }
        Ok(output)
    }

    /// Resolve one SELECT in its own scope
    pub(crate) fn resolve_select(
        &mut self,
        select: &Select,
        order_by: Option<&OrderBy>,
        track: bool,
    ) -> Result<RelationOutput, ResolutionError> {
        self.scopes.push(Scope::default());
        let output = self.resolve_select_in_scope(select, order_by, track);
        self.scopes.pop();
        output
    }

    fn resolve_select_in_scope(
        &mut self,
        select: &Select,
        order_by: Option<&OrderBy>,
        track: bool,
    ) -> Result<RelationOutput, ResolutionError> {
        if track {
            self.run.advance(RunPhase::SubqueryHoisting)?;
        }
        let hoisted = self.hoist_derived_tables(&select.from)?;

        if track {
            self.run.advance(RunPhase::TableResolution)?;
        }
        self.resolve_tables(&select.from, &hoisted)?;

        if track {
            self.run.advance(RunPhase::SharedConditionHarvest)?;
        }
        let mut harvested = self.harvest_conditions(select, order_by)?;

        if track {
            self.run.advance(RunPhase::ProjectionResolution)?;
        }
        let columns = self.resolve_projection(&select.projection, &mut harvested)?;

        Ok(RelationOutput {
            columns,
            base_tables: self.scope_base_tables(),
            first_is_aggregate: crate::projection::first_is_aggregate(&select.projection),
            harvested,
        })
    }

    /// `VALUES` rows: one output per position, named `_col_<index>`
    pub(crate) fn resolve_values(&mut self, rows: &[Vec<Expr>]) -> Result<RelationOutput, ResolutionError> {
        let width = rows.first().map_or(0, Vec::len);
        let mut columns = ColumnDict::new();

        for index in 0..width {
            let mut deps = columnflow_core::DependencySet::new();
            for row in rows {
                if let Some(expr) = row.get(index) {
                    deps.absorb_defining(&self.expression_dependencies(expr)?);
                }
            }
            columns.insert(format!("_col_{}", index), deps);
        }

        Ok(RelationOutput {
            columns,
            ..RelationOutput::default()
        })
    }

    /// Base tables reached by the innermost scope
    fn scope_base_tables(&self) -> BTreeSet<String> {
        let Some(scope) = self.scopes.last() else {
            return BTreeSet::new();
        };

        let mut tables = scope.extra_base_tables.clone();
        for candidate in &scope.candidates {
            match candidate.kind {
                crate::context::RelationKind::Base => {
                    tables.insert(candidate.name.clone());
                }
                crate::context::RelationKind::Intermediate => {
                    if let Some(entry) = self.ctx.registry.get(&candidate.name) {
                        tables.extend(entry.base_tables.iter().cloned());
                    }
                }
                _ => {}
            }
        }
        tables
    }
}

/// The query a statement's lineage comes from, plus explicit output names
fn statement_query(statement: &Statement) -> Result<(&Query, Vec<String>), ResolutionError> {
    match statement {
        Statement::Query(query) => Ok((query.as_ref(), Vec::new())),
        Statement::CreateTable(create) => match &create.query {
            Some(query) => Ok((query.as_ref(), Vec::new())),
            None => Err(ResolutionError::UnsupportedStatement(
                "CREATE TABLE without AS SELECT".to_string(),
            )),
        },
        Statement::CreateView { query, columns, .. } => Ok((
            query.as_ref(),
            columns.iter().map(|column| column.name.value.clone()).collect(),
        )),
        Statement::Insert(insert) => match &insert.source {
            Some(query) => Ok((
                query.as_ref(),
                insert.columns.iter().map(|column| column.value.clone()).collect(),
            )),
            None => Err(ResolutionError::UnsupportedStatement(
                "INSERT without a source query".to_string(),
            )),
        },
        other => Err(ResolutionError::UnsupportedStatement(statement_kind(other))),
    }
}

/// Leading keywords of a statement, for error messages
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use columnflow_core::DependencySet;
    use pretty_assertions::assert_eq;

    fn resolve(sql: &str, inputs: &InputTableDict) -> LineageResult {
        LineageEngine::new().resolve_sql(sql, None, inputs).unwrap()
    }

    #[test]
    fn simple_qualified_column() {
        let result = resolve("SELECT t.a FROM t", &InputTableDict::new());

        assert_eq!(result.column_dict["a"], DependencySet::defining("t.a"));
        assert_eq!(result.table_list.into_iter().collect::<Vec<_>>(), vec!["t"]);
    }

    #[test]
    fn create_view_renames_outputs() {
        let result = resolve("CREATE VIEW v (x, y) AS SELECT a, b FROM t", &InputTableDict::new());

        assert_eq!(result.target.as_deref(), Some("v"));
        assert_eq!(result.column_names(), vec!["x", "y"]);
        assert_eq!(result.column_dict["y"], DependencySet::defining("t.b"));
    }

    #[test]
    fn create_view_renames_repeated_aggregates() {
        let result = resolve("CREATE VIEW v (sa, sb) AS SELECT SUM(a), SUM(b) FROM t", &InputTableDict::new());

        assert_eq!(result.column_names(), vec!["sa", "sb"]);
        assert_eq!(result.column_dict["sa"], DependencySet::defining("t.a"));
        assert_eq!(result.column_dict["sb"], DependencySet::defining("t.b"));
    }

    #[test]
    fn insert_select_uses_target_columns() {
        let result = resolve("INSERT INTO sink (k) SELECT id FROM src", &InputTableDict::new());

        assert_eq!(result.target.as_deref(), Some("sink"));
        assert_eq!(result.column_dict["k"], DependencySet::defining("src.id"));
    }

    #[test]
    fn unsupported_statement_is_an_error() {
        let err = LineageEngine::new()
            .resolve_sql("DELETE FROM t WHERE a = 1", None, &InputTableDict::new())
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::Resolution(ResolutionError::UnsupportedStatement(_))
        ));
    }

    #[test]
    fn values_body_has_positional_names() {
        let result = resolve("SELECT * FROM (VALUES (1, 'a')) AS v", &InputTableDict::new());

        assert_eq!(result.column_names(), vec!["_col_0", "_col_1"]);
        assert!(result.table_list.is_empty());
    }

    #[test]
    fn zero_budget_marks_statement_unprocessed() {
        let engine = LineageEngine::new().with_budget(Duration::ZERO);

        let err = engine
            .resolve_sql("SELECT a FROM t", None, &InputTableDict::new())
            .unwrap_err();
        assert!(matches!(
            err,
            LineageError::Resolution(ResolutionError::BudgetExceeded { .. })
        ));
    }
}
