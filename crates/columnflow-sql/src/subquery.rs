//! Subquery hoisting and shared-condition harvesting
//!
//! Derived tables in FROM/JOIN are resolved first and registered like CTEs.
//! Subqueries under predicates only gate rows; their flattened dependencies
//! are folded into the referenced accumulator.

use crate::collect::ExprMentions;
use crate::columns::{qualify, resolve_column};
use crate::engine::StatementResolver;
use crate::error::ResolutionError;
use crate::relations::alias_columns;
use columnflow_core::DependencySet;
use sqlparser::ast::{
    Ident, JoinConstraint, JoinOperator, OrderBy, Query, Select, TableFactor, TableWithJoins,
};
use std::collections::{BTreeSet, HashMap};

/// Derived-table query (by node identity) -> registered relation name
pub(crate) type Hoisted = HashMap<usize, String>;

/// Identity of a query node for the duration of one statement's resolution
pub(crate) fn query_key(query: &Query) -> usize {
    query as *const Query as usize
}

impl StatementResolver<'_> {
    /// Resolve and register every derived table in a FROM clause
    pub(crate) fn hoist_derived_tables(&mut self, from: &[TableWithJoins]) -> Result<Hoisted, ResolutionError> {
        let mut hoisted = Hoisted::new();
        for table in from {
            self.hoist_factor(&table.relation, &mut hoisted)?;
            for join in &table.joins {
                self.hoist_factor(&join.relation, &mut hoisted)?;
            }
        }
        Ok(hoisted)
    }

    fn hoist_factor(&mut self, factor: &TableFactor, hoisted: &mut Hoisted) -> Result<(), ResolutionError> {
        match factor {
            TableFactor::Derived { subquery, alias, .. } => {
                let output = self.resolve_query(subquery, false)?;
                let renames = alias.as_ref().map(alias_columns).unwrap_or_default();
                let name = match alias {
                    Some(alias) => self.ctx.registry.unique_name(&alias.name.value),
                    None => self.ctx.next_subquery_name(),
                };
                self.ctx.registry.register(name.clone(), output.into_entry(&renames))?;
                tracing::debug!(relation = %name, "hoisted derived table");
                hoisted.insert(query_key(subquery), name);
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.hoist_factor(&table_with_joins.relation, hoisted)?;
                for join in &table_with_joins.joins {
                    self.hoist_factor(&join.relation, hoisted)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Columns that decide which rows a SELECT produces
    ///
    /// Covers WHERE, JOIN conditions, GROUP BY, HAVING, QUALIFY and ORDER BY,
    /// plus anything the table resolver already put in the scope accumulator.
    pub(crate) fn harvest_conditions(
        &mut self,
        select: &Select,
        order_by: Option<&OrderBy>,
    ) -> Result<BTreeSet<String>, ResolutionError> {
        let mut harvested = BTreeSet::new();

        if let Some(selection) = &select.selection {
            self.harvest_mentions(ExprMentions::of(selection), &mut harvested)?;
        }
        for table in &select.from {
            self.harvest_joins(table, &mut harvested)?;
        }
        self.harvest_mentions(ExprMentions::of(&select.group_by), &mut harvested)?;
        if let Some(having) = &select.having {
            self.harvest_mentions(ExprMentions::of(having), &mut harvested)?;
        }
        if let Some(qualify) = &select.qualify {
            self.harvest_mentions(ExprMentions::of(qualify), &mut harvested)?;
        }
        if let Some(order_by) = order_by {
            self.harvest_mentions(ExprMentions::of(order_by), &mut harvested)?;
        }

        harvested.extend(self.scope_mut().referenced.iter().cloned());
        Ok(harvested)
    }

    fn harvest_joins(&mut self, table: &TableWithJoins, harvested: &mut BTreeSet<String>) -> Result<(), ResolutionError> {
        if let TableFactor::NestedJoin { table_with_joins, .. } = &table.relation {
            self.harvest_joins(table_with_joins, harvested)?;
        }
        for join in &table.joins {
            if let TableFactor::NestedJoin { table_with_joins, .. } = &join.relation {
                self.harvest_joins(table_with_joins, harvested)?;
            }
            if let Some(columns) = using_columns(&join.join_operator) {
                for column in columns {
                    self.harvest_using(&column.value, harvested);
                }
            }
            self.harvest_mentions(ExprMentions::of(&join.join_operator), harvested)?;
        }
        Ok(())
    }

    /// `USING (k)` names `k` on every joined relation that may have it
    fn harvest_using(&mut self, column: &str, harvested: &mut BTreeSet<String>) {
        let candidates = self.scope_mut().candidates.clone();
        for candidate in &candidates {
            if self.ctx.knowledge(candidate).excludes(column) {
                continue;
            }
            if let Some(deps) = qualify(&mut self.ctx, candidate, column) {
                harvested.extend(deps.all().cloned());
            }
        }
    }

    fn harvest_mentions(
        &mut self,
        mentions: ExprMentions,
        harvested: &mut BTreeSet<String>,
    ) -> Result<(), ResolutionError> {
        for mention in &mentions.columns {
            let deps = resolve_column(&mut self.ctx, &self.scopes, mention.qualifier.as_deref(), &mention.name);
            harvested.extend(deps.all().cloned());
        }
        for query in &mentions.subqueries {
            let deps = self.nested_query_dependencies(query)?;
            harvested.extend(deps.all().cloned());
        }
        Ok(())
    }

    /// Resolve a query nested in an expression and flatten its outputs
    ///
    /// The split is kept so a scalar subquery in a projection still reports
    /// its own filters as referenced. Base tables it reaches are credited to
    /// the enclosing scope.
    pub(crate) fn nested_query_dependencies(&mut self, query: &Query) -> Result<DependencySet, ResolutionError> {
        let output = self.resolve_query(query, false)?;

        let mut deps = DependencySet::new();
        for column in output.columns.values() {
            deps.absorb_defining(column);
        }
        deps.referenced.extend(output.harvested.iter().cloned());
        self.scope_mut().extra_base_tables.extend(output.base_tables);
        Ok(deps)
    }
}

fn using_columns(operator: &JoinOperator) -> Option<&[Ident]> {
    let constraint = match operator {
        JoinOperator::Inner(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint) => constraint,
        _ => return None,
    };
    match constraint {
        JoinConstraint::Using(columns) => Some(columns.as_slice()),
        _ => None,
    }
}
