//! Table/alias resolution for FROM and JOIN items

use crate::collect::function_name;
use crate::context::{Candidate, RelationKind, Scope};
use crate::engine::StatementResolver;
use crate::error::ResolutionError;
use crate::parser::object_name;
use crate::subquery::{query_key, Hoisted};
use columnflow_core::DependencySet;
use indexmap::IndexMap;
use sqlparser::ast::{Expr, FunctionArg, FunctionArgExpr, TableAlias, TableFactor, TableWithJoins};

impl StatementResolver<'_> {
    /// Bind every FROM/JOIN item of the innermost scope
    pub(crate) fn resolve_tables(
        &mut self,
        from: &[TableWithJoins],
        hoisted: &Hoisted,
    ) -> Result<(), ResolutionError> {
        for table in from {
            self.bind_factor(&table.relation, hoisted)?;
            for join in &table.joins {
                self.bind_factor(&join.relation, hoisted)?;
            }
        }
        Ok(())
    }

    fn bind_factor(&mut self, factor: &TableFactor, hoisted: &Hoisted) -> Result<(), ResolutionError> {
        match factor {
            TableFactor::Table { name, alias, args, .. } => {
                if let Some(args) = args {
                    let function = function_name(name);
                    if function == "unnest" {
                        let sources: Vec<&Expr> = args.args.iter().filter_map(argument_expr).collect();
                        return self.bind_unnest(&sources, alias.as_ref());
                    }
                    self.bind_generator(&function, alias.as_ref());
                    return Ok(());
                }

                let raw = object_name(name);
                let alias = alias.as_ref().map(|alias| alias.name.value.as_str());
                let candidate = match self.visible_cte(&raw) {
                    Some(registered) => Candidate { name: registered, kind: RelationKind::Intermediate },
                    None => Candidate { name: self.ctx.fold_partition(&raw), kind: RelationKind::Base },
                };
                tracing::trace!(relation = %raw, canonical = %candidate.name, ?alias, "bound relation");
                bind_named(self.scope_mut(), candidate, &raw, alias);
            }
            TableFactor::Derived { subquery, alias, .. } => {
                let Some(registered) = hoisted.get(&query_key(subquery)) else {
                    return Err(ResolutionError::UnsupportedSyntax(format!(
                        "derived table was not hoisted: {}",
                        factor
                    )));
                };
                let candidate = Candidate { name: registered.clone(), kind: RelationKind::Intermediate };
                let alias = alias.as_ref().map(|alias| alias.name.value.clone());
                bind_named(self.scope_mut(), candidate, registered, alias.as_deref());
            }
            TableFactor::UNNEST { alias, array_exprs, .. } => {
                let sources: Vec<&Expr> = array_exprs.iter().collect();
                self.bind_unnest(&sources, alias.as_ref())?;
            }
            TableFactor::Function { name, args, alias, .. } => {
                let function = function_name(name);
                if function == "unnest" {
                    let sources: Vec<&Expr> = args.iter().filter_map(argument_expr).collect();
                    return self.bind_unnest(&sources, alias.as_ref());
                }
                self.bind_generator(&function, alias.as_ref());
            }
            TableFactor::TableFunction { alias, .. } => {
                self.bind_generator("table_function", alias.as_ref());
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.resolve_tables(std::slice::from_ref(table_with_joins.as_ref()), hoisted)?;
            }
            other => {
                return Err(ResolutionError::UnsupportedSyntax(format!("FROM item {}", other)));
            }
        }
        Ok(())
    }

    /// UNNEST: a virtual relation whose columns carry the source dependencies
    ///
    /// The unnested sources also decide how many rows come out, so they are
    /// added to the scope's referenced accumulator.
    fn bind_unnest(&mut self, sources: &[&Expr], alias: Option<&TableAlias>) -> Result<(), ResolutionError> {
        let mut per_source = Vec::with_capacity(sources.len());
        let mut combined = DependencySet::new();
        for source in sources {
            let deps = self.expression_dependencies(source)?;
            combined.absorb_flat(&deps);
            let mut flat = DependencySet::new();
            flat.absorb_flat(&deps);
            per_source.push(flat);
        }

        let name = alias
            .map(|alias| alias.name.value.clone())
            .unwrap_or_else(|| "unnest".to_string());
        let mut column_names = alias.map(alias_columns).unwrap_or_default();
        if column_names.is_empty() {
            column_names.push(name.clone());
        }

        let mut columns = IndexMap::new();
        for (index, column) in column_names.iter().enumerate() {
            let deps = if column_names.len() == per_source.len() {
                per_source[index].clone()
            } else {
                combined.clone()
            };
            columns.insert(column.clone(), deps);
        }

        let scope = self.scope_mut();
        scope.referenced.extend(combined.all().cloned());
        for (column, deps) in &columns {
            scope.virtual_columns.insert(column.clone(), deps.clone());
        }
        let candidate = Candidate { name: name.clone(), kind: RelationKind::Virtual(columns) };
        bind_named(scope, candidate, &name, None);
        Ok(())
    }

    /// Row generators produce values but no lineage
    fn bind_generator(&mut self, function: &str, alias: Option<&TableAlias>) {
        let name = alias
            .map(|alias| alias.name.value.clone())
            .unwrap_or_else(|| function.to_string());
        let mut columns = alias.map(alias_columns).unwrap_or_default();
        if columns.is_empty() {
            columns.push(name.clone());
        }
        tracing::trace!(function, relation = %name, "excluded row generator");

        let candidate = Candidate { name: name.clone(), kind: RelationKind::Generated(columns) };
        bind_named(self.scope_mut(), candidate, &name, None);
    }

    /// Innermost scope, created on first use
    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::default());
        }
        let innermost = self.scopes.len() - 1;
        &mut self.scopes[innermost]
    }
}

/// Bind a candidate under its alias, its written name and the name's last part
pub(crate) fn bind_named(scope: &mut Scope, candidate: Candidate, written: &str, alias: Option<&str>) {
    let canonical = candidate.name.clone();
    if let Some(alias) = alias {
        scope.aliases.insert(alias, canonical.as_str());
    }
    scope.aliases.insert_if_absent(written, canonical.as_str());
    if let Some((_, short)) = written.rsplit_once('.') {
        scope.aliases.insert_if_absent(short, canonical.as_str());
    }
    scope.aliases.insert_if_absent(canonical.as_str(), canonical.as_str());

    if !scope.candidates.iter().any(|c| c.name == canonical) {
        scope.candidates.push(candidate);
    }
}

/// Column names declared by `alias(c1, c2, ...)`
pub(crate) fn alias_columns(alias: &TableAlias) -> Vec<String> {
    alias
        .columns
        .iter()
        .filter_map(|column| {
            let rendered = column.to_string();
            rendered
                .split_whitespace()
                .next()
                .map(|name| name.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']').to_string())
        })
        .collect()
}

fn argument_expr(arg: &FunctionArg) -> Option<&Expr> {
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => Some(expr),
        FunctionArg::Named { arg: FunctionArgExpr::Expr(expr), .. } => Some(expr),
        _ => None,
    }
}
