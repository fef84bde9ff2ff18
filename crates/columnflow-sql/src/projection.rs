//! Projection resolution
//!
//! Each SELECT-list item is classified into a [`ProjectionKind`], named, and
//! resolved to its dependency pair. The row-gating columns harvested for the
//! SELECT are added to every item's referenced half.

use crate::collect::{function_name, star_argument, ExprMentions};
use crate::columns::{qualify, resolve_column};
use crate::context::{Candidate, RelationKind, ResolutionContext};
use crate::engine::StatementResolver;
use crate::error::ResolutionError;
use crate::parser::object_name;
use columnflow_core::{ColumnDict, DependencySet, Diagnostic, DiagnosticCode, Severity, STAR_SUFFIX};
use sqlparser::ast::{Expr, Function, SelectItem};
use std::collections::BTreeSet;

/// Aggregates whose `*` argument expands to the relation's columns
const STAR_AGGREGATES: &[&str] = &["count", "avg", "max", "min", "sum"];

const AGGREGATES: &[&str] = &[
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "array_agg",
    "string_agg",
    "listagg",
    "group_concat",
    "any_value",
    "approx_count_distinct",
    "count_if",
    "countif",
    "stddev",
    "variance",
    "median",
    "bool_and",
    "bool_or",
    "json_agg",
    "jsonb_agg",
    "collect_list",
    "collect_set",
];

const ARRAY_CONSTRUCTORS: &[&str] = &["array", "array_construct", "make_array"];

/// What a SELECT-list item is, for dependency purposes
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProjectionKind<'q> {
    /// `COUNT(*)`, `SUM(t.*)` and the like
    AggregateOfStar { function: String, qualifier: Option<String> },
    /// `ARRAY[a, b]`
    ArrayOfColumns(&'q Expr),
    /// Bare `*`
    Star,
    /// `alias.*`
    QualifiedStar(String),
    /// Anything that mentions columns or nested queries
    Expression(&'q Expr),
    /// No column mention at all
    Literal,
}

impl<'q> ProjectionKind<'q> {
    pub fn classify(item: &'q SelectItem) -> Self {
        let expr = match item {
            SelectItem::Wildcard(_) => return Self::Star,
            SelectItem::QualifiedWildcard(name, _) => return Self::QualifiedStar(object_name(name)),
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => expr,
        };

        if let Expr::Function(function) = expr {
            let name = function_name(&function.name);
            if STAR_AGGREGATES.contains(&name.as_str()) {
                if let Some(qualifier) = star_argument(&function.args) {
                    return Self::AggregateOfStar { function: name, qualifier };
                }
            }
        }
        if is_array_construction(expr) {
            return Self::ArrayOfColumns(expr);
        }

        if ExprMentions::of(expr).is_empty() {
            Self::Literal
        } else {
            Self::Expression(expr)
        }
    }
}

fn is_array_construction(expr: &Expr) -> bool {
    match expr {
        Expr::Array(_) => true,
        Expr::Function(Function { name, .. }) => ARRAY_CONSTRUCTORS.contains(&function_name(name).as_str()),
        _ => false,
    }
}

/// True if the first SELECT item is an aggregate call
pub(crate) fn first_is_aggregate(projection: &[SelectItem]) -> bool {
    let expr = match projection.first() {
        Some(SelectItem::UnnamedExpr(expr)) | Some(SelectItem::ExprWithAlias { expr, .. }) => expr,
        _ => return false,
    };
    match unwrap_expr(expr) {
        Expr::Function(function) => AGGREGATES.contains(&function_name(&function.name).as_str()),
        _ => false,
    }
}

fn unwrap_expr(expr: &Expr) -> &Expr {
    match expr {
        Expr::Cast { expr, .. } | Expr::Nested(expr) => unwrap_expr(expr),
        other => other,
    }
}

/// Output name for an unaliased expression
fn expression_name(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => match idents.last() {
            Some(ident) => ident.value.clone(),
            None => format!("_col_{}", index),
        },
        Expr::Cast { expr, .. } | Expr::Nested(expr) => expression_name(expr, index),
        Expr::Function(function) => {
            let name = function_name(&function.name);
            if name.is_empty() {
                format!("_col_{}", index)
            } else {
                name
            }
        }
        _ => format!("_col_{}", index),
    }
}

fn item_name(item: &SelectItem, index: usize) -> String {
    match item {
        SelectItem::ExprWithAlias { alias, .. } => alias.value.clone(),
        SelectItem::UnnamedExpr(expr) => expression_name(expr, index),
        _ => format!("_col_{}", index),
    }
}

/// Derived names already used in this SELECT list fall back to `_col_<index>`
fn unique_name(name: String, index: usize, columns: &ColumnDict) -> String {
    if columns.contains_key(&name) {
        format!("_col_{}", index)
    } else {
        name
    }
}

/// Record an item; explicit aliases are also remembered for later items
fn insert_item(item: &SelectItem, index: usize, deps: DependencySet, columns: &mut ColumnDict, aliases: &mut ColumnDict) {
    let name = match item {
        SelectItem::ExprWithAlias { alias, .. } => {
            aliases.insert(alias.value.clone(), deps.clone());
            alias.value.clone()
        }
        _ => unique_name(item_name(item, index), index, columns),
    };
    columns.insert(name, deps);
}

impl StatementResolver<'_> {
    /// Resolve a SELECT list in the innermost scope
    ///
    /// `harvested` is rewritten by the alias post-pass before being folded
    /// into every item.
    pub(crate) fn resolve_projection(
        &mut self,
        projection: &[SelectItem],
        harvested: &mut BTreeSet<String>,
    ) -> Result<ColumnDict, ResolutionError> {
        let mut columns = ColumnDict::new();
        let mut aliases = ColumnDict::new();

        for (index, item) in projection.iter().enumerate() {
            match ProjectionKind::classify(item) {
                ProjectionKind::Star => {
                    for candidate in self.scope_mut().candidates.clone() {
                        self.expand_star(&candidate, None, &mut columns);
                    }
                }
                ProjectionKind::QualifiedStar(qualifier) => match self.find_candidate(&qualifier) {
                    Some(candidate) => self.expand_star(&candidate, Some(&qualifier), &mut columns),
                    None => {
                        let canonical = self.ctx.fold_partition(&qualifier);
                        self.note_unexpanded(&canonical);
                        columns.insert(
                            format!("{}{}", qualifier, STAR_SUFFIX),
                            DependencySet::defining(format!("{}{}", canonical, STAR_SUFFIX)),
                        );
                    }
                },
                ProjectionKind::AggregateOfStar { function, qualifier } => {
                    let deps = self.star_dependencies(qualifier.as_deref(), false);
                    let name = match item {
                        SelectItem::ExprWithAlias { alias, .. } => alias.value.clone(),
                        _ => unique_name(function, index, &columns),
                    };
                    columns.insert(name, deps);
                }
                ProjectionKind::ArrayOfColumns(expr) => {
                    let mut deps = DependencySet::new();
                    deps.absorb_flat(&self.aliased_dependencies(expr, &aliases)?);
                    insert_item(item, index, deps, &mut columns, &mut aliases);
                }
                ProjectionKind::Expression(expr) => {
                    let deps = self.aliased_dependencies(expr, &aliases)?;
                    insert_item(item, index, deps, &mut columns, &mut aliases);
                }
                ProjectionKind::Literal => {
                    insert_item(item, index, DependencySet::new(), &mut columns, &mut aliases);
                }
            }
        }

        self.substitute_aliases(&aliases, harvested);
        for deps in columns.values_mut() {
            deps.referenced.extend(harvested.iter().cloned());
        }
        Ok(columns)
    }

    /// Dependencies of an expression with no SELECT-list aliases in play
    pub(crate) fn expression_dependencies(&mut self, expr: &Expr) -> Result<DependencySet, ResolutionError> {
        self.aliased_dependencies(expr, &ColumnDict::new())
    }

    /// Dependencies of an expression that may reuse earlier aliases
    ///
    /// An unqualified name matching an earlier alias resolves to the alias
    /// unless a relation in the innermost scope provably has that column.
    fn aliased_dependencies(&mut self, expr: &Expr, aliases: &ColumnDict) -> Result<DependencySet, ResolutionError> {
        let mentions = ExprMentions::of(expr);
        let mut deps = DependencySet::new();

        for mention in &mentions.columns {
            if mention.qualifier.is_none() {
                if let Some(alias_deps) = lookup(aliases, &mention.name) {
                    if !self.provably_has(&mention.name) {
                        deps.absorb_defining(alias_deps);
                        continue;
                    }
                }
            }
            let resolved = resolve_column(&mut self.ctx, &self.scopes, mention.qualifier.as_deref(), &mention.name);
            deps.absorb_defining(&resolved);
        }

        for star in &mentions.star_arguments {
            let expanded = self.star_dependencies(star.qualifier.as_deref(), true);
            deps.absorb_defining(&expanded);
        }

        for query in &mentions.subqueries {
            let nested = self.nested_query_dependencies(query)?;
            deps.absorb_defining(&nested);
        }

        Ok(deps)
    }

    /// Dependencies of `f(*)` or `f(q.*)`
    ///
    /// Unqualified stars expand to every column of every candidate when the
    /// aggregate is itself a SELECT item; inside a larger expression each
    /// candidate contributes a `rel.*` placeholder.
    fn star_dependencies(&mut self, qualifier: Option<&str>, in_expression: bool) -> DependencySet {
        let mut deps = DependencySet::new();
        match qualifier {
            Some(qualifier) => match self.find_candidate(qualifier) {
                Some(candidate) => deps.absorb_defining(&self.relation_dependencies(&candidate)),
                None => {
                    let canonical = self.ctx.fold_partition(qualifier);
                    deps.defining.insert(format!("{}{}", canonical, STAR_SUFFIX));
                }
            },
            None => {
                for candidate in self.scope_mut().candidates.clone() {
                    if in_expression {
                        if !matches!(candidate.kind, RelationKind::Generated(_)) {
                            deps.defining.insert(format!("{}{}", candidate.name, STAR_SUFFIX));
                        }
                    } else {
                        deps.absorb_defining(&self.relation_dependencies(&candidate));
                    }
                }
            }
        }
        deps
    }

    /// Union over every column of one relation, or a placeholder if unknown
    fn relation_dependencies(&mut self, candidate: &Candidate) -> DependencySet {
        let mut deps = DependencySet::new();
        match relation_columns(&mut self.ctx, candidate) {
            Some(columns) => {
                for column in columns.values() {
                    deps.absorb_defining(column);
                }
            }
            None => {
                deps.defining.insert(format!("{}{}", candidate.name, STAR_SUFFIX));
            }
        }
        deps
    }

    /// One output entry per column of `candidate`
    fn expand_star(&mut self, candidate: &Candidate, qualifier: Option<&str>, columns: &mut ColumnDict) {
        match relation_columns(&mut self.ctx, candidate) {
            Some(expanded) => {
                for (name, deps) in expanded {
                    columns.insert(name, deps);
                }
            }
            None => {
                self.note_unexpanded(&candidate.name);
                let key = qualifier.unwrap_or(&candidate.name);
                columns.insert(
                    format!("{}{}", key, STAR_SUFFIX),
                    DependencySet::defining(format!("{}{}", candidate.name, STAR_SUFFIX)),
                );
            }
        }
    }

    fn note_unexpanded(&mut self, relation: &str) {
        self.ctx.note(
            Diagnostic::new(
                DiagnosticCode::SqlSelectStarUnexpandable,
                Severity::Warn,
                format!("columns of '{}' are unknown; emitting a placeholder", relation),
            )
            .with_relation(relation),
        );
    }

    /// Candidate for a qualifier, innermost scope first
    fn find_candidate(&self, qualifier: &str) -> Option<Candidate> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.find(qualifier))
            .cloned()
    }

    /// Some relation in the innermost scope is known to have `column`
    fn provably_has(&mut self, column: &str) -> bool {
        let candidates = self.scope_mut().candidates.clone();
        candidates
            .iter()
            .any(|candidate| self.ctx.knowledge(candidate).matching(column).is_some())
    }

    /// Alias post-pass
    ///
    /// A harvested reference to an alias from this SELECT list (ORDER BY
    /// total) was resolved as if it were a column. Swap every such guess for
    /// the alias's own dependencies so the result bottoms out at base columns.
    fn substitute_aliases(&mut self, aliases: &ColumnDict, harvested: &mut BTreeSet<String>) {
        for (alias, deps) in aliases {
            if self.provably_has(alias) {
                continue;
            }

            let mut guesses = vec![alias.clone()];
            for candidate in self.scope_mut().candidates.clone() {
                guesses.push(format!("{}.{}", candidate.name, alias));
            }

            let mut found = false;
            for guess in &guesses {
                found |= harvested.remove(guess);
            }
            if found {
                tracing::trace!(alias = %alias, "substituted alias in referenced set");
                harvested.extend(deps.all().cloned());
            }
        }
    }
}

/// Output columns of a relation, or `None` if they are unknown
fn relation_columns(ctx: &mut ResolutionContext<'_>, candidate: &Candidate) -> Option<ColumnDict> {
    match &candidate.kind {
        RelationKind::Base => {
            let known = ctx.base_columns(&candidate.name)?;
            Some(
                known
                    .into_iter()
                    .map(|column| {
                        let deps = DependencySet::defining(format!("{}.{}", candidate.name, column));
                        (column, deps)
                    })
                    .collect(),
            )
        }
        RelationKind::Intermediate => ctx.registry.get(&candidate.name).map(|entry| entry.columns.clone()),
        RelationKind::Virtual(columns) => Some(columns.clone()),
        RelationKind::Generated(columns) => Some(
            columns
                .iter()
                .filter_map(|column| qualify(ctx, candidate, column).map(|deps| (column.clone(), deps)))
                .collect(),
        ),
    }
}

fn lookup<'d>(dict: &'d ColumnDict, name: &str) -> Option<&'d DependencySet> {
    dict.get(name).or_else(|| {
        dict.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, deps)| deps)
    })
}
