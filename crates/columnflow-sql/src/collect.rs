//! Read-only AST collectors built on the sqlparser visitor

use crate::parser::object_name;
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectName, Query, Visit, Visitor,
};
use std::collections::HashSet;
use std::ops::ControlFlow;

/// A column mention, optionally qualified (`t.col`, `schema.t.col`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMention {
    pub qualifier: Option<String>,
    pub name: String,
}

/// A `*` passed to a function, e.g. `COUNT(*)` or `COUNT(t.*)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StarArgument {
    pub function: String,
    pub qualifier: Option<String>,
}

/// Everything one scope's expression mentions directly
///
/// Nested queries are captured whole and not descended into; their columns
/// belong to their own scope.
#[derive(Debug, Default)]
pub(crate) struct ExprMentions {
    pub columns: Vec<ColumnMention>,
    pub subqueries: Vec<Query>,
    pub star_arguments: Vec<StarArgument>,
    depth: usize,
}

impl ExprMentions {
    /// Collect from any visitable node
    pub fn of<V: Visit + ?Sized>(node: &V) -> Self {
        let mut mentions = Self::default();
        let _ = node.visit(&mut mentions);
        mentions
    }

    /// Nothing that could carry lineage was found
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.subqueries.is_empty() && self.star_arguments.is_empty()
    }
}

impl Visitor for ExprMentions {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if self.depth == 0 {
            self.subqueries.push(query.clone());
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }

        match expr {
            Expr::Identifier(ident) => self.columns.push(ColumnMention {
                qualifier: None,
                name: ident.value.clone(),
            }),
            Expr::CompoundIdentifier(idents) => {
                if let Some((last, rest)) = idents.split_last() {
                    let qualifier = (!rest.is_empty()).then(|| {
                        rest.iter()
                            .map(|ident| ident.value.as_str())
                            .collect::<Vec<_>>()
                            .join(".")
                    });
                    self.columns.push(ColumnMention {
                        qualifier,
                        name: last.value.clone(),
                    });
                }
            }
            Expr::Function(function) => {
                if let Some(qualifier) = star_argument(&function.args) {
                    self.star_arguments.push(StarArgument {
                        function: function_name(&function.name),
                        qualifier,
                    });
                }
            }
            _ => {}
        }

        ControlFlow::Continue(())
    }
}

/// `Some(None)` for `f(*)`, `Some(Some(t))` for `f(t.*)`, `None` otherwise
pub(crate) fn star_argument(args: &FunctionArguments) -> Option<Option<String>> {
    let FunctionArguments::List(list) = args else {
        return None;
    };

    list.args.iter().find_map(|arg| match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => Some(None),
        FunctionArg::Unnamed(FunctionArgExpr::QualifiedWildcard(name)) => {
            Some(Some(object_name(name)))
        }
        _ => None,
    })
}

/// Lowercase unqualified function name
pub(crate) fn function_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default()
}

/// Relations a statement reads, minus the CTE names it defines
#[derive(Debug, Default)]
pub(crate) struct RelationReads {
    relations: Vec<String>,
    ctes: HashSet<String>,
}

impl RelationReads {
    pub fn of<V: Visit + ?Sized>(node: &V) -> Vec<String> {
        let mut reads = Self::default();
        let _ = node.visit(&mut reads);

        let mut seen = HashSet::new();
        reads
            .relations
            .into_iter()
            .filter(|name| !reads.ctes.contains(&name.to_lowercase()))
            .filter(|name| seen.insert(name.to_lowercase()))
            .collect()
    }
}

impl Visitor for RelationReads {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.relations.push(object_name(relation));
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;
    use sqlparser::ast::{SelectItem, SetExpr, Statement};

    fn first_item_mentions(sql: &str) -> ExprMentions {
        let parsed = SqlParser::new().parse(sql, None).unwrap();
        let Statement::Query(query) = parsed.statement else {
            panic!("not a query");
        };
        let SetExpr::Select(select) = *query.body else {
            panic!("not a select");
        };
        match &select.projection[0] {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                ExprMentions::of(expr)
            }
            other => panic!("unexpected item {other}"),
        }
    }

    #[test]
    fn collects_plain_and_qualified_columns() {
        let mentions = first_item_mentions("SELECT a + s.t.b FROM t");

        assert_eq!(
            mentions.columns,
            vec![
                ColumnMention { qualifier: None, name: "a".to_string() },
                ColumnMention { qualifier: Some("s.t".to_string()), name: "b".to_string() },
            ]
        );
    }

    #[test]
    fn nested_queries_are_captured_not_descended() {
        let mentions =
            first_item_mentions("SELECT x + (SELECT max(y) FROM u WHERE u.k = t.k) FROM t");

        assert_eq!(mentions.columns.len(), 1);
        assert_eq!(mentions.columns[0].name, "x");
        assert_eq!(mentions.subqueries.len(), 1);
    }

    #[test]
    fn star_arguments_are_recorded() {
        let mentions = first_item_mentions("SELECT COUNT(o.*) * 2 FROM orders o");

        assert_eq!(
            mentions.star_arguments,
            vec![StarArgument { function: "count".to_string(), qualifier: Some("o".to_string()) }]
        );
        assert!(mentions.columns.is_empty());
    }

    #[test]
    fn literals_have_no_mentions() {
        assert!(first_item_mentions("SELECT 1 + 2").is_empty());
    }

    #[test]
    fn relation_reads_skip_ctes() {
        let parsed = SqlParser::new()
            .parse(
                "WITH c AS (SELECT * FROM raw.a) SELECT * FROM c JOIN raw.b ON c.id = b.id \
                 WHERE EXISTS (SELECT 1 FROM raw.a)",
                None,
            )
            .unwrap();

        assert_eq!(RelationReads::of(&parsed.statement), vec!["raw.a", "raw.b"]);
    }
}
