//! UNION / INTERSECT / EXCEPT merging

use crate::engine::{RelationOutput, StatementResolver};
use crate::error::ResolutionError;
use columnflow_core::{is_placeholder, ColumnDict, DependencySet};
use sqlparser::ast::{Expr, OrderBy, SetExpr};
use std::collections::BTreeSet;

impl StatementResolver<'_> {
    /// Merge every branch of a set-operation tree positionally
    ///
    /// Each branch is resolved on its own. Columns that gate rows in any
    /// branch, and the outputs of every non-aggregate branch (set semantics
    /// compare whole rows), are shared as referenced by all outputs.
    pub(crate) fn merge_set_operation(
        &mut self,
        body: &SetExpr,
        order_by: Option<&OrderBy>,
    ) -> Result<RelationOutput, ResolutionError> {
        let mut leaves = Vec::new();
        collect_leaves(body, &mut leaves);

        let mut branches = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            self.run.check_budget()?;
            let branch = match leaf {
                SetExpr::Select(select) => self.resolve_select(select, None, false)?,
                SetExpr::Query(query) => self.resolve_query(query, false)?,
                SetExpr::Values(values) => self.resolve_values(&values.rows)?,
                other => {
                    return Err(ResolutionError::UnsupportedSyntax(format!(
                        "set operation branch {}",
                        other
                    )))
                }
            };
            branches.push(branch);
        }

        let Some(first) = branches.first() else {
            return Ok(RelationOutput::default());
        };
        let width = merged_width(&branches)?;

        let mut shared = BTreeSet::new();
        for branch in &branches {
            shared.extend(branch.harvested.iter().cloned());
            if !branch.first_is_aggregate {
                for deps in branch.columns.values() {
                    shared.extend(deps.all().cloned());
                }
            }
        }

        let mut columns = ColumnDict::new();
        for index in 0..width {
            let Some((name, _)) = first.columns.get_index(index) else {
                break;
            };
            let mut deps = DependencySet::new();
            for branch in &branches {
                if let Some((_, branch_deps)) = branch.columns.get_index(index) {
                    deps.absorb_defining(branch_deps);
                }
            }
            columns.insert(name.clone(), deps);
        }

        if let Some(order_by) = order_by {
            for expr in &order_by.exprs {
                if let Some(deps) = order_key(&expr.expr).and_then(|key| columns.get(key)) {
                    shared.extend(deps.all().cloned());
                }
            }
        }
        for deps in columns.values_mut() {
            deps.referenced.extend(shared.iter().cloned());
        }

        let first_is_aggregate = first.first_is_aggregate;
        let base_tables = branches
            .into_iter()
            .flat_map(|branch| branch.base_tables)
            .collect();

        tracing::trace!(width, "merged set operation");
        Ok(RelationOutput {
            columns,
            base_tables,
            first_is_aggregate,
            harvested: shared,
        })
    }
}

/// Leaf branches of a set-operation tree, left to right
fn collect_leaves<'q>(body: &'q SetExpr, leaves: &mut Vec<&'q SetExpr>) {
    match body {
        SetExpr::SetOperation { left, right, .. } => {
            collect_leaves(left, leaves);
            collect_leaves(right, leaves);
        }
        other => leaves.push(other),
    }
}

/// Number of merged output columns
///
/// Branches must agree on width unless one of them carries an unexpanded
/// star placeholder, in which case the overlapping positions are merged.
fn merged_width(branches: &[RelationOutput]) -> Result<usize, ResolutionError> {
    let widths: Vec<usize> = branches.iter().map(|branch| branch.columns.len()).collect();
    let first = widths.first().copied().unwrap_or(0);
    let Some(mismatch) = widths.iter().copied().find(|width| *width != first) else {
        return Ok(first);
    };

    let placeholder = branches
        .iter()
        .any(|branch| branch.columns.keys().any(|name| is_placeholder(name)));
    if placeholder {
        Ok(widths.into_iter().min().unwrap_or(0))
    } else {
        Err(ResolutionError::SetOperationArity { left: first, right: mismatch })
    }
}

/// Output name an ORDER BY item refers to
fn order_key(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.as_str()),
        Expr::CompoundIdentifier(idents) => idents.last().map(|ident| ident.value.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::LineageEngine;
    use crate::error::{LineageError, ResolutionError};
    use columnflow_core::{InputTableDict, LineageResult};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn resolve(sql: &str, inputs: &InputTableDict) -> LineageResult {
        LineageEngine::new().resolve_sql(sql, None, inputs).unwrap()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn union_merges_positionally() {
        let result = resolve(
            "SELECT id, name FROM staff UNION SELECT cid, full_name FROM customers WHERE active",
            &InputTableDict::new(),
        );

        assert_eq!(result.column_names(), vec!["id", "name"]);
        assert_eq!(result.column_dict["id"].defining, set(&["customers.cid", "staff.id"]));
        assert_eq!(
            result.column_dict["id"].referenced,
            set(&[
                "customers.active",
                "customers.cid",
                "customers.full_name",
                "staff.id",
                "staff.name"
            ])
        );
        assert_eq!(result.table_list, set(&["customers", "staff"]));
    }

    #[test]
    fn aggregate_branch_does_not_share_outputs() {
        let result = resolve(
            "SELECT COUNT(id) FROM a UNION ALL SELECT total FROM b",
            &InputTableDict::new(),
        );

        assert_eq!(result.column_names(), vec!["count"]);
        assert_eq!(result.column_dict["count"].defining, set(&["a.id", "b.total"]));
        assert_eq!(result.column_dict["count"].referenced, set(&["b.total"]));
    }

    #[test]
    fn three_way_union_keeps_leftmost_names() {
        let result = resolve(
            "SELECT x FROM a UNION SELECT y FROM b UNION SELECT z FROM c",
            &InputTableDict::new(),
        );

        assert_eq!(result.column_names(), vec!["x"]);
        assert_eq!(result.column_dict["x"].defining, set(&["a.x", "b.y", "c.z"]));
    }

    #[test]
    fn mismatched_widths_are_an_error() {
        let err = LineageEngine::new()
            .resolve_sql("SELECT a, b FROM t UNION SELECT c FROM u", None, &InputTableDict::new())
            .unwrap_err();

        assert!(matches!(
            err,
            LineageError::Resolution(ResolutionError::SetOperationArity { left: 2, right: 1 })
        ));
    }

    #[test]
    fn repeated_aggregates_keep_their_width() {
        let result = resolve(
            "SELECT SUM(a), SUM(b) FROM t UNION ALL SELECT x, y FROM u",
            &InputTableDict::new(),
        );

        assert_eq!(result.column_names(), vec!["sum", "_col_1"]);
        assert_eq!(result.column_dict["sum"].defining, set(&["t.a", "u.x"]));
        assert_eq!(result.column_dict["_col_1"].defining, set(&["t.b", "u.y"]));
    }

    #[test]
    fn placeholder_branch_merges_overlap() {
        let result = resolve("SELECT * FROM t UNION SELECT a, b FROM u", &InputTableDict::new());

        assert_eq!(result.column_names(), vec!["t.*"]);
        assert_eq!(result.column_dict["t.*"].defining, set(&["t.*", "u.a"]));
    }

    #[test]
    fn cte_with_union_body() {
        let result = resolve(
            "WITH ids AS (SELECT id FROM a UNION SELECT id FROM b) SELECT id FROM ids",
            &InputTableDict::new(),
        );

        assert_eq!(result.column_dict["id"].defining, set(&["a.id", "b.id"]));
        assert_eq!(result.table_list, set(&["a", "b"]));
    }
}
