//! Column reference resolution
//!
//! Turns a column mention into flattened base-table dependencies, searching
//! the innermost scope first and falling back to enclosing scopes for
//! correlated references.

use crate::context::{Candidate, RelationKind, ResolutionContext, Scope};
use columnflow_core::{DependencySet, Diagnostic, DiagnosticCode, Severity};

/// Resolve `qualifier.column` (or a bare `column`) against the scope stack
pub(crate) fn resolve_column(
    ctx: &mut ResolutionContext<'_>,
    scopes: &[Scope],
    qualifier: Option<&str>,
    column: &str,
) -> DependencySet {
    let resolved = match qualifier {
        Some(qualifier) => resolve_qualified(ctx, scopes, qualifier, column),
        None => resolve_unqualified(ctx, scopes, column),
    };
    tracing::trace!(?qualifier, column, deps = ?resolved.defining, "resolved column");
    resolved
}

fn resolve_qualified(
    ctx: &mut ResolutionContext<'_>,
    scopes: &[Scope],
    qualifier: &str,
    column: &str,
) -> DependencySet {
    for scope in scopes.iter().rev() {
        if let Some(candidate) = scope.find(qualifier) {
            return qualify(ctx, candidate, column)
                .unwrap_or_else(|| literal(ctx, column, Some(&candidate.name)));
        }
    }

    // Qualifier not bound by any FROM clause; take it as a base table name
    let canonical = ctx.fold_partition(qualifier);
    DependencySet::defining(format!("{}.{}", canonical, column))
}

fn resolve_unqualified(
    ctx: &mut ResolutionContext<'_>,
    scopes: &[Scope],
    column: &str,
) -> DependencySet {
    for scope in scopes.iter().rev() {
        if let Some(deps) = scope.virtual_column(column) {
            return deps.clone();
        }
        if scope.candidates.is_empty() {
            continue;
        }

        let knowledge: Vec<_> = scope
            .candidates
            .iter()
            .map(|candidate| (candidate, ctx.knowledge(candidate)))
            .collect();

        // Eliminate relations that provably lack the column
        let survivors: Vec<_> = knowledge
            .iter()
            .filter(|(_, known)| !known.excludes(column))
            .collect();

        match survivors.as_slice() {
            [] => continue,
            [(candidate, _)] => {
                return qualify(ctx, candidate, column)
                    .unwrap_or_else(|| literal(ctx, column, Some(&candidate.name)));
            }
            _ => {
                let exact: Vec<_> = survivors.iter().filter(|(_, k)| k.has_exact(column)).collect();
                if let [(candidate, _)] = exact.as_slice() {
                    return qualify(ctx, candidate, column)
                        .unwrap_or_else(|| literal(ctx, column, Some(&candidate.name)));
                }
                let folded: Vec<_> = survivors
                    .iter()
                    .filter(|(_, k)| k.matching(column).is_some())
                    .collect();
                if let [(candidate, _)] = folded.as_slice() {
                    return qualify(ctx, candidate, column)
                        .unwrap_or_else(|| literal(ctx, column, Some(&candidate.name)));
                }

                ctx.note(
                    Diagnostic::new(
                        DiagnosticCode::SqlAmbiguousColumn,
                        Severity::Info,
                        format!("column '{}' may belong to {} relations", column, survivors.len()),
                    )
                    .with_column(column),
                );
                return DependencySet::defining(column);
            }
        }
    }

    literal(ctx, column, None)
}

/// Dependencies of `column` read through one candidate
///
/// `None` when the candidate is known not to produce the column.
pub(crate) fn qualify(
    ctx: &mut ResolutionContext<'_>,
    candidate: &Candidate,
    column: &str,
) -> Option<DependencySet> {
    match &candidate.kind {
        RelationKind::Base => {
            let known = ctx.knowledge(candidate);
            let spelled = known.matching(column).unwrap_or(column);
            Some(DependencySet::defining(format!("{}.{}", candidate.name, spelled)))
        }
        RelationKind::Intermediate => {
            let entry = ctx.registry.get(&candidate.name)?;
            entry
                .column(column)
                .cloned()
                .or_else(|| entry.through_placeholders(column))
        }
        RelationKind::Virtual(columns) => columns
            .get(column)
            .or_else(|| {
                columns
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
                    .map(|(_, deps)| deps)
            })
            .cloned(),
        RelationKind::Generated(_) => Some(DependencySet::new()),
    }
}

/// Low-confidence bare-name fallback
fn literal(ctx: &mut ResolutionContext<'_>, column: &str, relation: Option<&str>) -> DependencySet {
    let mut diagnostic = Diagnostic::new(
        DiagnosticCode::SqlAmbiguousColumn,
        Severity::Info,
        format!("column '{}' could not be tied to a relation", column),
    )
    .with_column(column);
    if let Some(relation) = relation {
        diagnostic = diagnostic.with_relation(relation);
    }
    ctx.note(diagnostic);

    DependencySet::defining(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RelationEntry;
    use crate::relations::bind_named;
    use columnflow_core::InputTableDict;
    use pretty_assertions::assert_eq;

    fn base(name: &str) -> Candidate {
        Candidate { name: name.to_string(), kind: RelationKind::Base }
    }

    fn scope_of(candidates: Vec<(Candidate, Option<&str>)>) -> Scope {
        let mut scope = Scope::default();
        for (candidate, alias) in candidates {
            let written = candidate.name.clone();
            bind_named(&mut scope, candidate, &written, alias);
        }
        scope
    }

    #[test]
    fn single_unknown_relation_qualifies() {
        let inputs = InputTableDict::new();
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let scopes = vec![scope_of(vec![(base("t"), None)])];

        assert_eq!(resolve_column(&mut ctx, &scopes, None, "a"), DependencySet::defining("t.a"));
    }

    #[test]
    fn elimination_picks_the_only_possible_relation() {
        let inputs = InputTableDict::new()
            .with_table("orders", ["id", "total"])
            .with_table("users", ["id", "email"]);
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let scopes = vec![scope_of(vec![(base("orders"), Some("o")), (base("users"), Some("u"))])];

        assert_eq!(
            resolve_column(&mut ctx, &scopes, None, "email"),
            DependencySet::defining("users.email")
        );
        assert_eq!(
            resolve_column(&mut ctx, &scopes, Some("o"), "id"),
            DependencySet::defining("orders.id")
        );
    }

    #[test]
    fn ambiguous_column_is_a_bare_literal() {
        let inputs = InputTableDict::new()
            .with_table("orders", ["id"])
            .with_table("users", ["id"]);
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let scopes = vec![scope_of(vec![(base("orders"), None), (base("users"), None)])];

        assert_eq!(resolve_column(&mut ctx, &scopes, None, "id"), DependencySet::defining("id"));
        assert_eq!(ctx.diagnostics[0].code, DiagnosticCode::SqlAmbiguousColumn);
    }

    #[test]
    fn known_column_beats_unknown_relation() {
        let inputs = InputTableDict::new().with_table("users", ["email"]);
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let scopes = vec![scope_of(vec![(base("mystery"), None), (base("users"), None)])];

        assert_eq!(
            resolve_column(&mut ctx, &scopes, None, "email"),
            DependencySet::defining("users.email")
        );
    }

    #[test]
    fn case_insensitive_match_uses_schema_spelling() {
        let inputs = InputTableDict::new().with_table("users", ["Email"]);
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let scopes = vec![scope_of(vec![(base("users"), None)])];

        assert_eq!(
            resolve_column(&mut ctx, &scopes, None, "email"),
            DependencySet::defining("users.Email")
        );
    }

    #[test]
    fn intermediate_relations_are_flattened() {
        let inputs = InputTableDict::new();
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let mut entry = RelationEntry::default();
        entry
            .columns
            .insert("total".to_string(), DependencySet::from_parts(["raw.amount"], ["raw.status"]));
        ctx.registry.register("paid", entry).unwrap();

        let candidate = Candidate { name: "paid".to_string(), kind: RelationKind::Intermediate };
        let scopes = vec![scope_of(vec![(candidate, Some("p"))])];

        assert_eq!(
            resolve_column(&mut ctx, &scopes, Some("p"), "TOTAL"),
            DependencySet::from_parts(["raw.amount"], ["raw.status"])
        );
    }

    #[test]
    fn correlated_reference_reaches_outer_scope() {
        let inputs = InputTableDict::new().with_table("inner_t", ["k"]);
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let outer = scope_of(vec![(base("outer_t"), Some("o"))]);
        let inner = scope_of(vec![(base("inner_t"), None)]);
        let scopes = vec![outer, inner];

        assert_eq!(
            resolve_column(&mut ctx, &scopes, Some("o"), "k"),
            DependencySet::defining("outer_t.k")
        );
        assert_eq!(
            resolve_column(&mut ctx, &scopes, None, "flag"),
            DependencySet::defining("outer_t.flag")
        );
    }

    #[test]
    fn unbound_qualifier_is_taken_as_table() {
        let inputs = InputTableDict::new();
        let mut ctx = ResolutionContext::new(&inputs, None, None);

        assert_eq!(
            resolve_column(&mut ctx, &[], Some("raw.t"), "a"),
            DependencySet::defining("raw.t.a")
        );
    }
}
