//! Run-scoped resolution state
//!
//! A [`ResolutionContext`] lives for one statement and owns everything that
//! statement's resolution writes: the relation registry, the schema cache and
//! the soft diagnostics. A [`Scope`] holds what one SELECT can see.

use crate::registry::RelationRegistry;
use columnflow_catalog::{CatalogProvider, PartitionResolver, RelationName};
use columnflow_core::{is_placeholder, DependencySet, Diagnostic, DiagnosticCode, InputTableDict, Severity};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// Alias or bare name -> canonical relation name, for one SELECT
///
/// A name absent from the map is already canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: IndexMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `alias` to `canonical`, replacing an earlier binding
    pub fn insert(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.entries.insert(alias.into(), canonical.into());
    }

    /// Bind only if `alias` is still free
    pub fn insert_if_absent(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.entries.entry(alias.into()).or_insert_with(|| canonical.into());
    }

    /// Canonical name for an alias, exact first, then the earliest case-insensitive binding
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries
            .get(alias)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(alias))
                    .map(|(_, canonical)| canonical)
            })
            .map(String::as_str)
    }

    /// Canonical name, falling back to the name itself
    pub fn canonical<'n>(&'n self, name: &'n str) -> &'n str {
        self.get(name).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a FROM/JOIN item resolved to
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RelationKind {
    /// Physical table (after partition folding)
    Base,
    /// Registered CTE or hoisted subquery
    Intermediate,
    /// UNNEST output columns and their source dependencies
    Virtual(IndexMap<String, DependencySet>),
    /// Row generator (`generate_series`, table functions); contributes no lineage
    Generated(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub name: String,
    pub kind: RelationKind,
}

/// What is known about a candidate's columns
#[derive(Debug, Clone, Default)]
pub(crate) struct Knowledge {
    pub columns: Vec<String>,
    /// False when the list may be missing columns
    pub complete: bool,
}

impl Knowledge {
    pub fn has_exact(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Case-insensitive match, returning the stored spelling
    pub fn matching(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.as_str() == column)
            .or_else(|| self.columns.iter().find(|c| c.eq_ignore_ascii_case(column)))
            .map(String::as_str)
    }

    /// The relation provably does not have `column`
    pub fn excludes(&self, column: &str) -> bool {
        self.complete && self.matching(column).is_none()
    }
}

/// Relations and accumulators visible to one SELECT
#[derive(Debug, Default)]
pub(crate) struct Scope {
    pub candidates: Vec<Candidate>,
    pub aliases: AliasMap,
    /// UNNEST output column -> source dependencies
    pub virtual_columns: IndexMap<String, DependencySet>,
    /// Row-gating columns found while binding relations (UNNEST sources)
    pub referenced: BTreeSet<String>,
    /// Base tables reached through nested predicate and scalar subqueries
    pub extra_base_tables: BTreeSet<String>,
}

impl Scope {
    /// Candidate named by an alias or canonical name
    pub fn find(&self, qualifier: &str) -> Option<&Candidate> {
        let canonical = self.aliases.canonical(qualifier);
        self.candidates
            .iter()
            .find(|c| c.name == canonical)
            .or_else(|| self.candidates.iter().find(|c| c.name.eq_ignore_ascii_case(canonical)))
    }

    pub fn virtual_column(&self, column: &str) -> Option<&DependencySet> {
        self.virtual_columns.get(column).or_else(|| {
            self.virtual_columns
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, deps)| deps)
        })
    }
}

/// State shared by every phase of one statement's resolution
pub(crate) struct ResolutionContext<'a> {
    pub inputs: &'a InputTableDict,
    pub catalog: Option<&'a dyn CatalogProvider>,
    pub partitions: Option<&'a dyn PartitionResolver>,
    pub registry: RelationRegistry,
    pub diagnostics: Vec<Diagnostic>,
    schema_cache: HashMap<String, Option<Vec<String>>>,
    next_subquery: usize,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(
        inputs: &'a InputTableDict,
        catalog: Option<&'a dyn CatalogProvider>,
        partitions: Option<&'a dyn PartitionResolver>,
    ) -> Self {
        Self {
            inputs,
            catalog,
            partitions,
            registry: RelationRegistry::new(),
            diagnostics: Vec::new(),
            schema_cache: HashMap::new(),
            next_subquery: 0,
        }
    }

    /// Columns of a base table: input tables first, then the catalog
    ///
    /// Catalog results (including failures) are cached for the run.
    pub fn base_columns(&mut self, relation: &str) -> Option<Vec<String>> {
        if let Some(columns) = self.inputs.get(relation) {
            return Some(columns.to_vec());
        }
        if let Some(cached) = self.schema_cache.get(relation) {
            return cached.clone();
        }

        let fetched = self.catalog.and_then(|catalog| {
            match catalog.lookup_columns(&RelationName::parse(relation)) {
                Ok(columns) if !columns.is_empty() => Some(columns),
                Ok(_) => {
                    self.diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::CatalogLookupFailed,
                            Severity::Warn,
                            format!("catalog '{}' returned no columns", catalog.name()),
                        )
                        .with_relation(relation),
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(relation, error = %e, "catalog lookup failed");
                    self.diagnostics.push(
                        Diagnostic::new(DiagnosticCode::CatalogLookupFailed, Severity::Warn, e.to_string())
                            .with_relation(relation),
                    );
                    None
                }
            }
        });

        self.schema_cache.insert(relation.to_string(), fetched.clone());
        fetched
    }

    /// Fold a partition child onto its parent
    pub fn fold_partition(&self, relation: &str) -> String {
        self.partitions
            .and_then(|partitions| partitions.parent_of(relation))
            .unwrap_or_else(|| relation.to_string())
    }

    /// What is known about a candidate's columns
    pub fn knowledge(&mut self, candidate: &Candidate) -> Knowledge {
        match &candidate.kind {
            RelationKind::Base => match self.base_columns(&candidate.name) {
                Some(columns) => Knowledge { columns, complete: true },
                None => Knowledge::default(),
            },
            RelationKind::Intermediate => match self.registry.get(&candidate.name) {
                Some(entry) => Knowledge {
                    columns: entry
                        .columns
                        .keys()
                        .filter(|name| !is_placeholder(name))
                        .cloned()
                        .collect(),
                    complete: !entry.has_placeholder(),
                },
                None => Knowledge::default(),
            },
            RelationKind::Virtual(columns) => Knowledge {
                columns: columns.keys().cloned().collect(),
                complete: true,
            },
            RelationKind::Generated(columns) => Knowledge {
                columns: columns.clone(),
                complete: true,
            },
        }
    }

    /// Reserved name for an unaliased derived table
    pub fn next_subquery_name(&mut self) -> String {
        self.next_subquery += 1;
        self.registry.unique_name(&format!("_subquery_{}", self.next_subquery))
    }

    /// Record a soft diagnostic once
    pub fn note(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use columnflow_catalog::InMemoryCatalog;

    #[test]
    fn alias_map_falls_back_to_the_name() {
        let mut aliases = AliasMap::new();
        aliases.insert("o", "raw.orders");

        assert_eq!(aliases.canonical("O"), "raw.orders");
        assert_eq!(aliases.canonical("raw.users"), "raw.users");
    }

    #[test]
    fn alias_lookup_prefers_earliest_binding() {
        let mut aliases = AliasMap::new();
        aliases.insert("Ord", "raw.orders");
        aliases.insert("ORD", "archive.orders");

        assert_eq!(aliases.get("ord"), Some("raw.orders"));
        assert_eq!(aliases.get("ORD"), Some("archive.orders"));
    }

    #[test]
    fn inputs_win_over_catalog() {
        let inputs = InputTableDict::new().with_table("t", ["a"]);
        let catalog = InMemoryCatalog::new().with_table("t", ["a", "b"]);
        let mut ctx = ResolutionContext::new(&inputs, Some(&catalog), None);

        assert_eq!(ctx.base_columns("t"), Some(vec!["a".to_string()]));
    }

    #[test]
    fn catalog_failure_degrades_to_unknown() {
        let inputs = InputTableDict::new();
        let catalog = InMemoryCatalog::new().with_lookup_failure();
        let mut ctx = ResolutionContext::new(&inputs, Some(&catalog), None);

        assert_eq!(ctx.base_columns("t"), None);
        assert_eq!(ctx.base_columns("t"), None);
        assert_eq!(ctx.diagnostics.len(), 1);
        assert_eq!(ctx.diagnostics[0].code, DiagnosticCode::CatalogLookupFailed);
    }

    #[test]
    fn partitions_fold_to_parent() {
        let inputs = InputTableDict::new();
        let catalog = InMemoryCatalog::new();
        catalog.add_partition("events_2024", "events");
        let ctx = ResolutionContext::new(&inputs, None, Some(&catalog));

        assert_eq!(ctx.fold_partition("events_2024"), "events");
        assert_eq!(ctx.fold_partition("users"), "users");
    }

    #[test]
    fn unknown_base_table_has_incomplete_knowledge() {
        let inputs = InputTableDict::new();
        let mut ctx = ResolutionContext::new(&inputs, None, None);
        let candidate = Candidate { name: "t".to_string(), kind: RelationKind::Base };

        let knowledge = ctx.knowledge(&candidate);
        assert!(!knowledge.complete);
        assert!(!knowledge.excludes("anything"));
    }
}
