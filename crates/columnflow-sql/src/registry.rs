//! Registry of named intermediate relations (CTEs and hoisted subqueries)
//!
//! Entries are written once, before anything that names them is resolved.
//! Every dependency stored here is already flattened to base-table columns.

use crate::error::ResolutionError;
use columnflow_core::{is_placeholder, ColumnDict, DependencySet};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// One resolved intermediate relation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationEntry {
    /// Output column -> flattened dependencies
    pub columns: ColumnDict,

    /// Base tables the relation ultimately reads
    pub base_tables: BTreeSet<String>,
}

impl RelationEntry {
    /// Dependencies of one output column, exact name first, then case-insensitive
    pub fn column(&self, name: &str) -> Option<&DependencySet> {
        self.columns.get(name).or_else(|| {
            self.columns
                .iter()
                .find(|(column, _)| column.eq_ignore_ascii_case(name))
                .map(|(_, deps)| deps)
        })
    }

    /// True if an unexpanded `rel.*` entry stands in for unknown columns
    pub fn has_placeholder(&self) -> bool {
        self.columns.keys().any(|name| is_placeholder(name))
    }

    /// Map `column` onto every `rel.*` placeholder entry
    ///
    /// A placeholder `src.*` entry says "some column of src"; asking for
    /// `column` through it yields `src.column`.
    pub fn through_placeholders(&self, column: &str) -> Option<DependencySet> {
        let mut result: Option<DependencySet> = None;

        for (name, deps) in &self.columns {
            if !is_placeholder(name) {
                continue;
            }
            let mapped = DependencySet {
                defining: deps
                    .defining
                    .iter()
                    .map(|dep| substitute_star(dep, column))
                    .collect(),
                referenced: deps.referenced.clone(),
            };
            result.get_or_insert_with(DependencySet::new).absorb_defining(&mapped);
        }

        result
    }
}

fn substitute_star(dependency: &str, column: &str) -> String {
    match dependency.strip_suffix(".*") {
        Some(relation) => format!("{}.{}", relation, column),
        None if dependency == "*" => column.to_string(),
        None => dependency.to_string(),
    }
}

/// Write-once map of intermediate relation name -> entry
#[derive(Debug, Default)]
pub struct RelationRegistry {
    entries: IndexMap<String, RelationEntry>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation; a second write to the same name is an error
    pub fn register(&mut self, name: impl Into<String>, entry: RelationEntry) -> Result<(), ResolutionError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ResolutionError::DuplicateRelation(name));
        }
        tracing::debug!(relation = %name, columns = entry.columns.len(), "registered relation");
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Look up an entry, exact name first, then case-insensitive
    pub fn get(&self, name: &str) -> Option<&RelationEntry> {
        self.entries.get(name).or_else(|| {
            self.entries
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, entry)| entry)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `base` if free, otherwise the first free `base_N`
    pub fn unique_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(columns: &[(&str, &[&str])]) -> RelationEntry {
        RelationEntry {
            columns: columns
                .iter()
                .map(|(name, deps)| (name.to_string(), DependencySet::from_parts(deps.iter().copied(), Vec::<String>::new())))
                .collect(),
            base_tables: BTreeSet::new(),
        }
    }

    #[test]
    fn second_write_is_rejected() {
        let mut registry = RelationRegistry::new();
        registry.register("c", RelationEntry::default()).unwrap();

        let err = registry.register("c", RelationEntry::default()).unwrap_err();
        assert!(matches!(err, ResolutionError::DuplicateRelation(name) if name == "c"));
    }

    #[test]
    fn unique_names_skip_taken_ones() {
        let mut registry = RelationRegistry::new();
        registry.register("sub", RelationEntry::default()).unwrap();
        registry.register("sub_1", RelationEntry::default()).unwrap();

        assert_eq!(registry.unique_name("sub"), "sub_2");
        assert_eq!(registry.unique_name("other"), "other");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = RelationRegistry::new();
        registry.register("Active_Users", entry(&[("Id", &["users.id"])])).unwrap();

        let found = registry.get("active_users").unwrap();
        assert_eq!(found.column("id"), Some(&DependencySet::defining("users.id")));
    }

    #[test]
    fn placeholders_map_onto_the_requested_column() {
        let star = entry(&[("raw.*", &["raw.*"]), ("id", &["raw.id"])]);

        assert!(star.has_placeholder());
        assert_eq!(star.through_placeholders("email"), Some(DependencySet::defining("raw.email")));
        assert_eq!(entry(&[("id", &["raw.id"])]).through_placeholders("email"), None);
    }
}
