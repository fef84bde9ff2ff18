//! Column lineage domain types
//!
//! Dependencies are plain `relation.column` strings. A dependency that ends in
//! `.*` is a placeholder for "some column of this relation" and is emitted
//! whenever a relation's columns are unknown.

use crate::diagnostic::Diagnostic;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Suffix marking an unexpanded relation placeholder
pub const STAR_SUFFIX: &str = ".*";

/// Defining and referenced dependencies of one output column
///
/// Defining columns flow into the output value. Referenced columns only gate
/// which rows are produced (filters, join keys, grouping, ordering).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    /// Columns whose values flow into the output
    pub defining: BTreeSet<String>,

    /// Columns that only affect row inclusion
    pub referenced: BTreeSet<String>,
}

impl DependencySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// A set with a single defining dependency
    pub fn defining(column: impl Into<String>) -> Self {
        let mut set = Self::new();
        set.defining.insert(column.into());
        set
    }

    /// Build from explicit defining/referenced lists
    pub fn from_parts<D, R>(defining: D, referenced: R) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            defining: defining.into_iter().map(Into::into).collect(),
            referenced: referenced.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.defining.is_empty() && self.referenced.is_empty()
    }

    /// Merge keeping the split: defining into defining, referenced into referenced
    pub fn absorb_defining(&mut self, other: &DependencySet) {
        self.defining.extend(other.defining.iter().cloned());
        self.referenced.extend(other.referenced.iter().cloned());
    }

    /// Merge both halves of `other` into the defining half
    pub fn absorb_flat(&mut self, other: &DependencySet) {
        self.defining.extend(other.all().cloned());
    }

    /// Every dependency, defining first
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.defining.iter().chain(self.referenced.iter())
    }

    /// True if any dependency is an unexpanded `relation.*` placeholder
    pub fn has_placeholder(&self) -> bool {
        self.all().any(|dep| is_placeholder(dep))
    }

    /// Persisted `[definingList, referencedList]` pair
    pub fn to_lists(&self) -> (Vec<String>, Vec<String>) {
        (
            self.defining.iter().cloned().collect(),
            self.referenced.iter().cloned().collect(),
        )
    }
}

/// True for `relation.*` placeholders and a bare `*`
pub fn is_placeholder(dependency: &str) -> bool {
    dependency == "*" || dependency.ends_with(STAR_SUFFIX)
}

/// Output column name -> dependencies, in projection order
pub type ColumnDict = IndexMap<String, DependencySet>;

/// Lineage of one resolved statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageResult {
    /// Base tables reached, intermediate relations excluded
    pub table_list: BTreeSet<String>,

    /// Output column dependencies
    pub column_dict: ColumnDict,

    /// Relation written by `CREATE ... AS` / `INSERT ... SELECT`, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Soft failures raised while resolving
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl LineageResult {
    /// Output column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.column_dict.keys().cloned().collect()
    }

    /// Convert to the persisted record shape under `table_name`
    pub fn to_record(&self, table_name: impl Into<String>) -> StatementRecord {
        StatementRecord {
            tables: self.table_list.iter().cloned().collect(),
            columns: self
                .column_dict
                .iter()
                .map(|(name, deps)| (name.clone(), deps.to_lists()))
                .collect(),
            table_name: table_name.into(),
        }
    }
}

/// Persisted per-relation lineage record
///
/// Serializes as `{"tables": [...], "columns": {name: [defining, referenced]}, "table_name": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub tables: Vec<String>,
    pub columns: IndexMap<String, (Vec<String>, Vec<String>)>,
    pub table_name: String,
}

impl StatementRecord {
    /// Leaf record for a base table no statement defines
    pub fn base_table(table_name: impl Into<String>, columns: impl IntoIterator<Item = String>) -> Self {
        Self {
            tables: vec![String::new()],
            columns: columns
                .into_iter()
                .map(|column| (column, (vec![String::new()], vec![String::new()])))
                .collect(),
            table_name: table_name.into(),
        }
    }
}

/// Known relation name -> ordered column names
///
/// Filled from a schema catalog or from the outputs of statements resolved
/// earlier in the same batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputTableDict {
    tables: IndexMap<String, Vec<String>>,
}

impl InputTableDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a relation's columns
    pub fn insert(&mut self, relation: impl Into<String>, columns: Vec<String>) {
        self.tables.insert(relation.into(), columns);
    }

    /// Builder-style insert
    pub fn with_table<I, S>(mut self, relation: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(relation, columns.into_iter().map(Into::into).collect());
        self
    }

    /// Columns of a relation, exact name first, then the earliest case-insensitive match
    pub fn get(&self, relation: &str) -> Option<&[String]> {
        if let Some(columns) = self.tables.get(relation) {
            return Some(columns.as_slice());
        }
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(relation))
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.get(relation).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Relation names, sorted
    pub fn relations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
