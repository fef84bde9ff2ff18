//! In-memory catalog
//!
//! Stores relation columns and partition parents without connecting to any
//! database. It backs offline runs (loaded from a JSON file) and tests, and
//! can simulate lookup failures per relation.
//!
//! ## File format
//!
//! ```json
//! {
//!   "tables": { "raw.users": ["id", "email"], "raw.events": ["id", "ts"] },
//!   "partitions": { "raw.events_2024_01": "raw.events" }
//! }
//! ```

use crate::adapter::{CatalogError, CatalogProvider, PartitionResolver, RelationName};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tables: HashMap<String, Vec<String>>,

    #[serde(default)]
    partitions: HashMap<String, String>,
}

/// In-memory catalog keyed by lowercase fully qualified name
pub struct InMemoryCatalog {
    /// Column lists by relation FQN
    tables: Arc<RwLock<HashMap<String, Vec<String>>>>,

    /// Errors to return for specific relations
    errors: Arc<RwLock<HashMap<String, CatalogError>>>,

    /// Partition child -> parent
    partitions: Arc<RwLock<HashMap<String, String>>>,

    /// Fail every lookup
    fail_all: bool,

    /// Name to return from name() method
    catalog_name: &'static str,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            partitions: Arc::new(RwLock::new(HashMap::new())),
            fail_all: false,
            catalog_name: "memory",
        }
    }

    /// Load a catalog from its JSON representation
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| CatalogError::LoadError(e.to_string()))?;

        let catalog = Self::new();
        for (relation, columns) in file.tables {
            catalog.add_table(&relation, columns);
        }
        for (child, parent) in file.partitions {
            catalog.add_partition(&child, &parent);
        }

        tracing::debug!(tables = catalog.table_count(), "loaded in-memory catalog");
        Ok(catalog)
    }

    /// Load a catalog from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::LoadError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Add (or replace) a relation's columns
    pub fn add_table<I, S>(&self, relation: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(relation), columns.into_iter().map(Into::into).collect());
    }

    /// Builder-style [`add_table`](Self::add_table)
    pub fn with_table<I, S>(self, relation: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_table(relation, columns);
        self
    }

    /// Register `child` as a partition of `parent`
    pub fn add_partition(&self, child: &str, parent: &str) {
        self.partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(child), parent.to_string());
    }

    /// Configure an error to be returned for a specific relation
    pub fn add_error_for_table(&self, relation: &str, error: CatalogError) {
        self.errors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(relation), error);
    }

    /// Make every lookup fail
    pub fn with_lookup_failure(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Set a custom catalog name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.catalog_name = name;
        self
    }

    /// Get the number of relations stored
    pub fn table_count(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if a relation is known (exact FQN, case-insensitive)
    pub fn has_table(&self, relation: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key(relation))
    }
}

fn key(relation: &str) -> String {
    relation.to_ascii_lowercase()
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryCatalog {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            errors: Arc::clone(&self.errors),
            partitions: Arc::clone(&self.partitions),
            fail_all: self.fail_all,
            catalog_name: self.catalog_name,
        }
    }
}

impl CatalogProvider for InMemoryCatalog {
    fn name(&self) -> &'static str {
        self.catalog_name
    }

    fn lookup_columns(&self, relation: &RelationName) -> Result<Vec<String>, CatalogError> {
        let fqn = key(&relation.fqn());

        if self.fail_all {
            return Err(CatalogError::LookupFailed("simulated catalog failure".to_string()));
        }

        // Check for configured errors first
        if let Some(error) = self.errors.read().unwrap_or_else(PoisonError::into_inner).get(&fqn) {
            return Err(error.clone());
        }

        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(columns) = tables.get(&fqn) {
            return Ok(columns.clone());
        }

        // An unqualified name matches a single qualified entry with the same table name
        if !relation.is_qualified() {
            let suffix = format!(".{}", fqn);
            let mut matches = tables.iter().filter(|(name, _)| name.ends_with(&suffix));
            if let (Some((_, columns)), None) = (matches.next(), matches.next()) {
                return Ok(columns.clone());
            }
        }

        Err(CatalogError::TableNotFound(relation.fqn()))
    }
}

impl PartitionResolver for InMemoryCatalog {
    fn parent_of(&self, relation: &str) -> Option<String> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(relation))
            .cloned()
    }
}
