//! Catalog and partition collaborator traits

use std::fmt;

/// A possibly schema-qualified relation name, split on `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationName {
    parts: Vec<String>,
}

impl RelationName {
    /// Create from already-split parts (`["db", "schema", "table"]`)
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).filter(|p: &String| !p.is_empty()).collect(),
        }
    }

    /// Split a dotted name
    pub fn parse(name: &str) -> Self {
        Self::from_parts(name.split('.'))
    }

    /// Unqualified table name
    pub fn table(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Schema (or dataset) part, if qualified
    pub fn schema(&self) -> Option<&str> {
        if self.parts.len() >= 2 {
            self.parts.get(self.parts.len() - 2).map(String::as_str)
        } else {
            None
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.parts.len() > 1
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        self.parts.join(".")
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// Errors that can occur when looking up relation columns
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("Failed to load catalog: {0}")]
    LoadError(String),
}

/// Source of column names for relations the batch does not define
///
/// Lookups are synchronous; resolution never blocks on I/O inside the engine,
/// so network-backed providers are expected to prefetch.
pub trait CatalogProvider: Send + Sync {
    /// Get the provider name (e.g., "memory")
    fn name(&self) -> &'static str;

    /// Ordered column names of a relation
    fn lookup_columns(&self, relation: &RelationName) -> Result<Vec<String>, CatalogError>;
}

/// Maps partition child tables onto their parent
pub trait PartitionResolver: Send + Sync {
    /// Parent relation of a partition child, `None` if the relation is not a partition
    fn parent_of(&self, relation: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_name_parts() {
        let name = RelationName::parse("warehouse.analytics.orders");
        assert_eq!(name.table(), "orders");
        assert_eq!(name.schema(), Some("analytics"));
        assert!(name.is_qualified());
        assert_eq!(name.to_string(), "warehouse.analytics.orders");
    }

    #[test]
    fn unqualified_name_has_no_schema() {
        let name = RelationName::parse("orders");
        assert_eq!(name.table(), "orders");
        assert_eq!(name.schema(), None);
        assert!(!name.is_qualified());
    }
}
