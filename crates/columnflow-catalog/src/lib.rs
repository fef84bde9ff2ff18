//! Catalog collaborators for lineage resolution
//!
//! The resolution engine asks a [`CatalogProvider`] for the columns of
//! relations that neither the batch nor the caller-supplied input tables
//! describe, and a [`PartitionResolver`] for the parent of partition child
//! tables. Both are optional; without them unresolved relations degrade to
//! `relation.*` placeholders.
//!
//! ## Example
//!
//! ```rust,ignore
//! use columnflow_catalog::{CatalogProvider, InMemoryCatalog, RelationName};
//!
//! let catalog = InMemoryCatalog::new().with_table("raw.users", ["id", "email"]);
//! let columns = catalog.lookup_columns(&RelationName::parse("raw.users"))?;
//! ```

pub mod adapter;
pub mod memory;

pub use adapter::{CatalogError, CatalogProvider, PartitionResolver, RelationName};
pub use memory::InMemoryCatalog;
