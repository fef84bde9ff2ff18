//! SQL column lineage
//!
//! This crate handles:
//! - Parsing SQL with a list of fallback dialects
//! - Resolving CTEs, derived tables, aliases, stars and set operations
//! - Splitting each output column's dependencies into defining and referenced columns
//! - Running batches of named statements in dependency order

pub mod batch;
mod collect;
mod columns;
mod context;
mod cte;
pub mod engine;
pub mod error;
pub mod parser;
pub mod phase;
mod projection;
pub mod registry;
mod relations;
mod set_ops;
mod subquery;

pub use batch::{BatchOutcome, BatchRunner, BatchStatement};
pub use context::AliasMap;
pub use engine::LineageEngine;
pub use error::{LineageError, ResolutionError};
pub use parser::{dialect_for, SqlParser, ParsedSql, ParseError};
pub use phase::{RunPhase, RunState};
pub use registry::{RelationEntry, RelationRegistry};
