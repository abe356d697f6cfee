//! rowgraph - materialize linked object graphs from multi-result-set queries.
//!
//! A single query often returns several result sets: one per entity type.
//! rowgraph turns each result set into entities and links parents to children
//! across result sets as the rows stream past, without requiring the query to
//! join or sort anything:
//!
//! - Entities are described with `#[derive(Entity)]`
//! - Relationships are registered once, keyed by any supported key type
//! - Parents and children may arrive in either order; children seen before
//!   their parent are buffered and linked when it shows up
//! - The cursor is read exactly once, front to back
//!
//! # Quick Start
//!
//! ```ignore
//! use rowgraph::prelude::*;
//!
//! #[derive(Entity, Default)]
//! struct Manager {
//!     id: i64,
//!     name: String,
//!     manager_items: Vec<Shared<ManagerItem>>,
//! }
//!
//! #[derive(Entity, Default)]
//! struct ManagerItem {
//!     id: i64,
//!     manager_id: i64,
//!     manager: ParentRef<Manager>,
//! }
//!
//! fn load(cursor: impl ResultCursor) -> Result<Vec<Shared<Manager>>> {
//!     let mut relation = EntityRelation::new(cursor);
//!     relation.define_relationship::<Manager, ManagerItem>(RelationOptions::new())?;
//!
//!     let managers = relation.populate::<Manager>()?;
//!     relation.populate::<ManagerItem>()?;
//!     Ok(managers)
//! }
//! ```
//!
//! The derive macros expand to paths under `rowgraph_core`, so crates using
//! them depend on `rowgraph-core` as well.

pub mod bucket;
pub mod config;
pub mod key;
mod link;
pub mod mapper;
pub mod orchestrator;
pub mod relation;

// Re-export all public types from sub-crates
pub use rowgraph_core::{
    ColumnInfo, ColumnMatching, ConfigError, ConfigErrorKind, CursorError, Entity, Error,
    FieldInfo, FieldKind, FromValue, MemoryCursor, ParentRef, Record, Result, ResultCursor,
    ResultSet, Row, SchemaError, SchemaErrorKind, Shared, SqlEnum, TypeError, Value,
    parse_sql_enum, share,
};

pub use rowgraph_macros::{Entity, SqlEnum};

pub use bucket::{LinkFn, Reconciled, RelationStats};
pub use config::GraphConfig;
pub use key::{HashKeyIndex, IntKeyIndex, KeyIndex, RelationKey};
pub use mapper::{EntityMapper, GenericEntityMapper, MapperCache};
pub use orchestrator::{EntityRelation, OnPopulated, PopulateOptions, RelationSummary};
pub use relation::RelationOptions;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        ColumnMatching, Entity, EntityMapper, EntityRelation, Error, GraphConfig, MapperCache,
        MemoryCursor, ParentRef, PopulateOptions, Record, RelationOptions, Result,
        ResultCursor, ResultSet, Shared, SqlEnum, Value,
    };
}
