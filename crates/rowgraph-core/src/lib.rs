//! Core types and traits for rowgraph.
//!
//! This crate provides the foundations the relation engine is built on:
//!
//! - `Value` and `Row` for dynamically typed result-set data
//! - `Record` / `ResultCursor`, the forward-only multi-result-set cursor contract
//! - `Entity` and `FieldInfo` for statically described entity shapes
//! - `Shared` / `ParentRef` handles for linked entity graphs
//! - `Error`, the error taxonomy shared by every rowgraph crate

pub mod cursor;
pub mod entity;
pub mod error;
pub mod field;
pub mod row;
pub mod value;

pub use cursor::{MemoryCursor, Record, ResultCursor, ResultSet};
pub use entity::{Entity, ParentRef, Shared, SqlEnum, parse_sql_enum, share};
pub use error::{
    ConfigError, ConfigErrorKind, CursorError, Error, Result, SchemaError, SchemaErrorKind,
    TypeError,
};
pub use field::{FieldInfo, FieldKind};
pub use row::{ColumnInfo, ColumnMatching, FromValue, Row};
pub use value::Value;
