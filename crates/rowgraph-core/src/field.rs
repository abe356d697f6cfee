//! Static field metadata for entities.

use std::any::TypeId;

/// What role a field plays when an entity is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Bound to a result-set column.
    Column,
    /// Holds related entities (a child list or a parent back-reference).
    Relation,
    /// Left at its default value.
    Skipped,
}

/// Metadata about one entity field.
///
/// Generated as a `static` slice by `#[derive(Entity)]`.
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    /// Rust field name (e.g. `"manager_items"`).
    pub name: &'static str,
    /// Alternate column name, tried when no column matches `name`.
    pub column: Option<&'static str>,
    /// The field's Rust type as written in source.
    pub rust_type: &'static str,
    pub kind: FieldKind,
    /// Whether the field is the entity's primary key.
    pub primary_key: bool,
    /// `TypeId` of the field's type; used to match relation fields structurally.
    pub type_id: fn() -> TypeId,
}

impl FieldInfo {
    /// Create column-field metadata.
    pub const fn new(name: &'static str, rust_type: &'static str, type_id: fn() -> TypeId) -> Self {
        Self {
            name,
            column: None,
            rust_type,
            kind: FieldKind::Column,
            primary_key: false,
            type_id,
        }
    }

    /// Set the alternate column name.
    #[must_use]
    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Whether this field participates in column binding.
    pub fn is_column(&self) -> bool {
        self.kind == FieldKind::Column
    }

    /// Whether this field's type is exactly `T`.
    pub fn is_type<T: 'static>(&self) -> bool {
        (self.type_id)() == TypeId::of::<T>()
    }
}
