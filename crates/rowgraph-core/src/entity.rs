//! Entity trait and shared entity handles.
//!
//! Entities are created one per row and then referenced from several places:
//! the list returned to the caller, a parent's child list, a child's
//! back-reference. They therefore live behind [`Shared`] handles. Child →
//! parent links use [`ParentRef`], a weak handle, so a linked graph does not
//! form reference cycles.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::field::FieldInfo;
use crate::value::Value;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// A shared, lockable entity handle.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wrap a value into a [`Shared`] handle.
pub fn share<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// A type that can be materialized from a result-set row.
///
/// Usually derived:
///
/// ```ignore
/// use rowgraph::prelude::*;
///
/// #[derive(Entity, Default)]
/// struct Manager {
///     id: i64,
///     name: String,
///     manager_items: Vec<Shared<ManagerItem>>,
/// }
/// ```
pub trait Entity: Default + Send + Sync + 'static {
    /// Type name used for default column and field names and in errors.
    const ENTITY_NAME: &'static str;

    /// Metadata for every field, in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Convert `value` and store it in the field at index `field`.
    fn set_column(&mut self, field: usize, value: &Value) -> Result<()>;

    /// Type-erased mutable access to the field at index `field`.
    fn field_any_mut(&mut self, field: usize) -> Option<&mut dyn Any>;

    /// Current primary key value, if the entity declares one.
    fn primary_key_value(&self) -> Option<Value> {
        None
    }
}

/// Weak back-reference from a child entity to its parent.
pub struct ParentRef<T> {
    inner: Weak<RwLock<T>>,
}

impl<T> ParentRef<T> {
    /// An unset reference.
    pub fn new() -> Self {
        Self { inner: Weak::new() }
    }

    /// Point this reference at `parent`.
    pub fn set(&mut self, parent: &Shared<T>) {
        self.inner = Arc::downgrade(parent);
    }

    /// Upgrade to a strong handle, if the parent is still alive.
    pub fn get(&self) -> Option<Shared<T>> {
        self.inner.upgrade()
    }

    /// Whether this reference points at a live parent.
    pub fn is_set(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Whether this reference points at `parent`.
    pub fn points_to(&self, parent: &Shared<T>) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(parent))
    }
}

impl<T> Default for ParentRef<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ParentRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for ParentRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for ParentRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.strong_count() > 0 {
            f.write_str("ParentRef(set)")
        } else {
            f.write_str("ParentRef(unset)")
        }
    }
}

/// Enumerations stored as integers or strings.
///
/// Derived with `#[derive(SqlEnum)]`, which also implements
/// [`FromValue`](crate::FromValue) through [`parse_sql_enum`].
pub trait SqlEnum: Sized {
    /// Variant names in declaration order.
    const VARIANTS: &'static [&'static str];

    /// Enum type name used in errors.
    const TYPE_NAME: &'static str;

    /// Variant whose discriminant equals `value`.
    fn from_discriminant(value: i64) -> Option<Self>;

    /// Variant whose name or description equals `text`, ignoring ASCII case.
    fn from_label(text: &str) -> Option<Self>;
}

/// Parse an enum from an integer or text value.
///
/// Text is tried as an integer discriminant first, then as a variant name or
/// description.
pub fn parse_sql_enum<E: SqlEnum>(value: &Value) -> Result<E> {
    let parsed = if let Some(n) = value.as_i64() {
        E::from_discriminant(n)
    } else if let Some(text) = value.as_str() {
        let trimmed = text.trim();
        trimmed
            .parse::<i64>()
            .ok()
            .and_then(E::from_discriminant)
            .or_else(|| E::from_label(trimmed))
    } else {
        return Err(Error::Type(TypeError::new(
            E::TYPE_NAME,
            value.type_name(),
        )));
    };

    parsed.ok_or_else(|| {
        let shown = match value {
            Value::Text(s) => format!("'{}'", s),
            other => format!("{:?}", other),
        };
        Error::Type(TypeError::new(
            E::TYPE_NAME,
            format!(
                "unable to parse {} (expected one of {})",
                shown,
                E::VARIANTS.join(", ")
            ),
        ))
    })
}
