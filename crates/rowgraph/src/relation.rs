//! Relationship definitions.
//!
//! A relationship pairs a parent entity type with a child entity type through
//! a key type. It owns the column names used to read keys, the link function,
//! and the reconciliation buffer that both of its roles share.

use crate::bucket::{LinkFn, ReconcileBuffer, Reconciled, RelationStats};
use crate::key::RelationKey;
use crate::link::synthesize_link;
use rowgraph_core::{Entity, Error, FieldInfo, Result, Shared, TypeError, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Options for registering a relationship between `P` (parent) and `C` (child).
///
/// Every option has a default derived from the entity names:
///
/// | option             | default                      |
/// |--------------------|------------------------------|
/// | `foreign_key`      | `<ParentName>Id`             |
/// | `parent_key`       | `Id`, read from the primary key |
/// | `child_list_field` | `<child_name>s`              |
/// | `parent_field`     | `<parent_name>`              |
///
/// ```ignore
/// relation.define_relationship::<Manager, ManagerItem>(
///     RelationOptions::new().foreign_key("OwnerId"),
/// )?;
/// ```
pub struct RelationOptions<P, C> {
    foreign_key: Option<String>,
    parent_key: Option<String>,
    child_list_field: Option<String>,
    parent_field: Option<String>,
    link: Option<LinkFn<P, C>>,
}

impl<P, C> Default for RelationOptions<P, C> {
    fn default() -> Self {
        Self {
            foreign_key: None,
            parent_key: None,
            child_list_field: None,
            parent_field: None,
            link: None,
        }
    }
}

impl<P, C> fmt::Debug for RelationOptions<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationOptions")
            .field("foreign_key", &self.foreign_key)
            .field("parent_key", &self.parent_key)
            .field("child_list_field", &self.child_list_field)
            .field("parent_field", &self.parent_field)
            .field("link", &self.link.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<P: Entity, C: Entity> RelationOptions<P, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column on the child result set holding the parent's key.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Column on the parent result set holding the key.
    ///
    /// Setting this reads the key from the column instead of the parent's
    /// primary key.
    pub fn parent_key(mut self, column: impl Into<String>) -> Self {
        self.parent_key = Some(column.into());
        self
    }

    /// Field on the parent that collects children.
    pub fn child_list_field(mut self, field: impl Into<String>) -> Self {
        self.child_list_field = Some(field.into());
        self
    }

    /// Field on the child that refers back to the parent.
    pub fn parent_field(mut self, field: impl Into<String>) -> Self {
        self.parent_field = Some(field.into());
        self
    }

    /// Use `link` instead of a synthesized link function.
    ///
    /// The field options are ignored when a link function is given.
    pub fn link<F>(mut self, link: F) -> Self
    where
        F: Fn(&Shared<P>, &Shared<C>) + Send + Sync + 'static,
    {
        self.link = Some(Arc::new(link));
        self
    }
}

/// A registered relationship, with its key and entity types erased.
pub(crate) trait ErasedRelation: Send + Sync {
    fn parent_type(&self) -> TypeId;
    fn child_type(&self) -> TypeId;
    fn parent_name(&self) -> &'static str;
    fn child_name(&self) -> &'static str;
    fn foreign_key(&self) -> &str;
    fn parent_key(&self) -> &str;
    /// The parent's primary-key field, when the key is read from it.
    fn primary_key_field(&self) -> Option<&'static FieldInfo>;

    /// `parent` must be a `Shared<P>`; `key` must not be NULL.
    fn observe_parent(&mut self, parent: &dyn Any, key: &Value) -> Result<Reconciled>;

    /// `child` must be a `Shared<C>`; `key` must not be NULL.
    fn observe_child(&mut self, child: &dyn Any, key: &Value) -> Result<Reconciled>;

    fn stats(&self) -> RelationStats;
}

pub(crate) struct Relation<K: RelationKey, P, C> {
    foreign_key: String,
    parent_key: String,
    primary_key_field: Option<&'static FieldInfo>,
    link: LinkFn<P, C>,
    buffer: ReconcileBuffer<K, P, C>,
}

impl<K: RelationKey, P: Entity, C: Entity> Relation<K, P, C> {
    /// Build a relationship, synthesizing the link function when none is given.
    pub(crate) fn new(options: RelationOptions<P, C>) -> Result<Self> {
        let link = match options.link {
            Some(link) => link,
            None => synthesize_link::<P, C>(
                options.child_list_field.as_deref(),
                options.parent_field.as_deref(),
            )?,
        };

        let primary_key_field = match options.parent_key {
            Some(_) => None,
            None => P::fields().iter().find(|f| f.primary_key),
        };
        let parent_key = match (options.parent_key, primary_key_field) {
            (Some(column), _) => column,
            (None, Some(field)) => primary_key_column(field).to_string(),
            (None, None) => "Id".to_string(),
        };

        Ok(Self {
            foreign_key: options
                .foreign_key
                .unwrap_or_else(|| format!("{}Id", P::ENTITY_NAME)),
            parent_key,
            primary_key_field,
            link,
            buffer: ReconcileBuffer::new(),
        })
    }

    fn read_key(value: &Value, entity: &'static str, column: &str) -> Result<K> {
        K::read_key(value).map_err(|_| {
            Error::Type(
                TypeError::new(K::KEY_TYPE, value.type_name())
                    .with_entity(entity)
                    .with_column(column),
            )
        })
    }
}

/// Column name reported for a primary-key parent key.
fn primary_key_column(field: &FieldInfo) -> &'static str {
    match field.column {
        Some(column) => column,
        None if field.name == "id" => "Id",
        None => field.name,
    }
}

fn downcast<'a, T: 'static>(entity: &'a dyn Any, name: &'static str) -> Result<&'a Shared<T>> {
    entity
        .downcast_ref::<Shared<T>>()
        .ok_or_else(|| Error::Custom(format!("entity handle is not a Shared<{}>", name)))
}

impl<K: RelationKey, P: Entity, C: Entity> ErasedRelation for Relation<K, P, C> {
    fn parent_type(&self) -> TypeId {
        TypeId::of::<P>()
    }

    fn child_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn parent_name(&self) -> &'static str {
        P::ENTITY_NAME
    }

    fn child_name(&self) -> &'static str {
        C::ENTITY_NAME
    }

    fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    fn parent_key(&self) -> &str {
        &self.parent_key
    }

    fn primary_key_field(&self) -> Option<&'static FieldInfo> {
        self.primary_key_field
    }

    fn observe_parent(&mut self, parent: &dyn Any, key: &Value) -> Result<Reconciled> {
        let parent = downcast::<P>(parent, P::ENTITY_NAME)?;
        let key = Self::read_key(key, P::ENTITY_NAME, &self.parent_key)?;
        let result = self.buffer.observe_parent(key.clone(), parent, &self.link);
        match result {
            Reconciled::DuplicateParent => tracing::trace!(
                parent = P::ENTITY_NAME,
                child = C::ENTITY_NAME,
                key = ?key,
                "Duplicate parent key ignored"
            ),
            Reconciled::Resolved { flushed } if flushed > 0 => tracing::trace!(
                parent = P::ENTITY_NAME,
                child = C::ENTITY_NAME,
                key = ?key,
                flushed,
                "Flushed buffered children"
            ),
            _ => {}
        }
        Ok(result)
    }

    fn observe_child(&mut self, child: &dyn Any, key: &Value) -> Result<Reconciled> {
        let child = downcast::<C>(child, C::ENTITY_NAME)?;
        let key = Self::read_key(key, C::ENTITY_NAME, &self.foreign_key)?;
        let result = self.buffer.observe_child(key, child, &self.link);
        Ok(result)
    }

    fn stats(&self) -> RelationStats {
        self.buffer.stats()
    }
}
