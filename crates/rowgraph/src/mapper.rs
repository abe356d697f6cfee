//! Row-to-entity materialization.
//!
//! A mapper binds an entity's column fields to the ordinals of a result set
//! once, then converts each row through that binding. Binding happens on first
//! use and is never redone: the first schema a mapper sees is the one it keeps.

use parking_lot::{Mutex, RwLock};
use rowgraph_core::{ColumnInfo, Entity, Error, FieldInfo, Record, Result, TypeError};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns result-set rows into entities of type `T`.
pub trait EntityMapper<T: Entity>: Send + Sync {
    /// Bind fields to column ordinals. Calls after the first are no-ops.
    fn bind_columns(&self, columns: &ColumnInfo) -> Result<()>;

    /// Whether [`bind_columns`](Self::bind_columns) has run.
    fn is_bound(&self) -> bool;

    /// Fill `entity` from the current row.
    fn populate_into(&self, record: &dyn Record, entity: &mut T) -> Result<()>;

    /// Create an entity from the current row.
    fn populate_row(&self, record: &dyn Record) -> Result<T> {
        let mut entity = T::default();
        self.populate_into(record, &mut entity)?;
        Ok(entity)
    }
}

/// Field index paired with the column ordinal it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundField {
    field: usize,
    ordinal: usize,
}

/// Fold a name for loose matching: ASCII lowercase with underscores removed,
/// so `manager_id` matches `ManagerId`.
fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn bind_field(field: &FieldInfo, columns: &ColumnInfo, folded: &[String]) -> Option<usize> {
    let by_name = |name: &str| {
        columns.index_of(name).or_else(|| {
            let target = fold_name(name);
            folded.iter().position(|c| *c == target)
        })
    };
    by_name(field.name).or_else(|| field.column.and_then(by_name))
}

/// Ordinal of the column a field binds to, matched the way
/// [`GenericEntityMapper`] binds it.
pub(crate) fn field_ordinal(field: &FieldInfo, columns: &ColumnInfo) -> Option<usize> {
    let folded: Vec<String> = columns.names().iter().map(|n| fold_name(n)).collect();
    bind_field(field, columns, &folded)
}

/// Default [`EntityMapper`] driven by the derived [`Entity`] metadata.
///
/// Each column field binds to the column with the same name, compared
/// without regard to ASCII case or underscores; fields with a
/// `#[rowgraph(column = "...")]` alias fall back to it. Unbound fields and
/// NULL columns leave the field at its default value.
pub struct GenericEntityMapper<T> {
    binding: RwLock<Option<Arc<[BoundField]>>>,
    init: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> GenericEntityMapper<T> {
    pub fn new() -> Self {
        Self {
            binding: RwLock::new(None),
            init: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Number of fields bound to a column, once bound.
    pub fn bound_fields(&self) -> Option<usize> {
        self.binding.read().as_ref().map(|b| b.len())
    }

    fn current_binding(&self) -> Option<Arc<[BoundField]>> {
        self.binding.read().clone()
    }

    fn binding_for(&self, record: &dyn Record) -> Result<Arc<[BoundField]>> {
        if let Some(binding) = self.current_binding() {
            return Ok(binding);
        }
        let names = (0..record.field_count())
            .map(|i| record.column_name(i).unwrap_or_default().to_string())
            .collect();
        self.bind_columns(&ColumnInfo::new(names))?;
        self.current_binding().ok_or_else(|| {
            Error::Custom(format!("{}: column binding was not recorded", T::ENTITY_NAME))
        })
    }
}

impl<T: Entity> Default for GenericEntityMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for GenericEntityMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericEntityMapper")
            .field("type", &std::any::type_name::<T>())
            .field("bound", &self.binding.read().is_some())
            .finish()
    }
}

impl<T: Entity> EntityMapper<T> for GenericEntityMapper<T> {
    fn bind_columns(&self, columns: &ColumnInfo) -> Result<()> {
        if self.binding.read().is_some() {
            return Ok(());
        }
        let _guard = self.init.lock();
        // Another caller may have bound while we waited for the lock.
        if self.binding.read().is_some() {
            return Ok(());
        }

        let folded: Vec<String> = columns.names().iter().map(|n| fold_name(n)).collect();
        let bound: Vec<BoundField> = T::fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_column())
            .filter_map(|(field, info)| {
                bind_field(info, columns, &folded).map(|ordinal| BoundField { field, ordinal })
            })
            .collect();

        tracing::debug!(
            entity = T::ENTITY_NAME,
            bound = bound.len(),
            columns = columns.len(),
            "Bound entity columns"
        );
        *self.binding.write() = Some(bound.into());
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.binding.read().is_some()
    }

    fn populate_into(&self, record: &dyn Record, entity: &mut T) -> Result<()> {
        let binding = self.binding_for(record)?;
        let fields = T::fields();

        for bound in binding.iter() {
            let Some(value) = record.value(bound.ordinal) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            entity.set_column(bound.field, value).map_err(|e| {
                let info = &fields[bound.field];
                let column = record.column_name(bound.ordinal).unwrap_or_default();
                match e {
                    Error::Type(te) => Error::Type(
                        TypeError {
                            actual: record.source_type_name(bound.ordinal).to_string(),
                            ..te
                        }
                        .with_entity(T::ENTITY_NAME)
                        .with_field(info.name, info.rust_type)
                        .with_column(column),
                    ),
                    other => other,
                }
            })?;
        }
        Ok(())
    }
}

/// Shared store of [`GenericEntityMapper`]s, one per entity type.
///
/// Owned by the caller and handed to
/// [`EntityRelation::with_mapper_cache`](crate::EntityRelation::with_mapper_cache).
/// A cached mapper keeps the binding from the first result set it saw, so
/// share a cache only between queries whose result sets have the same shape.
#[derive(Default)]
pub struct MapperCache {
    mappers: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl MapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mapper for `T`, created on first request.
    pub fn get_or_create<T: Entity>(&self) -> Arc<GenericEntityMapper<T>> {
        let mut mappers = self.mappers.lock();
        let entry = mappers
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(GenericEntityMapper::<T>::new()));
        match Arc::clone(entry).downcast::<GenericEntityMapper<T>>() {
            Ok(mapper) => mapper,
            Err(_) => {
                let mapper = Arc::new(GenericEntityMapper::<T>::new());
                *entry = mapper.clone();
                mapper
            }
        }
    }

    pub fn len(&self) -> usize {
        self.mappers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.lock().is_empty()
    }

    pub fn clear(&self) {
        self.mappers.lock().clear();
    }
}

impl fmt::Debug for MapperCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperCache")
            .field("mappers", &self.len())
            .finish()
    }
}
