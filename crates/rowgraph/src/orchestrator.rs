//! Population loop over a multi-result-set cursor.
//!
//! [`EntityRelation`] owns the cursor and the relationship registry. Each
//! [`populate`](EntityRelation::populate) call consumes exactly one result
//! set: it materializes every row, hands each entity to the relationships it
//! takes part in, and moves the cursor on to the next result set.

use crate::bucket::{Reconciled, RelationStats};
use crate::config::GraphConfig;
use crate::key::RelationKey;
use crate::mapper::{EntityMapper, GenericEntityMapper, MapperCache, field_ordinal};
use crate::relation::{ErasedRelation, Relation, RelationOptions};
use rowgraph_core::{ConfigErrorKind, Entity, Error, Result, ResultCursor, Shared, share};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Callback run on every entity right after it is materialized.
///
/// Receives the cursor, still positioned on the entity's row, so extra
/// columns can be read. An error aborts the population call.
pub type OnPopulated<'a, T, C> = Box<dyn FnMut(&C, &Shared<T>) -> Result<()> + 'a>;

/// Per-call options for [`EntityRelation::populate_with`].
pub struct PopulateOptions<'a, T: Entity, C> {
    mapper: Option<&'a dyn EntityMapper<T>>,
    on_populated: Option<OnPopulated<'a, T, C>>,
}

impl<T: Entity, C> Default for PopulateOptions<'_, T, C> {
    fn default() -> Self {
        Self {
            mapper: None,
            on_populated: None,
        }
    }
}

impl<'a, T: Entity, C> PopulateOptions<'a, T, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize rows with `mapper` instead of a generic one.
    pub fn mapper(mut self, mapper: &'a dyn EntityMapper<T>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Run `callback` on each entity as soon as it is created.
    pub fn on_populated<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&C, &Shared<T>) -> Result<()> + 'a,
    {
        self.on_populated = Some(Box::new(callback));
        self
    }
}

/// Diagnostics for one registered relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSummary {
    pub parent: &'static str,
    pub child: &'static str,
    pub foreign_key: String,
    pub stats: RelationStats,
}

/// Where a parent-role relationship reads its key from.
#[derive(Debug, Clone, Copy)]
enum ParentKeySource {
    PrimaryKey,
    Column(usize),
}

/// Materializes linked entity graphs from a multi-result-set cursor.
///
/// # Example
///
/// ```ignore
/// let mut relation = EntityRelation::new(cursor);
/// relation.define_relationship::<Manager, ManagerItem>(RelationOptions::new())?;
///
/// let managers = relation.populate::<Manager>()?;
/// let items = relation.populate::<ManagerItem>()?;
/// // every manager's `manager_items` now holds its items
/// ```
///
/// Result sets must be populated in the order the query produces them.
/// Relationships must be registered before the first `populate` call.
pub struct EntityRelation<C> {
    cursor: C,
    relations: Vec<Box<dyn ErasedRelation>>,
    config: GraphConfig,
    mappers: Option<Arc<MapperCache>>,
    sealed: bool,
}

impl<C: ResultCursor> EntityRelation<C> {
    /// Create an engine over `cursor` with default settings.
    pub fn new(cursor: C) -> Self {
        Self::with_config(cursor, GraphConfig::default())
    }

    pub fn with_config(cursor: C, config: GraphConfig) -> Self {
        Self {
            cursor,
            relations: Vec::new(),
            config,
            mappers: None,
            sealed: false,
        }
    }

    /// Reuse mappers from `cache` instead of creating one per call.
    pub fn with_mapper_cache(mut self, cache: Arc<MapperCache>) -> Self {
        self.mappers = Some(cache);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn cursor(&self) -> &C {
        &self.cursor
    }

    /// Give the cursor back, ending population.
    pub fn into_cursor(self) -> C {
        self.cursor
    }

    /// Number of registered relationships.
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Register a relationship keyed by `i64`.
    pub fn define_relationship<P: Entity, Ch: Entity>(
        &mut self,
        options: RelationOptions<P, Ch>,
    ) -> Result<()> {
        self.define_keyed_relationship::<i64, P, Ch>(options)
    }

    /// Register a relationship keyed by `K`.
    ///
    /// Fails if the link function cannot be synthesized or population has
    /// already started.
    pub fn define_keyed_relationship<K: RelationKey, P: Entity, Ch: Entity>(
        &mut self,
        options: RelationOptions<P, Ch>,
    ) -> Result<()> {
        if self.sealed {
            return Err(Error::config(
                ConfigErrorKind::RegistrySealed,
                format!(
                    "cannot register {} -> {} after population has started",
                    P::ENTITY_NAME,
                    Ch::ENTITY_NAME
                ),
            ));
        }

        let relation = Relation::<K, P, Ch>::new(options)?;
        tracing::debug!(
            parent = P::ENTITY_NAME,
            child = Ch::ENTITY_NAME,
            key = K::KEY_TYPE,
            foreign_key = relation.foreign_key(),
            parent_key = relation.parent_key(),
            "Registered relationship"
        );
        self.relations.push(Box::new(relation));
        Ok(())
    }

    /// Register a relationship with an explicit link function.
    pub fn define_linked_relationship<K, P, Ch, F>(
        &mut self,
        options: RelationOptions<P, Ch>,
        link: F,
    ) -> Result<()>
    where
        K: RelationKey,
        P: Entity,
        Ch: Entity,
        F: Fn(&Shared<P>, &Shared<Ch>) + Send + Sync + 'static,
    {
        self.define_keyed_relationship::<K, P, Ch>(options.link(link))
    }

    /// Reconciliation state of every relationship, in registration order.
    pub fn stats(&self) -> Vec<RelationSummary> {
        self.relations
            .iter()
            .map(|r| RelationSummary {
                parent: r.parent_name(),
                child: r.child_name(),
                foreign_key: r.foreign_key().to_string(),
                stats: r.stats(),
            })
            .collect()
    }

    /// Materialize the current result set as `T` and advance the cursor.
    pub fn populate<T: Entity>(&mut self) -> Result<Vec<Shared<T>>> {
        self.populate_with(PopulateOptions::new())
    }

    /// Like [`populate`](Self::populate), with a custom mapper and/or a
    /// per-entity callback.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::ENTITY_NAME))]
    pub fn populate_with<T: Entity>(
        &mut self,
        options: PopulateOptions<'_, T, C>,
    ) -> Result<Vec<Shared<T>>> {
        self.sealed = true;
        let PopulateOptions {
            mapper,
            mut on_populated,
        } = options;

        let target = TypeId::of::<T>();
        let parent_roles: Vec<usize> = (0..self.relations.len())
            .filter(|&i| self.relations[i].parent_type() == target)
            .collect();
        let child_roles: Vec<usize> = (0..self.relations.len())
            .filter(|&i| self.relations[i].child_type() == target)
            .collect();

        let mut entities = Vec::new();

        if self.cursor.has_rows() {
            let (parent_keys, child_keys) =
                self.resolve_ordinals::<T>(&parent_roles, &child_roles)?;

            let cached;
            let fresh;
            let mapper: &dyn EntityMapper<T> = match (mapper, &self.mappers) {
                (Some(mapper), _) => mapper,
                (None, Some(cache)) => {
                    cached = cache.get_or_create::<T>();
                    &*cached
                }
                (None, None) => {
                    fresh = GenericEntityMapper::<T>::new();
                    &fresh
                }
            };
            mapper.bind_columns(self.cursor.columns())?;

            let mut links = 0usize;
            let mut buffered = 0usize;

            while self.cursor.read()? {
                let entity = share(mapper.populate_row(&self.cursor)?);
                if let Some(callback) = on_populated.as_mut() {
                    callback(&self.cursor, &entity)?;
                }

                for &(index, source) in &parent_keys {
                    let primary;
                    let key = match source {
                        ParentKeySource::PrimaryKey => {
                            primary = entity.read().primary_key_value();
                            primary.as_ref()
                        }
                        ParentKeySource::Column(ordinal) => self.cursor.value(ordinal),
                    };
                    let Some(key) = key.filter(|k| !k.is_null()) else {
                        continue;
                    };
                    let result = self.relations[index].observe_parent(&entity, key)?;
                    links += result.links();
                }

                for &(index, ordinal) in &child_keys {
                    let Some(key) = self.cursor.value(ordinal).filter(|k| !k.is_null()) else {
                        continue;
                    };
                    let result = self.relations[index].observe_child(&entity, key)?;
                    links += result.links();
                    if result == Reconciled::Buffered {
                        buffered += 1;
                    }
                }

                entities.push(entity);
            }

            tracing::debug!(
                rows = entities.len(),
                links,
                buffered,
                "Populated result set"
            );
        } else {
            tracing::debug!("Result set is empty");
        }

        let more = self.cursor.next_result_set()?;
        if !more {
            self.report_orphans();
        }
        Ok(entities)
    }

    /// Resolve key ordinals against the current result set.
    fn resolve_ordinals<T: Entity>(
        &self,
        parent_roles: &[usize],
        child_roles: &[usize],
    ) -> Result<(Vec<(usize, ParentKeySource)>, Vec<(usize, usize)>)> {
        let columns = self.cursor.columns();
        let matching = self.config.column_matching;

        let mut child_keys = Vec::with_capacity(child_roles.len());
        for &index in child_roles {
            let relation = &self.relations[index];
            let ordinal = columns
                .resolve(relation.foreign_key(), matching)
                .ok_or_else(|| {
                    Error::column_not_found(
                        T::ENTITY_NAME,
                        relation.foreign_key(),
                        Some(relation.parent_name()),
                    )
                })?;
            tracing::debug!(
                column = relation.foreign_key(),
                ordinal,
                parent = relation.parent_name(),
                "Resolved foreign key"
            );
            child_keys.push((index, ordinal));
        }

        let mut parent_keys = Vec::with_capacity(parent_roles.len());
        for &index in parent_roles {
            let relation = &self.relations[index];
            let ordinal = match relation.primary_key_field() {
                Some(field) => field_ordinal(field, columns),
                None => columns.resolve(relation.parent_key(), matching),
            }
            .ok_or_else(|| {
                Error::column_not_found(
                    T::ENTITY_NAME,
                    relation.parent_key(),
                    Some(relation.child_name()),
                )
            })?;
            tracing::debug!(
                column = relation.parent_key(),
                ordinal,
                child = relation.child_name(),
                "Resolved parent key"
            );
            let source = if relation.primary_key_field().is_some() {
                ParentKeySource::PrimaryKey
            } else {
                ParentKeySource::Column(ordinal)
            };
            parent_keys.push((index, source));
        }

        Ok((parent_keys, child_keys))
    }

    fn report_orphans(&self) {
        if !self.config.warn_on_orphans {
            return;
        }
        for relation in &self.relations {
            let stats = relation.stats();
            if stats.pending_children > 0 {
                tracing::warn!(
                    parent = relation.parent_name(),
                    child = relation.child_name(),
                    orphans = stats.pending_children,
                    "Children never matched a parent"
                );
            }
        }
    }
}

impl<C> fmt::Debug for EntityRelation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRelation")
            .field("relations", &self.relations.len())
            .field("config", &self.config)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{MemoryCursor, ParentRef, ResultSet, Value};
    use rowgraph_macros::Entity;

    #[derive(Entity, Default)]
    struct Manager {
        id: i64,
        name: String,
        manager_items: Vec<Shared<ManagerItem>>,
    }

    #[derive(Entity, Default)]
    struct ManagerItem {
        id: i64,
        manager_id: Option<i64>,
        manager: ParentRef<Manager>,
    }

    fn managers() -> ResultSet {
        ResultSet::new(["Id", "Name"])
            .row([Value::BigInt(1), Value::from("one")])
            .row([Value::BigInt(2), Value::from("two")])
    }

    fn items(keys: &[Option<i64>]) -> ResultSet {
        let mut set = ResultSet::new(["Id", "ManagerId"]);
        for (i, key) in keys.iter().enumerate() {
            set.push_row([Value::BigInt(i as i64 + 10), Value::from(*key)]);
        }
        set
    }

    fn ids(items: &[Shared<ManagerItem>]) -> Vec<i64> {
        items.iter().map(|i| i.read().id).collect()
    }

    #[test]
    fn test_parents_then_children() {
        let cursor = MemoryCursor::new([managers(), items(&[Some(1), Some(1), Some(2)])]);
        let mut relation = EntityRelation::new(cursor);
        relation
            .define_relationship::<Manager, ManagerItem>(RelationOptions::new())
            .unwrap();

        let managers = relation.populate::<Manager>().unwrap();
        let items = relation.populate::<ManagerItem>().unwrap();

        assert_eq!(managers.len(), 2);
        assert_eq!(items.len(), 3);
        assert_eq!(ids(&managers[0].read().manager_items), vec![10, 11]);
        assert_eq!(ids(&managers[1].read().manager_items), vec![12]);
        assert!(items[2].read().manager.points_to(&managers[1]));
        assert!(relation.into_cursor().is_exhausted());
    }

    #[test]
    fn test_empty_result_set_still_advances() {
        let cursor = MemoryCursor::new([ResultSet::new(["Id"]), items(&[Some(1)])]);
        let mut relation = EntityRelation::new(cursor);
        relation
            .define_relationship::<Manager, ManagerItem>(RelationOptions::new())
            .unwrap();

        assert!(relation.populate::<Manager>().unwrap().is_empty());
        let items = relation.populate::<ManagerItem>().unwrap();
        assert_eq!(items.len(), 1);
        assert!(!items[0].read().manager.is_set());
        assert_eq!(relation.stats()[0].stats.pending_children, 1);
    }

    #[test]
    fn test_registration_is_sealed_after_populate() {
        let cursor = MemoryCursor::new([managers()]);
        let mut relation = EntityRelation::new(cursor);
        relation.populate::<Manager>().unwrap();

        let err = relation
            .define_relationship::<Manager, ManagerItem>(RelationOptions::new())
            .unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::RegistrySealed));
        assert_eq!(relation.relation_count(), 0);
    }

    #[test]
    fn test_missing_parent_key_column() {
        let cursor = MemoryCursor::new([ResultSet::new(["Code"]).row(["x"])]);
        let mut relation = EntityRelation::new(cursor);
        relation
            .define_relationship::<Manager, ManagerItem>(
                RelationOptions::new().parent_key("Code2"),
            )
            .unwrap();

        let Err(err) = relation.populate::<Manager>() else {
            panic!("missing parent key column must fail");
        };
        assert!(err.is_schema());
        assert_eq!(
            err.to_string(),
            "Schema error: Manager expected column Code2 to map with ManagerItem which was not provided"
        );
    }

    #[test]
    fn test_callback_error_aborts() {
        let cursor = MemoryCursor::new([managers()]);
        let mut relation = EntityRelation::new(cursor);
        let mut seen = 0;
        let result = relation.populate_with::<Manager>(PopulateOptions::new().on_populated(
            |_, _| {
                seen += 1;
                Err(Error::Custom("stop".to_string()))
            },
        ));
        let Err(err) = result else {
            panic!("callback error must abort population");
        };
        assert_eq!(err.to_string(), "stop");
        assert_eq!(seen, 1);
    }
}
