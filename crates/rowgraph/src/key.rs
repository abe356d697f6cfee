//! Relationship key types.
//!
//! Every relationship is parameterized by a key type `K`. The key is read
//! from the foreign-key column of child rows and from the parent key (column
//! or primary key) of parent rows. `i64` is the default and gets a dedicated
//! index backed by `FxHashMap`; every other key type goes through the generic
//! `HashMap` index. Both indexes only map keys to bucket slots, so the choice
//! never changes how rows are reconciled.

use rowgraph_core::{Error, FromValue, Result, TypeError, Value};
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Maps relationship keys to bucket slots.
pub trait KeyIndex<K>: Default + Send + Sync {
    /// Slot for `key`, if one has been assigned.
    fn get(&self, key: &K) -> Option<usize>;

    /// Slot for `key`, assigning `next` if the key is new.
    fn get_or_insert(&mut self, key: K, next: usize) -> usize;

    /// Number of distinct keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A type usable as a relationship key.
pub trait RelationKey: FromValue + Hash + Eq + Clone + Debug + Send + Sync + 'static {
    /// Key-to-slot index used by the reconciliation buffer.
    type Index: KeyIndex<Self>;

    /// Type name reported in conversion errors.
    const KEY_TYPE: &'static str;

    /// Read a key from a non-NULL column value.
    fn read_key(value: &Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// Index for `i64` keys.
#[derive(Debug, Default)]
pub struct IntKeyIndex {
    slots: FxHashMap<i64, usize>,
}

impl KeyIndex<i64> for IntKeyIndex {
    fn get(&self, key: &i64) -> Option<usize> {
        self.slots.get(key).copied()
    }

    fn get_or_insert(&mut self, key: i64, next: usize) -> usize {
        *self.slots.entry(key).or_insert(next)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Index for any other hashable key.
#[derive(Debug)]
pub struct HashKeyIndex<K> {
    slots: HashMap<K, usize>,
}

impl<K> Default for HashKeyIndex<K> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Send + Sync> KeyIndex<K> for HashKeyIndex<K> {
    fn get(&self, key: &K) -> Option<usize> {
        self.slots.get(key).copied()
    }

    fn get_or_insert(&mut self, key: K, next: usize) -> usize {
        *self.slots.entry(key).or_insert(next)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

impl RelationKey for i64 {
    type Index = IntKeyIndex;
    const KEY_TYPE: &'static str = "i64";

    fn read_key(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| Error::Type(TypeError::new("i64", value.type_name())))
    }
}

macro_rules! hashed_keys {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RelationKey for $ty {
                type Index = HashKeyIndex<$ty>;
                const KEY_TYPE: &'static str = stringify!($ty);
            }
        )*
    };
}

hashed_keys!(i8, i16, i32, u8, u16, u32, u64, String, [u8; 16]);
