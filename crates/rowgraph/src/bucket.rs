//! Per-relationship reconciliation buffer.
//!
//! A relationship sees parents and children in whatever order the result sets
//! deliver them. For each key the buffer keeps a [`Bucket`]: the parent once
//! one has been observed, and the children that arrived before it. Buckets
//! live in an arena addressed through the key index, so every lookup yields
//! the live bucket rather than a copy of it.

use crate::key::{KeyIndex, RelationKey};
use rowgraph_core::Shared;
use std::sync::Arc;

/// Links one child to one parent.
pub type LinkFn<P, C> = Arc<dyn Fn(&Shared<P>, &Shared<C>) + Send + Sync>;

/// Reconciliation state for one key.
pub struct Bucket<P, C> {
    parent: Option<Shared<P>>,
    pending: Vec<Shared<C>>,
}

impl<P, C> Bucket<P, C> {
    fn new() -> Self {
        Self {
            parent: None,
            pending: Vec::new(),
        }
    }

    /// The parent for this key, once observed.
    pub fn parent(&self) -> Option<&Shared<P>> {
        self.parent.as_ref()
    }

    /// Children still waiting for a parent, in arrival order.
    pub fn pending(&self) -> &[Shared<C>] {
        &self.pending
    }
}

/// What a single observation did to its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// First parent for the key; `flushed` buffered children were linked to it.
    Resolved { flushed: usize },
    /// The key already had a parent; nothing changed.
    DuplicateParent,
    /// Child linked straight to an already observed parent.
    Linked,
    /// Child buffered until its parent shows up.
    Buffered,
}

impl Reconciled {
    /// Number of link calls this observation made.
    pub fn links(self) -> usize {
        match self {
            Reconciled::Resolved { flushed } => flushed,
            Reconciled::Linked => 1,
            Reconciled::DuplicateParent | Reconciled::Buffered => 0,
        }
    }
}

/// Bucket counts for one relationship.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationStats {
    /// Distinct keys observed on either side.
    pub keys: usize,
    /// Keys that have a parent.
    pub resolved: usize,
    /// Children buffered under keys that have no parent yet.
    pub pending_children: usize,
}

/// Key-indexed buckets for one relationship.
pub struct ReconcileBuffer<K: RelationKey, P, C> {
    index: K::Index,
    buckets: Vec<Bucket<P, C>>,
}

impl<K: RelationKey, P, C> Default for ReconcileBuffer<K, P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RelationKey, P, C> ReconcileBuffer<K, P, C> {
    pub fn new() -> Self {
        Self {
            index: K::Index::default(),
            buckets: Vec::new(),
        }
    }

    /// The bucket for `key`, if the key has been observed.
    pub fn get(&self, key: &K) -> Option<&Bucket<P, C>> {
        self.index.get(key).map(|slot| &self.buckets[slot])
    }

    fn bucket_mut(&mut self, key: K) -> &mut Bucket<P, C> {
        let next = self.buckets.len();
        let slot = self.index.get_or_insert(key, next);
        if slot == next {
            self.buckets.push(Bucket::new());
        }
        &mut self.buckets[slot]
    }

    /// Record `parent` under `key`.
    ///
    /// The first parent for a key takes over every buffered child, linked in
    /// arrival order. Later parents for the same key are ignored.
    pub fn observe_parent(&mut self, key: K, parent: &Shared<P>, link: &LinkFn<P, C>) -> Reconciled {
        let bucket = self.bucket_mut(key);
        if bucket.parent.is_some() {
            return Reconciled::DuplicateParent;
        }

        let flushed = bucket.pending.len();
        for child in bucket.pending.drain(..) {
            link(parent, &child);
        }
        bucket.parent = Some(Arc::clone(parent));
        Reconciled::Resolved { flushed }
    }

    /// Record `child` under `key`, linking it now if the parent is known.
    pub fn observe_child(&mut self, key: K, child: &Shared<C>, link: &LinkFn<P, C>) -> Reconciled {
        let bucket = self.bucket_mut(key);
        match &bucket.parent {
            Some(parent) => {
                link(parent, child);
                Reconciled::Linked
            }
            None => {
                bucket.pending.push(Arc::clone(child));
                Reconciled::Buffered
            }
        }
    }

    pub fn stats(&self) -> RelationStats {
        let mut stats = RelationStats {
            keys: self.buckets.len(),
            ..RelationStats::default()
        };
        for bucket in &self.buckets {
            if bucket.parent.is_some() {
                stats.resolved += 1;
            }
            stats.pending_children += bucket.pending.len();
        }
        stats
    }
}
