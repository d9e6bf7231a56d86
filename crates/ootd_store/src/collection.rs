//! Id-keyed, dedup-enforcing entity collection.
//!
//! This is the single merge point for HTTP pages and channel pushes. Both
//! paths race on the same id space, so every insert is an upsert that keeps
//! the existing position.

use ootd_protocol::{Entity, Patch, ProtocolResult};
use std::collections::HashMap;

/// An ordered collection of entities with unique ids.
///
/// # Invariants
///
/// - No two elements share an id
/// - Upserting or patching a known id never changes its index
#[derive(Debug, Clone)]
pub struct EntityCollection<T: Entity> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Entity> EntityCollection<T> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a collection from server order, deduplicating.
    pub fn from_vec(items: Vec<T>) -> Self {
        let mut collection = Self::new();
        collection.replace_all(items);
        collection
    }

    /// Inserts at index 0, or updates in place if the id is known.
    ///
    /// Returns true if the id was new.
    pub fn insert_front(&mut self, entity: T) -> bool {
        if let Some(&pos) = self.index.get(entity.id()) {
            self.items[pos] = entity;
            return false;
        }
        self.items.insert(0, entity);
        self.reindex();
        true
    }

    /// Appends entities in order; known ids are updated in place.
    ///
    /// Returns the number of new entities.
    pub fn append_back<I>(&mut self, entities: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut added = 0;
        for entity in entities {
            if let Some(&pos) = self.index.get(entity.id()) {
                self.items[pos] = entity;
            } else {
                self.index.insert(entity.id().to_string(), self.items.len());
                self.items.push(entity);
                added += 1;
            }
        }
        added
    }

    /// Shallow-merges `patch` into the entity with `id`.
    ///
    /// Returns `Ok(false)` if the id is unknown. On error the entity is left
    /// untouched.
    pub fn patch(&mut self, id: &str, patch: &Patch) -> ProtocolResult<bool> {
        let Some(&pos) = self.index.get(id) else {
            return Ok(false);
        };
        let merged = self.items[pos].patched(patch)?;
        self.items[pos] = merged;
        Ok(true)
    }

    /// Removes the entity with `id`. Idempotent.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let pos = self.index.remove(id)?;
        let removed = self.items.remove(pos);
        self.reindex();
        Some(removed)
    }

    /// Replaces every element with `entities`.
    ///
    /// Duplicate ids inside the input keep the first position and the last
    /// value.
    pub fn replace_all<I>(&mut self, entities: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.items.clear();
        self.index.clear();
        self.append_back(entities);
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    /// Returns true if an entity with `id` is present.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the entity with `id`.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    /// Returns the index of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in collection order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Returns the entities as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Returns the ids in order.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|e| e.id().to_string()).collect()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, item) in self.items.iter().enumerate() {
            self.index.insert(item.id().to_string(), pos);
        }
    }
}

impl<T: Entity> Default for EntityCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}
