//! Append-only tables of netlist entities keyed by typed IDs.
//!
//! A netlist never deletes a signal, domain or binding once declared, so an
//! [`Arena`] is a `Vec` whose positions double as IDs. The ID type parameter
//! keeps a [`SignalId`](crate::SignalId) from indexing the domain table.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed position in an [`Arena`].
pub trait ArenaId: Copy {
    /// Wraps a raw position.
    fn from_raw(index: u32) -> Self;

    /// Unwraps the raw position.
    fn as_raw(self) -> u32;

    /// The position as a `Vec` index.
    fn slot(self) -> usize {
        self.as_raw() as usize
    }
}

/// Entities of one kind, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arena<I: ArenaId, T> {
    items: Vec<T>,
    #[serde(skip)]
    key: PhantomData<fn() -> I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// An empty table.
    pub fn new() -> Self {
        Arena {
            items: Vec::new(),
            key: PhantomData,
        }
    }

    /// Appends `item` and returns its ID.
    pub fn alloc(&mut self, item: T) -> I {
        let next = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        self.items.push(item);
        I::from_raw(next)
    }

    /// Looks up a declared entity.
    ///
    /// # Panics
    ///
    /// If `id` was not handed out by this table. Use [`try_get`](Self::try_get)
    /// for IDs that have not been validated.
    pub fn get(&self, id: I) -> &T {
        &self.items[id.slot()]
    }

    /// Mutable access to a declared entity.
    ///
    /// # Panics
    ///
    /// If `id` was not handed out by this table.
    pub fn get_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.slot()]
    }

    /// Looks up an entity that may not exist, such as an ID read from a
    /// deserialized netlist.
    pub fn try_get(&self, id: I) -> Option<&T> {
        self.items.get(id.slot())
    }

    /// Whether `id` names an entity in this table.
    pub fn contains(&self, id: I) -> bool {
        id.slot() < self.items.len()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All IDs, in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = I> {
        (0..self.items.len()).map(|slot| I::from_raw(slot as u32))
    }

    /// `(id, entity)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.ids().zip(self.items.iter())
    }

    /// Entities in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        self.get(id)
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        self.get_mut(id)
    }
}
