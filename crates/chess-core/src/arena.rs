//! Generational arena backing the move tree.
//!
//! Nodes live in a flat `Vec` of slots. A [`NodeId`] pairs a slot index with
//! the generation the slot had when the node was allocated; freeing a slot
//! bumps its generation, so every handle issued before the free is detected
//! as stale instead of silently resolving to whatever reuses the slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Versioned handle into an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

impl NodeId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Flat store of `T` addressed by [`NodeId`].
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert into a reusable slot if one exists, otherwise grow.
    pub fn allocate(&mut self, value: T) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return NodeId::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        NodeId::new(index, 0)
    }

    /// Whether `id` still resolves to a live entry.
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    pub fn get(&self, id: NodeId) -> Result<&T, TreeError> {
        let slot = self
            .slots
            .get(id.index as usize)
            .ok_or_else(|| TreeError::NotFound(format!("no slot {}", id.index)))?;
        if slot.generation != id.generation {
            return Err(TreeError::StaleHandle(id));
        }
        slot.value.as_ref().ok_or(TreeError::StaleHandle(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut T, TreeError> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .ok_or_else(|| TreeError::NotFound(format!("no slot {}", id.index)))?;
        if slot.generation != id.generation {
            return Err(TreeError::StaleHandle(id));
        }
        slot.value.as_mut().ok_or(TreeError::StaleHandle(id))
    }

    /// Apply `mutator` in place if the handle is valid.
    pub fn update<R>(&mut self, id: NodeId, mutator: impl FnOnce(&mut T) -> R) -> Result<R, TreeError> {
        self.get_mut(id).map(mutator)
    }

    /// Remove the entry, invalidating every outstanding handle to its slot.
    pub fn free(&mut self, id: NodeId) -> Result<T, TreeError> {
        // validate first so a stale free never touches a reused slot
        self.get(id)?;
        let slot = &mut self.slots[id.index as usize];
        let value = slot.value.take().ok_or(TreeError::StaleHandle(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Ok(value)
    }

    /// Free every live slot. Slots are handed out again lowest index first.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.len = 0;
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (NodeId::new(index as u32, slot.generation), value))
        })
    }
}
