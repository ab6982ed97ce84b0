//! Entity Registry
//!
//! Single authority for collider handle → live piece lookup. Only
//! [`BoardContext`](super::board::BoardContext) mutates it, always paired
//! with the matching physics-world and renderer change.

use std::collections::BTreeMap;

use crate::game::catalog::Fruit;
use crate::physics::{BodyHandle, ColliderHandle};
use crate::render::ProxyId;

/// Registry errors. Both indicate a spawn/merge sequencing bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Handle already registered.
    #[error("Duplicate handle {0:?}")]
    DuplicateHandle(ColliderHandle),

    /// Handle not registered.
    #[error("Handle {0:?} not found")]
    NotFound(ColliderHandle),
}

/// One live piece.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    /// Collider handle (registry key).
    pub handle: ColliderHandle,
    /// Tier. Never changes in place; a merge replaces the entity.
    pub fruit: Fruit,
    /// Owning rigid body.
    pub body: BodyHandle,
    /// Visual proxy.
    pub proxy: ProxyId,
}

/// Handle → entity map, iterated in handle order.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<ColliderHandle, Entity>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity under `handle`.
    pub fn register(&mut self, handle: ColliderHandle, entity: Entity) -> Result<(), RegistryError> {
        if self.entities.contains_key(&handle) {
            return Err(RegistryError::DuplicateHandle(handle));
        }
        self.entities.insert(handle, entity);
        Ok(())
    }

    /// Look up an entity.
    pub fn lookup(&self, handle: ColliderHandle) -> Option<&Entity> {
        self.entities.get(&handle)
    }

    /// Remove and return an entity.
    pub fn remove(&mut self, handle: ColliderHandle) -> Result<Entity, RegistryError> {
        self.entities.remove(&handle).ok_or(RegistryError::NotFound(handle))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Registered handles in order.
    pub fn handles(&self) -> impl Iterator<Item = ColliderHandle> + '_ {
        self.entities.keys().copied()
    }
}
