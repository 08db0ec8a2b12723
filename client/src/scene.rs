//! Rendering boundary
//!
//! Scene construction and drawing are outside this crate. The game core only
//! tells a [`Scene`] which entities exist and where they are; an embedder
//! backs the trait with its renderer, while [`NullScene`] runs headless and
//! [`MemoryScene`] lets tests assert on what would be drawn.

use glam::{Quat, Vec3};
use shared::{BulletId, PlayerId};
use std::collections::HashMap;

/// Stable key for everything the scene can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    Vehicle(PlayerId),
    Bullet(BulletId),
}

pub trait Scene {
    fn add(&mut self, id: EntityId, position: Vec3, rotation: Quat);
    fn update(&mut self, id: EntityId, position: Vec3, rotation: Quat);
    fn remove(&mut self, id: EntityId);
}

/// Discards everything. The default for the headless client.
#[derive(Debug, Default)]
pub struct NullScene;

impl Scene for NullScene {
    fn add(&mut self, _id: EntityId, _position: Vec3, _rotation: Quat) {}
    fn update(&mut self, _id: EntityId, _position: Vec3, _rotation: Quat) {}
    fn remove(&mut self, _id: EntityId) {}
}

/// Keeps the last transform per entity. `update` on an unknown id inserts,
/// mirroring how a real backend would lazily create a node.
#[derive(Debug, Default)]
pub struct MemoryScene {
    entities: HashMap<EntityId, (Vec3, Quat)>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn transform(&self, id: EntityId) -> Option<(Vec3, Quat)> {
        self.entities.get(&id).copied()
    }
}

impl Scene for MemoryScene {
    fn add(&mut self, id: EntityId, position: Vec3, rotation: Quat) {
        self.entities.insert(id, (position, rotation));
    }

    fn update(&mut self, id: EntityId, position: Vec3, rotation: Quat) {
        self.entities.insert(id, (position, rotation));
    }

    fn remove(&mut self, id: EntityId) {
        self.entities.remove(&id);
    }
}
