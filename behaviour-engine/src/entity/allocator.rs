// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Entity allocation
//!
//! The allocator hands out generational handles and recycles released slots.
//! Releasing a slot bumps its generation so that old handles stop matching.

use crate::entity::Entity;
use std::collections::HashSet;

/// Allocates and recycles entity handles for a scene
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
    alive: HashSet<Entity>,
}

impl EntityAllocator {
    /// Create a new empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new entity, reusing a released slot when one is available
    pub fn allocate(&mut self) -> Entity {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.generations.push(0);
                (self.generations.len() - 1) as u32
            }
        };

        let entity = Entity::new(index, self.generations[index as usize]);
        self.alive.insert(entity);
        entity
    }

    /// Release an entity
    ///
    /// Increments the slot generation to invalidate old references. Returns
    /// false if the entity was not alive.
    pub fn release(&mut self, entity: Entity) -> bool {
        if !self.alive.remove(&entity) {
            return false;
        }

        let index = entity.index();
        if let Some(generation) = self.generations.get_mut(index as usize) {
            *generation = generation.wrapping_add(1);
        }
        self.free.push(index);
        true
    }

    /// Check if an entity is alive
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.contains(&entity)
    }

    /// Get the number of alive entities
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Check whether no entity is alive
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Get an iterator over all alive entities
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.alive.iter()
    }
}
