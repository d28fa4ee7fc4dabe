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
//! Entity handles
//!
//! An entity is only a name that behaviours are attached under. The handle
//! pairs a slot index with the slot's generation, so a handle kept past
//! despawn never matches the entity that later reuses the slot.
//!
//! Handles order by slot first. Collision bookkeeping relies on that to key
//! contact pairs deterministically, and scoped event channels key on the
//! packed form from [`Entity::key`].

use std::fmt;

/// Generational entity handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Handle for slot `index` at `generation`
    pub const fn new(index: u32, generation: u32) -> Self {
        Entity { index, generation }
    }

    /// Slot this handle refers to
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Times the slot had been released when this handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Both halves packed into one word, slot in the high bits
    pub fn key(&self) -> u64 {
        (u64::from(self.index) << 32) | u64::from(self.generation)
    }

    /// Check whether `other` names the same slot, live or stale
    pub fn shares_slot(&self, other: Entity) -> bool {
        self.index == other.index
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reused_slot_is_a_different_entity() {
        let first = Entity::new(7, 0);
        let reused = Entity::new(7, 1);
        assert_ne!(first, reused);
        assert!(first.shares_slot(reused));
        assert_ne!(first.key(), reused.key());
    }

    #[test]
    fn test_key_does_not_collide_across_slots() {
        assert_ne!(Entity::new(1, 0).key(), Entity::new(0, 1).key());
        assert_eq!(Entity::new(1, 2).key(), (1 << 32) | 2);
    }

    #[test]
    fn test_ordering_is_by_slot_then_generation() {
        let mut handles = vec![Entity::new(2, 0), Entity::new(1, 5), Entity::new(1, 0)];
        handles.sort();
        assert_eq!(handles, vec![Entity::new(1, 0), Entity::new(1, 5), Entity::new(2, 0)]);
    }

    #[test]
    fn test_display_names_slot_and_generation() {
        assert_eq!(Entity::new(3, 2).to_string(), "#3v2");
    }
}
