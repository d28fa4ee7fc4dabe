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
//! Broad phase, collision bookkeeping and contact events
//!
//! [`CollisionManager`] owns every [`Geometry`]. Each step it pairs up
//! geometries whose bounding circles overlap, keeps one pooled [`Collision`]
//! per pair while they stay close, maintains each geometry's touching list
//! and publishes [`CollisionEvent`]s when contact begins or ends.

use super::{Collision, CollisionResolver, Geometry, PhysicsConfig};
use crate::behaviour::{Behaviour, BehaviourManager, Manager, Registration};
use crate::entity::Entity;
use crate::error::Result;
use crate::pool::{Pool, PoolConfig};
use crate::services::{EventService, ServiceContainer};
use crate::sync::{lock, read, write};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Contact begin/end notification
///
/// Sent on the global channel and on the scoped channel of both entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEvent {
    /// Two geometries started touching
    Started {
        /// First entity
        a: Entity,
        /// Second entity
        b: Entity,
    },
    /// Two geometries stopped touching
    Ended {
        /// First entity
        a: Entity,
        /// Second entity
        b: Entity,
    },
}

impl CollisionEvent {
    /// Both entities involved
    pub fn entities(&self) -> (Entity, Entity) {
        match *self {
            CollisionEvent::Started { a, b } | CollisionEvent::Ended { a, b } => (a, b),
        }
    }

    /// Check whether `entity` takes part
    pub fn involves(&self, entity: Entity) -> bool {
        let (a, b) = self.entities();
        a == entity || b == entity
    }
}

/// Ordered entity pair identifying a collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct PairKey(Entity, Entity);

impl PairKey {
    fn new(a: &Geometry, b: &Geometry) -> Option<Self> {
        let (a, b) = (a.core().owner()?, b.core().owner()?);
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(PairKey(a, b)),
            std::cmp::Ordering::Greater => Some(PairKey(b, a)),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Manager owning every [`Geometry`] and resolving their contacts
pub struct CollisionManager {
    geometries: BehaviourManager<Geometry>,
    max_contacts: usize,
    collisions: Mutex<BTreeMap<PairKey, Collision>>,
    pool: Pool<Collision>,
    events: RwLock<Option<Arc<EventService>>>,
}

impl CollisionManager {
    /// Create a manager using `config.max_contacts`
    pub fn new(config: &PhysicsConfig) -> Self {
        Self::with_pool_config(config, PoolConfig::default())
    }

    /// Create a manager with custom collision pooling
    pub fn with_pool_config(config: &PhysicsConfig, pool: PoolConfig) -> Self {
        CollisionManager {
            geometries: BehaviourManager::new(),
            max_contacts: config.max_contacts,
            collisions: Mutex::new(BTreeMap::new()),
            pool: Pool::with_config(pool),
            events: RwLock::new(None),
        }
    }

    /// Managed geometries
    pub fn geometries(&self) -> &BehaviourManager<Geometry> {
        &self.geometries
    }

    /// Number of tracked pairs, touching or not
    pub fn pair_count(&self) -> usize {
        lock(&self.collisions).len()
    }

    /// Number of pairs currently in contact
    pub fn touching_count(&self) -> usize {
        lock(&self.collisions)
            .values()
            .filter(|c| c.is_touching())
            .count()
    }

    /// Run `f` over every pair currently in contact
    pub fn for_each_contact(&self, mut f: impl FnMut(&Collision)) {
        for collision in lock(&self.collisions).values() {
            if collision.is_touching() {
                f(collision);
            }
        }
    }

    /// Statistics of the collision pool
    pub fn pool_stats(&self) -> crate::pool::PoolStats {
        self.pool.stats()
    }

    fn may_collide(a: &Geometry, b: &Geometry) -> bool {
        let group = a.group();
        if group != 0 && group == b.group() {
            return false;
        }
        let (Some(body_a), Some(body_b)) = (a.body(), b.body()) else {
            return false;
        };
        if body_a.is_resting() && body_b.is_resting() {
            return false;
        }
        let reach = a.shape().bounding_radius() + b.shape().bounding_radius();
        (body_b.position() - body_a.position()).length_squared() <= reach * reach
    }

    fn recycle(&self, mut collision: Collision) {
        collision.clear();
        self.pool.release(collision);
    }

    fn begin_contact(collision: &Collision) {
        let (Some(a), Some(b)) = (collision.geometry_a(), collision.geometry_b()) else {
            return;
        };
        a.add_touching(b);
        b.add_touching(a);
        for geometry in [a, b] {
            if let Some(body) = geometry.body() {
                body.wake();
            }
        }
    }

    fn end_contact(collision: &Collision) {
        if let (Some(a), Some(b)) = (collision.geometry_a(), collision.geometry_b()) {
            a.remove_touching(b);
            b.remove_touching(a);
        }
    }

    fn publish(&self, events: Vec<CollisionEvent>) {
        if events.is_empty() {
            return;
        }
        let Some(service) = read(&self.events).clone() else {
            return;
        };
        for event in events {
            let (a, b) = event.entities();
            service.scoped::<CollisionEvent>(a).send(event);
            service.scoped::<CollisionEvent>(b).send_local(event);
        }
    }
}

impl Manager for CollisionManager {
    fn register(self: Arc<Self>, registration: &mut Registration) {
        registration.manages(&self.geometries);
        registration.category::<dyn CollisionResolver>(self.clone());
    }

    fn initialise(self: Arc<Self>, services: &ServiceContainer) -> Result<()> {
        *write(&self.events) = Some(services.require::<EventService>()?);
        Ok(())
    }

    fn shutdown(&self) {
        let drained = std::mem::take(&mut *lock(&self.collisions));
        for (_, collision) in drained {
            Self::end_contact(&collision);
            self.recycle(collision);
        }
        self.geometries.dispose();
    }
}

impl CollisionResolver for CollisionManager {
    fn resolve(&self, dt: f64, iterations: usize, allowed_penetration: f64, bias_factor: f64) {
        let geometries = self.geometries.behaviours();
        let present: HashSet<Entity> = geometries
            .iter()
            .filter_map(|g| g.core().owner())
            .collect();
        let mut events = Vec::new();

        {
            let mut collisions = lock(&self.collisions);

            let departed: Vec<PairKey> = collisions
                .keys()
                .filter(|k| !present.contains(&k.0) || !present.contains(&k.1))
                .copied()
                .collect();
            for key in departed {
                if let Some(collision) = collisions.remove(&key) {
                    if collision.is_touching() {
                        Self::end_contact(&collision);
                        events.push(CollisionEvent::Ended { a: key.0, b: key.1 });
                    }
                    self.recycle(collision);
                }
            }

            for (i, a) in geometries.iter().enumerate() {
                for b in &geometries[i + 1..] {
                    let Some(key) = PairKey::new(a, b) else {
                        continue;
                    };
                    if collisions.contains_key(&key) || !Self::may_collide(a, b) {
                        continue;
                    }
                    let mut collision = self.pool.acquire_with(Collision::default);
                    collision.reset(Arc::clone(a), Arc::clone(b));
                    collisions.insert(key, collision);
                }
            }

            let keys: Vec<PairKey> = collisions.keys().copied().collect();
            for key in keys {
                let Some(collision) = collisions.get_mut(&key) else {
                    continue;
                };
                let was_touching = collision.is_touching();
                if collision.find_contacts(self.max_contacts) {
                    if !was_touching {
                        Self::begin_contact(collision);
                        debug!("collision started between {} and {}", key.0, key.1);
                        events.push(CollisionEvent::Started { a: key.0, b: key.1 });
                    }
                    continue;
                }
                if let Some(collision) = collisions.remove(&key) {
                    if was_touching {
                        Self::end_contact(&collision);
                        debug!("collision ended between {} and {}", key.0, key.1);
                        events.push(CollisionEvent::Ended { a: key.0, b: key.1 });
                    }
                    self.recycle(collision);
                }
            }

            for collision in collisions.values_mut() {
                collision.prepare(dt, allowed_penetration, bias_factor);
            }
            for _ in 0..iterations {
                for collision in collisions.values_mut() {
                    collision.iterate();
                }
            }
        }

        self.publish(events);
    }
}
