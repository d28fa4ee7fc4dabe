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
//! 2D rigid-body physics on top of behaviours and managers
//!
//! Bodies ([`DynamicPhysics`]), collision shapes ([`Geometry`]) and springs
//! ([`Spring`]) are behaviours. Their managers implement the role traits
//! below, and [`PhysicsEngine`] drives every registered role in a fixed
//! order each tick.
//!
//! [`install`] wires the standard managers and the engine into a scene.

mod body;
mod collision;
mod config;
mod engine;
mod forces;
mod geometry;
pub mod math;
mod resolver;

pub use body::{DynamicPhysics, DynamicPhysicsManager};
pub use collision::{Collision, Contact, ContactFeature};
pub use config::PhysicsConfig;
pub use engine::PhysicsEngine;
pub use forces::{Spring, SpringAnchor, SpringManager};
pub use geometry::{Geometry, Shape};
pub use math::Vec2;
pub use resolver::{CollisionEvent, CollisionManager};

use crate::behaviour::ManagerId;
use crate::error::Result;
use crate::scene::Scene;
use log::{debug, warn};
use std::sync::Arc;

/// Step 1: accumulate forces and torques
pub trait ForceProvider: Send + Sync {
    /// Add this provider's forces for a step of `dt` seconds
    fn accumulate_forces(&self, dt: f64);
}

/// Step 2: convert accumulated forces into accelerations
pub trait ForceApplier: Send + Sync {
    /// Compute accelerations and clear the force accumulators
    fn apply_forces(&self, dt: f64);
}

/// Steps 3 and 7: semi-implicit Euler integration
pub trait Integrator: Send + Sync {
    /// Apply acceleration to velocity
    fn integrate_velocity(&self, dt: f64);

    /// Apply velocity and bias velocity to position, then clear the bias
    fn integrate_position(&self, dt: f64);
}

/// Steps 4 and 6: sleeping
pub trait ActivityManager: Send + Sync {
    /// Advance sleep timers and put resting bodies to sleep
    fn update_activity(&self, dt: f64);

    /// Zero the velocity of every sleeping body
    fn freeze_sleeping(&self);
}

/// Step 5: contact generation and resolution
pub trait CollisionResolver: Send + Sync {
    /// Find contacts and run `iterations` sequential-impulse passes
    fn resolve(&self, dt: f64, iterations: usize, allowed_penetration: f64, bias_factor: f64);
}

/// Register the body, collision and spring managers and start the engine
///
/// The engine runs as a process, so it steps on every [`Scene::update`].
/// If any manager fails to register, the ones already added are removed
/// again and no engine is started.
pub fn install(scene: &Scene, config: PhysicsConfig) -> Result<Arc<PhysicsEngine>> {
    let engine = Arc::new(PhysicsEngine::new(Arc::clone(scene.managers()), config.clone())?);
    let mut added = Vec::with_capacity(3);
    if let Err(err) = add_role_managers(scene, &config, &mut added) {
        warn!("physics install failed: {}", err);
        for id in added.into_iter().rev() {
            scene.remove_manager(id);
        }
        return Err(err);
    }
    scene.processes().add(engine.clone());
    debug!("physics installed with {} solver iterations", config.iterations);
    Ok(engine)
}

fn add_role_managers(scene: &Scene, config: &PhysicsConfig, added: &mut Vec<ManagerId>) -> Result<()> {
    added.push(scene.add_manager(Arc::new(DynamicPhysicsManager::new(config.clone())))?);
    added.push(scene.add_manager(Arc::new(CollisionManager::new(config)))?);
    added.push(scene.add_manager(Arc::new(SpringManager::new()))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_install_registers_roles_and_engine() {
        let scene = Scene::new();
        install(&scene, PhysicsConfig::default()).unwrap();
        assert_eq!(scene.managers().manager_count(), 3);
        assert_eq!(scene.managers().find_by_type::<dyn Integrator>().len(), 1);
        assert_eq!(scene.managers().find_by_type::<dyn CollisionResolver>().len(), 1);
        assert_eq!(scene.processes().pending_len(), 1);
    }

    #[test]
    fn test_failed_install_leaves_no_managers_behind() {
        let scene = Scene::new();
        scene.add_manager(Arc::new(SpringManager::new())).unwrap();

        let err = install(&scene, PhysicsConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::ManagerAlreadyRegistered(_)));
        assert_eq!(scene.managers().manager_count(), 1);
        assert!(scene.managers().find_manager::<DynamicPhysicsManager>().is_none());
        assert!(scene.managers().find_manager::<CollisionManager>().is_none());
        assert_eq!(scene.processes().pending_len(), 0);
    }
}
