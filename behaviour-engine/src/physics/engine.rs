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
//! Fixed-order physics step

use super::{ActivityManager, CollisionResolver, ForceApplier, ForceProvider, Integrator, PhysicsConfig};
use crate::behaviour::BehaviourManagerContainer;
use crate::error::Result;
use crate::services::Process;
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Process that advances every registered physics role each tick
///
/// The stages always run in this order:
///
/// 1. force providers accumulate forces
/// 2. force appliers turn forces into accelerations
/// 3. integrators update velocities
/// 4. activity managers update sleep timers
/// 5. collision resolvers generate and solve contacts
/// 6. activity managers freeze sleeping bodies
/// 7. integrators update positions and clear bias velocities
///
/// Role implementers are looked up on every step, so managers added or
/// removed between ticks are picked up immediately.
pub struct PhysicsEngine {
    managers: Arc<BehaviourManagerContainer>,
    config: PhysicsConfig,
    steps: AtomicU64,
    stopped: AtomicBool,
}

impl PhysicsEngine {
    /// Create an engine over the roles registered in `managers`
    pub fn new(managers: Arc<BehaviourManagerContainer>, config: PhysicsConfig) -> Result<Self> {
        config.validate()?;
        Ok(PhysicsEngine {
            managers,
            config,
            steps: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Steps run so far
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Stop the engine; the scheduler drops it on its next update
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Advance the simulation by `dt` seconds
    pub fn step(&self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }
        let config = &self.config;
        let providers = self.managers.find_by_type::<dyn ForceProvider>();
        let appliers = self.managers.find_by_type::<dyn ForceApplier>();
        let integrators = self.managers.find_by_type::<dyn Integrator>();
        let activity = self.managers.find_by_type::<dyn ActivityManager>();
        let resolvers = self.managers.find_by_type::<dyn CollisionResolver>();

        for provider in &providers {
            provider.accumulate_forces(dt);
        }
        for applier in &appliers {
            applier.apply_forces(dt);
        }
        for integrator in &integrators {
            integrator.integrate_velocity(dt);
        }
        for manager in &activity {
            manager.update_activity(dt);
        }
        for resolver in &resolvers {
            resolver.resolve(
                dt,
                config.iterations,
                config.allowed_penetration,
                config.bias_factor,
            );
        }
        for manager in &activity {
            manager.freeze_sleeping();
        }
        for integrator in &integrators {
            integrator.integrate_position(dt);
        }

        let step = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("physics step {} ({}s)", step, dt);
    }
}

impl Process for PhysicsEngine {
    fn update(&self, elapsed: f64) {
        self.step(elapsed);
    }

    fn is_complete(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
