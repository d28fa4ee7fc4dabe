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
//! Rigid bodies and the manager that integrates them
//!
//! Position and rotation live in the entity's property store (`"position"`,
//! `"rotation"`) so other behaviours can observe them; everything else is
//! private motion state. A mass or inertia of zero or infinity makes the body
//! immovable.

use super::math::EPSILON;
use super::{ActivityManager, ForceApplier, ForceProvider, Geometry, Integrator, PhysicsConfig, Vec2};
use crate::behaviour::{Behaviour, BehaviourCore, BehaviourManager, InitContext, Manager, Registration};
use crate::entity::{Property, PropertyStore};
use crate::error::{EngineError, Result};
use crate::sync::lock;
use log::{debug, trace};
use std::sync::{Arc, Mutex, Weak};

fn inverse(value: f64) -> f64 {
    if value == 0.0 || value.is_infinite() {
        0.0
    } else {
        1.0 / value
    }
}

fn check_mass(name: &'static str, value: f64) -> Result<f64> {
    if value.is_nan() || value < 0.0 {
        return Err(EngineError::InvalidArgument {
            name,
            reason: format!("must be non-negative, got {}", value),
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, Default)]
struct Motion {
    velocity: Vec2,
    angular_velocity: f64,
    velocity_bias: Vec2,
    angular_velocity_bias: f64,
    force: Vec2,
    torque: f64,
    acceleration: Vec2,
    angular_acceleration: f64,
    sleeping: bool,
    sleep_timer: f64,
}

/// A rigid body
pub struct DynamicPhysics {
    core: BehaviourCore,
    mass: f64,
    inertia: f64,
    inverse_mass: f64,
    inverse_inertia: f64,
    position: Property<Vec2>,
    rotation: Property<f64>,
    motion: Mutex<Motion>,
    geometry: Mutex<Weak<Geometry>>,
}

impl DynamicPhysics {
    /// Create a body with the given mass and moment of inertia
    pub fn new(mass: f64, inertia: f64) -> Result<Self> {
        let mass = check_mass("mass", mass)?;
        let inertia = check_mass("inertia", inertia)?;
        Ok(DynamicPhysics {
            core: BehaviourCore::named("DynamicPhysics"),
            mass,
            inertia,
            inverse_mass: inverse(mass),
            inverse_inertia: inverse(inertia),
            position: Property::detached("position", Vec2::ZERO),
            rotation: Property::detached("rotation", 0.0),
            motion: Mutex::new(Motion::default()),
            geometry: Mutex::new(Weak::new()),
        })
    }

    /// Create a body whose inertia matches `shape` at the given mass
    pub fn for_shape(mass: f64, shape: &super::Shape) -> Result<Self> {
        let mass = check_mass("mass", mass)?;
        Self::new(mass, shape.moment_of_inertia(mass))
    }

    /// Create an immovable body
    pub fn immovable() -> Self {
        DynamicPhysics {
            core: BehaviourCore::named("DynamicPhysics"),
            mass: f64::INFINITY,
            inertia: f64::INFINITY,
            inverse_mass: 0.0,
            inverse_inertia: 0.0,
            position: Property::detached("position", Vec2::ZERO),
            rotation: Property::detached("rotation", 0.0),
            motion: Mutex::new(Motion::default()),
            geometry: Mutex::new(Weak::new()),
        }
    }

    /// Mass
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse mass; zero for immovable bodies
    pub fn inverse_mass(&self) -> f64 {
        self.inverse_mass
    }

    /// Moment of inertia
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    /// Inverse moment of inertia; zero for bodies that cannot rotate
    pub fn inverse_inertia(&self) -> f64 {
        self.inverse_inertia
    }

    /// True if neither impulses nor forces can move the body
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0 && self.inverse_inertia == 0.0
    }

    /// Shared position cell
    pub fn position_property(&self) -> &Property<Vec2> {
        &self.position
    }

    /// Position of the body origin
    pub fn position(&self) -> Vec2 {
        self.position.get()
    }

    /// Teleport the body
    pub fn set_position(&self, position: Vec2) {
        self.position.set(position);
    }

    /// Rotation in radians
    pub fn rotation(&self) -> f64 {
        self.rotation.get()
    }

    /// Set the rotation in radians
    pub fn set_rotation(&self, rotation: f64) {
        self.rotation.set(rotation);
    }

    /// Linear velocity
    pub fn velocity(&self) -> Vec2 {
        lock(&self.motion).velocity
    }

    /// Set the linear velocity, waking the body
    pub fn set_velocity(&self, velocity: Vec2) {
        self.wake();
        let mut motion = lock(&self.motion);
        motion.velocity = velocity;
        motion.sleep_timer = 0.0;
    }

    /// Angular velocity
    pub fn angular_velocity(&self) -> f64 {
        lock(&self.motion).angular_velocity
    }

    /// Set the angular velocity, waking the body
    pub fn set_angular_velocity(&self, angular_velocity: f64) {
        self.wake();
        let mut motion = lock(&self.motion);
        motion.angular_velocity = angular_velocity;
        motion.sleep_timer = 0.0;
    }

    /// Positional-correction velocity accumulated this step
    pub fn velocity_bias(&self) -> Vec2 {
        lock(&self.motion).velocity_bias
    }

    /// Force accumulated this step
    pub fn force(&self) -> Vec2 {
        lock(&self.motion).force
    }

    /// Torque accumulated this step
    pub fn torque(&self) -> f64 {
        lock(&self.motion).torque
    }

    /// Acceleration computed from the last applied force
    pub fn acceleration(&self) -> Vec2 {
        lock(&self.motion).acceleration
    }

    /// Accumulate a force through the centre of mass
    ///
    /// Ignored while the body sleeps; call [`DynamicPhysics::wake`] first.
    pub fn apply_force(&self, force: Vec2) {
        let mut motion = lock(&self.motion);
        if !motion.sleeping {
            motion.force += force;
        }
    }

    /// Accumulate a force at a world-space point
    pub fn apply_force_at(&self, force: Vec2, point: Vec2) {
        let arm = point - self.position();
        let mut motion = lock(&self.motion);
        if !motion.sleeping {
            motion.force += force;
            motion.torque += arm.cross(force);
        }
    }

    /// Accumulate a torque
    pub fn apply_torque(&self, torque: f64) {
        let mut motion = lock(&self.motion);
        if !motion.sleeping {
            motion.torque += torque;
        }
    }

    /// Apply an instantaneous impulse through the centre of mass, waking the body
    pub fn apply_linear_impulse(&self, impulse: Vec2) {
        self.wake();
        let mut motion = lock(&self.motion);
        motion.velocity += impulse * self.inverse_mass;
        motion.sleep_timer = 0.0;
    }

    /// True while the body sleeps
    pub fn is_sleeping(&self) -> bool {
        lock(&self.motion).sleeping
    }

    /// True if the body is asleep or immovable
    pub fn is_resting(&self) -> bool {
        self.is_static() || self.is_sleeping()
    }

    /// Seconds the body has spent below the sleep thresholds
    pub fn sleep_timer(&self) -> f64 {
        lock(&self.motion).sleep_timer
    }

    /// Put the body to sleep or wake it
    ///
    /// Waking also wakes every body currently touching this one.
    pub fn set_sleeping(&self, sleeping: bool) {
        if sleeping {
            let mut motion = lock(&self.motion);
            motion.sleeping = true;
            motion.velocity = Vec2::ZERO;
            motion.angular_velocity = 0.0;
            motion.force = Vec2::ZERO;
            motion.torque = 0.0;
        } else {
            self.wake();
        }
    }

    /// Wake the body and the bodies touching it
    pub fn wake(&self) {
        if !self.wake_alone() {
            return;
        }
        let geometry = lock(&self.geometry).upgrade();
        if let Some(geometry) = geometry {
            for other in geometry.touching() {
                if let Some(body) = other.body() {
                    body.wake_alone();
                }
            }
        }
    }

    /// Returns true if the body was asleep
    fn wake_alone(&self) -> bool {
        let mut motion = lock(&self.motion);
        if !motion.sleeping {
            return false;
        }
        motion.sleeping = false;
        motion.sleep_timer = 0.0;
        trace!("body woke");
        true
    }

    /// Geometry bound to the body, if any
    pub fn geometry(&self) -> Option<Arc<Geometry>> {
        lock(&self.geometry).upgrade()
    }

    pub(crate) fn attach_geometry(&self, geometry: Weak<Geometry>) {
        *lock(&self.geometry) = geometry;
    }

    /// Inverse mass and inertia as seen by the contact solver
    ///
    /// Sleeping bodies behave as immovable until woken.
    pub(crate) fn solver_mass(&self) -> (f64, f64) {
        if self.is_sleeping() {
            (0.0, 0.0)
        } else {
            (self.inverse_mass, self.inverse_inertia)
        }
    }

    pub(crate) fn velocity_at(&self, arm: Vec2) -> Vec2 {
        let motion = lock(&self.motion);
        motion.velocity + Vec2::cross_scalar(motion.angular_velocity, arm)
    }

    pub(crate) fn bias_velocity_at(&self, arm: Vec2) -> Vec2 {
        let motion = lock(&self.motion);
        motion.velocity_bias + Vec2::cross_scalar(motion.angular_velocity_bias, arm)
    }

    pub(crate) fn apply_impulse(&self, impulse: Vec2, arm: Vec2) {
        let (inverse_mass, inverse_inertia) = self.solver_mass();
        let mut motion = lock(&self.motion);
        motion.velocity += impulse * inverse_mass;
        motion.angular_velocity += inverse_inertia * arm.cross(impulse);
    }

    pub(crate) fn apply_bias_impulse(&self, impulse: Vec2, arm: Vec2) {
        let (inverse_mass, inverse_inertia) = self.solver_mass();
        let mut motion = lock(&self.motion);
        motion.velocity_bias += impulse * inverse_mass;
        motion.angular_velocity_bias += inverse_inertia * arm.cross(impulse);
    }

    fn accumulate_environment(&self, config: &PhysicsConfig) {
        if self.is_static() {
            return;
        }
        let mut motion = lock(&self.motion);
        if motion.sleeping {
            return;
        }
        if self.inverse_mass > 0.0 {
            let damping = motion.velocity * (-config.linear_damping * self.mass);
            motion.force += config.gravity * self.mass + damping;
        }
        if self.inverse_inertia > 0.0 {
            motion.torque -= config.angular_damping * motion.angular_velocity * self.inertia;
        }
    }

    fn apply_accumulated(&self) {
        let mut motion = lock(&self.motion);
        if motion.sleeping {
            motion.acceleration = Vec2::ZERO;
            motion.angular_acceleration = 0.0;
        } else {
            motion.acceleration = motion.force * self.inverse_mass;
            motion.angular_acceleration = motion.torque * self.inverse_inertia;
        }
        motion.force = Vec2::ZERO;
        motion.torque = 0.0;
    }

    fn integrate_velocity(&self, dt: f64) {
        let mut motion = lock(&self.motion);
        if motion.sleeping || self.is_static() {
            return;
        }
        let acceleration = motion.acceleration;
        let angular_acceleration = motion.angular_acceleration;
        motion.velocity += acceleration * dt;
        motion.angular_velocity += angular_acceleration * dt;
    }

    /// Returns true if the body fell asleep
    fn update_activity(&self, dt: f64, config: &PhysicsConfig) -> bool {
        if self.is_static() {
            return false;
        }
        let mut motion = lock(&self.motion);
        if motion.sleeping {
            return false;
        }
        let resting = motion.velocity.length_squared() < config.linear_sleep_threshold
            && motion.angular_velocity.abs() < config.angular_sleep_threshold;
        if !resting {
            motion.sleep_timer = 0.0;
            return false;
        }
        motion.sleep_timer += dt;
        // Summed steps drift below the exact total.
        if motion.sleep_timer + EPSILON >= config.time_to_sleep {
            motion.sleeping = true;
            return true;
        }
        false
    }

    fn freeze_if_sleeping(&self) {
        let mut motion = lock(&self.motion);
        if motion.sleeping {
            motion.velocity = Vec2::ZERO;
            motion.angular_velocity = 0.0;
            motion.velocity_bias = Vec2::ZERO;
            motion.angular_velocity_bias = 0.0;
        }
    }

    fn integrate_position(&self, dt: f64) {
        let (linear, angular) = {
            let mut motion = lock(&self.motion);
            let step = if motion.sleeping || self.is_static() {
                None
            } else {
                Some((
                    motion.velocity + motion.velocity_bias,
                    motion.angular_velocity + motion.angular_velocity_bias,
                ))
            };
            motion.velocity_bias = Vec2::ZERO;
            motion.angular_velocity_bias = 0.0;
            match step {
                Some(step) => step,
                None => return,
            }
        };
        if linear != Vec2::ZERO {
            self.position.update(|p| *p += linear * dt);
        }
        if angular != 0.0 {
            self.rotation.update(|r| *r += angular * dt);
        }
    }
}

impl Behaviour for DynamicPhysics {
    fn core(&self) -> &BehaviourCore {
        &self.core
    }

    fn create_properties(&mut self, properties: &mut PropertyStore) -> Result<()> {
        self.position = properties.create("position", self.position.get())?;
        self.rotation = properties.create("rotation", self.rotation.get())?;
        Ok(())
    }

    fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
        let data = context.data();
        if let Some(position) = data.try_get::<Vec2>("position") {
            self.position.set(position);
        }
        if let Some(rotation) = data.try_get::<f64>("rotation") {
            self.rotation.set(rotation);
        }
        let mut motion = lock(&self.motion);
        *motion = Motion::default();
        if !self.is_static() {
            motion.velocity = data.get_or("velocity", Vec2::ZERO);
            motion.angular_velocity = data.get_or("angular_velocity", 0.0);
            motion.sleeping = data.get_or("sleeping", false);
        }
        Ok(())
    }

    fn shutdown(&self, _context: &InitContext<'_>) {
        *lock(&self.geometry) = Weak::new();
    }
}

/// Manager owning every [`DynamicPhysics`]
///
/// Provides gravity and damping forces, converts forces into accelerations,
/// integrates velocity and position and tracks sleeping.
pub struct DynamicPhysicsManager {
    bodies: BehaviourManager<DynamicPhysics>,
    config: PhysicsConfig,
}

impl DynamicPhysicsManager {
    /// Create a manager with the given configuration
    pub fn new(config: PhysicsConfig) -> Self {
        DynamicPhysicsManager {
            bodies: BehaviourManager::new(),
            config,
        }
    }

    /// Managed bodies
    pub fn bodies(&self) -> &BehaviourManager<DynamicPhysics> {
        &self.bodies
    }

    /// Active configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }
}

impl Manager for DynamicPhysicsManager {
    fn register(self: Arc<Self>, registration: &mut Registration) {
        registration.manages(&self.bodies);
        registration.category::<dyn ForceProvider>(self.clone());
        registration.category::<dyn ForceApplier>(self.clone());
        registration.category::<dyn Integrator>(self.clone());
        registration.category::<dyn ActivityManager>(self.clone());
    }

    fn shutdown(&self) {
        self.bodies.dispose();
    }
}

impl ForceProvider for DynamicPhysicsManager {
    fn accumulate_forces(&self, _dt: f64) {
        for body in self.bodies.behaviours() {
            body.accumulate_environment(&self.config);
        }
    }
}

impl ForceApplier for DynamicPhysicsManager {
    fn apply_forces(&self, _dt: f64) {
        for body in self.bodies.behaviours() {
            body.apply_accumulated();
        }
    }
}

impl Integrator for DynamicPhysicsManager {
    fn integrate_velocity(&self, dt: f64) {
        for body in self.bodies.behaviours() {
            body.integrate_velocity(dt);
        }
    }

    fn integrate_position(&self, dt: f64) {
        for body in self.bodies.behaviours() {
            body.integrate_position(dt);
        }
    }
}

impl ActivityManager for DynamicPhysicsManager {
    fn update_activity(&self, dt: f64) {
        for body in self.bodies.behaviours() {
            if body.update_activity(dt, &self.config) {
                debug!("body on {:?} fell asleep", body.core().owner());
            }
        }
    }

    fn freeze_sleeping(&self) {
        for body in self.bodies.behaviours() {
            body.freeze_if_sleeping();
        }
    }
}
