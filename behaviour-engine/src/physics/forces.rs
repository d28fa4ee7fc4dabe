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
//! Damped springs

use super::{DynamicPhysics, ForceProvider, Vec2};
use crate::behaviour::{Behaviour, BehaviourCore, BehaviourManager, InitContext, Manager, Registration};
use crate::error::{EngineError, Result};
use crate::sync::{lock, read, write};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Far end of a spring
#[derive(Debug, Clone)]
pub enum SpringAnchor {
    /// Fixed world-space point
    Point(Vec2),
    /// Origin of another body
    Body(Weak<DynamicPhysics>),
}

/// Hooke spring with linear damping between a body and an anchor
///
/// The spring is attached to the [`DynamicPhysics`] on its own entity. An
/// initial value `"spring_anchor"` of type [`Vec2`] overrides a point anchor.
pub struct Spring {
    core: BehaviourCore,
    anchor: Mutex<SpringAnchor>,
    rest_length: f64,
    stiffness: f64,
    damping: f64,
    body: RwLock<Option<Arc<DynamicPhysics>>>,
}

impl Spring {
    /// Create a spring towards a fixed point
    pub fn new(anchor: Vec2, rest_length: f64, stiffness: f64, damping: f64) -> Result<Self> {
        let rest_length = EngineError::check_range("rest_length", rest_length, 0.0, f64::MAX)?;
        let stiffness = EngineError::check_range("stiffness", stiffness, 0.0, f64::MAX)?;
        let damping = EngineError::check_range("damping", damping, 0.0, f64::MAX)?;
        Ok(Spring {
            core: BehaviourCore::named("Spring"),
            anchor: Mutex::new(SpringAnchor::Point(anchor)),
            rest_length,
            stiffness,
            damping,
            body: RwLock::new(None),
        })
    }

    /// Current anchor
    pub fn anchor(&self) -> SpringAnchor {
        lock(&self.anchor).clone()
    }

    /// Anchor the far end to a fixed point
    pub fn set_anchor_point(&self, point: Vec2) {
        *lock(&self.anchor) = SpringAnchor::Point(point);
    }

    /// Anchor the far end to another body; the force acts on both
    pub fn connect(&self, other: &Arc<DynamicPhysics>) {
        *lock(&self.anchor) = SpringAnchor::Body(Arc::downgrade(other));
    }

    /// Length at which the spring exerts no force
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    /// Body the spring pulls on, once initialised
    pub fn body(&self) -> Option<Arc<DynamicPhysics>> {
        read(&self.body).clone()
    }

    fn apply(&self) {
        let Some(body) = self.body() else {
            return;
        };
        let (anchor_position, anchor_velocity, anchor_body) = match self.anchor() {
            SpringAnchor::Point(point) => (point, Vec2::ZERO, None),
            SpringAnchor::Body(weak) => match weak.upgrade() {
                Some(other) => (other.position(), other.velocity(), Some(other)),
                None => return,
            },
        };

        let offset = body.position() - anchor_position;
        let Some(direction) = offset.try_normalize() else {
            return;
        };
        let stretch = offset.length() - self.rest_length;
        let closing = (body.velocity() - anchor_velocity).dot(direction);
        let force = direction * -(self.stiffness * stretch + self.damping * closing);

        body.apply_force(force);
        if let Some(other) = anchor_body {
            other.apply_force(-force);
        }
    }
}

impl Behaviour for Spring {
    fn core(&self) -> &BehaviourCore {
        &self.core
    }

    fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
        let body = context.require_sibling::<DynamicPhysics>("Spring")?;
        if let Some(point) = context.data().try_get::<Vec2>("spring_anchor") {
            self.set_anchor_point(point);
        }
        *write(&self.body) = Some(body);
        Ok(())
    }

    fn shutdown(&self, _context: &InitContext<'_>) {
        *write(&self.body) = None;
    }
}

/// Manager applying spring forces
#[derive(Default)]
pub struct SpringManager {
    springs: BehaviourManager<Spring>,
}

impl SpringManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Managed springs
    pub fn springs(&self) -> &BehaviourManager<Spring> {
        &self.springs
    }
}

impl Manager for SpringManager {
    fn register(self: Arc<Self>, registration: &mut Registration) {
        registration.manages(&self.springs);
        registration.category::<dyn ForceProvider>(self.clone());
    }

    fn shutdown(&self) {
        self.springs.dispose();
    }
}

impl ForceProvider for SpringManager {
    fn accumulate_forces(&self, _dt: f64) {
        for spring in self.springs.behaviours() {
            spring.apply();
        }
    }
}
