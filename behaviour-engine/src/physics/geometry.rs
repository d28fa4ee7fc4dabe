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
//! Collision shapes
//!
//! Every shape is a convex polygon in body-local coordinates, wound
//! counter-clockwise. Circles are approximated with regular polygons.

use super::math::EPSILON;
use super::{DynamicPhysics, Vec2};
use crate::behaviour::{Behaviour, BehaviourCore, InitContext};
use crate::error::{EngineError, Result};
use crate::sync::{lock, read, write};
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, RwLock, Weak};

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidArgument {
        name: "shape",
        reason: reason.into(),
    }
}

/// A convex polygon in body-local coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    vertices: Vec<Vec2>,
    bounding_radius: f64,
}

impl Shape {
    /// Validate a convex polygon; clockwise input is re-wound
    pub fn polygon(mut vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(invalid("a polygon needs at least three vertices"));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(invalid("vertices must be finite"));
        }

        let area = signed_area(&vertices);
        if area.abs() < EPSILON {
            return Err(invalid("polygon has no area"));
        }
        if area < 0.0 {
            vertices.reverse();
        }

        let count = vertices.len();
        for i in 0..count {
            let a = vertices[i];
            let b = vertices[(i + 1) % count];
            let c = vertices[(i + 2) % count];
            if (b - a).cross(c - b) < -EPSILON {
                return Err(invalid("polygon is not convex"));
            }
        }

        let bounding_radius = vertices
            .iter()
            .map(|v| v.length())
            .fold(0.0, f64::max);
        Ok(Shape {
            vertices,
            bounding_radius,
        })
    }

    /// Axis-aligned rectangle centred on the body origin
    pub fn rectangle(width: f64, height: f64) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(invalid("rectangle sides must be positive"));
        }
        let (hw, hh) = (width * 0.5, height * 0.5);
        Self::polygon(vec![
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ])
    }

    /// Regular polygon with `sides` vertices on a circle of `radius`
    pub fn regular(sides: usize, radius: f64) -> Result<Self> {
        if sides < 3 {
            return Err(invalid("a regular polygon needs at least three sides"));
        }
        if !(radius > 0.0) {
            return Err(invalid("radius must be positive"));
        }
        let vertices = (0..sides)
            .map(|i| {
                let angle = TAU * i as f64 / sides as f64;
                Vec2::new(radius * angle.cos(), radius * angle.sin())
            })
            .collect();
        Self::polygon(vertices)
    }

    /// Local vertices, counter-clockwise
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// Distance from the origin to the farthest vertex
    pub fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }

    /// Area of the polygon
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    /// Moment of inertia about the body origin for a uniform density
    pub fn moment_of_inertia(&self, mass: f64) -> f64 {
        let count = self.vertices.len();
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for i in 0..count {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % count];
            let weight = a.cross(b).abs();
            numerator += weight * (a.dot(a) + a.dot(b) + b.dot(b));
            denominator += weight;
        }
        if denominator < EPSILON {
            return 0.0;
        }
        mass * numerator / (6.0 * denominator)
    }

    /// Vertices placed in world space
    pub fn transformed(&self, position: Vec2, rotation: f64) -> Vec<Vec2> {
        self.vertices
            .iter()
            .map(|v| v.rotate(rotation) + position)
            .collect()
    }
}

fn signed_area(vertices: &[Vec2]) -> f64 {
    let count = vertices.len();
    (0..count)
        .map(|i| vertices[i].cross(vertices[(i + 1) % count]))
        .sum::<f64>()
        * 0.5
}

#[derive(Debug, Clone, Copy)]
struct Surface {
    friction: f64,
    restitution: f64,
    group: u32,
}

/// Collision geometry attached to a [`DynamicPhysics`] on the same entity
pub struct Geometry {
    core: BehaviourCore,
    shape: Shape,
    surface: Mutex<Surface>,
    body: RwLock<Option<Arc<DynamicPhysics>>>,
    touching: Mutex<Vec<Weak<Geometry>>>,
}

impl Geometry {
    /// Create geometry with friction 0.5, restitution 0 and no group
    pub fn new(shape: Shape) -> Self {
        Geometry {
            core: BehaviourCore::named("Geometry"),
            shape,
            surface: Mutex::new(Surface {
                friction: 0.5,
                restitution: 0.0,
                group: 0,
            }),
            body: RwLock::new(None),
            touching: Mutex::new(Vec::new()),
        }
    }

    /// Builder form of [`Geometry::set_friction`]
    pub fn with_friction(self, friction: f64) -> Result<Self> {
        self.set_friction(friction)?;
        Ok(self)
    }

    /// Builder form of [`Geometry::set_restitution`]
    pub fn with_restitution(self, restitution: f64) -> Result<Self> {
        self.set_restitution(restitution)?;
        Ok(self)
    }

    /// Builder form of [`Geometry::set_group`]
    pub fn with_group(self, group: u32) -> Self {
        self.set_group(group);
        self
    }

    /// Local shape
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Coulomb friction coefficient
    pub fn friction(&self) -> f64 {
        lock(&self.surface).friction
    }

    /// Set the friction coefficient; must be finite and non-negative
    pub fn set_friction(&self, friction: f64) -> Result<()> {
        let friction = EngineError::check_range("friction", friction, 0.0, f64::MAX)?;
        lock(&self.surface).friction = friction;
        Ok(())
    }

    /// Restitution coefficient
    pub fn restitution(&self) -> f64 {
        lock(&self.surface).restitution
    }

    /// Set the restitution coefficient; must lie in `[0, 1]`
    pub fn set_restitution(&self, restitution: f64) -> Result<()> {
        let restitution = EngineError::check_range("restitution", restitution, 0.0, 1.0)?;
        lock(&self.surface).restitution = restitution;
        Ok(())
    }

    /// Collision group; 0 means none
    pub fn group(&self) -> u32 {
        lock(&self.surface).group
    }

    /// Geometries sharing a non-zero group never collide
    pub fn set_group(&self, group: u32) {
        lock(&self.surface).group = group;
    }

    /// Body this geometry follows, once initialised
    pub fn body(&self) -> Option<Arc<DynamicPhysics>> {
        read(&self.body).clone()
    }

    /// Vertices in world space, following the body
    pub fn world_vertices(&self) -> Option<Vec<Vec2>> {
        let body = self.body()?;
        Some(self.shape.transformed(body.position(), body.rotation()))
    }

    /// Geometries currently in contact with this one
    pub fn touching(&self) -> Vec<Arc<Geometry>> {
        lock(&self.touching)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Check whether `other` is in contact with this geometry
    pub fn is_touching(&self, other: &Geometry) -> bool {
        let target = other as *const Geometry;
        lock(&self.touching)
            .iter()
            .any(|w| Weak::as_ptr(w) == target)
    }

    pub(crate) fn add_touching(&self, other: &Arc<Geometry>) {
        let mut touching = lock(&self.touching);
        let target = Arc::as_ptr(other);
        touching.retain(|w| w.strong_count() > 0);
        if !touching.iter().any(|w| Weak::as_ptr(w) == target) {
            touching.push(Arc::downgrade(other));
        }
    }

    pub(crate) fn remove_touching(&self, other: &Geometry) {
        let target = other as *const Geometry;
        lock(&self.touching).retain(|w| w.strong_count() > 0 && Weak::as_ptr(w) != target);
    }
}

impl Behaviour for Geometry {
    fn core(&self) -> &BehaviourCore {
        &self.core
    }

    fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
        let body = context.require_sibling::<DynamicPhysics>("Geometry")?;
        if let Some(me) = context.shared(self) {
            body.attach_geometry(Arc::downgrade(&me));
        }
        lock(&self.touching).clear();
        *write(&self.body) = Some(body);
        Ok(())
    }

    fn shutdown(&self, _context: &InitContext<'_>) {
        for other in self.touching() {
            other.remove_touching(self);
        }
        lock(&self.touching).clear();
        *write(&self.body) = None;
    }
}
