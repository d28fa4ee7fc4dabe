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
//! Narrow phase and sequential-impulse contact resolution
//!
//! A [`Collision`] tracks one pair of geometries over the frames they stay
//! in broad-phase range. Each frame:
//!
//! 1. [`Collision::find_contacts`] runs a separating-axis test and gathers
//!    penetrating vertices, carrying accumulated impulses over from the
//!    previous frame for contacts on the same feature
//! 2. [`Collision::prepare`] computes effective masses, positional bias and
//!    restitution targets, then warm starts
//! 3. [`Collision::iterate`] is called once per solver pass
//!
//! Contact normals point from geometry A towards geometry B. An impulse `P`
//! along the normal is applied as `-P` to A and `+P` to B.

use super::math::EPSILON;
use super::{DynamicPhysics, Geometry, Vec2};
use std::sync::Arc;

/// Which part of the pair produced a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactFeature {
    /// Vertex `i` of geometry A inside geometry B
    VertexOfA(usize),
    /// Vertex `i` of geometry B inside geometry A
    VertexOfB(usize),
    /// Deepest point along the separating axis
    Deepest,
}

/// One contact point and its solver state
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    feature: ContactFeature,
    position: Vec2,
    normal: Vec2,
    penetration: f64,
    arm_a: Vec2,
    arm_b: Vec2,
    normal_mass: f64,
    tangent_mass: f64,
    bias: f64,
    bounce: f64,
    normal_impulse: f64,
    tangent_impulse: f64,
    bias_impulse: f64,
}

impl Contact {
    fn new(feature: ContactFeature, position: Vec2, normal: Vec2, penetration: f64) -> Self {
        Contact {
            feature,
            position,
            normal,
            penetration,
            arm_a: Vec2::ZERO,
            arm_b: Vec2::ZERO,
            normal_mass: 0.0,
            tangent_mass: 0.0,
            bias: 0.0,
            bounce: 0.0,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            bias_impulse: 0.0,
        }
    }

    /// Feature identity used for warm starting
    pub fn feature(&self) -> ContactFeature {
        self.feature
    }

    /// World-space contact point
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Unit normal from A towards B
    pub fn normal(&self) -> Vec2 {
        self.normal
    }

    /// Penetration depth
    pub fn penetration(&self) -> f64 {
        self.penetration
    }

    /// Accumulated normal impulse, never negative
    pub fn normal_impulse(&self) -> f64 {
        self.normal_impulse
    }

    /// Accumulated friction impulse
    pub fn tangent_impulse(&self) -> f64 {
        self.tangent_impulse
    }

    /// Accumulated positional-correction impulse this frame
    pub fn bias_impulse(&self) -> f64 {
        self.bias_impulse
    }

    fn tangent(&self) -> Vec2 {
        Vec2::new(self.normal.y, -self.normal.x)
    }
}

/// Contact state for one pair of geometries
#[derive(Default)]
pub struct Collision {
    a: Option<Arc<Geometry>>,
    b: Option<Arc<Geometry>>,
    contacts: Vec<Contact>,
    scratch: Vec<Contact>,
    friction: f64,
    restitution: f64,
}

impl Collision {
    /// Track the pair `a`, `b`
    pub fn new(a: Arc<Geometry>, b: Arc<Geometry>) -> Self {
        let mut collision = Collision::default();
        collision.reset(a, b);
        collision
    }

    pub(crate) fn reset(&mut self, a: Arc<Geometry>, b: Arc<Geometry>) {
        self.a = Some(a);
        self.b = Some(b);
        self.contacts.clear();
        self.scratch.clear();
    }

    pub(crate) fn clear(&mut self) {
        self.a = None;
        self.b = None;
        self.contacts.clear();
        self.scratch.clear();
    }

    /// First geometry of the pair
    pub fn geometry_a(&self) -> Option<&Arc<Geometry>> {
        self.a.as_ref()
    }

    /// Second geometry of the pair
    pub fn geometry_b(&self) -> Option<&Arc<Geometry>> {
        self.b.as_ref()
    }

    /// Current contacts
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// True while the pair has at least one contact
    pub fn is_touching(&self) -> bool {
        !self.contacts.is_empty()
    }

    /// Averaged friction coefficient of the pair
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Averaged restitution coefficient of the pair
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    fn bodies(&self) -> Option<(Arc<DynamicPhysics>, Arc<DynamicPhysics>)> {
        let a = self.a.as_ref()?.body()?;
        let b = self.b.as_ref()?.body()?;
        Some((a, b))
    }

    /// Update the contact set; returns whether the pair is touching
    ///
    /// A pair whose bodies both rest keeps its previous contacts untouched.
    pub fn find_contacts(&mut self, max_contacts: usize) -> bool {
        let (Some(geometry_a), Some(geometry_b)) = (self.a.clone(), self.b.clone()) else {
            self.contacts.clear();
            return false;
        };
        let (Some(body_a), Some(body_b)) = (geometry_a.body(), geometry_b.body()) else {
            self.contacts.clear();
            return false;
        };
        if body_a.is_resting() && body_b.is_resting() {
            return self.is_touching();
        }

        let (Some(poly_a), Some(poly_b)) = (geometry_a.world_vertices(), geometry_b.world_vertices())
        else {
            self.contacts.clear();
            return false;
        };
        let Some((axis, overlap)) = separating_axis(&poly_a, &poly_b) else {
            self.contacts.clear();
            return false;
        };

        // Depths are measured along the separating axis against the other
        // polygon's facing extent.
        let (_, far_a) = project(&poly_a, axis);
        let (near_b, _) = project(&poly_b, axis);

        self.scratch.clear();
        for (i, vertex) in poly_a.iter().enumerate() {
            if self.scratch.len() >= max_contacts {
                break;
            }
            if contains(&poly_b, *vertex) {
                let depth = (vertex.dot(axis) - near_b).max(0.0);
                self.scratch
                    .push(Contact::new(ContactFeature::VertexOfA(i), *vertex, axis, depth));
            }
        }
        let from_a = self.scratch.len();
        for (i, vertex) in poly_b.iter().enumerate() {
            if self.scratch.len() - from_a >= max_contacts {
                break;
            }
            if contains(&poly_a, *vertex) {
                let depth = (far_a - vertex.dot(axis)).max(0.0);
                self.scratch
                    .push(Contact::new(ContactFeature::VertexOfB(i), *vertex, axis, depth));
            }
        }
        if self.scratch.is_empty() {
            let point = support(&poly_b, -axis);
            self.scratch
                .push(Contact::new(ContactFeature::Deepest, point, axis, overlap));
        }

        for contact in self.scratch.iter_mut() {
            if let Some(previous) = self.contacts.iter().find(|c| c.feature == contact.feature) {
                contact.normal_impulse = previous.normal_impulse;
                contact.tangent_impulse = previous.tangent_impulse;
            }
        }
        std::mem::swap(&mut self.contacts, &mut self.scratch);
        self.scratch.clear();

        self.friction = 0.5 * (geometry_a.friction() + geometry_b.friction());
        self.restitution = 0.5 * (geometry_a.restitution() + geometry_b.restitution());
        true
    }

    /// Compute per-contact solver terms and apply warm-start impulses
    pub fn prepare(&mut self, dt: f64, allowed_penetration: f64, bias_factor: f64) {
        let Some((body_a, body_b)) = self.bodies() else {
            return;
        };
        let (inverse_mass_a, inverse_inertia_a) = body_a.solver_mass();
        let (inverse_mass_b, inverse_inertia_b) = body_b.solver_mass();
        let (position_a, position_b) = (body_a.position(), body_b.position());
        let inverse_dt = if dt > EPSILON { 1.0 / dt } else { 0.0 };
        let restitution = self.restitution;

        for contact in self.contacts.iter_mut() {
            contact.arm_a = contact.position - position_a;
            contact.arm_b = contact.position - position_b;
            let normal = contact.normal;
            let tangent = contact.tangent();

            let rn_a = contact.arm_a.cross(normal);
            let rn_b = contact.arm_b.cross(normal);
            let k_normal = inverse_mass_a
                + inverse_mass_b
                + inverse_inertia_a * rn_a * rn_a
                + inverse_inertia_b * rn_b * rn_b;
            contact.normal_mass = if k_normal > EPSILON { 1.0 / k_normal } else { 0.0 };

            let rt_a = contact.arm_a.cross(tangent);
            let rt_b = contact.arm_b.cross(tangent);
            let k_tangent = inverse_mass_a
                + inverse_mass_b
                + inverse_inertia_a * rt_a * rt_a
                + inverse_inertia_b * rt_b * rt_b;
            contact.tangent_mass = if k_tangent > EPSILON { 1.0 / k_tangent } else { 0.0 };

            contact.bias =
                bias_factor * inverse_dt * (contact.penetration - allowed_penetration).max(0.0);

            let relative = body_b.velocity_at(contact.arm_b) - body_a.velocity_at(contact.arm_a);
            let approach = relative.dot(normal);
            contact.bounce = if approach < 0.0 {
                -restitution * approach
            } else {
                0.0
            };

            contact.bias_impulse = 0.0;
            let impulse = normal * contact.normal_impulse + tangent * contact.tangent_impulse;
            body_a.apply_impulse(-impulse, contact.arm_a);
            body_b.apply_impulse(impulse, contact.arm_b);
        }
    }

    /// Run one sequential-impulse pass over every contact
    pub fn iterate(&mut self) {
        let Some((body_a, body_b)) = self.bodies() else {
            return;
        };
        let friction = self.friction;

        for contact in self.contacts.iter_mut() {
            let normal = contact.normal;
            let tangent = contact.tangent();

            let relative = body_b.velocity_at(contact.arm_b) - body_a.velocity_at(contact.arm_a);
            let delta = contact.normal_mass * (contact.bounce - relative.dot(normal));
            let accumulated = (contact.normal_impulse + delta).max(0.0);
            let delta = accumulated - contact.normal_impulse;
            contact.normal_impulse = accumulated;
            let impulse = normal * delta;
            body_a.apply_impulse(-impulse, contact.arm_a);
            body_b.apply_impulse(impulse, contact.arm_b);

            let relative_bias =
                body_b.bias_velocity_at(contact.arm_b) - body_a.bias_velocity_at(contact.arm_a);
            let delta = contact.normal_mass * (contact.bias - relative_bias.dot(normal));
            let accumulated = (contact.bias_impulse + delta).max(0.0);
            let delta = accumulated - contact.bias_impulse;
            contact.bias_impulse = accumulated;
            let impulse = normal * delta;
            body_a.apply_bias_impulse(-impulse, contact.arm_a);
            body_b.apply_bias_impulse(impulse, contact.arm_b);

            let relative = body_b.velocity_at(contact.arm_b) - body_a.velocity_at(contact.arm_a);
            let delta = -contact.tangent_mass * relative.dot(tangent);
            let limit = friction * contact.normal_impulse;
            let accumulated = (contact.tangent_impulse + delta).clamp(-limit, limit);
            let delta = accumulated - contact.tangent_impulse;
            contact.tangent_impulse = accumulated;
            let impulse = tangent * delta;
            body_a.apply_impulse(-impulse, contact.arm_a);
            body_b.apply_impulse(impulse, contact.arm_b);
        }
    }
}

fn outward_normal(polygon: &[Vec2], index: usize) -> Vec2 {
    let edge = polygon[(index + 1) % polygon.len()] - polygon[index];
    Vec2::new(edge.y, -edge.x).normalize_or_zero()
}

fn project(polygon: &[Vec2], axis: Vec2) -> (f64, f64) {
    polygon.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        let d = v.dot(axis);
        (min.min(d), max.max(d))
    })
}

fn centroid(polygon: &[Vec2]) -> Vec2 {
    let sum = polygon.iter().fold(Vec2::ZERO, |acc, v| acc + *v);
    sum * (1.0 / polygon.len() as f64)
}

/// Axis of least overlap, oriented from A to B; `None` when separated
fn separating_axis(a: &[Vec2], b: &[Vec2]) -> Option<(Vec2, f64)> {
    let mut best: Option<(Vec2, f64)> = None;
    for polygon in [a, b] {
        for i in 0..polygon.len() {
            let axis = outward_normal(polygon, i);
            if axis == Vec2::ZERO {
                continue;
            }
            let (min_a, max_a) = project(a, axis);
            let (min_b, max_b) = project(b, axis);
            let overlap = max_a.min(max_b) - min_a.max(min_b);
            if overlap <= 0.0 {
                return None;
            }
            if best.map_or(true, |(_, o)| overlap < o) {
                best = Some((axis, overlap));
            }
        }
    }
    let (axis, overlap) = best?;
    if axis.dot(centroid(b) - centroid(a)) < 0.0 {
        Some((-axis, overlap))
    } else {
        Some((axis, overlap))
    }
}

/// Point-in-convex-polygon test, boundary included
fn contains(polygon: &[Vec2], point: Vec2) -> bool {
    (0..polygon.len()).all(|i| {
        let normal = outward_normal(polygon, i);
        (point - polygon[i]).dot(normal) <= EPSILON
    })
}

fn support(polygon: &[Vec2], direction: Vec2) -> Vec2 {
    polygon
        .iter()
        .copied()
        .fold((Vec2::ZERO, f64::NEG_INFINITY), |(best, best_d), v| {
            let d = v.dot(direction);
            if d > best_d {
                (v, d)
            } else {
                (best, best_d)
            }
        })
        .0
}
