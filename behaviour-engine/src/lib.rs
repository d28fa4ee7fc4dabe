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
//! # Behaviour Engine
//!
//! A component-style composition core for tick-based simulations, paired
//! with a 2D rigid-body solver built on the same primitives.
//!
//! ## Features
//!
//! - **Behaviours and Managers**: behaviours hold per-entity data, managers own
//!   every piece of logic that runs over them
//! - **Dispatch Table**: behaviour types resolve to exactly one manager, with
//!   lookups walking an explicitly declared lineage
//! - **Services**: a deferred, double-buffered event bus and a buffered
//!   process scheduler driven once per tick
//! - **Parallelization**: optional Rayon fan-out for order-independent behaviours
//! - **Physics**: SAT contact generation, sequential impulses with warm
//!   starting, friction, restitution and sleeping
//!
//! ## Example
//!
//! ```rust
//! use behaviour_engine::scene::{EntityBuilder, Scene};
//! use behaviour_engine::physics::{self, DynamicPhysics, Geometry, PhysicsConfig, Shape, Vec2};
//!
//! let scene = Scene::new();
//! physics::install(&scene, PhysicsConfig::default()).unwrap();
//!
//! let ball = scene
//!     .spawn(
//!         EntityBuilder::new()
//!             .with(DynamicPhysics::new(1.0, 0.1).unwrap())
//!             .with(Geometry::new(Shape::regular(12, 0.5).unwrap()))
//!             .with_value("position", Vec2::new(0.0, 10.0)),
//!     )
//!     .unwrap();
//!
//! scene.update(1.0 / 60.0);
//! let body = ball.behaviour::<DynamicPhysics>().unwrap();
//! assert!(body.position().y < 10.0);
//! ```

#![warn(missing_docs)]

/// Error types shared by every module
pub mod error;

/// Entities, named property cells and initial-value providers
pub mod entity;

/// Behaviours, managers and the manager dispatch table
pub mod behaviour;

/// Scene-level services: event bus and process scheduler
pub mod services;

/// Scene composition and entity construction
pub mod scene;

/// Object pooling for reducing allocation churn
pub mod pool;

/// 2D rigid-body physics
pub mod physics;

mod sync;

pub use error::{EngineError, Result};
pub use entity::Entity;
pub use scene::Scene;
