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
//! Falling boxes example
//!
//! Drops a column of boxes onto a static ground, reports collisions through
//! the event service and prints the heights from a process behaviour that
//! runs twice a second. Run with `RUST_LOG=debug` to see engine logging.

use behaviour_engine::behaviour::{
    Behaviour, BehaviourCore, InitContext, ProcessBehaviour, ProcessBehaviourManager,
    UpdateSchedule,
};
use behaviour_engine::physics::{
    self, CollisionEvent, DynamicPhysics, Geometry, PhysicsConfig, Shape, Vec2,
};
use behaviour_engine::scene::EntityBuilder;
use behaviour_engine::{Result, Scene};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DT: f64 = 1.0 / 60.0;

/// Prints the height of the body on the same entity
struct HeightReporter {
    core: BehaviourCore,
    schedule: UpdateSchedule,
    body: Mutex<Option<Arc<DynamicPhysics>>>,
}

impl HeightReporter {
    fn new() -> Self {
        HeightReporter {
            core: BehaviourCore::named("HeightReporter"),
            schedule: UpdateSchedule::every(30),
            body: Mutex::new(None),
        }
    }
}

impl Behaviour for HeightReporter {
    fn core(&self) -> &BehaviourCore {
        &self.core
    }

    fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
        let body = context.require_sibling::<DynamicPhysics>("HeightReporter")?;
        *self.body.lock().unwrap_or_else(|e| e.into_inner()) = Some(body);
        Ok(())
    }
}

impl ProcessBehaviour for HeightReporter {
    fn schedule(&self) -> &UpdateSchedule {
        &self.schedule
    }

    fn update(&self, _elapsed: f64) {
        let body = self.body.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let (Some(body), Some(entity)) = (body, self.core.owner()) {
            let state = if body.is_sleeping() { "asleep" } else { "awake" };
            println!("  {} at y = {:.3} ({})", entity, body.position().y, state);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    println!("Behaviour Engine - Falling Boxes Example");
    println!("========================================\n");

    let scene = Scene::new();
    let engine = physics::install(&scene, PhysicsConfig::default())?;
    scene.add_manager(Arc::new(ProcessBehaviourManager::<HeightReporter>::new()))?;

    let contacts = Arc::new(AtomicUsize::new(0));
    let counter = contacts.clone();
    scene
        .events()
        .event::<CollisionEvent>()
        .add_listener(move |event| {
            if let CollisionEvent::Started { a, b } = event {
                counter.fetch_add(1, Ordering::Relaxed);
                println!("  contact: {} touched {}", a, b);
            }
        });

    scene.spawn(
        EntityBuilder::new()
            .with(DynamicPhysics::immovable())
            .with(Geometry::new(Shape::rectangle(20.0, 1.0)?)),
    )?;

    let shape = Shape::rectangle(1.0, 1.0)?;
    let mut boxes = Vec::new();
    for level in 0..3 {
        let position = Vec2::new(0.2 * level as f64, 2.0 + 1.5 * level as f64);
        let record = scene.spawn(
            EntityBuilder::new()
                .with(DynamicPhysics::for_shape(1.0, &shape)?)
                .with(Geometry::new(shape.clone()).with_friction(0.8)?)
                .with(HeightReporter::new())
                .with_value("position", position),
        )?;
        println!("Spawned {} at ({:.1}, {:.1})", record.entity(), position.x, position.y);
        boxes.push(record);
    }

    println!("\nSimulating 8 seconds at 60 Hz:");
    for _ in 0..480 {
        scene.update(DT);
    }

    println!("\nSummary:");
    println!("  physics steps: {}", engine.steps());
    println!("  contacts started: {}", contacts.load(Ordering::Relaxed));
    println!("  live entities: {}", scene.entity_count());

    for record in boxes {
        scene.despawn(record);
    }
    Ok(())
}
