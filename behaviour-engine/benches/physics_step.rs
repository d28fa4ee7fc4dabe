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
//! Benchmarks for the physics step
//!
//! Measures a full step over stacks of boxes resting on a ground plane.

use behaviour_engine::physics::{
    self, DynamicPhysics, Geometry, PhysicsConfig, PhysicsEngine, Shape, Vec2,
};
use behaviour_engine::scene::{EntityBuilder, EntityRecord};
use behaviour_engine::Scene;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn setup_scene(
    columns: usize,
    config: PhysicsConfig,
) -> (Scene, Arc<PhysicsEngine>, Vec<EntityRecord>) {
    let scene = Scene::new();
    let engine = physics::install(&scene, config).unwrap();
    let mut records = Vec::new();

    let width = columns as f64 * 2.0 + 4.0;
    let ground = Shape::rectangle(width, 1.0).unwrap();
    records.push(
        scene
            .spawn(
                EntityBuilder::new()
                    .with(DynamicPhysics::immovable())
                    .with(Geometry::new(ground)),
            )
            .unwrap(),
    );

    let shape = Shape::rectangle(1.0, 1.0).unwrap();
    for column in 0..columns {
        for row in 0..3 {
            let x = column as f64 * 2.0 - width / 2.0 + 2.0;
            let y = 1.0 + row as f64 * 1.05;
            records.push(
                scene
                    .spawn(
                        EntityBuilder::new()
                            .with(DynamicPhysics::for_shape(1.0, &shape).unwrap())
                            .with(Geometry::new(shape.clone()))
                            .with_value("position", Vec2::new(x, y)),
                    )
                    .unwrap(),
            );
        }
    }
    (scene, engine, records)
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("physics_step");

    for columns in [4, 16, 64].iter() {
        let (_scene, engine, _records) = setup_scene(*columns, PhysicsConfig::default());
        group.bench_with_input(BenchmarkId::new("stacks", columns), columns, |b, _| {
            b.iter(|| engine.step(black_box(1.0 / 60.0)));
        });
    }

    group.finish();
}

fn bench_iterations(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver_iterations");

    for iterations in [1, 10, 30].iter() {
        let config = PhysicsConfig::default().with_iterations(*iterations);
        let (_scene, engine, _records) = setup_scene(16, config);
        group.bench_with_input(
            BenchmarkId::new("iterations", iterations),
            iterations,
            |b, _| {
                b.iter(|| engine.step(black_box(1.0 / 60.0)));
            },
        );
    }

    group.finish();
}

fn bench_scene_update(c: &mut Criterion) {
    let (scene, _engine, _records) = setup_scene(16, PhysicsConfig::default());

    c.bench_function("scene_update_with_events", |b| {
        b.iter(|| scene.update(black_box(1.0 / 60.0)));
    });
}

criterion_group!(benches, bench_step, bench_iterations, bench_scene_update);
criterion_main!(benches);
