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
//! Integration tests for behaviour ownership, manager dispatch and scheduling

use behaviour_engine::behaviour::{
    Behaviour, BehaviourCore, BehaviourManager, InitContext, Manager, ProcessBehaviour,
    ProcessBehaviourManager, Registration, UpdateSchedule,
};
use behaviour_engine::scene::{EntityBuilder, Scene};
use behaviour_engine::services::ServiceContainer;
use behaviour_engine::{EngineError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Wanderer {
    core: BehaviourCore,
    schedule: UpdateSchedule,
    distance: Mutex<f64>,
    speed: Mutex<f64>,
}

impl Behaviour for Wanderer {
    fn core(&self) -> &BehaviourCore {
        &self.core
    }

    fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
        *self.distance.lock().unwrap() = 0.0;
        *self.speed.lock().unwrap() = context.data().get_or("speed", 1.0);
        Ok(())
    }
}

impl ProcessBehaviour for Wanderer {
    fn schedule(&self) -> &UpdateSchedule {
        &self.schedule
    }

    fn update(&self, elapsed: f64) {
        let speed = *self.speed.lock().unwrap();
        *self.distance.lock().unwrap() += speed * elapsed;
    }
}

#[derive(Default)]
struct Beacon {
    core: BehaviourCore,
}

impl Behaviour for Beacon {
    fn core(&self) -> &BehaviourCore {
        &self.core
    }
}

#[derive(Default)]
struct BeaconManager {
    beacons: BehaviourManager<Beacon>,
    initialised: AtomicUsize,
}

impl Manager for BeaconManager {
    fn register(self: Arc<Self>, registration: &mut Registration) {
        registration.manages(&self.beacons);
    }

    fn initialise(self: Arc<Self>, _services: &ServiceContainer) -> Result<()> {
        self.initialised.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) {
        self.beacons.dispose();
    }
}

#[test]
fn test_exclusive_ownership_across_managers() {
    init_logging();
    let first = BehaviourManager::<Beacon>::new();
    let second = BehaviourManager::<Beacon>::new();
    let beacons: Vec<_> = (0..5).map(|_| Arc::new(Beacon::default())).collect();

    for beacon in &beacons {
        first.add(beacon.clone()).unwrap();
        assert!(first.contains(beacon));
        let binding = beacon.core().current_manager().unwrap();
        assert!(binding.is_handler(&first.handle()));
    }
    for beacon in &beacons {
        second.add(beacon.clone()).unwrap();
    }

    assert!(first.is_empty());
    assert_eq!(second.len(), 5);
    for beacon in &beacons {
        assert!(!first.contains(beacon));
        assert!(second.contains(beacon));
    }
}

#[test]
fn test_remove_and_dispose_are_idempotent() {
    let manager = BehaviourManager::<Beacon>::new();
    let beacon = Arc::new(Beacon::default());
    manager.add(beacon.clone()).unwrap();

    assert!(manager.remove(&beacon));
    assert!(!manager.remove(&beacon));

    manager.add(beacon.clone()).unwrap();
    manager.dispose();
    assert!(manager.is_disposed());
    manager.dispose();
    assert!(manager.is_disposed());
    assert!(beacon.core().current_manager().is_none());
}

#[test]
fn test_scene_routes_and_initialises_managers() {
    init_logging();
    let scene = Scene::new();
    let manager = Arc::new(BeaconManager::default());
    let id = scene.add_manager(manager.clone()).unwrap();
    assert_eq!(manager.initialised.load(Ordering::SeqCst), 1);

    let record = scene.spawn(EntityBuilder::new().with(Beacon::default())).unwrap();
    let beacon = record.behaviour::<Beacon>().unwrap();
    assert!(manager.beacons.contains(&beacon));

    assert!(scene.remove_manager(id));
    assert!(manager.beacons.is_disposed());
    assert!(beacon.core().current_manager().is_none());
    assert!(matches!(
        scene.spawn(EntityBuilder::new().with(Beacon::default())),
        Err(EngineError::NoManager(_))
    ));
}

#[test]
fn test_process_behaviours_run_through_scene() {
    init_logging();
    let scene = Scene::new();
    let manager = Arc::new(ProcessBehaviourManager::<Wanderer>::new());
    scene.add_manager(manager.clone()).unwrap();

    let record = scene
        .spawn(EntityBuilder::new().with(Wanderer::default()).with_value("speed", 2.0))
        .unwrap();
    let wanderer = record.behaviour::<Wanderer>().unwrap();

    for _ in 0..4 {
        scene.update(0.25);
    }
    assert!((*wanderer.distance.lock().unwrap() - 2.0).abs() < 1e-12);
    assert_eq!(manager.ticks(), 4);

    scene.deactivate(&record);
    scene.update(0.25);
    assert!((*wanderer.distance.lock().unwrap() - 2.0).abs() < 1e-12);

    scene.activate(&record).unwrap();
    assert_eq!(*wanderer.distance.lock().unwrap(), 0.0);
    scene.update(0.25);
    assert!((*wanderer.distance.lock().unwrap() - 0.5).abs() < 1e-12);
}

#[test]
fn test_category_view_tracks_registrations() {
    let scene = Scene::new();
    let container = scene.managers();
    assert!(container.find_by_type::<dyn Manager>().is_empty());

    let id = scene.add_manager(Arc::new(BeaconManager::default())).unwrap();
    assert_eq!(container.find_by_type::<dyn Manager>().len(), 1);

    scene
        .add_manager(Arc::new(ProcessBehaviourManager::<Wanderer>::new()))
        .unwrap();
    assert_eq!(container.find_by_type::<dyn Manager>().len(), 2);
    assert_eq!(
        container
            .find_by_type::<dyn behaviour_engine::services::Process>()
            .len(),
        1
    );

    scene.remove_manager(id);
    assert_eq!(container.find_by_type::<dyn Manager>().len(), 1);
    assert!(container.find_manager::<BeaconManager>().is_none());
}
