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
//! Scene composition
//!
//! A [`Scene`] owns the service container, the manager dispatch table and
//! the entity allocator, and ties the behaviour lifecycle together:
//!
//! 1. [`EntityBuilder`] collects behaviours and starting values
//! 2. [`Scene::spawn`] creates properties, attaches owners, initialises every
//!    behaviour and routes each one to its manager
//! 3. [`Scene::deactivate`] / [`Scene::activate`] recycle an entity without
//!    rebuilding it; [`Scene::despawn`] retires it
//!
//! [`Scene::update`] runs one tick: every service in registration order,
//! starting with the process scheduler and then the event service.

use crate::behaviour::{
    downcast_arc, Behaviour, BehaviourManagerContainer, InitContext, Manager, ManagerId,
};
use crate::entity::{DataProvider, Entity, EntityAllocator, InitialValues, PropertyStore};
use crate::error::Result;
use crate::services::{EventService, ProcessService, Service, ServiceContainer};
use crate::sync::lock;
use log::{debug, warn};
use std::sync::{Arc, Mutex};

/// Collects the behaviours and starting values of an entity to spawn
#[derive(Default)]
pub struct EntityBuilder {
    behaviours: Vec<Box<dyn Behaviour>>,
    values: InitialValues,
}

impl EntityBuilder {
    /// Start an empty entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a behaviour
    pub fn with(mut self, behaviour: impl Behaviour) -> Self {
        self.behaviours.push(Box::new(behaviour));
        self
    }

    /// Attach an already boxed behaviour
    pub fn with_boxed(mut self, behaviour: Box<dyn Behaviour>) -> Self {
        self.behaviours.push(behaviour);
        self
    }

    /// Provide a named starting value
    pub fn with_value<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.values.insert(name, value);
        self
    }
}

/// A spawned entity together with the behaviours it owns
pub struct EntityRecord {
    entity: Entity,
    properties: PropertyStore,
    behaviours: Vec<Arc<dyn Behaviour>>,
    values: InitialValues,
}

impl EntityRecord {
    /// Entity handle
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Property cells shared by the entity's behaviours
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Behaviours in attach order
    pub fn behaviours(&self) -> &[Arc<dyn Behaviour>] {
        &self.behaviours
    }

    /// First behaviour of type `B`
    pub fn behaviour<B: Behaviour>(&self) -> Option<Arc<B>> {
        self.behaviours
            .iter()
            .find(|b| b.is::<B>())
            .and_then(|b| downcast_arc::<B>(Arc::clone(b)))
    }

    /// True if every behaviour is initialised
    pub fn is_active(&self) -> bool {
        self.behaviours.iter().all(|b| b.core().is_ready())
    }
}

/// Root of a simulation: services, managers and entities
pub struct Scene {
    services: ServiceContainer,
    managers: Arc<BehaviourManagerContainer>,
    entities: Mutex<EntityAllocator>,
    processes: Arc<ProcessService>,
    events: Arc<EventService>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create a scene with a process service and an event service
    pub fn new() -> Self {
        let processes = Arc::new(ProcessService::new());
        let events = Arc::new(EventService::new());
        let services = ServiceContainer::for_scene(Arc::clone(&processes), Arc::clone(&events));
        Scene {
            services,
            managers: Arc::new(BehaviourManagerContainer::new()),
            entities: Mutex::new(EntityAllocator::new()),
            processes,
            events,
        }
    }

    /// Scene services
    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    /// Manager dispatch table
    pub fn managers(&self) -> &Arc<BehaviourManagerContainer> {
        &self.managers
    }

    /// Process scheduler
    pub fn processes(&self) -> &Arc<ProcessService> {
        &self.processes
    }

    /// Event service
    pub fn events(&self) -> &Arc<EventService> {
        &self.events
    }

    /// Register an additional service
    pub fn add_service<S: Service>(&self, service: Arc<S>) -> Result<()> {
        self.services.add(service)
    }

    /// Register a manager and let it resolve its services
    ///
    /// If initialisation fails the manager is unregistered again.
    pub fn add_manager<M: Manager>(&self, manager: Arc<M>) -> Result<ManagerId> {
        let id = self.managers.add(Arc::clone(&manager))?;
        if let Err(err) = manager.initialise(&self.services) {
            warn!("manager initialisation failed: {}", err);
            self.managers.remove(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Unregister a manager and shut it down
    pub fn remove_manager(&self, id: ManagerId) -> bool {
        match self.managers.remove(id) {
            Some(manager) => {
                manager.shutdown();
                true
            }
            None => false,
        }
    }

    /// Build, initialise and route a new entity
    ///
    /// On failure every behaviour already initialised is shut down again,
    /// nothing stays registered with a manager and the entity id is released.
    pub fn spawn(&self, builder: EntityBuilder) -> Result<EntityRecord> {
        let entity = lock(&self.entities).allocate();
        match self.build(entity, builder) {
            Ok(record) => {
                debug!("spawned {} with {} behaviours", entity, record.behaviours.len());
                Ok(record)
            }
            Err(err) => {
                lock(&self.entities).release(entity);
                Err(err)
            }
        }
    }

    fn build(&self, entity: Entity, builder: EntityBuilder) -> Result<EntityRecord> {
        let EntityBuilder {
            mut behaviours,
            values,
        } = builder;
        let mut properties = PropertyStore::new();
        for behaviour in behaviours.iter_mut() {
            behaviour.create_properties(&mut properties)?;
            behaviour.core().attach(entity)?;
        }

        let record = EntityRecord {
            entity,
            properties,
            behaviours: behaviours.into_iter().map(Arc::from).collect(),
            values,
        };
        self.activate(&record)?;
        Ok(record)
    }

    /// Initialise an inactive entity with its original starting values
    pub fn activate(&self, record: &EntityRecord) -> Result<()> {
        self.activate_with(record, &record.values)
    }

    /// Initialise an inactive entity with fresh starting values
    pub fn activate_with(&self, record: &EntityRecord, data: &dyn DataProvider) -> Result<()> {
        let context = InitContext::new(record.entity, data, &self.services, &record.behaviours);

        let mut initialised: Vec<&Arc<dyn Behaviour>> = Vec::new();
        for behaviour in &record.behaviours {
            if behaviour.core().is_ready() {
                continue;
            }
            if let Err(err) = behaviour.initialise(&context) {
                warn!(
                    "{} failed to initialise on {}: {}",
                    behaviour.behaviour_type_name(),
                    record.entity,
                    err
                );
                for done in initialised.into_iter().rev() {
                    done.shutdown(&context);
                    done.core().set_ready(false);
                }
                return Err(err);
            }
            behaviour.core().set_ready(true);
            initialised.push(behaviour);
        }

        for behaviour in &record.behaviours {
            if let Err(err) = self.managers.add_behaviour(Arc::clone(behaviour)) {
                self.teardown(record, &context);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Detach every behaviour from its manager and shut it down
    ///
    /// The entity stays allocated and can be activated again.
    pub fn deactivate(&self, record: &EntityRecord) {
        let context = InitContext::new(record.entity, &record.values, &self.services, &record.behaviours);
        self.teardown(record, &context);
    }

    fn teardown(&self, record: &EntityRecord, context: &InitContext<'_>) {
        for behaviour in record.behaviours.iter().rev() {
            self.managers.remove_behaviour(behaviour);
            if behaviour.core().is_ready() {
                behaviour.shutdown(context);
                behaviour.core().set_ready(false);
            }
        }
    }

    /// Deactivate an entity and release its id
    pub fn despawn(&self, record: EntityRecord) {
        self.deactivate(&record);
        lock(&self.entities).release(record.entity);
        debug!("despawned {}", record.entity);
    }

    /// Check whether an entity id is still live
    pub fn is_alive(&self, entity: Entity) -> bool {
        lock(&self.entities).is_alive(entity)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        lock(&self.entities).len()
    }

    /// Run one tick
    pub fn update(&self, elapsed: f64) {
        self.services.update(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::{BehaviourCore, BehaviourManager, Registration};
    use crate::entity::Property;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Health {
        core: BehaviourCore,
        value: Option<Property<i32>>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl Behaviour for Health {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }

        fn create_properties(&mut self, properties: &mut PropertyStore) -> Result<()> {
            self.value = Some(properties.create("health", 100)?);
            Ok(())
        }

        fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
            if let Some(value) = &self.value {
                value.set(context.data().get_or("health", 100));
            }
            Ok(())
        }

        fn shutdown(&self, _context: &InitContext<'_>) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Fragile {
        core: BehaviourCore,
    }

    impl Behaviour for Fragile {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }

        fn initialise(&self, context: &InitContext<'_>) -> Result<()> {
            context.require_sibling::<Armour>("Fragile").map(|_| ())
        }
    }

    #[derive(Default)]
    struct Armour {
        core: BehaviourCore,
    }

    impl Behaviour for Armour {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }
    }

    #[derive(Default)]
    struct HealthManager {
        health: BehaviourManager<Health>,
        fragile: BehaviourManager<Fragile>,
    }

    impl Manager for HealthManager {
        fn register(self: Arc<Self>, registration: &mut Registration) {
            registration.manages(&self.health);
            registration.manages(&self.fragile);
        }
    }

    #[test]
    fn test_spawn_initialises_and_routes() {
        let scene = Scene::new();
        let manager = Arc::new(HealthManager::default());
        scene.add_manager(manager.clone()).unwrap();

        let record = scene
            .spawn(EntityBuilder::new().with(Health::default()).with_value("health", 42))
            .unwrap();
        let health = record.behaviour::<Health>().unwrap();

        assert!(record.is_active());
        assert_eq!(health.core().owner(), Some(record.entity()));
        assert_eq!(record.properties().try_get_value::<i32>("health"), Some(42));
        assert!(manager.health.contains(&health));
    }

    #[test]
    fn test_failed_initialise_rolls_back() {
        let scene = Scene::new();
        let manager = Arc::new(HealthManager::default());
        scene.add_manager(manager.clone()).unwrap();
        let shutdowns = Arc::new(AtomicUsize::new(0));

        let err = scene
            .spawn(
                EntityBuilder::new()
                    .with(Health {
                        shutdowns: shutdowns.clone(),
                        ..Health::default()
                    })
                    .with(Fragile::default()),
            )
            .err()
            .unwrap();

        assert!(matches!(err, EngineError::MissingBehaviour { .. }));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(manager.health.is_empty());
        assert!(manager.fragile.is_empty());
        assert_eq!(scene.entity_count(), 0);
    }

    #[test]
    fn test_unmanaged_behaviour_rolls_back_routing() {
        let scene = Scene::new();
        let manager = Arc::new(HealthManager::default());
        scene.add_manager(manager.clone()).unwrap();

        let err = scene
            .spawn(EntityBuilder::new().with(Health::default()).with(Armour::default()))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::NoManager(_)));
        assert!(manager.health.is_empty());
    }

    #[test]
    fn test_recycle_entity() {
        let scene = Scene::new();
        let manager = Arc::new(HealthManager::default());
        scene.add_manager(manager.clone()).unwrap();
        let record = scene.spawn(EntityBuilder::new().with(Health::default())).unwrap();

        scene.deactivate(&record);
        assert!(!record.is_active());
        assert!(manager.health.is_empty());
        assert!(scene.is_alive(record.entity()));

        let fresh = InitialValues::new().with("health", 7);
        scene.activate_with(&record, &fresh).unwrap();
        assert!(record.is_active());
        assert_eq!(manager.health.len(), 1);
        assert_eq!(record.properties().try_get_value::<i32>("health"), Some(7));

        let entity = record.entity();
        scene.despawn(record);
        assert!(!scene.is_alive(entity));
        assert!(manager.health.is_empty());
    }

    #[test]
    fn test_remove_manager_unbinds() {
        let scene = Scene::new();
        let id = scene.add_manager(Arc::new(HealthManager::default())).unwrap();
        assert!(scene.remove_manager(id));
        assert!(!scene.remove_manager(id));

        let err = scene.spawn(EntityBuilder::new().with(Health::default())).err().unwrap();
        assert!(matches!(err, EngineError::NoManager(_)));
    }

    #[test]
    fn test_default_services() {
        let scene = Scene::new();
        assert_eq!(scene.services().len(), 2);
        assert!(scene.services().get::<ProcessService>().is_some());
        assert!(scene.services().get::<EventService>().is_some());
    }
}
