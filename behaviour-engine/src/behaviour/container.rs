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
//! Dispatch table from behaviour types to managers
//!
//! Managers announce what they handle through [`Manager::register`]: the
//! behaviour lists they own and the categories (role traits) they implement.
//! The container resolves a behaviour to the nearest registered manager by
//! walking declared subtype links, and answers "every manager implementing
//! role C" queries for the engine loop.

use super::{Behaviour, BehaviourHandler, BehaviourManager};
use crate::error::{EngineError, Result};
use crate::services::ServiceContainer;
use crate::sync::{read, write};
use log::{debug, warn};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A long-lived object that owns one or more behaviour lists
pub trait Manager: Any + Send + Sync {
    /// Display name used in logs and errors
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Declare managed behaviour types and implemented categories
    fn register(self: Arc<Self>, registration: &mut Registration);

    /// Resolve services once the manager is part of a scene
    fn initialise(self: Arc<Self>, _services: &ServiceContainer) -> Result<()> {
        Ok(())
    }

    /// Called after the manager is removed from its container
    fn shutdown(&self) {}
}

/// Identifier of a registered manager
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    /// Raw numeric value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Manager({})", self.0)
    }
}

/// What a manager declares when it joins a container
#[derive(Default)]
pub struct Registration {
    handlers: Vec<Arc<dyn BehaviourHandler>>,
    categories: Vec<(TypeId, &'static str, Box<dyn Any + Send + Sync>)>,
}

impl Registration {
    /// Declare that the manager owns `behaviours`
    pub fn manages<T: ?Sized + Behaviour>(&mut self, behaviours: &BehaviourManager<T>) {
        self.handlers.push(behaviours.handle());
    }

    /// Declare that the manager implements category `C`
    ///
    /// `C` is usually a `dyn` role trait; pass the manager upcast to it.
    pub fn category<C: ?Sized + Send + Sync + 'static>(&mut self, manager: Arc<C>) {
        self.categories
            .push((TypeId::of::<C>(), type_name::<C>(), Box::new(manager)));
    }
}

struct ManagerEntry {
    id: ManagerId,
    type_id: TypeId,
    name: String,
    manager: Arc<dyn Manager>,
    managed: Vec<TypeId>,
}

struct BoundHandler {
    manager: ManagerId,
    manager_name: String,
    handler: Arc<dyn BehaviourHandler>,
}

struct CategoryEntry {
    manager: ManagerId,
    item: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct ContainerState {
    next_id: u64,
    managers: Vec<ManagerEntry>,
    // One slot per behaviour type ever claimed; an empty slot is kept so the
    // type stays known after its manager leaves.
    slots: HashMap<TypeId, Option<BoundHandler>>,
    categories: HashMap<TypeId, Vec<CategoryEntry>>,
    parents: HashMap<TypeId, (TypeId, &'static str)>,
    resolved: HashMap<TypeId, Option<TypeId>>,
}

impl ContainerState {
    /// Nearest claimed type on the lineage of `behaviour_type`
    fn resolve(&self, behaviour_type: TypeId, manager: Option<ManagerId>) -> Option<TypeId> {
        let mut current = Some(behaviour_type);
        while let Some(ty) = current {
            if let Some(Some(bound)) = self.slots.get(&ty) {
                if manager.map_or(true, |id| bound.manager == id) {
                    return Some(ty);
                }
            }
            current = self.parents.get(&ty).map(|(parent, _)| *parent);
        }
        None
    }
}

/// The dispatch table shared by a scene and its managers
#[derive(Default)]
pub struct BehaviourManagerContainer {
    state: RwLock<ContainerState>,
}

impl BehaviourManagerContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager
    ///
    /// Fails if a manager of the same concrete type is present, or if any
    /// behaviour type it claims is already claimed by another manager.
    pub fn add<M: Manager>(&self, manager: Arc<M>) -> Result<ManagerId> {
        let mut registration = Registration::default();
        Arc::clone(&manager).register(&mut registration);
        let name = manager.name().to_string();

        let mut state = write(&self.state);
        if state.managers.iter().any(|m| m.type_id == TypeId::of::<M>()) {
            return Err(EngineError::ManagerAlreadyRegistered(name));
        }
        for handler in &registration.handlers {
            if let Some(Some(bound)) = state.slots.get(&handler.managed_type()) {
                return Err(EngineError::DuplicateManager {
                    behaviour: handler.managed_type_name(),
                    existing: bound.manager_name.clone(),
                });
            }
        }

        let id = ManagerId(state.next_id);
        state.next_id += 1;

        let mut managed = Vec::with_capacity(registration.handlers.len());
        for handler in registration.handlers {
            let ty = handler.managed_type();
            managed.push(ty);
            state.slots.insert(
                ty,
                Some(BoundHandler {
                    manager: id,
                    manager_name: name.clone(),
                    handler,
                }),
            );
        }

        let as_manager: Arc<dyn Manager> = manager.clone();
        let mut categories = registration.categories;
        categories.push((TypeId::of::<M>(), type_name::<M>(), Box::new(manager)));
        categories.push((
            TypeId::of::<dyn Manager>(),
            type_name::<dyn Manager>(),
            Box::new(Arc::clone(&as_manager)),
        ));
        for (category, category_name, item) in categories {
            debug!("{} registered under {}", name, category_name);
            state
                .categories
                .entry(category)
                .or_default()
                .push(CategoryEntry { manager: id, item });
        }

        state.managers.push(ManagerEntry {
            id,
            type_id: TypeId::of::<M>(),
            name: name.clone(),
            manager: as_manager,
            managed,
        });
        state.resolved.clear();
        debug!("registered manager {} as {}", name, id);
        Ok(id)
    }

    /// Unregister a manager and unbind every behaviour type it claimed
    ///
    /// Behaviours already in the manager's lists stay there; the caller is
    /// expected to dispose them. Returns the removed manager.
    pub fn remove(&self, id: ManagerId) -> Option<Arc<dyn Manager>> {
        let mut state = write(&self.state);
        let index = state.managers.iter().position(|m| m.id == id)?;
        let entry = state.managers.remove(index);

        for ty in &entry.managed {
            if let Some(slot) = state.slots.get_mut(ty) {
                if slot.as_ref().is_some_and(|bound| bound.manager == id) {
                    *slot = None;
                }
            }
        }
        for entries in state.categories.values_mut() {
            entries.retain(|c| c.manager != id);
        }
        state.categories.retain(|_, entries| !entries.is_empty());
        state.resolved.clear();
        debug!("removed manager {}", entry.name);
        Some(entry.manager)
    }

    /// Unregister the manager of concrete type `M`
    pub fn remove_manager<M: Manager>(&self) -> Option<Arc<M>> {
        let id = self.manager_id::<M>()?;
        let manager = self.find_manager::<M>()?;
        self.remove(id)?;
        Some(manager)
    }

    /// Declare `Child` as a subtype of `Parent` for manager resolution
    pub fn declare_subtype<Child, Parent>(&self) -> Result<()>
    where
        Child: ?Sized + 'static,
        Parent: ?Sized + 'static,
    {
        let child = TypeId::of::<Child>();
        let parent = TypeId::of::<Parent>();
        let cycle = EngineError::CyclicLineage {
            child: type_name::<Child>(),
            parent: type_name::<Parent>(),
        };

        let mut state = write(&self.state);
        let mut current = Some(parent);
        while let Some(ty) = current {
            if ty == child {
                return Err(cycle);
            }
            current = state.parents.get(&ty).map(|(p, _)| *p);
        }
        let previous = state
            .parents
            .insert(child, (parent, type_name::<Parent>()));
        if let Some((previous, previous_name)) = previous {
            if previous != parent {
                warn!(
                    "{} re-declared as subtype of {} (was {})",
                    type_name::<Child>(),
                    type_name::<Parent>(),
                    previous_name
                );
            }
        }
        state.resolved.clear();
        Ok(())
    }

    /// Nearest handler for `behaviour_type`, walking the declared lineage
    ///
    /// With `manager` set, only handlers owned by that manager qualify.
    pub fn find(
        &self,
        behaviour_type: TypeId,
        manager: Option<ManagerId>,
    ) -> Option<Arc<dyn BehaviourHandler>> {
        if manager.is_none() {
            let state = read(&self.state);
            if let Some(cached) = state.resolved.get(&behaviour_type) {
                return (*cached).and_then(|ty| Self::handler_in(&state, ty));
            }
        }

        let mut state = write(&self.state);
        let resolved = state.resolve(behaviour_type, manager);
        if manager.is_none() {
            state.resolved.insert(behaviour_type, resolved);
        }
        resolved.and_then(|ty| Self::handler_in(&state, ty))
    }

    /// [`BehaviourManagerContainer::find`] keyed by a static type
    pub fn find_for<B: ?Sized + 'static>(&self) -> Option<Arc<dyn BehaviourHandler>> {
        self.find(TypeId::of::<B>(), None)
    }

    fn handler_in(state: &ContainerState, ty: TypeId) -> Option<Arc<dyn BehaviourHandler>> {
        state
            .slots
            .get(&ty)
            .and_then(|slot| slot.as_ref())
            .map(|bound| Arc::clone(&bound.handler))
    }

    /// Every registered manager implementing category `C`, in registration order
    pub fn find_by_type<C: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<C>> {
        let state = read(&self.state);
        state
            .categories
            .get(&TypeId::of::<C>())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|c| c.item.downcast_ref::<Arc<C>>().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The registered manager of concrete type `M`
    pub fn find_manager<M: Manager>(&self) -> Option<Arc<M>> {
        self.find_by_type::<M>().into_iter().next()
    }

    /// Identifier of the registered manager of concrete type `M`
    pub fn manager_id<M: Manager>(&self) -> Option<ManagerId> {
        read(&self.state)
            .managers
            .iter()
            .find(|m| m.type_id == TypeId::of::<M>())
            .map(|m| m.id)
    }

    /// All registered managers, in registration order
    pub fn managers(&self) -> Vec<(ManagerId, Arc<dyn Manager>)> {
        read(&self.state)
            .managers
            .iter()
            .map(|m| (m.id, Arc::clone(&m.manager)))
            .collect()
    }

    /// Number of registered managers
    pub fn manager_count(&self) -> usize {
        read(&self.state).managers.len()
    }

    /// Route a behaviour to the manager responsible for its concrete type
    pub fn add_behaviour(&self, behaviour: Arc<dyn Behaviour>) -> Result<()> {
        let handler = self
            .find(behaviour.behaviour_type(), None)
            .ok_or(EngineError::NoManager(behaviour.behaviour_type_name()))?;
        handler.add(behaviour)
    }

    /// Detach a behaviour from whichever manager owns it
    pub fn remove_behaviour(&self, behaviour: &Arc<dyn Behaviour>) -> bool {
        match behaviour.core().current_manager() {
            Some(binding) => binding.handler().remove(behaviour),
            None => false,
        }
    }
}
