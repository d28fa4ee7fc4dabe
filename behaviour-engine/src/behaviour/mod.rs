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
//! Behaviours and the managers that own their logic
//!
//! A behaviour is a unit of per-entity state with lifecycle hooks and no
//! update logic of its own. Every behaviour type is routed to exactly one
//! manager, which holds the authoritative list of active instances and runs
//! whatever logic applies to them.
//!
//! - [`Behaviour`] / [`BehaviourCore`]: the behaviour contract and the shared
//!   bookkeeping every behaviour embeds (name, owner, readiness, binding)
//! - [`BehaviourManager`]: the homogeneous, exclusively-owning list
//! - [`BehaviourManagerContainer`]: the dispatch table from behaviour types to
//!   managers, plus categorised manager queries
//! - [`ProcessBehaviourManager`] / [`ParallelProcessManager`]: managers that
//!   drive per-behaviour updates from the process scheduler

mod container;
mod manager;
mod parallel;
mod process;

pub use container::{BehaviourManagerContainer, Manager, ManagerId, Registration};
pub use manager::{same_handler, BehaviourHandler, BehaviourManager, ManagerBuilder};
pub use parallel::{ParallelProcessBehaviour, ParallelProcessManager};
pub use process::{PhaseSequence, ProcessBehaviour, ProcessBehaviourManager, UpdateSchedule};

use crate::entity::{DataProvider, Entity, PropertyStore};
use crate::error::{EngineError, Result};
use crate::services::ServiceContainer;
use crate::sync::lock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Type-erasure helpers implemented for every [`Behaviour`]
///
/// Provided by a blanket impl; behaviour authors never implement this.
pub trait AsBehaviour {
    /// Borrow as `Any` for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle into a downcastable `Any` handle
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Convert a shared handle into a `dyn Behaviour` handle
    fn into_behaviour(self: Arc<Self>) -> Arc<dyn Behaviour>;

    /// Concrete type id of the behaviour
    fn behaviour_type(&self) -> TypeId;

    /// Concrete type name of the behaviour
    fn behaviour_type_name(&self) -> &'static str;
}

impl<T: Behaviour> AsBehaviour for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn into_behaviour(self: Arc<Self>) -> Arc<dyn Behaviour> {
        self
    }

    fn behaviour_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn behaviour_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A typed, ownable unit of per-entity data with lifecycle hooks
///
/// Lifecycle:
/// 1. constructed detached
/// 2. [`Behaviour::create_properties`] once, while the entity is being built
/// 3. [`Behaviour::initialise`] / [`Behaviour::shutdown`], possibly many
///    times as the entity is recycled in and out of a scene
///
/// Implementations must support re-initialisation without leaking state from
/// a previous activation.
pub trait Behaviour: AsBehaviour + Send + Sync + 'static {
    /// Shared bookkeeping embedded in the behaviour
    fn core(&self) -> &BehaviourCore;

    /// Reserve the named cells this behaviour needs
    fn create_properties(&mut self, _properties: &mut PropertyStore) -> Result<()> {
        Ok(())
    }

    /// Prepare for activation
    ///
    /// Optional starting values come from `context.data()`; absent values
    /// fall back to defaults. The caller marks the behaviour ready once this
    /// returns `Ok`.
    fn initialise(&self, _context: &InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Inverse of [`Behaviour::initialise`], best effort
    fn shutdown(&self, _context: &InitContext<'_>) {}
}

impl dyn Behaviour {
    /// Downcast a borrowed behaviour to a concrete type
    pub fn downcast_ref<B: Behaviour>(&self) -> Option<&B> {
        self.as_any().downcast_ref::<B>()
    }

    /// Check the concrete type of a behaviour
    pub fn is<B: Behaviour>(&self) -> bool {
        self.as_any().is::<B>()
    }
}

/// Downcast a shared behaviour handle to its concrete type
pub fn downcast_arc<B: Behaviour>(behaviour: Arc<dyn Behaviour>) -> Option<Arc<B>> {
    behaviour.into_any().downcast::<B>().ok()
}

/// Thin address of a shared value, used for identity comparisons
pub(crate) fn address_of<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value).cast::<()>() as usize
}

/// Records which manager currently owns a behaviour
#[derive(Clone)]
pub struct ManagerBinding {
    handler: Arc<dyn BehaviourHandler>,
    managed_as: TypeId,
}

impl ManagerBinding {
    pub(crate) fn new(handler: Arc<dyn BehaviourHandler>, managed_as: TypeId) -> Self {
        ManagerBinding { handler, managed_as }
    }

    /// Handle of the owning manager
    pub fn handler(&self) -> &Arc<dyn BehaviourHandler> {
        &self.handler
    }

    /// Type the behaviour was registered under
    pub fn managed_as(&self) -> TypeId {
        self.managed_as
    }

    /// Name of the type the behaviour was registered under
    pub fn managed_as_name(&self) -> &'static str {
        self.handler.managed_type_name()
    }

    /// Check whether `handler` is the owning handle
    pub fn is_handler(&self, handler: &Arc<dyn BehaviourHandler>) -> bool {
        same_handler(&self.handler, handler)
    }
}

impl fmt::Debug for ManagerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerBinding")
            .field("managed_as", &self.handler.managed_type_name())
            .finish()
    }
}

/// Bookkeeping shared by every behaviour
///
/// The owner is set exactly once; the binding changes as the behaviour moves
/// between managers and is `None` while detached.
#[derive(Default)]
pub struct BehaviourCore {
    name: Option<String>,
    owner: OnceLock<Entity>,
    ready: AtomicBool,
    binding: Mutex<Option<ManagerBinding>>,
}

impl BehaviourCore {
    /// Create an unnamed core
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a core with a declared name
    pub fn named(name: impl Into<String>) -> Self {
        BehaviourCore {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Declared name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning entity, once attached
    pub fn owner(&self) -> Option<Entity> {
        self.owner.get().copied()
    }

    /// Attach to the owning entity; fails if already attached
    pub fn attach(&self, entity: Entity) -> Result<()> {
        self.owner
            .set(entity)
            .map_err(|_| EngineError::AlreadyAttached(self.owner().unwrap_or(entity)))
    }

    /// True between a successful initialise and the matching shutdown
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Update the readiness flag
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Current manager binding
    pub fn current_manager(&self) -> Option<ManagerBinding> {
        lock(&self.binding).clone()
    }

    /// Check whether a manager currently owns the behaviour
    pub fn is_managed(&self) -> bool {
        lock(&self.binding).is_some()
    }

    pub(crate) fn bind(&self, binding: ManagerBinding) {
        *lock(&self.binding) = Some(binding);
    }

    pub(crate) fn unbind(&self) {
        *lock(&self.binding) = None;
    }
}

impl fmt::Debug for BehaviourCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviourCore")
            .field("name", &self.name)
            .field("owner", &self.owner())
            .field("ready", &self.is_ready())
            .field("binding", &self.current_manager())
            .finish()
    }
}

/// Everything a behaviour can see while it initialises or shuts down
pub struct InitContext<'a> {
    entity: Entity,
    data: &'a dyn DataProvider,
    services: &'a ServiceContainer,
    siblings: &'a [Arc<dyn Behaviour>],
}

impl<'a> InitContext<'a> {
    /// Create a context for one entity activation
    pub fn new(
        entity: Entity,
        data: &'a dyn DataProvider,
        services: &'a ServiceContainer,
        siblings: &'a [Arc<dyn Behaviour>],
    ) -> Self {
        InitContext {
            entity,
            data,
            services,
            siblings,
        }
    }

    /// Entity being activated
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Source of optional starting values
    pub fn data(&self) -> &'a dyn DataProvider {
        self.data
    }

    /// Scene services
    pub fn services(&self) -> &'a ServiceContainer {
        self.services
    }

    /// All behaviours attached to the entity, in attach order
    pub fn siblings(&self) -> &'a [Arc<dyn Behaviour>] {
        self.siblings
    }

    /// First behaviour of type `B` on the same entity
    pub fn sibling<B: Behaviour>(&self) -> Option<Arc<B>> {
        self.siblings
            .iter()
            .find(|b| b.is::<B>())
            .and_then(|b| downcast_arc::<B>(Arc::clone(b)))
    }

    /// Like [`InitContext::sibling`], but a missing co-behaviour is a
    /// configuration error
    pub fn require_sibling<B: Behaviour>(&self, requester: &'static str) -> Result<Arc<B>> {
        self.sibling::<B>().ok_or(EngineError::MissingBehaviour {
            behaviour: requester,
            required: std::any::type_name::<B>(),
        })
    }

    /// Shared handle of the behaviour `me` itself
    pub fn shared<B: Behaviour>(&self, me: &B) -> Option<Arc<B>> {
        let target = me as *const B as usize;
        self.siblings
            .iter()
            .find(|b| address_of(*b) == target)
            .and_then(|b| downcast_arc::<B>(Arc::clone(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::InitialValues;

    #[derive(Default)]
    struct Marker {
        core: BehaviourCore,
    }

    impl Behaviour for Marker {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }
    }

    #[derive(Default)]
    struct Other {
        core: BehaviourCore,
    }

    impl Behaviour for Other {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }
    }

    #[test]
    fn test_owner_is_set_once() {
        let core = BehaviourCore::named("marker");
        assert_eq!(core.name(), Some("marker"));
        assert!(core.owner().is_none());

        core.attach(Entity::new(1, 0)).unwrap();
        let err = core.attach(Entity::new(2, 0)).unwrap_err();
        assert_eq!(err, EngineError::AlreadyAttached(Entity::new(1, 0)));
        assert_eq!(core.owner(), Some(Entity::new(1, 0)));
    }

    #[test]
    fn test_type_erasure_round_trip() {
        let marker: Arc<dyn Behaviour> = Arc::new(Marker::default());
        assert!(marker.is::<Marker>());
        assert!(!marker.is::<Other>());
        assert_eq!(marker.behaviour_type(), TypeId::of::<Marker>());
        assert!(downcast_arc::<Marker>(Arc::clone(&marker)).is_some());
        assert!(downcast_arc::<Other>(marker).is_none());
    }

    #[test]
    fn test_context_sibling_lookup() {
        let services = ServiceContainer::new();
        let values = InitialValues::new();
        let marker: Arc<dyn Behaviour> = Arc::new(Marker::default());
        let siblings = vec![Arc::clone(&marker)];
        let context = InitContext::new(Entity::new(0, 0), &values, &services, &siblings);

        assert!(context.sibling::<Marker>().is_some());
        assert!(context.sibling::<Other>().is_none());
        assert!(matches!(
            context.require_sibling::<Other>("Marker"),
            Err(EngineError::MissingBehaviour { .. })
        ));

        let concrete = context.sibling::<Marker>().unwrap();
        let shared = context.shared(concrete.as_ref()).unwrap();
        assert!(Arc::ptr_eq(&concrete, &shared));
    }
}
