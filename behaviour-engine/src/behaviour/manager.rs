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
//! Homogeneous behaviour lists
//!
//! [`BehaviourManager<T>`] owns the active instances of one behaviour type.
//! A behaviour is in at most one manager list at a time: adding it to a new
//! manager first detaches it from the previous one, and the binding recorded
//! on the behaviour always names the list that holds it.

use super::{address_of, Behaviour, ManagerBinding};
use crate::error::{EngineError, Result};
use crate::sync::lock;
use log::trace;
use std::any::{type_name, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Type-erased handle to a behaviour list
///
/// This is what the dispatch table stores and what a behaviour's binding
/// points at. Identity is pointer identity; use [`same_handler`].
pub trait BehaviourHandler: Send + Sync {
    /// Insert a behaviour, detaching it from any previous manager
    fn add(&self, behaviour: Arc<dyn Behaviour>) -> Result<()>;

    /// Remove a behaviour this handle owns; `false` if it is not owned here
    fn remove(&self, behaviour: &Arc<dyn Behaviour>) -> bool;

    /// Type the list is declared over
    fn managed_type(&self) -> TypeId;

    /// Name of the type the list is declared over
    fn managed_type_name(&self) -> &'static str;
}

/// Pointer identity for handler handles
pub fn same_handler(a: &Arc<dyn BehaviourHandler>, b: &Arc<dyn BehaviourHandler>) -> bool {
    address_of(a) == address_of(b)
}

type Cast<T> = fn(Arc<dyn Behaviour>) -> Option<Arc<T>>;
type AddHook<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Pending<T: ?Sized> {
    added: Vec<Arc<T>>,
    removed: Vec<usize>,
}

struct ManagerCore<T: ?Sized + Behaviour> {
    this: Weak<ManagerCore<T>>,
    cast: Cast<T>,
    deferred: bool,
    live: Mutex<Vec<Arc<T>>>,
    pending: Mutex<Pending<T>>,
    disposed: AtomicBool,
    on_add: Option<AddHook<T>>,
}

impl<T: ?Sized + Behaviour> ManagerCore<T> {
    fn handle(&self) -> Option<Arc<dyn BehaviourHandler>> {
        let this: Arc<ManagerCore<T>> = self.this.upgrade()?;
        Some(this)
    }

    fn add_typed(&self, behaviour: Arc<T>) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(EngineError::ManagerDisposed(type_name::<T>()));
        }
        let me = self
            .handle()
            .ok_or(EngineError::ManagerDisposed(type_name::<T>()))?;
        let erased = Arc::clone(&behaviour).into_behaviour();

        if let Some(binding) = erased.core().current_manager() {
            if binding.is_handler(&me) {
                return Ok(());
            }
            binding.handler().remove(&erased);
        }

        if let Some(hook) = &self.on_add {
            hook(&behaviour);
        }
        if self.deferred {
            lock(&self.pending).added.push(behaviour);
        } else {
            lock(&self.live).push(behaviour);
        }
        erased
            .core()
            .bind(ManagerBinding::new(me, TypeId::of::<T>()));
        trace!(
            "{} added to manager of {}",
            erased.behaviour_type_name(),
            type_name::<T>()
        );
        Ok(())
    }

    fn remove_erased(&self, behaviour: &Arc<dyn Behaviour>) -> bool {
        let Some(me) = self.handle() else {
            return false;
        };
        match behaviour.core().current_manager() {
            Some(binding) if binding.is_handler(&me) => {}
            _ => return false,
        }
        behaviour.core().unbind();

        let target = address_of(behaviour);
        if self.deferred {
            let mut pending = lock(&self.pending);
            if let Some(index) = pending.added.iter().position(|b| address_of(b) == target) {
                pending.added.remove(index);
            } else {
                pending.removed.push(target);
            }
        } else {
            let mut live = lock(&self.live);
            if let Some(index) = live.iter().position(|b| address_of(b) == target) {
                live.remove(index);
            }
        }
        trace!(
            "{} removed from manager of {}",
            behaviour.behaviour_type_name(),
            type_name::<T>()
        );
        true
    }

    fn flush(&self) {
        let (added, removed) = {
            let mut pending = lock(&self.pending);
            (
                std::mem::take(&mut pending.added),
                std::mem::take(&mut pending.removed),
            )
        };
        if added.is_empty() && removed.is_empty() {
            return;
        }
        let mut live = lock(&self.live);
        if !removed.is_empty() {
            live.retain(|b| !removed.contains(&address_of(b)));
        }
        live.extend(added);
    }
}

impl<T: ?Sized + Behaviour> BehaviourHandler for ManagerCore<T> {
    fn add(&self, behaviour: Arc<dyn Behaviour>) -> Result<()> {
        let concrete = behaviour.behaviour_type_name();
        let typed = (self.cast)(behaviour).ok_or(EngineError::IncompatibleBehaviour {
            behaviour: concrete,
            managed_as: type_name::<T>(),
        })?;
        self.add_typed(typed)
    }

    fn remove(&self, behaviour: &Arc<dyn Behaviour>) -> bool {
        self.remove_erased(behaviour)
    }

    fn managed_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn managed_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Options for building a [`BehaviourManager`]
pub struct ManagerBuilder<T: ?Sized + Behaviour> {
    cast: Cast<T>,
    deferred: bool,
    on_add: Option<AddHook<T>>,
}

impl<T: Behaviour> ManagerBuilder<T> {
    /// Builder for a list over a concrete behaviour type
    pub fn new() -> Self {
        Self::with_cast(|b| b.into_any().downcast::<T>().ok())
    }
}

impl<T: Behaviour> Default for ManagerBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Behaviour> ManagerBuilder<T> {
    /// Builder for a list over any type, typically a `dyn` behaviour trait
    ///
    /// `cast` converts an erased behaviour into the managed type, returning
    /// `None` for behaviours the list cannot hold.
    pub fn with_cast(cast: fn(Arc<dyn Behaviour>) -> Option<Arc<T>>) -> Self {
        ManagerBuilder {
            cast,
            deferred: false,
            on_add: None,
        }
    }

    /// Buffer adds and removes until [`BehaviourManager::flush`]
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Run `hook` on every behaviour as it is added
    pub fn on_add(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_add = Some(Box::new(hook));
        self
    }

    /// Finish the list
    pub fn build(self) -> BehaviourManager<T> {
        let core = Arc::new_cyclic(|this| ManagerCore {
            this: this.clone(),
            cast: self.cast,
            deferred: self.deferred,
            live: Mutex::new(Vec::new()),
            pending: Mutex::new(Pending {
                added: Vec::new(),
                removed: Vec::new(),
            }),
            disposed: AtomicBool::new(false),
            on_add: self.on_add,
        });
        BehaviourManager { core }
    }
}

/// The exclusively-owning list of active behaviours of one type
///
/// Iteration works over a snapshot, so behaviours may be added or removed
/// from inside the loop body. In deferred mode changes become visible only
/// after [`BehaviourManager::flush`].
pub struct BehaviourManager<T: ?Sized + Behaviour> {
    core: Arc<ManagerCore<T>>,
}

impl<T: Behaviour> BehaviourManager<T> {
    /// Immediate-mode list over a concrete behaviour type
    pub fn new() -> Self {
        ManagerBuilder::new().build()
    }

    /// Deferred-mode list over a concrete behaviour type
    pub fn deferred() -> Self {
        ManagerBuilder::new().deferred().build()
    }

    /// Start configuring a list over a concrete behaviour type
    pub fn builder() -> ManagerBuilder<T> {
        ManagerBuilder::new()
    }
}

impl<T: Behaviour> Default for BehaviourManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Behaviour> BehaviourManager<T> {
    /// Add a behaviour, moving it out of any other manager
    pub fn add(&self, behaviour: Arc<T>) -> Result<()> {
        self.core.add_typed(behaviour)
    }

    /// Remove a behaviour; `false` if this list does not own it
    pub fn remove(&self, behaviour: &Arc<T>) -> bool {
        let erased = Arc::clone(behaviour).into_behaviour();
        self.core.remove_erased(&erased)
    }

    /// Check whether a behaviour is currently owned by this list
    pub fn contains(&self, behaviour: &Arc<T>) -> bool {
        behaviour
            .core()
            .current_manager()
            .is_some_and(|binding| binding.is_handler(&self.handle()))
    }

    /// Snapshot of the active behaviours, in insertion order
    pub fn behaviours(&self) -> Vec<Arc<T>> {
        lock(&self.core.live).clone()
    }

    /// Number of active behaviours
    pub fn len(&self) -> usize {
        lock(&self.core.live).len()
    }

    /// True if no behaviour is active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buffered adds and removes awaiting a flush
    pub fn pending_len(&self) -> usize {
        let pending = lock(&self.core.pending);
        pending.added.len() + pending.removed.len()
    }

    /// Apply buffered changes; a no-op in immediate mode
    pub fn flush(&self) {
        self.core.flush();
    }

    /// Type-erased handle for the dispatch table
    pub fn handle(&self) -> Arc<dyn BehaviourHandler> {
        let core: Arc<ManagerCore<T>> = Arc::clone(&self.core);
        core
    }

    /// Detach every behaviour, last first, and stop accepting new ones
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut owned = self.behaviours();
        owned.extend(lock(&self.core.pending).added.iter().cloned());
        for behaviour in owned.into_iter().rev() {
            self.core.remove_erased(&behaviour.into_behaviour());
        }
        self.core.flush();
        lock(&self.core.live).clear();
    }

    /// True once [`BehaviourManager::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::BehaviourCore;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Tag {
        core: BehaviourCore,
    }

    impl Behaviour for Tag {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }
    }

    trait Tagged: Behaviour {}
    impl Tagged for Tag {}

    fn as_tagged(b: Arc<dyn Behaviour>) -> Option<Arc<dyn Tagged>> {
        b.into_any().downcast::<Tag>().ok().map(|t| t as Arc<dyn Tagged>)
    }

    #[test]
    fn test_add_records_binding() {
        let manager = BehaviourManager::<Tag>::new();
        let tag = Arc::new(Tag::default());
        manager.add(Arc::clone(&tag)).unwrap();

        assert!(manager.contains(&tag));
        assert_eq!(manager.len(), 1);
        let binding = tag.core().current_manager().unwrap();
        assert!(binding.is_handler(&manager.handle()));
        assert_eq!(binding.managed_as(), TypeId::of::<Tag>());
    }

    #[test]
    fn test_add_twice_is_noop() {
        let manager = BehaviourManager::<Tag>::new();
        let tag = Arc::new(Tag::default());
        manager.add(Arc::clone(&tag)).unwrap();
        manager.add(Arc::clone(&tag)).unwrap();
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_add_moves_between_managers() {
        let first = BehaviourManager::<Tag>::new();
        let second = BehaviourManager::<Tag>::new();
        let tag = Arc::new(Tag::default());

        first.add(Arc::clone(&tag)).unwrap();
        second.add(Arc::clone(&tag)).unwrap();

        assert!(!first.contains(&tag));
        assert!(first.is_empty());
        assert!(second.contains(&tag));
    }

    #[test]
    fn test_remove_unowned_returns_false() {
        let first = BehaviourManager::<Tag>::new();
        let second = BehaviourManager::<Tag>::new();
        let tag = Arc::new(Tag::default());
        first.add(Arc::clone(&tag)).unwrap();

        assert!(!second.remove(&tag));
        assert!(first.contains(&tag));
        assert!(first.remove(&tag));
        assert!(!first.remove(&tag));
        assert!(tag.core().current_manager().is_none());
    }

    #[test]
    fn test_remove_preserves_order() {
        let manager = BehaviourManager::<Tag>::new();
        let tags: Vec<_> = (0..4).map(|_| Arc::new(Tag::default())).collect();
        for tag in &tags {
            manager.add(Arc::clone(tag)).unwrap();
        }
        manager.remove(&tags[1]);

        let remaining = manager.behaviours();
        assert!(Arc::ptr_eq(&remaining[0], &tags[0]));
        assert!(Arc::ptr_eq(&remaining[1], &tags[2]));
        assert!(Arc::ptr_eq(&remaining[2], &tags[3]));
    }

    #[test]
    fn test_deferred_changes_wait_for_flush() {
        let manager = BehaviourManager::<Tag>::deferred();
        let tag = Arc::new(Tag::default());
        manager.add(Arc::clone(&tag)).unwrap();
        assert!(manager.is_empty());
        assert_eq!(manager.pending_len(), 1);

        manager.flush();
        assert_eq!(manager.len(), 1);

        manager.remove(&tag);
        assert_eq!(manager.len(), 1);
        manager.flush();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_deferred_add_then_remove_cancels() {
        let manager = BehaviourManager::<Tag>::deferred();
        let tag = Arc::new(Tag::default());
        manager.add(Arc::clone(&tag)).unwrap();
        assert!(manager.remove(&tag));
        assert_eq!(manager.pending_len(), 0);
        manager.flush();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_dispose_detaches_everything() {
        let manager = BehaviourManager::<Tag>::new();
        let tags: Vec<_> = (0..3).map(|_| Arc::new(Tag::default())).collect();
        for tag in &tags {
            manager.add(Arc::clone(tag)).unwrap();
        }

        manager.dispose();
        assert!(manager.is_disposed());
        assert!(manager.is_empty());
        for tag in &tags {
            assert!(tag.core().current_manager().is_none());
        }

        manager.dispose();
        let err = manager.add(Arc::new(Tag::default())).unwrap_err();
        assert!(matches!(err, EngineError::ManagerDisposed(_)));
    }

    #[test]
    fn test_on_add_hook_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let manager = BehaviourManager::<Tag>::builder()
            .on_add(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        manager.add(Arc::new(Tag::default())).unwrap();
        manager.add(Arc::new(Tag::default())).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_trait_object_manager() {
        let manager = ManagerBuilder::<dyn Tagged>::with_cast(as_tagged).build();
        let handle = manager.handle();
        let tag: Arc<dyn Behaviour> = Arc::new(Tag::default());

        handle.add(Arc::clone(&tag)).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(
            tag.core().current_manager().unwrap().managed_as(),
            TypeId::of::<dyn Tagged>()
        );
        assert!(handle.remove(&tag));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_incompatible_behaviour_rejected() {
        #[derive(Default)]
        struct Stranger {
            core: BehaviourCore,
        }
        impl Behaviour for Stranger {
            fn core(&self) -> &BehaviourCore {
                &self.core
            }
        }

        let manager = BehaviourManager::<Tag>::new();
        let err = manager
            .handle()
            .add(Arc::new(Stranger::default()))
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompatibleBehaviour { .. }));
    }
}
