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
//! Deferred, typed publish/subscribe
//!
//! Sending an event never calls listeners directly. Each send enqueues an
//! invocation on a queue shared by every channel of the service, and
//! [`EventService::update`] delivers them. Listeners may send further events
//! while being invoked; those are delivered in the same update, after the
//! batch that produced them.
//!
//! A scoped channel is bound to a scope (usually an entity). Sending on it
//! notifies its own listeners and then the global channel of the same type.
//!
//! Invocation records are recycled through a per-type [`Pool`].

use super::Service;
use crate::entity::Entity;
use crate::pool::{Pool, PoolConfig, PoolStats};
use crate::sync::{lock, read, write};
use log::trace;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Payload bound for event channels
pub trait EventData: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> EventData for T {}

/// Key of a scoped channel
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Raw numeric value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ScopeId {
    fn from(raw: u64) -> Self {
        ScopeId(raw)
    }
}

impl From<Entity> for ScopeId {
    fn from(entity: Entity) -> Self {
        ScopeId(entity.key())
    }
}

/// Handle for removing a listener
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

trait Dispatch: Send {
    fn execute(&mut self);
    fn recycle(self: Box<Self>);
}

struct Invocation<T: EventData> {
    event: Option<Arc<Event<T>>>,
    data: Option<T>,
}

impl<T: EventData> Invocation<T> {
    fn empty() -> Box<Self> {
        Box::new(Invocation {
            event: None,
            data: None,
        })
    }
}

impl<T: EventData> Dispatch for Invocation<T> {
    fn execute(&mut self) {
        if let (Some(event), Some(data)) = (&self.event, &self.data) {
            event.invoke(data);
        }
    }

    fn recycle(mut self: Box<Self>) {
        self.data = None;
        if let Some(event) = self.event.take() {
            event.pool.release(self);
        }
    }
}

#[derive(Default)]
struct DispatchQueue {
    pending: Mutex<Vec<Box<dyn Dispatch>>>,
    spare: Mutex<Vec<Box<dyn Dispatch>>>,
}

/// One typed channel, either global or bound to a scope
pub struct Event<T: EventData> {
    this: Weak<Event<T>>,
    scope: Option<ScopeId>,
    global: Option<Arc<Event<T>>>,
    listeners: RwLock<Vec<(ListenerId, Listener<T>)>>,
    next_listener: AtomicU64,
    queue: Arc<DispatchQueue>,
    pool: Arc<Pool<Box<Invocation<T>>>>,
}

impl<T: EventData> Event<T> {
    fn create(
        scope: Option<ScopeId>,
        global: Option<Arc<Event<T>>>,
        queue: Arc<DispatchQueue>,
        pool: Arc<Pool<Box<Invocation<T>>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Event {
            this: this.clone(),
            scope,
            global,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            queue,
            pool,
        })
    }

    /// Scope of the channel; `None` for the global channel
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// True for the global channel of `T`
    pub fn is_global(&self) -> bool {
        self.scope.is_none()
    }

    /// Subscribe a listener
    pub fn add_listener(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        write(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe a listener; `false` if it was not subscribed
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = write(&self.listeners);
        match listeners.iter().position(|(existing, _)| *existing == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of subscribed listeners
    pub fn listener_count(&self) -> usize {
        read(&self.listeners).len()
    }

    /// Queue `data` for delivery on the next update
    ///
    /// On a scoped channel the global channel is notified as well.
    pub fn send(&self, data: T) {
        match &self.global {
            Some(global) => {
                self.enqueue(data.clone());
                global.enqueue(data);
            }
            None => self.enqueue(data),
        }
    }

    /// Queue `data` for this channel's own listeners only
    pub fn send_local(&self, data: T) {
        self.enqueue(data);
    }

    fn enqueue(&self, data: T) {
        let Some(event) = self.this.upgrade() else {
            return;
        };
        let mut invocation = self.pool.acquire_with(Invocation::empty);
        invocation.event = Some(event);
        invocation.data = Some(data);
        let invocation: Box<dyn Dispatch> = invocation;
        lock(&self.queue.pending).push(invocation);
    }

    fn invoke(&self, data: &T) {
        let listeners: Vec<Listener<T>> = read(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(data);
        }
    }
}

impl<T: EventData> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &std::any::type_name::<T>())
            .field("scope", &self.scope)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

struct Channels<T: EventData> {
    global: Arc<Event<T>>,
    scoped: HashMap<ScopeId, Arc<Event<T>>>,
    queue: Arc<DispatchQueue>,
    pool: Arc<Pool<Box<Invocation<T>>>>,
}

impl<T: EventData> Channels<T> {
    fn new(queue: Arc<DispatchQueue>, config: PoolConfig) -> Self {
        let pool = Arc::new(Pool::with_config(config));
        Channels {
            global: Event::create(None, None, Arc::clone(&queue), Arc::clone(&pool)),
            scoped: HashMap::new(),
            queue,
            pool,
        }
    }

    fn scoped(&mut self, scope: ScopeId) -> Arc<Event<T>> {
        let Channels {
            global,
            scoped,
            queue,
            pool,
        } = self;
        let event = scoped.entry(scope).or_insert_with(|| {
            Event::create(
                Some(scope),
                Some(Arc::clone(global)),
                Arc::clone(queue),
                Arc::clone(pool),
            )
        });
        Arc::clone(event)
    }
}

/// Owner of every event channel in a scene
pub struct EventService {
    queue: Arc<DispatchQueue>,
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send>>>,
    pool_config: PoolConfig,
}

impl Default for EventService {
    fn default() -> Self {
        Self::new()
    }
}

impl EventService {
    /// Create a service with default invocation pooling
    pub fn new() -> Self {
        Self::with_pool_config(PoolConfig::default())
    }

    /// Create a service with custom invocation pooling
    pub fn with_pool_config(pool_config: PoolConfig) -> Self {
        EventService {
            queue: Arc::new(DispatchQueue::default()),
            channels: Mutex::new(HashMap::new()),
            pool_config,
        }
    }

    fn with_channels<T: EventData, R>(&self, f: impl FnOnce(&mut Channels<T>) -> R) -> R {
        let mut channels = lock(&self.channels);
        let entry = channels.entry(TypeId::of::<T>()).or_insert_with(|| {
            Box::new(Channels::<T>::new(
                Arc::clone(&self.queue),
                self.pool_config.clone(),
            ))
        });
        // Entries are keyed by the TypeId of their payload.
        let typed = entry
            .downcast_mut::<Channels<T>>()
            .expect("event channel stored under a foreign TypeId");
        f(typed)
    }

    /// Global channel for `T`, created on first use
    pub fn event<T: EventData>(&self) -> Arc<Event<T>> {
        self.with_channels::<T, _>(|c| Arc::clone(&c.global))
    }

    /// Scoped channel for `T`, created on first use and linked to the global one
    pub fn scoped<T: EventData>(&self, scope: impl Into<ScopeId>) -> Arc<Event<T>> {
        let scope = scope.into();
        self.with_channels::<T, _>(|c| c.scoped(scope))
    }

    /// Drop a scoped channel and its listeners
    pub fn remove_scope<T: EventData>(&self, scope: impl Into<ScopeId>) -> bool {
        let scope = scope.into();
        self.with_channels::<T, _>(|c| c.scoped.remove(&scope).is_some())
    }

    /// Pool statistics for invocations of `T`
    pub fn invocation_stats<T: EventData>(&self) -> PoolStats {
        self.with_channels::<T, _>(|c| c.pool.stats())
    }

    /// Invocations waiting for delivery
    pub fn pending_count(&self) -> usize {
        lock(&self.queue.pending).len()
    }

    /// Deliver queued invocations until the queue stays empty
    ///
    /// Returns the number of invocations delivered. A listener that keeps
    /// sending in response to its own event will keep this loop running.
    pub fn flush(&self) -> usize {
        let mut delivered = 0;
        loop {
            let mut batch = {
                let mut pending = lock(&self.queue.pending);
                if pending.is_empty() {
                    break;
                }
                let spare = std::mem::take(&mut *lock(&self.queue.spare));
                std::mem::replace(&mut *pending, spare)
            };
            delivered += batch.len();
            for mut invocation in batch.drain(..) {
                invocation.execute();
                invocation.recycle();
            }
            *lock(&self.queue.spare) = batch;
        }
        if delivered > 0 {
            trace!("delivered {} event invocations", delivered);
        }
        delivered
    }
}

impl Service for EventService {
    fn update(&self, _elapsed: f64) {
        self.flush();
    }
}
