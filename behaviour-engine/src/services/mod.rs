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
//! Scene-scoped services
//!
//! Services are singletons owned by a scene and updated once per tick in
//! registration order. The scene always registers a [`ProcessService`]
//! followed by an [`EventService`].

mod event;
mod process;

pub use event::{Event, EventData, EventService, ListenerId, ScopeId};
pub use process::{Process, ProcessService};

use crate::error::{EngineError, Result};
use crate::sync::{read, write};
use log::debug;
use std::any::{type_name, Any, TypeId};
use std::sync::{Arc, RwLock};

/// A scene-wide singleton updated once per tick
pub trait Service: Any + Send + Sync {
    /// Display name used in logs
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Advance by `elapsed` seconds
    fn update(&self, _elapsed: f64) {}
}

struct ServiceEntry {
    type_id: TypeId,
    service: Arc<dyn Service>,
    concrete: Arc<dyn Any + Send + Sync>,
}

impl ServiceEntry {
    fn new<S: Service>(service: Arc<S>) -> Self {
        debug!("registered service {}", service.name());
        ServiceEntry {
            type_id: TypeId::of::<S>(),
            service: service.clone(),
            concrete: service,
        }
    }
}

/// Ordered, type-indexed set of services
#[derive(Default)]
pub struct ServiceContainer {
    entries: RwLock<Vec<ServiceEntry>>,
}

impl ServiceContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Container holding the scene's process and event services, in that order
    pub(crate) fn for_scene(processes: Arc<ProcessService>, events: Arc<EventService>) -> Self {
        ServiceContainer {
            entries: RwLock::new(vec![ServiceEntry::new(processes), ServiceEntry::new(events)]),
        }
    }

    /// Register a service; one instance per concrete type
    pub fn add<S: Service>(&self, service: Arc<S>) -> Result<()> {
        let mut entries = write(&self.entries);
        if entries.iter().any(|e| e.type_id == TypeId::of::<S>()) {
            return Err(EngineError::ServiceAlreadyRegistered(type_name::<S>()));
        }
        entries.push(ServiceEntry::new(service));
        Ok(())
    }

    /// Look up a service by concrete type
    pub fn get<S: Service>(&self) -> Option<Arc<S>> {
        read(&self.entries)
            .iter()
            .find(|e| e.type_id == TypeId::of::<S>())
            .and_then(|e| Arc::clone(&e.concrete).downcast::<S>().ok())
    }

    /// Like [`ServiceContainer::get`], but absence is an error
    pub fn require<S: Service>(&self) -> Result<Arc<S>> {
        self.get::<S>()
            .ok_or(EngineError::MissingService(type_name::<S>()))
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    /// True if no service is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update every service in registration order
    pub fn update(&self, elapsed: f64) {
        let services: Vec<Arc<dyn Service>> = read(&self.entries)
            .iter()
            .map(|e| Arc::clone(&e.service))
            .collect();
        for service in services {
            service.update(elapsed);
        }
    }
}
