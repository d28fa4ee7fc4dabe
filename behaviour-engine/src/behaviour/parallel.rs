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
//! Data-parallel behaviour updates
//!
//! Behaviours updated here must not touch each other or shared mutable
//! state outside their own synchronisation. The list is deferred: adds and
//! removes made during a tick take effect when the next update begins.

use super::{Behaviour, BehaviourManager, Manager, Registration};
use crate::error::Result;
use crate::services::{Process, ProcessService, ServiceContainer};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A behaviour whose update may run concurrently with its peers
pub trait ParallelProcessBehaviour: Behaviour {
    /// Advance by `elapsed` seconds
    fn update(&self, elapsed: f64);
}

/// Manager that fans [`ParallelProcessBehaviour`] updates out across threads
///
/// With the `parallel` feature disabled updates run sequentially.
pub struct ParallelProcessManager<B: ParallelProcessBehaviour> {
    behaviours: BehaviourManager<B>,
    #[cfg(feature = "parallel")]
    pool: Option<Arc<rayon::ThreadPool>>,
    stopped: AtomicBool,
}

impl<B: ParallelProcessBehaviour> Default for ParallelProcessManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ParallelProcessBehaviour> ParallelProcessManager<B> {
    /// Create a manager using the global rayon pool
    pub fn new() -> Self {
        ParallelProcessManager {
            behaviours: BehaviourManager::deferred(),
            #[cfg(feature = "parallel")]
            pool: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// Create a manager running updates on a dedicated pool
    #[cfg(feature = "parallel")]
    pub fn with_thread_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        ParallelProcessManager {
            pool: Some(pool),
            ..Self::new()
        }
    }

    /// The managed behaviour list
    pub fn behaviours(&self) -> &BehaviourManager<B> {
        &self.behaviours
    }

    #[cfg(feature = "parallel")]
    fn run(&self, snapshot: &[Arc<B>], elapsed: f64) {
        let update = || snapshot.par_iter().for_each(|b| b.update(elapsed));
        match &self.pool {
            Some(pool) => pool.install(update),
            None => update(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run(&self, snapshot: &[Arc<B>], elapsed: f64) {
        for behaviour in snapshot {
            behaviour.update(elapsed);
        }
    }
}

impl<B: ParallelProcessBehaviour> Process for ParallelProcessManager<B> {
    fn update(&self, elapsed: f64) {
        self.behaviours.flush();
        let snapshot = self.behaviours.behaviours();
        self.run(&snapshot, elapsed);
    }

    fn is_complete(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl<B: ParallelProcessBehaviour> Manager for ParallelProcessManager<B> {
    fn register(self: Arc<Self>, registration: &mut Registration) {
        registration.manages(&self.behaviours);
        registration.category::<dyn Process>(self.clone());
    }

    fn initialise(self: Arc<Self>, services: &ServiceContainer) -> Result<()> {
        services.require::<ProcessService>()?.add(self);
        Ok(())
    }

    fn shutdown(&self) {
        debug!("stopping {}", self.name());
        self.stopped.store(true, Ordering::Release);
        self.behaviours.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::BehaviourCore;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Particle {
        core: BehaviourCore,
        steps: AtomicUsize,
    }

    impl Behaviour for Particle {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }
    }

    impl ParallelProcessBehaviour for Particle {
        fn update(&self, _elapsed: f64) {
            self.steps.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_adds_apply_on_next_update() {
        let manager = ParallelProcessManager::<Particle>::new();
        let particles: Vec<_> = (0..100).map(|_| Arc::new(Particle::default())).collect();
        for particle in &particles {
            manager.behaviours().add(particle.clone()).unwrap();
        }
        assert!(manager.behaviours().is_empty());

        manager.update(0.1);
        manager.update(0.1);
        for particle in &particles {
            assert_eq!(particle.steps.load(Ordering::Relaxed), 2);
        }
    }

    #[test]
    fn test_removal_applies_on_next_update() {
        let manager = ParallelProcessManager::<Particle>::new();
        let particle = Arc::new(Particle::default());
        manager.behaviours().add(particle.clone()).unwrap();
        manager.update(0.1);

        manager.behaviours().remove(&particle);
        manager.update(0.1);
        assert_eq!(particle.steps.load(Ordering::Relaxed), 1);
        assert!(manager.behaviours().is_empty());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_dedicated_thread_pool() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let manager = ParallelProcessManager::<Particle>::with_thread_pool(Arc::new(pool));
        let particle = Arc::new(Particle::default());
        manager.behaviours().add(particle.clone()).unwrap();
        manager.update(0.1);
        assert_eq!(particle.steps.load(Ordering::Relaxed), 1);
    }
}
