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
//! Cooperative process scheduler
//!
//! Processes are driven once per tick. A process added during an update is
//! queued and first runs on the following tick; a process reporting
//! completion is dropped before it would next run.

use super::Service;
use crate::sync::lock;
use log::trace;
use std::sync::{Arc, Mutex};

/// Something the scheduler advances every tick
pub trait Process: Send + Sync {
    /// Advance by `elapsed` seconds
    fn update(&self, elapsed: f64);

    /// Once true, the scheduler drops the process
    fn is_complete(&self) -> bool {
        false
    }
}

/// Drives registered processes each tick
#[derive(Default)]
pub struct ProcessService {
    live: Mutex<Vec<Arc<dyn Process>>>,
    pending: Mutex<Vec<Arc<dyn Process>>>,
}

impl ProcessService {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a process; it runs from the next update onwards
    pub fn add(&self, process: Arc<dyn Process>) {
        lock(&self.pending).push(process);
    }

    /// Number of processes that ran (or were queued to run) last update
    pub fn len(&self) -> usize {
        lock(&self.live).len()
    }

    /// True if no process is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of processes waiting for the next update
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Run one tick
    ///
    /// Pending processes join first, then live processes are visited from
    /// the back so a completed one can be swapped out with the visited tail.
    pub fn update(&self, elapsed: f64) {
        let mut live = std::mem::take(&mut *lock(&self.live));
        live.append(&mut lock(&self.pending));

        let mut index = live.len();
        while index > 0 {
            index -= 1;
            if live[index].is_complete() {
                // The tail was already visited this tick.
                live.swap_remove(index);
                trace!("process completed, {} remaining", live.len());
            } else {
                live[index].update(elapsed);
            }
        }

        let mut slot = lock(&self.live);
        // Nothing else writes `live`, but keep anything that raced in.
        live.append(&mut slot);
        *slot = live;
    }
}

impl Service for ProcessService {
    fn update(&self, elapsed: f64) {
        ProcessService::update(self, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        runs: AtomicUsize,
        done: AtomicBool,
    }

    impl Process for Counter {
        fn update(&self, _elapsed: f64) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }

        fn is_complete(&self) -> bool {
            self.done.load(Ordering::SeqCst)
        }
    }

    struct Spawner {
        scheduler: Arc<ProcessService>,
        child: Arc<Counter>,
        spawned: AtomicBool,
    }

    impl Process for Spawner {
        fn update(&self, _elapsed: f64) {
            if !self.spawned.swap(true, Ordering::SeqCst) {
                self.scheduler.add(self.child.clone());
            }
        }
    }

    #[test]
    fn test_completed_process_is_dropped() {
        let scheduler = ProcessService::new();
        let counter = Arc::new(Counter::default());
        scheduler.add(counter.clone());

        scheduler.update(0.1);
        scheduler.update(0.1);
        assert_eq!(counter.runs.load(Ordering::SeqCst), 2);

        counter.done.store(true, Ordering::SeqCst);
        scheduler.update(0.1);
        assert_eq!(counter.runs.load(Ordering::SeqCst), 2);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_added_during_update_runs_next_tick() {
        let scheduler = Arc::new(ProcessService::new());
        let child = Arc::new(Counter::default());
        scheduler.add(Arc::new(Spawner {
            scheduler: scheduler.clone(),
            child: child.clone(),
            spawned: AtomicBool::new(false),
        }));

        scheduler.update(0.1);
        assert_eq!(child.runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_len(), 1);

        scheduler.update(0.1);
        assert_eq!(child.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_complete_before_first_run() {
        let scheduler = ProcessService::new();
        let counter = Arc::new(Counter::default());
        counter.done.store(true, Ordering::SeqCst);
        scheduler.add(counter.clone());
        scheduler.update(0.1);
        assert_eq!(counter.runs.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_completion_mid_list_skips_nobody() {
        let scheduler = ProcessService::new();
        let counters: Vec<Arc<Counter>> = (0..4).map(|_| Arc::new(Counter::default())).collect();
        for counter in &counters {
            scheduler.add(counter.clone());
        }

        scheduler.update(0.1);
        counters[1].done.store(true, Ordering::SeqCst);
        scheduler.update(0.1);
        scheduler.update(0.1);

        assert_eq!(scheduler.len(), 3);
        for (i, counter) in counters.iter().enumerate() {
            let expected = if i == 1 { 1 } else { 3 };
            assert_eq!(counter.runs.load(Ordering::SeqCst), expected, "process {}", i);
        }
    }
}
