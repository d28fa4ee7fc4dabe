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
//! Integration tests for the process scheduler

use behaviour_engine::services::{Process, ProcessService};
use behaviour_engine::Scene;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counts its updates and completes after a fixed number of them
struct Countdown {
    remaining: AtomicUsize,
    runs: AtomicUsize,
}

impl Countdown {
    fn new(runs: usize) -> Arc<Self> {
        Arc::new(Countdown {
            remaining: AtomicUsize::new(runs),
            runs: AtomicUsize::new(0),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Process for Countdown {
    fn update(&self, _elapsed: f64) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.remaining.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) == 0
    }
}

/// Schedules a child process the first time it runs
struct Launcher {
    scheduler: Arc<ProcessService>,
    child: Arc<Countdown>,
    launched: AtomicBool,
}

impl Process for Launcher {
    fn update(&self, _elapsed: f64) {
        if !self.launched.swap(true, Ordering::SeqCst) {
            self.scheduler.add(self.child.clone());
        }
    }

    fn is_complete(&self) -> bool {
        false
    }
}

/// Records the order processes run in
struct Tagged {
    tag: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Process for Tagged {
    fn update(&self, _elapsed: f64) {
        self.log.lock().unwrap().push(self.tag);
    }

    fn is_complete(&self) -> bool {
        false
    }
}

#[test]
fn test_process_added_during_update_runs_next_tick() {
    let _ = env_logger::builder().is_test(true).try_init();
    let scene = Scene::new();
    let child = Countdown::new(10);
    scene.processes().add(Arc::new(Launcher {
        scheduler: scene.processes().clone(),
        child: child.clone(),
        launched: AtomicBool::new(false),
    }));

    scene.update(0.1);
    assert_eq!(child.runs(), 0);
    assert_eq!(scene.processes().pending_len(), 1);

    scene.update(0.1);
    assert_eq!(child.runs(), 1);
    assert_eq!(scene.processes().len(), 2);
}

#[test]
fn test_completed_processes_are_dropped() {
    let scheduler = ProcessService::new();
    let short = Countdown::new(2);
    let long = Countdown::new(5);
    scheduler.add(short.clone());
    scheduler.add(long.clone());

    for _ in 0..3 {
        scheduler.update(0.1);
    }
    assert_eq!(short.runs(), 2);
    assert_eq!(long.runs(), 3);
    assert_eq!(scheduler.len(), 1);

    for _ in 0..5 {
        scheduler.update(0.1);
    }
    assert_eq!(long.runs(), 5);
    assert!(scheduler.is_empty());
}

#[test]
fn test_processes_run_newest_first() {
    let scheduler = ProcessService::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        scheduler.add(Arc::new(Tagged {
            tag,
            log: log.clone(),
        }));
    }

    scheduler.update(0.1);
    assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
}
