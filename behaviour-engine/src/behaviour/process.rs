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
//! Per-behaviour updates driven by the process scheduler
//!
//! A [`ProcessBehaviourManager`] is itself a [`Process`]: each tick it walks
//! its behaviours and updates the ones whose [`UpdateSchedule`] is due. A
//! behaviour with period `p` runs on every tick where
//! `(tick + phase) % p == 0` and receives the time accumulated since it last
//! ran. Phases come from a [`PhaseSequence`], so behaviours sharing a period
//! are spread across ticks instead of all firing together.

use super::{Behaviour, BehaviourManager, Manager, Registration};
use crate::error::Result;
use crate::services::{Process, ProcessService, ServiceContainer};
use crate::sync::lock;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A behaviour updated by a [`ProcessBehaviourManager`]
pub trait ProcessBehaviour: Behaviour {
    /// Update cadence of this behaviour
    fn schedule(&self) -> &UpdateSchedule;

    /// Advance by the time elapsed since this behaviour last ran
    fn update(&self, elapsed: f64);
}

/// Update cadence and phase of one behaviour
#[derive(Debug, Default)]
pub struct UpdateSchedule {
    period: AtomicU32,
    phase: AtomicU32,
    accumulated: Mutex<f64>,
}

impl UpdateSchedule {
    /// Run every tick
    pub fn new() -> Self {
        Self::default()
    }

    /// Run once every `period` ticks; 0 and 1 both mean every tick
    pub fn every(period: u32) -> Self {
        let schedule = Self::default();
        schedule.set_period(period);
        schedule
    }

    /// Current period
    pub fn period(&self) -> u32 {
        self.period.load(Ordering::Relaxed)
    }

    /// Change the period
    pub fn set_period(&self, period: u32) {
        self.period.store(period, Ordering::Relaxed);
    }

    /// Phase offset assigned when the behaviour was added
    pub fn phase(&self) -> u32 {
        self.phase.load(Ordering::Relaxed)
    }

    pub(crate) fn set_phase(&self, phase: u32) {
        self.phase.store(phase, Ordering::Relaxed);
    }

    /// Check whether the behaviour runs on `tick`
    pub fn is_due(&self, tick: u64) -> bool {
        let period = u64::from(self.period());
        period <= 1 || (tick.wrapping_add(u64::from(self.phase()))) % period == 0
    }

    /// Add `elapsed` and, if due, take the accumulated total
    fn advance(&self, tick: u64, elapsed: f64) -> Option<f64> {
        let mut accumulated = lock(&self.accumulated);
        *accumulated += elapsed;
        if self.is_due(tick) {
            Some(std::mem::take(&mut *accumulated))
        } else {
            None
        }
    }
}

/// Generator of well-spread phase offsets
///
/// Consecutive counter values are scrambled with a multiplicative hash and
/// an xor-fold of the high half into the low half.
#[derive(Debug, Default)]
pub struct PhaseSequence {
    next: AtomicU32,
}

impl PhaseSequence {
    /// Start a sequence at `seed`
    pub fn new(seed: u32) -> Self {
        PhaseSequence {
            next: AtomicU32::new(seed),
        }
    }

    /// Produce the next phase
    pub fn next_phase(&self) -> u32 {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let hashed = n.wrapping_mul(0x9E37_79B9);
        hashed ^ (hashed >> 16)
    }
}

/// Manager that drives [`ProcessBehaviour`]s each tick
pub struct ProcessBehaviourManager<B: ProcessBehaviour> {
    behaviours: BehaviourManager<B>,
    tick: AtomicU64,
    stopped: AtomicBool,
}

impl<B: ProcessBehaviour> Default for ProcessBehaviourManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ProcessBehaviour> ProcessBehaviourManager<B> {
    /// Create a manager with a phase sequence starting at zero
    pub fn new() -> Self {
        Self::with_phases(PhaseSequence::default())
    }

    /// Create a manager drawing phases from `phases`
    pub fn with_phases(phases: PhaseSequence) -> Self {
        let behaviours = BehaviourManager::<B>::builder()
            .on_add(move |b: &B| b.schedule().set_phase(phases.next_phase()))
            .build();
        ProcessBehaviourManager {
            behaviours,
            tick: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// The managed behaviour list
    pub fn behaviours(&self) -> &BehaviourManager<B> {
        &self.behaviours
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }
}

impl<B: ProcessBehaviour> Process for ProcessBehaviourManager<B> {
    fn update(&self, elapsed: f64) {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        for behaviour in self.behaviours.behaviours() {
            if let Some(total) = behaviour.schedule().advance(tick, elapsed) {
                behaviour.update(total);
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl<B: ProcessBehaviour> Manager for ProcessBehaviourManager<B> {
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

    #[derive(Default)]
    struct Pulse {
        core: BehaviourCore,
        schedule: UpdateSchedule,
        received: Mutex<Vec<f64>>,
    }

    impl Pulse {
        fn every(period: u32) -> Self {
            Pulse {
                schedule: UpdateSchedule::every(period),
                ..Self::default()
            }
        }
    }

    impl Behaviour for Pulse {
        fn core(&self) -> &BehaviourCore {
            &self.core
        }
    }

    impl ProcessBehaviour for Pulse {
        fn schedule(&self) -> &UpdateSchedule {
            &self.schedule
        }

        fn update(&self, elapsed: f64) {
            self.received.lock().unwrap().push(elapsed);
        }
    }

    #[test]
    fn test_period_zero_runs_every_tick() {
        let manager = ProcessBehaviourManager::<Pulse>::new();
        let pulse = Arc::new(Pulse::default());
        manager.behaviours().add(pulse.clone()).unwrap();

        for _ in 0..3 {
            manager.update(0.5);
        }
        assert_eq!(*pulse.received.lock().unwrap(), vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_skipped_ticks_accumulate() {
        let manager = ProcessBehaviourManager::<Pulse>::new();
        let pulse = Arc::new(Pulse::every(4));
        manager.behaviours().add(pulse.clone()).unwrap();

        for _ in 0..8 {
            manager.update(0.25);
        }
        let received = pulse.received.lock().unwrap();
        assert_eq!(received.len(), 2);
        // The first run may come early depending on phase; the second always
        // carries a full period.
        assert!((received[1] - 1.0).abs() < 1e-12);
        assert!(received.iter().sum::<f64>() <= 2.0 + 1e-12);
    }

    #[test]
    fn test_phases_spread_updates() {
        let manager = ProcessBehaviourManager::<Pulse>::new();
        let pulses: Vec<_> = (0..64).map(|_| Arc::new(Pulse::every(4))).collect();
        for pulse in &pulses {
            manager.behaviours().add(pulse.clone()).unwrap();
        }

        let mut per_tick = Vec::new();
        for _ in 0..4 {
            let before: usize = pulses.iter().map(|p| p.received.lock().unwrap().len()).sum();
            manager.update(0.1);
            let after: usize = pulses.iter().map(|p| p.received.lock().unwrap().len()).sum();
            per_tick.push(after - before);
        }

        assert_eq!(per_tick.iter().sum::<usize>(), 64);
        assert!(per_tick.iter().all(|&n| n < 64));
        for pulse in &pulses {
            assert_eq!(pulse.received.lock().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_phase_sequence_varies() {
        let phases = PhaseSequence::new(0);
        let values: Vec<u32> = (0..8).map(|_| phases.next_phase() % 4).collect();
        assert!(values.iter().any(|&v| v != values[0]));
    }

    #[test]
    fn test_registers_with_scheduler() {
        let services = ServiceContainer::new();
        let scheduler = Arc::new(ProcessService::new());
        services.add(scheduler.clone()).unwrap();

        let manager = Arc::new(ProcessBehaviourManager::<Pulse>::new());
        let pulse = Arc::new(Pulse::default());
        manager.behaviours().add(pulse.clone()).unwrap();
        manager.clone().initialise(&services).unwrap();

        scheduler.update(0.1);
        assert_eq!(pulse.received.lock().unwrap().len(), 1);

        manager.shutdown();
        scheduler.update(0.1);
        assert_eq!(pulse.received.lock().unwrap().len(), 1);
        assert!(scheduler.is_empty());
    }
}
