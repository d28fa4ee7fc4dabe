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
//! Solver configuration

use super::Vec2;
use crate::error::{EngineError, Result};

/// Tuning parameters for the physics pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    /// Sequential-impulse passes per step
    pub iterations: usize,
    /// Penetration tolerated before positional correction kicks in
    pub allowed_penetration: f64,
    /// Fraction of excess penetration corrected per step
    pub bias_factor: f64,
    /// Maximum contacts collected per polygon per pair
    pub max_contacts: usize,
    /// Gravitational acceleration
    pub gravity: Vec2,
    /// Squared linear speed below which a body counts as resting
    ///
    /// Checked after gravity is integrated but before contacts are solved,
    /// so it must exceed `(|gravity| * dt)^2` for resting bodies to sleep.
    pub linear_sleep_threshold: f64,
    /// Angular speed below which a body counts as resting
    pub angular_sleep_threshold: f64,
    /// Seconds a body must rest before it sleeps
    pub time_to_sleep: f64,
    /// Linear velocity damping rate, per second
    pub linear_damping: f64,
    /// Angular velocity damping rate, per second
    pub angular_damping: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            iterations: 10,
            allowed_penetration: 0.01,
            bias_factor: 0.2,
            max_contacts: 2,
            gravity: Vec2::new(0.0, -9.81),
            linear_sleep_threshold: 0.05,
            angular_sleep_threshold: 0.05,
            time_to_sleep: 5.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

impl PhysicsConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the solver iteration count
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set gravity
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set positional correction parameters
    pub fn with_penetration(mut self, allowed_penetration: f64, bias_factor: f64) -> Self {
        self.allowed_penetration = allowed_penetration;
        self.bias_factor = bias_factor;
        self
    }

    /// Set the per-polygon contact limit
    pub fn with_max_contacts(mut self, max_contacts: usize) -> Self {
        self.max_contacts = max_contacts;
        self
    }

    /// Set sleeping thresholds and delay
    pub fn with_sleeping(mut self, linear: f64, angular: f64, time_to_sleep: f64) -> Self {
        self.linear_sleep_threshold = linear;
        self.angular_sleep_threshold = angular;
        self.time_to_sleep = time_to_sleep;
        self
    }

    /// Set damping rates
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Reject configurations the solver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(EngineError::InvalidArgument {
                name: "iterations",
                reason: "at least one solver iteration is required".to_string(),
            });
        }
        if self.max_contacts == 0 {
            return Err(EngineError::InvalidArgument {
                name: "max_contacts",
                reason: "at least one contact per polygon is required".to_string(),
            });
        }
        if !self.gravity.is_finite() {
            return Err(EngineError::InvalidArgument {
                name: "gravity",
                reason: "must be finite".to_string(),
            });
        }
        EngineError::check_range("bias_factor", self.bias_factor, 0.0, 1.0)?;
        EngineError::check_range("allowed_penetration", self.allowed_penetration, 0.0, f64::MAX)?;
        EngineError::check_range("linear_sleep_threshold", self.linear_sleep_threshold, 0.0, f64::MAX)?;
        EngineError::check_range("angular_sleep_threshold", self.angular_sleep_threshold, 0.0, f64::MAX)?;
        EngineError::check_range("time_to_sleep", self.time_to_sleep, 0.0, f64::INFINITY)?;
        EngineError::check_range("linear_damping", self.linear_damping, 0.0, f64::MAX)?;
        EngineError::check_range("angular_damping", self.angular_damping, 0.0, f64::MAX)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PhysicsConfig::default();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.time_to_sleep, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(PhysicsConfig::new().with_iterations(0).validate().is_err());
        assert!(PhysicsConfig::new().with_penetration(0.01, 1.5).validate().is_err());
        assert!(PhysicsConfig::new().with_sleeping(-1.0, 0.1, 5.0).validate().is_err());
        assert!(PhysicsConfig::new().with_max_contacts(0).validate().is_err());
    }
}
