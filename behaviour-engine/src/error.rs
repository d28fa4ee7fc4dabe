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
//! Engine error taxonomy
//!
//! Configuration mistakes and invalid arguments are reported eagerly through
//! [`EngineError`]. Expected steady-state churn (removing a behaviour that is
//! not owned, disposing twice) is never an error and is reported through
//! `bool` returns instead.

use crate::entity::Entity;
use thiserror::Error;

/// Errors produced by the behaviour core and the physics solver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A behaviour needs a co-behaviour on the same entity that is absent
    #[error("{behaviour} requires a {required} behaviour on the same entity")]
    MissingBehaviour {
        /// Behaviour that failed to initialise
        behaviour: &'static str,
        /// Behaviour type it depends on
        required: &'static str,
    },

    /// Two managers claimed the same behaviour type
    #[error("behaviour type {behaviour} is already managed by {existing}")]
    DuplicateManager {
        /// Contested behaviour type
        behaviour: &'static str,
        /// Name of the manager that already owns it
        existing: String,
    },

    /// A manager of the same concrete type is already registered
    #[error("manager {0} is already registered")]
    ManagerAlreadyRegistered(String),

    /// No manager (direct or through the lineage) handles a behaviour type
    #[error("no manager is registered for behaviour type {0}")]
    NoManager(&'static str),

    /// The resolved manager cannot accept this concrete behaviour
    #[error("behaviour {behaviour} cannot be managed as {managed_as}")]
    IncompatibleBehaviour {
        /// Concrete behaviour type
        behaviour: &'static str,
        /// Managed type of the resolved handler
        managed_as: &'static str,
    },

    /// Declaring a subtype link would make the lineage cyclic
    #[error("declaring {child} as a subtype of {parent} would create a cycle")]
    CyclicLineage {
        /// Child type name
        child: &'static str,
        /// Parent type name
        parent: &'static str,
    },

    /// The manager was disposed and no longer accepts behaviours
    #[error("manager for {0} has been disposed")]
    ManagerDisposed(&'static str),

    /// A service of the same concrete type is already registered
    #[error("service {0} is already registered")]
    ServiceAlreadyRegistered(&'static str),

    /// A required scene service is not registered
    #[error("service {0} is not registered")]
    MissingService(&'static str),

    /// The behaviour already has an owning entity
    #[error("behaviour is already attached to {0}")]
    AlreadyAttached(Entity),

    /// A named property exists with a different value type
    #[error("property '{name}' already exists with a different type")]
    PropertyTypeMismatch {
        /// Property name
        name: String,
    },

    /// A numeric argument lies outside its permitted range
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        /// Argument name
        name: &'static str,
        /// Rejected value
        value: f64,
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },

    /// An argument is malformed for a reason other than its range
    #[error("invalid {name}: {reason}")]
    InvalidArgument {
        /// Argument name
        name: &'static str,
        /// Human readable reason
        reason: String,
    },
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Check `value` against an inclusive range, producing [`EngineError::OutOfRange`]
    pub fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
        if value.is_nan() || value < min || value > max {
            return Err(EngineError::OutOfRange { name, value, min, max });
        }
        Ok(value)
    }
}
