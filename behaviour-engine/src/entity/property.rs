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
//! Named, typed property cells
//!
//! A [`PropertyStore`] belongs to one entity. Behaviours reserve the cells
//! they need during construction; creating a name that already exists returns
//! the existing cell, so two behaviours asking for `"position"` share it.
//!
//! [`DataProvider`] is the read-only counterpart used at initialisation time:
//! a bag of optional starting values that behaviours consult before falling
//! back to their defaults.

use crate::error::{EngineError, Result};
use crate::sync::{read, write};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct PropertyCell<T> {
    name: String,
    value: RwLock<T>,
    observers: RwLock<Vec<Observer<T>>>,
}

/// Shared handle to a named value with change notification
///
/// Cloning the handle shares the underlying cell.
pub struct Property<T> {
    cell: Arc<PropertyCell<T>>,
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Create a cell that is not part of any store
    ///
    /// Behaviours use detached cells as placeholders until
    /// `create_properties` swaps in the store-backed ones.
    pub fn detached(name: impl Into<String>, value: T) -> Self {
        Property {
            cell: Arc::new(PropertyCell {
                name: name.into(),
                value: RwLock::new(value),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Name the cell was created under
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Read a copy of the current value
    pub fn get(&self) -> T {
        read(&self.cell.value).clone()
    }

    /// Replace the value and notify observers
    pub fn set(&self, value: T) {
        *write(&self.cell.value) = value;
        self.notify();
    }

    /// Mutate the value in place and notify observers
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut write(&self.cell.value));
        self.notify();
    }

    /// Register an observer invoked after every write
    pub fn on_change(&self, observer: impl Fn(&T) + Send + Sync + 'static) {
        write(&self.cell.observers).push(Arc::new(observer));
    }

    /// Check whether two handles point at the same cell
    pub fn ptr_eq(&self, other: &Property<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    fn notify(&self) {
        let observers: Vec<Observer<T>> = read(&self.cell.observers).clone();
        if observers.is_empty() {
            return;
        }
        let value = self.get();
        for observer in observers {
            observer(&value);
        }
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Property {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.cell.name)
            .field("value", &*read(&self.cell.value))
            .finish()
    }
}

/// Per-entity collection of named property cells
#[derive(Default)]
pub struct PropertyStore {
    cells: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl PropertyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the cell called `name`
    ///
    /// Fails if the name is already taken by a cell of another type.
    pub fn create<T: Clone + Send + Sync + 'static>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<Property<T>> {
        if let Some(existing) = self.cells.get(name) {
            return existing
                .downcast_ref::<Property<T>>()
                .cloned()
                .ok_or_else(|| EngineError::PropertyTypeMismatch {
                    name: name.to_string(),
                });
        }

        let property = Property::detached(name, default);
        self.cells
            .insert(name.to_string(), Box::new(property.clone()));
        Ok(property)
    }

    /// Look up an existing cell
    pub fn get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<Property<T>> {
        self.cells.get(name)?.downcast_ref::<Property<T>>().cloned()
    }

    /// Read the current value of a cell, if it exists with type `T`
    pub fn try_get_value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.get::<T>(name).map(|p| p.get())
    }

    /// Check whether a cell with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// Number of cells in the store
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Generic source of optional named starting values
pub trait DataProvider: Send + Sync {
    /// Raw access to a named value
    fn value(&self, name: &str) -> Option<&(dyn Any + Send + Sync)>;
}

impl dyn DataProvider + '_ {
    /// Typed lookup; `None` if absent or stored with another type
    pub fn try_get<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.value(name)?.downcast_ref::<T>().cloned()
    }

    /// Typed lookup with a fallback
    pub fn get_or<T: Clone + 'static>(&self, name: &str, default: T) -> T {
        self.try_get(name).unwrap_or(default)
    }
}

/// Simple map-backed [`DataProvider`]
#[derive(Default)]
pub struct InitialValues {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl InitialValues {
    /// Create an empty set of values
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Box::new(value));
    }

    /// Builder form of [`InitialValues::insert`]
    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, value);
        self
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether no values are stored
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DataProvider for InitialValues {
    fn value(&self, name: &str) -> Option<&(dyn Any + Send + Sync)> {
        self.values.get(name).map(|v| v.as_ref())
    }
}
