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
//! Entities and the named-property collaborator
//!
//! Entities are lightweight generational handles. Everything an entity knows
//! lives either in its behaviours or in its [`PropertyStore`], a set of named,
//! typed cells that behaviours reserve at construction time.

mod allocator;
mod handle;
mod property;

pub use allocator::EntityAllocator;
pub use handle::Entity;
pub use property::{DataProvider, InitialValues, Property, PropertyStore};
