// Copyright 2025 eraflo
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

//! # Tessera Core
//!
//! The foundational crate of the Tessera substrate. It defines the shared
//! vocabulary every other crate builds on: the identifier layout, the error
//! taxonomy, and the contracts resource types and schedulers must honor.
//!
//! It holds no storage of its own; allocators, pools and records live in
//! `tessera-data`.

#![warn(missing_docs)]

pub mod ecs;
pub mod error;
pub mod event;
pub mod graph;
pub mod resource;
pub mod scheduler;

pub use self::ecs::{EntityId, Id, IdGroup, ResourceId};
pub use self::error::{CoreError, CoreResult};
pub use self::resource::{LoadEvent, LoadFailure, LoadState, ResourceKind, ResourceType};
pub use self::scheduler::{InlineScheduler, Task, TaskScheduler};
