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

//! Agents that run the resource lifecycle outside the simulation thread.
//!
//! - [`load_agent`] owns the worker threads that execute resource loads.
//! - [`gc_agent`] sweeps resource records whose destruction was deferred.

#![warn(missing_docs)]

pub mod gc_agent;
pub mod load_agent;

pub use gc_agent::ResourceGcAgent;
pub use load_agent::LoadWorkerPool;
