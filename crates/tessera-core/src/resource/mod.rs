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

//! Contracts for resource types and their load lifecycle.
//!
//! A resource type is a closed, statically known case implementing
//! [`ResourceKind`]: it names its create-info and loaded-data payloads and
//! carries a [`ResourceType`] tag. Storage and loaders dispatch on that tag
//! and only ever reach the payloads through checked downcasts.

mod kind;
mod state;

pub use self::kind::{ResourceKind, ResourceType};
pub use self::state::{LoadEvent, LoadFailure, LoadState};
