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

//! Reference counted resource records and the pool that owns them.
//!
//! Every resource type shares the same lifecycle: a [`ResourcePool`] slot
//! is created on first reference, optionally given create-info, loaded on
//! the pool's scheduler by the [`ResourceLoader`] registered for its type,
//! and destroyed once the last [`ResourceHandle`] is dropped and no load is
//! in flight.

mod handle;
mod history;
mod loader;
mod pool;
mod record;

pub use self::handle::{ResourceHandle, ResourceUse};
pub use self::history::CreateInfoHistory;
pub use self::loader::{LoadContext, ResourceLoader};
pub use self::pool::{RecordInfo, RecordIter, ResourcePool};
pub use self::record::{LoadRequest, ResourceRecord, UnloadRequest};
pub use tessera_core::{LoadEvent, LoadFailure, LoadState, ResourceId, ResourceKind, ResourceType};
