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

//! Entity-side storage: identifier bookkeeping and component pools.

mod component;
mod component_pool;
mod group_data;
mod indexes;
mod name_map;
mod pool_registry;
mod translation;


pub use self::component::Component;
pub use self::component_pool::{
    AnyComponentPool, CommitReport, CommitSummary, ComponentPool, ComponentSnapshot, SnapshotIter,
};
pub use self::group_data::GroupData;
pub use self::indexes::{GroupIndexes, IdAllocator, IndexState};
pub use self::name_map::EditorNameMap;
pub use self::pool_registry::ComponentPoolRegistry;
pub use self::translation::{GroupTranslator, TranslationMode, TranslationTable};
pub use tessera_core::{EntityId, Id, IdGroup};
