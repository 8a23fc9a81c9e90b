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

//! # Tessera SDK
//!
//! The public face of the Tessera substrate. It assembles the allocators,
//! pools and agents of the lower crates into a [`SimulationContext`], lets
//! domain modules plug into it through the [`FunctionalityRegistry`], and
//! moves datasets in and out with [`Importer`] and [`Exporter`].
//!
//! ```no_run
//! use tessera_sdk::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = SimulationConfig::default();
//!     tessera_sdk::logging::init(&config.log_filter);
//!
//!     let mut registry = FunctionalityRegistry::with_static();
//!     let mut context = SimulationContext::new(config)?;
//!     registry.instantiate(&mut context)?;
//!     registry.initialize(&mut context)?;
//!
//!     context.maintenance();
//!
//!     registry.teardown(&mut context);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod editing;
pub mod functionality;
pub mod import;
pub mod logging;
pub mod simulation;

pub use config::SimulationConfig;
pub use functionality::{
    FunctionalityDescriptor, FunctionalityId, FunctionalityRegistry, SetupHook, TeardownHook,
};
pub use import::{ExportScope, Exporter, ImportReport, ImportScope, Importer};
pub use simulation::{MaintenanceReport, SimulationContext};

pub use inventory;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        ExportScope, Exporter, FunctionalityDescriptor, FunctionalityId, FunctionalityRegistry,
        ImportReport, ImportScope, Importer, MaintenanceReport, SimulationConfig,
        SimulationContext,
    };
    pub use tessera_core::{
        CoreError, CoreResult, EntityId, Id, IdGroup, LoadEvent, LoadFailure, LoadState,
        ResourceId, ResourceKind, ResourceType,
    };
    pub use tessera_data::ecs::{Component, ComponentPool, TranslationMode};
    pub use tessera_data::resources::{
        LoadContext, LoadRequest, ResourceHandle, ResourceLoader, ResourceUse, UnloadRequest,
    };
}
