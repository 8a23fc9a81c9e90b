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

//! Runtime settings of a simulation.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings read when a [`SimulationContext`](crate::SimulationContext) is
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of resource loader threads. Zero runs loads inline on the
    /// requesting thread.
    pub worker_threads: usize,
    /// How many resource records the maintenance sweep may examine per
    /// tick.
    pub gc_budget_per_tick: usize,
    /// Keep editor name maps for entities and resources.
    pub name_maps: bool,
    /// Filter used by [`logging::init`](crate::logging::init) when
    /// `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            gc_budget_per_tick: 16,
            name_maps: true,
            log_filter: "info".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Parses a RON document. Missing fields keep their defaults.
    pub fn from_ron_str(source: &str) -> anyhow::Result<Self> {
        ron::de::from_str(source).context("invalid simulation config")
    }

    /// Reads and parses a RON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_ron_str(&source).with_context(|| format!("in {}", path.display()))
    }

    /// Renders the settings as pretty RON.
    pub fn to_ron_string(&self) -> anyhow::Result<String> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).context("failed to serialize simulation config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = SimulationConfig::from_ron_str("(worker_threads: 0)").unwrap();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.gc_budget_per_tick, 16);
        assert!(config.name_maps);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = SimulationConfig {
            worker_threads: 8,
            gc_budget_per_tick: 4,
            name_maps: false,
            log_filter: "debug".to_string(),
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(SimulationConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        let err = SimulationConfig::from_ron_str("(worker_threads: \"many\")").unwrap_err();
        assert!(err.to_string().contains("invalid simulation config"));
    }
}
