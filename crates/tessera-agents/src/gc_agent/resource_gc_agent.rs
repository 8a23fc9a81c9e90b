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

//! Budgeted reclamation of resource records.
//!
//! Dropping the last handle normally destroys a record on the spot. Records
//! whose last handle went away while a load was in flight, or whose
//! destruction raced with another thread, can linger with a zero reference
//! count; this agent sweeps them a few at a time so a tick never pays for a
//! large backlog at once.

use std::collections::VecDeque;
use tessera_core::Id;
use tessera_data::resources::ResourcePool;

const DEFAULT_BUDGET_PER_TICK: usize = 16;

/// Sweeps unreferenced records from a [`ResourcePool`] within a per-tick
/// budget.
#[derive(Debug)]
pub struct ResourceGcAgent {
    candidates: VecDeque<Id>,
    budget_per_tick: usize,
    last_collected: usize,
    total_collected: u64,
    tick_count: u64,
}

impl ResourceGcAgent {
    /// Creates an agent with the default budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            candidates: VecDeque::new(),
            budget_per_tick: DEFAULT_BUDGET_PER_TICK,
            last_collected: 0,
            total_collected: 0,
            tick_count: 0,
        }
    }

    /// Sets how many records may be examined per tick. Clamped to at
    /// least one.
    #[must_use]
    pub fn with_budget(mut self, budget_per_tick: usize) -> Self {
        self.budget_per_tick = budget_per_tick.max(1);
        self
    }

    /// Queues `id` to be checked first on the next tick.
    pub fn queue_candidate(&mut self, id: Id) {
        self.candidates.push_back(id);
    }

    /// Runs one maintenance tick over `pool`. Returns how many records were
    /// destroyed.
    ///
    /// Queued candidates are checked first; whatever budget remains goes
    /// to a sweep over the pool's records.
    pub fn run(&mut self, pool: &ResourcePool) -> usize {
        self.tick_count += 1;
        let budget = self.budget_per_tick;

        let checked = budget.min(self.candidates.len());
        let mut collected = self
            .candidates
            .drain(..checked)
            .filter(|id| pool.destroy_if_unreferenced(*id))
            .count();

        let remaining = budget - checked;
        if remaining > 0 {
            collected += pool.collect_garbage(remaining);
        }

        self.last_collected = collected;
        self.total_collected += collected as u64;
        if collected > 0 {
            log::trace!(
                "ResourceGcAgent: Collected {collected} records on tick {} ({} queued)",
                self.tick_count,
                self.candidates.len()
            );
        }
        collected
    }

    /// Candidates still waiting to be checked.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.candidates.len()
    }

    /// Records destroyed by the last tick.
    #[must_use]
    pub fn last_collected(&self) -> usize {
        self.last_collected
    }

    /// Records destroyed since the agent was created.
    #[must_use]
    pub fn total_collected(&self) -> u64 {
        self.total_collected
    }

    /// The per-tick budget.
    #[must_use]
    pub fn budget_per_tick(&self) -> usize {
        self.budget_per_tick
    }
}

impl Default for ResourceGcAgent {
    fn default() -> Self {
        Self::new()
    }
}
