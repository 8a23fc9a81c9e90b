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

//! Mapping identifiers from a foreign group into the live namespace.
//!
//! An import declares every identifier its dataset references up front; the
//! [`GroupTranslator`] allocates a live identifier for each and hands back an
//! immutable [`TranslationTable`] for the duration of the import pass.

use super::indexes::IdAllocator;
use std::collections::HashMap;
use tessera_core::{CoreError, CoreResult, Id, IdGroup};

/// How target indices are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationMode {
    /// Allocate the lowest free index in the target group.
    #[default]
    Fresh,
    /// Reserve the same index the foreign identifier had.
    Preserve,
}

/// Builds [`TranslationTable`]s between two groups.
#[derive(Debug, Clone, Copy)]
pub struct GroupTranslator {
    source: IdGroup,
    target: IdGroup,
    mode: TranslationMode,
}

impl GroupTranslator {
    /// Translates from `source` into freshly allocated ids of `target`.
    #[must_use]
    pub fn new(source: IdGroup, target: IdGroup) -> Self {
        Self {
            source,
            target,
            mode: TranslationMode::Fresh,
        }
    }

    /// Selects how target indices are chosen.
    #[must_use]
    pub fn with_mode(mut self, mode: TranslationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Allocates a live identifier for every referenced foreign identifier.
    ///
    /// Repeated foreign ids map once and [`Id::INVALID`] entries are skipped.
    /// If any id is outside the source group, or an allocation or reservation
    /// fails, every id allocated so far is released before the error is
    /// returned.
    pub fn build(
        &self,
        allocator: &IdAllocator,
        referenced: impl IntoIterator<Item = Id>,
    ) -> CoreResult<TranslationTable> {
        let mut table = TranslationTable {
            source: self.source,
            target: self.target,
            map: HashMap::new(),
        };

        for foreign in referenced {
            if foreign == Id::INVALID || table.map.contains_key(&foreign) {
                continue;
            }
            if let Err(e) = self.map_one(allocator, &mut table, foreign) {
                log::warn!(
                    "GroupTranslator: {} -> {} aborted at {foreign}: {e}",
                    self.source,
                    self.target
                );
                table.rollback(allocator);
                return Err(e);
            }
        }

        log::debug!(
            "GroupTranslator: mapped {} ids from {} into {}",
            table.len(),
            self.source,
            self.target
        );
        Ok(table)
    }

    fn map_one(
        &self,
        allocator: &IdAllocator,
        table: &mut TranslationTable,
        foreign: Id,
    ) -> CoreResult<()> {
        if foreign.group() != self.source || !foreign.is_valid() {
            return Err(CoreError::InvalidHandle(foreign));
        }
        table.map.try_reserve(1)?;
        let live = match self.mode {
            TranslationMode::Fresh => allocator.allocate(self.target)?,
            TranslationMode::Preserve => allocator.reserve(self.target, foreign.index())?,
        };
        table.map.insert(foreign, live);
        Ok(())
    }
}

/// An immutable foreign → live identifier mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationTable {
    source: IdGroup,
    target: IdGroup,
    map: HashMap<Id, Id>,
}

impl TranslationTable {
    /// Translates a foreign identifier.
    ///
    /// [`Id::INVALID`] translates to itself, so optional references survive
    /// the pass. Every other identifier must be in the table.
    pub fn translate(&self, foreign: Id) -> CoreResult<Id> {
        if foreign == Id::INVALID {
            return Ok(Id::INVALID);
        }
        self.map
            .get(&foreign)
            .copied()
            .ok_or(CoreError::UnmappedIdentifier(foreign))
    }

    /// The group foreign identifiers come from.
    #[must_use]
    pub fn source_group(&self) -> IdGroup {
        self.source
    }

    /// The group live identifiers were allocated in.
    #[must_use]
    pub fn target_group(&self) -> IdGroup {
        self.target
    }

    /// Number of mapped identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing was mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates `(foreign, live)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, Id)> + '_ {
        self.map.iter().map(|(&foreign, &live)| (foreign, live))
    }

    /// Releases every live identifier this table allocated.
    ///
    /// Identifiers released elsewhere in the meantime are skipped.
    pub fn rollback(&mut self, allocator: &IdAllocator) {
        for (_, live) in self.map.drain() {
            if let Err(e) = allocator.release(live) {
                log::warn!("TranslationTable: rollback skipped {live}: {e}");
            }
        }
    }
}
