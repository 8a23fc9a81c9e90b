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

//! Per-group index allocation with lowest-first recycling.
//!
//! Each [`IdGroup`] owns an independent [`GroupIndexes`] behind its own
//! mutex, so importing into one group never serializes against the
//! simulation allocating in another. Free indices are tracked as coalesced
//! ranges, which keeps forced reservations far above the current high-water
//! mark cheap.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tessera_core::{CoreError, CoreResult, Id, IdGroup};

/// A serializable snapshot of one group's index bookkeeping.
///
/// Indices in `1..next_fresh` are live unless they fall in one of the
/// half-open `free_ranges`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexState {
    /// The lowest index that has never been issued.
    pub next_fresh: u32,
    /// Released indices below `next_fresh`, as `[start, end)` pairs.
    pub free_ranges: Vec<[u32; 2]>,
}

/// Coalesced set of free indices, keyed by range start.
#[derive(Debug, Default)]
struct FreeRanges {
    ranges: BTreeMap<u32, u32>,
}

impl FreeRanges {
    fn contains(&self, index: u32) -> bool {
        self.ranges
            .range(..=index)
            .next_back()
            .is_some_and(|(_, &end)| index < end)
    }

    fn pop_lowest(&mut self) -> Option<u32> {
        let (start, end) = self.ranges.pop_first()?;
        if start + 1 < end {
            self.ranges.insert(start + 1, end);
        }
        Some(start)
    }

    /// Adds `[start, end)`, merging with adjacent ranges. The caller
    /// guarantees none of it is already free.
    fn insert(&mut self, mut start: u32, mut end: u32) {
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..start).next_back() {
            if prev_end == start {
                self.ranges.remove(&prev_start);
                start = prev_start;
            }
        }
        if let Some(next_end) = self.ranges.remove(&end) {
            end = next_end;
        }
        self.ranges.insert(start, end);
    }

    /// Removes a single free index. Returns `false` if it was not free.
    fn remove(&mut self, index: u32) -> bool {
        let Some((&start, &end)) = self.ranges.range(..=index).next_back() else {
            return false;
        };
        if index >= end {
            return false;
        }
        self.ranges.remove(&start);
        if start < index {
            self.ranges.insert(start, index);
        }
        if index + 1 < end {
            self.ranges.insert(index + 1, end);
        }
        true
    }

    /// Detaches a range ending exactly at `end`, returning its start.
    fn take_ending_at(&mut self, end: u32) -> Option<u32> {
        let (&start, &range_end) = self.ranges.range(..end).next_back()?;
        (range_end == end).then(|| {
            self.ranges.remove(&start);
            start
        })
    }

    fn total(&self) -> u32 {
        self.ranges.iter().map(|(start, end)| end - start).sum()
    }
}

#[derive(Debug)]
struct GroupState {
    next_fresh: u32,
    free: FreeRanges,
}

impl GroupState {
    fn new() -> Self {
        Self {
            next_fresh: Id::MIN_INDEX,
            free: FreeRanges::default(),
        }
    }

    fn is_live(&self, index: u32) -> bool {
        index >= Id::MIN_INDEX && index < self.next_fresh && !self.free.contains(index)
    }

    fn release(&mut self, index: u32) {
        if index + 1 == self.next_fresh {
            // Shrink the high-water mark instead of growing the free list.
            self.next_fresh = self.free.take_ending_at(index).unwrap_or(index);
        } else {
            self.free.insert(index, index + 1);
        }
    }
}

/// Index bookkeeping for a single identifier group.
#[derive(Debug)]
pub struct GroupIndexes {
    group: IdGroup,
    state: Mutex<GroupState>,
}

impl GroupIndexes {
    /// Creates an empty index space for `group`.
    #[must_use]
    pub fn new(group: IdGroup) -> Self {
        Self {
            group,
            state: Mutex::new(GroupState::new()),
        }
    }

    /// The group this index space issues identifiers for.
    #[must_use]
    pub fn group(&self) -> IdGroup {
        self.group
    }

    fn lock(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues the lowest free index.
    pub fn allocate(&self) -> CoreResult<Id> {
        let mut state = self.lock();
        if let Some(index) = state.free.pop_lowest() {
            return Ok(Id::new(self.group, index));
        }
        if state.next_fresh > Id::MAX_INDEX {
            log::error!("GroupIndexes: group {} exhausted its index space", self.group);
            return Err(CoreError::OutOfMemory);
        }
        let index = state.next_fresh;
        state.next_fresh += 1;
        Ok(Id::new(self.group, index))
    }

    /// Returns `id`'s index to the free pool.
    pub fn release(&self, id: Id) -> CoreResult<()> {
        let mut state = self.lock();
        self.validate_live(&state, id)?;
        state.release(id.index());
        Ok(())
    }

    fn validate_live(&self, state: &GroupState, id: Id) -> CoreResult<()> {
        if id.group() != self.group || !state.is_live(id.index()) {
            return Err(CoreError::InvalidHandle(id));
        }
        Ok(())
    }

    /// Forces `index` to become live, as needed when preserving authored
    /// identifiers during an import.
    pub fn reserve(&self, index: u32) -> CoreResult<Id> {
        let id = Id::new(self.group, index);
        if !(Id::MIN_INDEX..=Id::MAX_INDEX).contains(&index) {
            return Err(CoreError::InvalidHandle(id));
        }

        let mut state = self.lock();
        if index >= state.next_fresh {
            let gap_start = state.next_fresh;
            if gap_start < index {
                state.free.insert(gap_start, index);
            }
            state.next_fresh = index + 1;
            Ok(id)
        } else if state.free.remove(index) {
            Ok(id)
        } else {
            Err(CoreError::Conflict(format!(
                "index {index} is already live in group {}",
                self.group
            )))
        }
    }

    /// Returns `true` if `id` was issued by this group and not released.
    #[must_use]
    pub fn is_live(&self, id: Id) -> bool {
        id.group() == self.group && self.lock().is_live(id.index())
    }

    /// Every live identifier, in ascending index order.
    #[must_use]
    pub fn live_ids(&self) -> Vec<Id> {
        let state = self.lock();
        let mut ids = Vec::new();
        let mut cursor = Id::MIN_INDEX;
        for (&start, &end) in &state.free.ranges {
            ids.extend((cursor..start).map(|index| Id::new(self.group, index)));
            cursor = end;
        }
        ids.extend((cursor..state.next_fresh).map(|index| Id::new(self.group, index)));
        ids
    }

    /// The number of live identifiers.
    #[must_use]
    pub fn live_count(&self) -> usize {
        let state = self.lock();
        (state.next_fresh - Id::MIN_INDEX - state.free.total()) as usize
    }

    /// Snapshots the bookkeeping for persistence.
    #[must_use]
    pub fn export_state(&self) -> IndexState {
        let state = self.lock();
        IndexState {
            next_fresh: state.next_fresh,
            free_ranges: state
                .free
                .ranges
                .iter()
                .map(|(&start, &end)| [start, end])
                .collect(),
        }
    }

    /// Replaces the bookkeeping with a previously exported snapshot.
    ///
    /// The snapshot is validated in full before anything changes.
    pub fn import_state(&self, snapshot: &IndexState) -> CoreResult<()> {
        if snapshot.next_fresh < Id::MIN_INDEX || snapshot.next_fresh > Id::MAX_INDEX + 1 {
            return Err(CoreError::Conflict(format!(
                "next fresh index {} is out of range",
                snapshot.next_fresh
            )));
        }

        let mut sorted = snapshot.free_ranges.clone();
        sorted.sort_unstable();
        let mut free = FreeRanges::default();
        let mut previous_end = Id::MIN_INDEX;
        for [start, end] in sorted {
            if start < previous_end || start >= end || end > snapshot.next_fresh {
                return Err(CoreError::Conflict(format!(
                    "free range [{start}, {end}) overlaps or exceeds the index range"
                )));
            }
            free.insert(start, end);
            previous_end = end;
        }

        *self.lock() = GroupState {
            next_fresh: snapshot.next_fresh,
            free,
        };
        log::debug!("GroupIndexes: imported state for group {}", self.group);
        Ok(())
    }
}

/// Issues identifiers for every group, partitioned one lock per group.
#[derive(Debug)]
pub struct IdAllocator {
    groups: [GroupIndexes; IdGroup::COUNT],
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Creates an allocator with every group empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: std::array::from_fn(|value| {
                GroupIndexes::new(IdGroup::from_value(value as u8).unwrap_or(IdGroup::TEMPORARY))
            }),
        }
    }

    /// The bookkeeping of a single group.
    #[must_use]
    pub fn group(&self, group: IdGroup) -> &GroupIndexes {
        &self.groups[group.value() as usize]
    }

    /// Issues an identifier in `group`, reusing the lowest released index.
    pub fn allocate(&self, group: IdGroup) -> CoreResult<Id> {
        self.group(group).allocate()
    }

    /// Releases `id`. Fails with [`CoreError::InvalidHandle`] if it is not
    /// currently live, which includes a second release.
    pub fn release(&self, id: Id) -> CoreResult<()> {
        self.group(id.group()).release(id)
    }

    /// Releases every identifier in `ids`, or none of them.
    pub fn release_many(&self, ids: &[Id]) -> CoreResult<()> {
        let mut groups: Vec<IdGroup> = ids.iter().map(|id| id.group()).collect();
        groups.sort_unstable();
        groups.dedup();

        // Locks are always taken in ascending group order.
        let mut guards: Vec<(IdGroup, MutexGuard<'_, GroupState>)> = groups
            .into_iter()
            .map(|group| (group, self.group(group).lock()))
            .collect();

        let mut seen = HashSet::with_capacity(ids.len());
        for &id in ids {
            let live = guards
                .iter()
                .find(|(group, _)| *group == id.group())
                .is_some_and(|(_, state)| state.is_live(id.index()));
            if !live || !seen.insert(id) {
                return Err(CoreError::InvalidHandle(id));
            }
        }

        for &id in ids {
            if let Some((_, state)) = guards.iter_mut().find(|(group, _)| *group == id.group()) {
                state.release(id.index());
            }
        }
        Ok(())
    }

    /// Forces `index` live in `group`. See [`GroupIndexes::reserve`].
    pub fn reserve(&self, group: IdGroup, index: u32) -> CoreResult<Id> {
        self.group(group).reserve(index)
    }

    /// Returns `true` if `id` is currently live.
    #[must_use]
    pub fn is_live(&self, id: Id) -> bool {
        self.group(id.group()).is_live(id)
    }

    /// Every live identifier of `group`, ascending.
    #[must_use]
    pub fn live_ids(&self, group: IdGroup) -> Vec<Id> {
        self.group(group).live_ids()
    }

    /// Number of live identifiers in `group`.
    #[must_use]
    pub fn live_count(&self, group: IdGroup) -> usize {
        self.group(group).live_count()
    }

    /// See [`GroupIndexes::export_state`].
    #[must_use]
    pub fn export_state(&self, group: IdGroup) -> IndexState {
        self.group(group).export_state()
    }

    /// See [`GroupIndexes::import_state`].
    pub fn import_state(&self, group: IdGroup, snapshot: &IndexState) -> CoreResult<()> {
        self.group(group).import_state(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn group0() -> IdGroup {
        IdGroup::dynamic(0).unwrap()
    }

    #[test]
    fn test_lowest_released_index_is_reused() {
        // --- 1. ARRANGE ---
        let allocator = IdAllocator::new();
        let ids: Vec<Id> = (0..3).map(|_| allocator.allocate(group0()).unwrap()).collect();
        assert_eq!(
            ids.iter().map(|id| id.index()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        // --- 2. ACT ---
        allocator.release(ids[1]).unwrap();
        let reused = allocator.allocate(group0()).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(reused.index(), 2, "The lowest free index should be reused");
        assert_eq!(reused.group(), group0());
    }

    #[test]
    fn test_never_issues_invalid() {
        let allocator = IdAllocator::new();
        let first = allocator.allocate(group0()).unwrap();
        assert_ne!(first, Id::INVALID);
        assert!(first.is_valid());
    }

    #[test]
    fn test_double_release_is_detected() {
        let allocator = IdAllocator::new();
        let a = allocator.allocate(group0()).unwrap();
        let _b = allocator.allocate(group0()).unwrap();

        allocator.release(a).unwrap();
        assert_eq!(allocator.release(a), Err(CoreError::InvalidHandle(a)));
    }

    #[test]
    fn test_release_of_never_issued_ids_fails() {
        let allocator = IdAllocator::new();
        let never = Id::new(group0(), 40);

        assert_eq!(allocator.release(never), Err(CoreError::InvalidHandle(never)));
        assert_eq!(
            allocator.release(Id::INVALID),
            Err(CoreError::InvalidHandle(Id::INVALID))
        );
    }

    #[test]
    fn test_release_of_highest_shrinks_and_stays_detected() {
        let allocator = IdAllocator::new();
        let ids: Vec<Id> = (0..4).map(|_| allocator.allocate(group0()).unwrap()).collect();

        allocator.release(ids[2]).unwrap();
        allocator.release(ids[3]).unwrap();

        assert_eq!(allocator.export_state(group0()).next_fresh, 3);
        assert!(allocator.export_state(group0()).free_ranges.is_empty());
        assert_eq!(allocator.release(ids[3]), Err(CoreError::InvalidHandle(ids[3])));
        assert_eq!(allocator.allocate(group0()).unwrap().index(), 3);
    }

    #[test]
    fn test_groups_are_independent() {
        let allocator = IdAllocator::new();
        let dynamic = allocator.allocate(group0()).unwrap();
        let persistent = allocator.allocate(IdGroup::PERSISTENT).unwrap();

        assert_eq!(dynamic.index(), persistent.index());
        assert_ne!(dynamic, persistent);
        assert_eq!(
            allocator.release(Id::new(IdGroup::TEMPORARY, 1)),
            Err(CoreError::InvalidHandle(Id::new(IdGroup::TEMPORARY, 1)))
        );
    }

    #[test]
    fn test_reserve_fills_gap_and_detects_conflict() {
        let allocator = IdAllocator::new();
        let reserved = allocator.reserve(group0(), 5).unwrap();
        assert_eq!(reserved.index(), 5);

        // Indices below the reservation remain available, lowest first.
        assert_eq!(allocator.allocate(group0()).unwrap().index(), 1);
        assert!(matches!(
            allocator.reserve(group0(), 5),
            Err(CoreError::Conflict(_))
        ));
        assert!(allocator.reserve(group0(), 3).is_ok());
        assert!(matches!(
            allocator.reserve(group0(), 0),
            Err(CoreError::InvalidHandle(_))
        ));
        assert_eq!(
            allocator
                .live_ids(group0())
                .iter()
                .map(|id| id.index())
                .collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }

    #[test]
    fn test_reserve_far_index_is_cheap() {
        let allocator = IdAllocator::new();
        allocator.reserve(IdGroup::PERSISTENT, Id::MAX_INDEX).unwrap();

        assert_eq!(allocator.live_count(IdGroup::PERSISTENT), 1);
        assert_eq!(allocator.allocate(IdGroup::PERSISTENT).unwrap().index(), 1);
        assert!(matches!(
            allocator.allocate(IdGroup::PERSISTENT).map(|id| id.index()),
            Ok(2)
        ));
    }

    #[test]
    fn test_release_many_is_all_or_nothing() {
        let allocator = IdAllocator::new();
        let a = allocator.allocate(group0()).unwrap();
        let b = allocator.allocate(IdGroup::PERSISTENT).unwrap();
        let stale = Id::new(group0(), 9);

        assert_eq!(
            allocator.release_many(&[a, b, stale]),
            Err(CoreError::InvalidHandle(stale))
        );
        assert!(allocator.is_live(a) && allocator.is_live(b));

        assert_eq!(
            allocator.release_many(&[a, a]),
            Err(CoreError::InvalidHandle(a))
        );
        assert!(allocator.is_live(a));

        allocator.release_many(&[a, b]).unwrap();
        assert!(!allocator.is_live(a) && !allocator.is_live(b));
    }

    #[test]
    fn test_state_export_import() {
        let source = IdAllocator::new();
        let ids: Vec<Id> = (0..5).map(|_| source.allocate(group0()).unwrap()).collect();
        source.release(ids[1]).unwrap();
        source.release(ids[2]).unwrap();

        let state = source.export_state(group0());
        assert_eq!(state.next_fresh, 6);
        assert_eq!(state.free_ranges, vec![[2, 4]]);

        let json = serde_json::to_string(&state).unwrap();
        let restored: IndexState = serde_json::from_str(&json).unwrap();

        let target = IdAllocator::new();
        target.import_state(group0(), &restored).unwrap();
        assert_eq!(target.live_ids(group0()), source.live_ids(group0()));
        assert_eq!(target.allocate(group0()).unwrap().index(), 2);
    }

    #[test]
    fn test_import_rejects_overlapping_ranges() {
        let allocator = IdAllocator::new();
        let first = allocator.allocate(group0()).unwrap();
        let bad = IndexState {
            next_fresh: 10,
            free_ranges: vec![[2, 5], [4, 6]],
        };

        assert!(matches!(
            allocator.import_state(group0(), &bad),
            Err(CoreError::Conflict(_))
        ));
        assert!(allocator.is_live(first), "Failed import must not touch state");
    }

    #[test]
    fn test_concurrent_allocation_yields_unique_ids() {
        let allocator = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || {
                    let mut mine = Vec::new();
                    for round in 0..200 {
                        let id = allocator.allocate(IdGroup::TEMPORARY).unwrap();
                        if round % 3 == 0 {
                            allocator.release(id).unwrap();
                        } else {
                            mine.push(id);
                        }
                    }
                    mine
                })
            })
            .collect();

        let mut all: Vec<Id> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();

        assert_eq!(all.len(), total, "No two live ids may share an index");
        assert_eq!(allocator.live_count(IdGroup::TEMPORARY), total);
    }
}
