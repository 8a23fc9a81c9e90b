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

//! Per-component-type storage with deferred structural mutation.
//!
//! A [`ComponentPool`] keeps a committed view, published as an immutable
//! `Arc` snapshot, and a staging area of pending inserts and removals.
//! Readers clone the current snapshot and iterate it without holding any
//! lock, so staging from other systems mid-tick never disturbs them.
//! [`ComponentPool::commit`] is the only point where staged mutations
//! become visible.

use super::component::Component;
use std::any::{type_name, Any};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use tessera_core::{CoreError, CoreResult, Id};

type Entries<T> = Vec<(Id, Arc<T>)>;

/// Counts live snapshots per thread, so a commit issued from inside an
/// iteration of the same pool is caught.
#[derive(Debug, Default)]
struct ReaderTracker {
    readers: Mutex<HashMap<ThreadId, usize>>,
}

impl ReaderTracker {
    fn lock(&self) -> MutexGuard<'_, HashMap<ThreadId, usize>> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, thread: ThreadId) {
        *self.lock().entry(thread).or_insert(0) += 1;
    }

    fn leave(&self, thread: ThreadId) {
        let mut readers = self.lock();
        if let Some(count) = readers.get_mut(&thread) {
            *count -= 1;
            if *count == 0 {
                readers.remove(&thread);
            }
        }
    }

    fn holds(&self, thread: ThreadId) -> bool {
        self.lock().contains_key(&thread)
    }
}

#[derive(Debug)]
struct Pending<T> {
    inserts: BTreeMap<Id, T>,
    removes: BTreeSet<Id>,
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self {
            inserts: BTreeMap::new(),
            removes: BTreeSet::new(),
        }
    }
}

/// What a single [`ComponentPool::commit`] changed.
#[derive(Debug)]
pub struct CommitReport<T> {
    /// Entities that gained a value, ascending.
    pub inserted: Vec<Id>,
    /// Entities that lost a value, ascending, with the value they lost.
    pub removed: Vec<(Id, Arc<T>)>,
}

impl<T> CommitReport<T> {
    fn empty() -> Self {
        Self {
            inserted: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Returns `true` if the commit changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }

    /// Drops the values, keeping only the counts.
    #[must_use]
    pub fn summary(&self) -> CommitSummary {
        CommitSummary {
            inserted: self.inserted.len(),
            removed: self.removed.len(),
        }
    }
}

/// Type-erased counts of a [`CommitReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Number of values inserted.
    pub inserted: usize,
    /// Number of values removed.
    pub removed: usize,
}

impl std::ops::AddAssign for CommitSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.removed += rhs.removed;
    }
}

/// Storage for every value of one component type, keyed by entity.
pub struct ComponentPool<T: Component> {
    committed: RwLock<Arc<Entries<T>>>,
    pending: Mutex<Pending<T>>,
    readers: Arc<ReaderTracker>,
}

impl<T: Component> Default for ComponentPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> std::fmt::Debug for ComponentPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentPool")
            .field("component", &type_name::<T>())
            .field("len", &self.len())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl<T: Component> ComponentPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Vec::new())),
            pending: Mutex::new(Pending::default()),
            readers: Arc::new(ReaderTracker::default()),
        }
    }

    fn current(&self) -> Arc<Entries<T>> {
        Arc::clone(&self.committed.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn position(entries: &Entries<T>, id: Id) -> Result<usize, usize> {
        entries.binary_search_by_key(&id, |(entry_id, _)| *entry_id)
    }

    /// Stages `value` for `id`.
    ///
    /// Fails with [`CoreError::Duplicate`] if `id` already has a pending
    /// insert, or a committed value that is not staged for removal. Staging
    /// a removal and then an insert replaces the value at the next commit.
    pub fn insert(&self, id: Id, value: T) -> CoreResult<()> {
        let mut pending = self.lock_pending();
        if pending.inserts.contains_key(&id) {
            return Err(CoreError::Duplicate(id));
        }
        let committed = Self::position(&self.current(), id).is_ok();
        if committed && !pending.removes.contains(&id) {
            return Err(CoreError::Duplicate(id));
        }
        pending.inserts.insert(id, value);
        Ok(())
    }

    /// Stages the removal of `id`'s value, or cancels its pending insert.
    ///
    /// Fails with [`CoreError::NotFound`] if there is nothing left to
    /// remove, including when the committed value is already staged for
    /// removal.
    pub fn remove(&self, id: Id) -> CoreResult<()> {
        let mut pending = self.lock_pending();
        if pending.inserts.remove(&id).is_some() {
            return Ok(());
        }
        let committed = Self::position(&self.current(), id).is_ok();
        if !committed || !pending.removes.insert(id) {
            return Err(CoreError::NotFound(format!(
                "no {} component for entity {id}",
                type_name::<T>()
            )));
        }
        Ok(())
    }

    /// Drops every staged mutation for `id`. Returns `true` if there was
    /// any.
    pub fn discard_pending(&self, id: Id) -> bool {
        let mut pending = self.lock_pending();
        let inserted = pending.inserts.remove(&id).is_some();
        let removed = pending.removes.remove(&id);
        inserted || removed
    }

    /// Reads `id`'s committed value.
    #[must_use]
    pub fn get(&self, id: Id) -> Option<Arc<T>> {
        let entries = self.current();
        Self::position(&entries, id)
            .ok()
            .map(|index| Arc::clone(&entries[index].1))
    }

    /// Returns `true` if `id` has a committed value.
    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        Self::position(&self.current(), id).is_ok()
    }

    /// Number of committed values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().len()
    }

    /// Returns `true` if nothing is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Number of staged inserts and removals.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        let pending = self.lock_pending();
        pending.inserts.len() + pending.removes.len()
    }

    /// Captures the committed view as it is now.
    ///
    /// The snapshot is unaffected by later commits. While it is alive the
    /// current thread must not commit this pool.
    #[must_use]
    pub fn iterate(&self) -> ComponentSnapshot<T> {
        let thread = thread::current().id();
        self.readers.enter(thread);
        ComponentSnapshot {
            entries: self.current(),
            readers: Arc::clone(&self.readers),
            thread,
        }
    }

    /// Applies staged removals, then staged inserts, to the committed view.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread still holds a snapshot of this pool.
    pub fn commit(&self) -> CommitReport<T> {
        assert!(
            !self.readers.holds(thread::current().id()),
            "ComponentPool<{}>: commit called while this thread iterates the pool",
            type_name::<T>()
        );

        // Staging stays locked until the new view is published, so no
        // insert can validate against the view being replaced.
        let mut pending = self.lock_pending();
        if pending.inserts.is_empty() && pending.removes.is_empty() {
            return CommitReport::empty();
        }
        let inserts = mem::take(&mut pending.inserts);
        let removes = mem::take(&mut pending.removes);

        let mut committed = self.committed.write().unwrap_or_else(PoisonError::into_inner);
        let mut report = CommitReport::empty();
        let mut merged: Entries<T> = Vec::with_capacity(committed.len() + inserts.len());
        let mut incoming = inserts.into_iter().peekable();

        for (id, value) in committed.iter() {
            if removes.contains(id) {
                report.removed.push((*id, Arc::clone(value)));
                continue;
            }
            while let Some((new_id, new_value)) = incoming.next_if(|(new_id, _)| new_id < id) {
                report.inserted.push(new_id);
                merged.push((new_id, Arc::new(new_value)));
            }
            merged.push((*id, Arc::clone(value)));
        }
        for (new_id, new_value) in incoming {
            report.inserted.push(new_id);
            merged.push((new_id, Arc::new(new_value)));
        }

        *committed = Arc::new(merged);
        log::trace!(
            "ComponentPool<{}>: committed +{} -{}",
            type_name::<T>(),
            report.inserted.len(),
            report.removed.len()
        );
        report
    }
}

/// An immutable view of a pool's committed values.
///
/// Iterate it as many times as needed; every pass yields the same
/// entries in ascending id order.
pub struct ComponentSnapshot<T: Component> {
    entries: Arc<Entries<T>>,
    readers: Arc<ReaderTracker>,
    thread: ThreadId,
}

impl<T: Component> ComponentSnapshot<T> {
    /// Starts a pass over the snapshot.
    pub fn iter(&self) -> SnapshotIter<'_, T> {
        SnapshotIter {
            inner: self.entries.iter(),
        }
    }

    /// Reads a value as of the snapshot.
    #[must_use]
    pub fn get(&self, id: Id) -> Option<&T> {
        ComponentPool::<T>::position(&self.entries, id)
            .ok()
            .map(|index| self.entries[index].1.as_ref())
    }

    /// Number of values in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Component> Drop for ComponentSnapshot<T> {
    fn drop(&mut self) {
        self.readers.leave(self.thread);
    }
}

impl<'a, T: Component> IntoIterator for &'a ComponentSnapshot<T> {
    type Item = (Id, &'a T);
    type IntoIter = SnapshotIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A single pass over a [`ComponentSnapshot`].
pub struct SnapshotIter<'a, T> {
    inner: std::slice::Iter<'a, (Id, Arc<T>)>,
}

impl<'a, T> Iterator for SnapshotIter<'a, T> {
    type Item = (Id, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(id, value)| (*id, value.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for SnapshotIter<'_, T> {}

/// The operations every pool supports regardless of its component type.
pub trait AnyComponentPool: Send + Sync + 'static {
    /// The name of the stored component type.
    fn component_name(&self) -> &'static str;

    /// Commits staged mutations, reporting only counts.
    fn commit_erased(&self) -> CommitSummary;

    /// Stages removal of `id`'s value if it has one. Returns `true` if
    /// something was staged or cancelled.
    fn remove_entity(&self, id: Id) -> bool;

    /// See [`ComponentPool::discard_pending`].
    fn discard_pending(&self, id: Id) -> bool;

    /// Number of committed values.
    fn committed_len(&self) -> usize;

    /// Access to the concrete pool for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Component> AnyComponentPool for ComponentPool<T> {
    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn commit_erased(&self) -> CommitSummary {
        self.commit().summary()
    }

    fn remove_entity(&self, id: Id) -> bool {
        self.remove(id).is_ok()
    }

    fn discard_pending(&self, id: Id) -> bool {
        ComponentPool::discard_pending(self, id)
    }

    fn committed_len(&self) -> usize {
        self.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
