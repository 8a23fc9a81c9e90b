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

//! The seam between resource records and whatever executes their loads.

/// A unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes load tasks on behalf of resource records.
///
/// Implementations must eventually run every scheduled task exactly once.
/// They may run it on another thread or, like [`InlineScheduler`], before
/// `schedule` returns.
pub trait TaskScheduler: Send + Sync {
    /// Queues `task` for execution.
    fn schedule(&self, task: Task);
}

/// Runs every task synchronously on the calling thread.
///
/// Used by tools and tests that need loads to settle deterministically.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl TaskScheduler for InlineScheduler {
    fn schedule(&self, task: Task) {
        task();
    }
}
