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

//! The packed 32-bit identifier used for entities and resources.
//!
//! An [`Id`] stores its namespace ([`IdGroup`]) in the top four bits and an
//! index, unique within that group, in the remaining 28 bits. The raw value
//! `0` is reserved as [`Id::INVALID`], so index `0` is never issued in any
//! group.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The namespace an identifier was issued in.
///
/// Groups `0..=13` are dynamic, typically one per imported dataset. Group 14
/// holds persistent data authored with the simulation itself, and group 15
/// holds temporary, runtime-only data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct IdGroup(u8);

impl IdGroup {
    /// Total number of groups addressable by the identifier layout.
    pub const COUNT: usize = 16;
    /// Number of groups available for imported datasets.
    pub const DYNAMIC_COUNT: u8 = 14;
    /// The group of data authored together with the simulation.
    pub const PERSISTENT: IdGroup = IdGroup(14);
    /// The group of runtime-only data that is never exported.
    pub const TEMPORARY: IdGroup = IdGroup(15);

    /// Returns the dynamic group with the given ordinal, if it exists.
    #[must_use]
    pub const fn dynamic(ordinal: u8) -> Option<IdGroup> {
        if ordinal < Self::DYNAMIC_COUNT {
            Some(IdGroup(ordinal))
        } else {
            None
        }
    }

    /// Builds a group from its raw 4-bit value.
    #[must_use]
    pub const fn from_value(value: u8) -> Option<IdGroup> {
        if (value as usize) < Self::COUNT {
            Some(IdGroup(value))
        } else {
            None
        }
    }

    /// The raw 4-bit value of this group.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns `true` for groups reserved for imported datasets.
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        self.0 < Self::DYNAMIC_COUNT
    }

    /// Iterates over every addressable group, in ascending order.
    pub fn all() -> impl Iterator<Item = IdGroup> {
        (0..Self::COUNT as u8).map(IdGroup)
    }
}

impl TryFrom<u8> for IdGroup {
    type Error = crate::CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        IdGroup::from_value(value).ok_or(crate::CoreError::InvalidGroup(value))
    }
}

impl From<IdGroup> for u8 {
    fn from(group: IdGroup) -> Self {
        group.0
    }
}

impl fmt::Debug for IdGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for IdGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IdGroup::PERSISTENT => f.write_str("Persistent"),
            IdGroup::TEMPORARY => f.write_str("Temporary"),
            IdGroup(ordinal) => write!(f, "Dynamic({ordinal})"),
        }
    }
}

/// A packed group + index identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(u32);

/// An identifier issued by an entity allocator.
pub type EntityId = Id;
/// An identifier issued by a resource allocator.
pub type ResourceId = Id;

impl Id {
    /// Number of bits holding the group.
    pub const GROUP_BITS: u32 = 4;
    /// Number of bits holding the index.
    pub const INDEX_BITS: u32 = 32 - Self::GROUP_BITS;
    /// Mask selecting the index bits.
    pub const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;
    /// The smallest index an allocator hands out.
    pub const MIN_INDEX: u32 = 1;
    /// The largest index an allocator hands out.
    pub const MAX_INDEX: u32 = Self::INDEX_MASK;
    /// The sentinel that never denotes a live entity or resource.
    pub const INVALID: Id = Id(0);

    /// Packs a group and an index. Index bits above the 28-bit range are
    /// discarded.
    #[must_use]
    pub const fn new(group: IdGroup, index: u32) -> Self {
        Id(((group.0 as u32) << Self::INDEX_BITS) | (index & Self::INDEX_MASK))
    }

    /// Reinterprets a raw packed value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Id(raw)
    }

    /// The raw packed value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The group this identifier belongs to.
    #[must_use]
    pub const fn group(self) -> IdGroup {
        IdGroup((self.0 >> Self::INDEX_BITS) as u8)
    }

    /// The index of this identifier within its group.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }

    /// Returns `true` unless the index is `0`, which no allocator issues.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index() >= Self::MIN_INDEX
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_unpack() {
        let group = IdGroup::dynamic(3).unwrap();
        let id = Id::new(group, 42);

        assert_eq!(id.group(), group);
        assert_eq!(id.index(), 42);
        assert_eq!(id.raw(), 0x3000_002A);
    }

    #[test]
    fn test_invalid_sentinel() {
        assert!(!Id::INVALID.is_valid());
        assert_eq!(Id::INVALID, Id::default());
        assert_eq!(Id::INVALID.group(), IdGroup::dynamic(0).unwrap());
        // Index 0 is unusable in every group, not just group 0.
        assert!(!Id::new(IdGroup::PERSISTENT, 0).is_valid());
    }

    #[test]
    fn test_index_is_masked() {
        let id = Id::new(IdGroup::TEMPORARY, Id::MAX_INDEX + 5);
        assert_eq!(id.group(), IdGroup::TEMPORARY);
        assert_eq!(id.index(), 4);
    }

    #[test]
    fn test_display_is_padded_hex() {
        assert_eq!(Id::new(IdGroup::PERSISTENT, 0x1F).to_string(), "0xE000001F");
        assert_eq!(format!("{:?}", Id::from_raw(1)), "Id(0x00000001)");
    }

    #[test]
    fn test_group_bounds() {
        assert!(IdGroup::dynamic(13).is_some());
        assert!(IdGroup::dynamic(14).is_none());
        assert_eq!(IdGroup::from_value(14), Some(IdGroup::PERSISTENT));
        assert!(IdGroup::from_value(16).is_none());
        assert!(!IdGroup::TEMPORARY.is_dynamic());
        assert_eq!(IdGroup::all().count(), IdGroup::COUNT);
        assert_eq!(IdGroup::TEMPORARY.to_string(), "Temporary");
        assert_eq!(IdGroup::dynamic(2).unwrap().to_string(), "Dynamic(2)");
    }
}
