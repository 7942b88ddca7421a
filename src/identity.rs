//! Identity atoms for the DR consumption path.
//!
//! DrId: per-producer log record identifier
//! UniqueId: producer transaction identifier
//! PartitionId: consumer- or producer-side partition
//! ClusterId: producer cluster

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing identifier a producer partition assigns to each
/// unit of replicated log data.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrId(i64);

impl DrId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }

    pub fn next(self) -> DrId {
        DrId(self.0.checked_add(1).expect("dr id overflow computing next"))
    }

    pub fn prev(self) -> DrId {
        DrId(self.0.checked_sub(1).expect("dr id underflow computing prev"))
    }

    /// True when `start` begins exactly one past `self`, so the two runs
    /// form one contiguous run.
    pub fn abuts(self, start: DrId) -> bool {
        start.0 == self.0.saturating_add(1)
    }
}

impl fmt::Debug for DrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrId({})", self.0)
    }
}

impl fmt::Display for DrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DrId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<DrId> for i64 {
    fn from(id: DrId) -> i64 {
        id.0
    }
}

/// Producer-side transaction identifier carried alongside replicated
/// records; compared only for recency.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(i64);

impl UniqueId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.0)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UniqueId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<UniqueId> for i64 {
    fn from(id: UniqueId) -> i64 {
        id.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(i32);

impl PartitionId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartitionId({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for PartitionId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<PartitionId> for i32 {
    fn from(id: PartitionId) -> i32 {
        id.0
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(i32);

impl ClusterId {
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterId({})", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ClusterId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<ClusterId> for i32 {
    fn from(id: ClusterId) -> i32 {
        id.0
    }
}
