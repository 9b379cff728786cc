use serde::{Deserialize, Serialize};
use std::fmt;

/// Position identifier, unique within one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Group identifier: all siblings spawned by one signal share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Sequential id generator. Counters restart at 1 for every run so that
/// identical inputs produce identical ids.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next_position: u64,
    next_group: u64,
}

impl IdGen {
    pub fn next_position_id(&mut self) -> PositionId {
        self.next_position += 1;
        PositionId(self.next_position)
    }

    pub fn next_group_id(&mut self) -> GroupId {
        self.next_group += 1;
        GroupId(self.next_group)
    }
}
