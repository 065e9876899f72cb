use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A discrete time step. Slot `t` covers the interval `[t, t + 1)`.
pub type Timeslot = u32;

/// Half-open range of timeslots `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SlotRange {
    pub start: Timeslot,
    pub end: Timeslot,
}

impl SlotRange {
    pub fn new(start: Timeslot, end: Timeslot) -> Self {
        debug_assert!(start <= end, "invalid slot range [{start}, {end})");
        SlotRange { start, end }
    }

    /// `length` slots starting at `start`.
    pub fn with_length(start: Timeslot, length: Timeslot) -> Self {
        SlotRange {
            start,
            end: start + length,
        }
    }

    pub fn len(&self) -> Timeslot {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, slot: Timeslot) -> bool {
        self.start <= slot && slot < self.end
    }

    pub fn overlaps(&self, other: &SlotRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }

    pub fn iter(&self) -> std::ops::Range<Timeslot> {
        self.start..self.end
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
