//! Scenario-relative addressing.
//!
//! Two distinct notions of "where" show up in the core: a raw byte
//! [`Offset`] into a scenario's decompressed script (the key the bytecode
//! parser uses for its element map, and the unit `goto` targets are
//! expressed in), and a [`Cursor`] — an index into the parsed element
//! sequence that the [Scriptor](../../rlvm/src/scriptor.rs) and machine use
//! to walk forward without re-searching the map on every step.

use std::fmt;

/// A byte offset into a scenario's decompressed script body.
pub type Offset = u32;

/// A resolved position inside one scenario's parsed element sequence.
///
/// Cheap to copy, cheap to advance (`index += 1`), and stable across a
/// scenario's lifetime once parsed — elements are never reordered or
/// removed after parse. Resolving a `Cursor` back to an [`Offset`] or an
/// [`crate::Instruction`] always goes through the Scriptor, which may
/// re-fetch an evicted scenario; a `Cursor` never borrows scenario data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    /// Which scenario this cursor addresses.
    pub scenario_number: u32,
    /// Index into that scenario's ordered element sequence.
    pub index: usize,
}

impl Cursor {
    /// A cursor at the start of `scenario_number`'s element sequence.
    pub fn start(scenario_number: u32) -> Self {
        Cursor {
            scenario_number,
            index: 0,
        }
    }

    /// The cursor immediately following this one. Whether it is valid
    /// depends on the scenario's element count; callers check with
    /// `Scriptor::has_next` before resolving.
    pub fn next(self) -> Self {
        Cursor {
            index: self.index + 1,
            ..self
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scenario_number, self.index)
    }
}

/// An entrypoint index resolved against a scenario's entrypoint table.
///
/// Values `>= 1_000_000` in the raw kidoku table denote entrypoints, with
/// the entrypoint index itself being `raw - 1_000_000`; this type carries
/// the already-subtracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPoint(pub i32);

/// The raw table value threshold documented in spec.md §4.6: kidoku table
/// entries at or above this value are entrypoints, not read-markers.
pub const ENTRYPOINT_THRESHOLD: i32 = 1_000_000;

impl EntryPoint {
    /// Decode a raw kidoku-table value, returning `None` if it is an
    /// ordinary kidoku marker rather than an entrypoint.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw >= ENTRYPOINT_THRESHOLD {
            Some(EntryPoint(raw - ENTRYPOINT_THRESHOLD))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_next_advances_index_only() {
        let c = Cursor::start(7);
        let n = c.next();
        assert_eq!(n.scenario_number, 7);
        assert_eq!(n.index, 1);
    }

    #[test]
    fn entrypoint_threshold_boundary() {
        assert_eq!(EntryPoint::from_raw(999_999), None);
        assert_eq!(EntryPoint::from_raw(1_000_000), Some(EntryPoint(0)));
        assert_eq!(EntryPoint::from_raw(1_000_005), Some(EntryPoint(5)));
    }
}
