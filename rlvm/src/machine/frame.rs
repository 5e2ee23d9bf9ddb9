//! Call-stack frames.
//!
//! Grounded on spec.md §3's `CallFrame` and on
//! `original_source/src/machine/instruction.hpp`'s `Jump`/`Farcall`/
//! `Goto`/`Gosub` variants, which distinguish "new frame" from "same
//! frame" transfers. Here that distinction becomes [`FrameKind`] on one
//! [`CallFrame`] struct rather than four instruction variants, since the
//! machine already classifies the transfer before it ever builds a frame.

use rlvm_types::Cursor;

use crate::memory::MemoryBank;

/// Why a frame was pushed, and what it carries back on return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// The outermost frame; never popped.
    Root,
    /// Pushed by `farcall`: a call into a different scenario's entrypoint.
    Farcall,
    /// Pushed by `gosub`: a call to a location within the same scenario.
    Gosub,
    /// Pushed by `gosub_with`: a `Gosub` that also captured evaluated
    /// argument values for the callee to read back.
    GosubWith {
        /// The evaluated arguments, in source order.
        args: Vec<i32>,
    },
}

/// One entry of the machine's call stack.
///
/// `local_snapshot` holds the caller's bank-`L` contents as they stood
/// immediately before this frame was pushed; [`crate::machine::Machine`]
/// restores it into live memory when the frame is popped, so a callee is
/// free to scribble over `intL` without the caller ever observing it.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Which scenario this frame is executing.
    pub scenario_number: u32,
    /// The frame's current position in that scenario's element sequence.
    pub cursor: Cursor,
    /// How this frame was created.
    pub kind: FrameKind,
    pub(crate) local_snapshot: MemoryBank<i32>,
}

impl CallFrame {
    /// The root frame: no caller to restore, so its snapshot is never
    /// consulted (the root is never popped).
    pub fn root(scenario_number: u32, cursor: Cursor, local_snapshot: MemoryBank<i32>) -> Self {
        CallFrame {
            scenario_number,
            cursor,
            kind: FrameKind::Root,
            local_snapshot,
        }
    }

    /// The arguments captured by a `gosub_with`, if this frame is one.
    pub fn gosub_args(&self) -> Option<&[i32]> {
        match &self.kind {
            FrameKind::GosubWith { args } => Some(args),
            _ => None,
        }
    }
}
