//! Atomic types shared by the RLVM workspace: the error catalogue,
//! scenario addressing, opcode/bank tags, and the Gameexe leaf value.
//!
//! Mirrors how `fuel-types` sits underneath `fuel-vm`: small, dependency-
//! light, `Copy`-friendly types that every other crate in the workspace
//! builds on, with no knowledge of parsing or execution.

mod error;
mod location;
mod opcode;
mod token;

pub use error::{Error, Result};
pub use location::{Cursor, EntryPoint, Offset, ENTRYPOINT_THRESHOLD};
pub use opcode::{
    BankTag, BitWidth, IntBank, IntBankRef, OpcodeKey, OpcodeTriple, StringBank,
};
pub use token::Token;
