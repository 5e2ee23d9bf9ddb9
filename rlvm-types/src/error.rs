//! The workspace-wide error catalogue.
//!
//! Every fallible operation in the RLVM core returns [`Result`], whose
//! error variants correspond 1:1 to the kinds enumerated in the
//! specification: a codec or parser failure, an out-of-range access, a
//! missing lookup, or a runtime invariant violation. Wrapping variants
//! (`Archive`, `Opcode`) let a caller add context without losing the
//! original cause.

use crate::opcode::OpcodeTriple;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The full error catalogue for the RLVM core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A codec or parser saw structurally invalid input.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// Input ended before the expected amount of data was consumed.
    #[error("truncated input: {0}")]
    Truncated(String),

    /// A requested bit width fell outside `0..=64`.
    #[error("invalid bit width: {0}")]
    InvalidWidth(u32),

    /// An asset, Gameexe key, or scenario index was missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A Gameexe accessor was used with the wrong type.
    #[error("type mismatch for key '{0}'")]
    TypeMismatch(String),

    /// A memory bank access or byte-reader seek landed outside bounds.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// An opcode was dispatched with no registered implementation.
    #[error("Undefined: {name}(opcode<{0}:{1}:{2}, {overload}>)", triple.type_, triple.module, triple.opcode)]
    Undefined {
        /// Best-effort display name for the opcode, e.g. `"Line_page"`.
        name: String,
        /// The dispatched `(type, module, opcode)` triple.
        triple: OpcodeTriple,
        /// The overload selector the instruction carried.
        overload: u8,
    },

    /// Expression evaluation or a machine invariant was violated.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A lower-level error annotated with the scenario that produced it.
    #[error("scenario {scenario}: {source}")]
    Archive {
        /// The scenario number the Archive was decoding when this failed.
        scenario: u32,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap `self` with the scenario number that was being decoded.
    pub fn in_scenario(self, scenario: u32) -> Error {
        Error::Archive {
            scenario,
            source: Box::new(self),
        }
    }
}
