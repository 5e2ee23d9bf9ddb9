//! Opcode keys and memory-bank tags.
//!
//! These are the small, `Copy` value types that both the bytecode parser
//! and the machine index into tables with: the `(type, module, opcode)`
//! triple a `#`-command carries, and the single-byte bank tag a memory
//! reference carries. Neither type owns any data; both are meant to be
//! passed by value the way `fuel_asm::RegId` is.

use std::fmt;

/// The `(type, module, opcode)` key of a general module call, matching the
/// 32-bit key `Parser::ParseFunction` builds from the 8-byte command
/// header before consulting the control-flow opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpcodeTriple {
    /// Module family selector (`mm_type` on disk).
    pub type_: u8,
    /// Module selector (`mm_mod` on disk).
    pub module: u8,
    /// Opcode number within the module.
    pub opcode: u16,
}

impl OpcodeTriple {
    /// Build the packed 32-bit key used to look up control-flow opcodes:
    /// `type<<24 | module<<16 | opcode`.
    pub const fn packed_key(self) -> u32 {
        ((self.type_ as u32) << 24) | ((self.module as u32) << 16) | self.opcode as u32
    }
}

impl fmt::Display for OpcodeTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.type_, self.module, self.opcode)
    }
}

/// A fully-qualified opcode identity: the triple plus the overload byte
/// that distinguishes variants sharing the same triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpcodeKey {
    /// The `(type, module, opcode)` triple.
    pub triple: OpcodeTriple,
    /// The one-byte overload selector.
    pub overload: u8,
}

/// The integer banks named in spec.md §3: `A, B, C, D, E, F, G, L, Z`,
/// plus bit-width sub-views over `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum IntBank {
    /// General-purpose bank A.
    A,
    /// General-purpose bank B, viewed as a plain 32-bit integer.
    B,
    /// General-purpose bank C.
    C,
    /// General-purpose bank D.
    D,
    /// General-purpose bank E.
    E,
    /// General-purpose bank F.
    F,
    /// Global bank, persists across scenarios and save files.
    G,
    /// Local bank, snapshotted per call frame.
    L,
    /// Scratch bank used by a handful of opcode families.
    Z,
}

/// A bit width a sub-view of bank `B` can be addressed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitWidth {
    /// 1-bit view.
    W1,
    /// 2-bit view.
    W2,
    /// 4-bit view.
    W4,
    /// 8-bit view.
    W8,
    /// 16-bit view.
    W16,
}

impl BitWidth {
    /// The number of bits this view masks off per element.
    pub const fn bits(self) -> u32 {
        match self {
            BitWidth::W1 => 1,
            BitWidth::W2 => 2,
            BitWidth::W4 => 4,
            BitWidth::W8 => 8,
            BitWidth::W16 => 16,
        }
    }
}

/// One addressable integer location kind: either a plain bank, or bank `B`
/// viewed through a narrower bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntBankRef {
    /// A whole bank, addressed as 32-bit integers.
    Plain(IntBank),
    /// Bank `B`, addressed through a narrower bit-width mask.
    Narrow(BitWidth),
}

/// The on-disk single-byte tag for a memory reference, as parsed from
/// `<bank_tag>[` in the expression grammar (spec.md §4.5). `0xc8` and
/// `0xff` are reserved for the store register and integer constants and
/// can never appear here.
///
/// The specific byte assignments below are this implementation's own
/// choice (the specification does not fix them beyond bank `B`'s
/// `0x0b..=0x10` range); see `DESIGN.md` for the resolved open question.
impl IntBankRef {
    /// Decode a raw bank-tag byte into the bank/width it selects.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x00 => IntBankRef::Plain(IntBank::A),
            0x0b => IntBankRef::Plain(IntBank::B),
            0x01 => IntBankRef::Plain(IntBank::C),
            0x02 => IntBankRef::Plain(IntBank::D),
            0x03 => IntBankRef::Plain(IntBank::E),
            0x04 => IntBankRef::Plain(IntBank::F),
            0x05 => IntBankRef::Plain(IntBank::G),
            0x0a => IntBankRef::Plain(IntBank::L),
            0x06 => IntBankRef::Plain(IntBank::Z),
            0x0c => IntBankRef::Narrow(BitWidth::W1),
            0x0d => IntBankRef::Narrow(BitWidth::W2),
            0x0e => IntBankRef::Narrow(BitWidth::W4),
            0x0f => IntBankRef::Narrow(BitWidth::W8),
            0x10 => IntBankRef::Narrow(BitWidth::W16),
            _ => return None,
        })
    }

    /// The inverse of [`Self::from_tag`], used when re-serialising an
    /// expression (the disassembler, and `rlkp`'s round-trip tests).
    pub fn to_tag(self) -> u8 {
        match self {
            IntBankRef::Plain(IntBank::A) => 0x00,
            IntBankRef::Plain(IntBank::B) => 0x0b,
            IntBankRef::Plain(IntBank::C) => 0x01,
            IntBankRef::Plain(IntBank::D) => 0x02,
            IntBankRef::Plain(IntBank::E) => 0x03,
            IntBankRef::Plain(IntBank::F) => 0x04,
            IntBankRef::Plain(IntBank::G) => 0x05,
            IntBankRef::Plain(IntBank::L) => 0x0a,
            IntBankRef::Plain(IntBank::Z) => 0x06,
            IntBankRef::Narrow(BitWidth::W1) => 0x0c,
            IntBankRef::Narrow(BitWidth::W2) => 0x0d,
            IntBankRef::Narrow(BitWidth::W4) => 0x0e,
            IntBankRef::Narrow(BitWidth::W8) => 0x0f,
            IntBankRef::Narrow(BitWidth::W16) => 0x10,
        }
    }

    /// The debug-string bank name RealLive tooling uses, e.g. `"intD"`.
    pub fn debug_name(self) -> &'static str {
        match self {
            IntBankRef::Plain(IntBank::A) => "intA",
            IntBankRef::Plain(IntBank::B) => "intB",
            IntBankRef::Plain(IntBank::C) => "intC",
            IntBankRef::Plain(IntBank::D) => "intD",
            IntBankRef::Plain(IntBank::E) => "intE",
            IntBankRef::Plain(IntBank::F) => "intF",
            IntBankRef::Plain(IntBank::G) => "intG",
            IntBankRef::Plain(IntBank::L) => "intL",
            IntBankRef::Plain(IntBank::Z) => "intZ",
            IntBankRef::Narrow(BitWidth::W1) => "intB1",
            IntBankRef::Narrow(BitWidth::W2) => "intB2",
            IntBankRef::Narrow(BitWidth::W4) => "intB4",
            IntBankRef::Narrow(BitWidth::W8) => "intB8",
            IntBankRef::Narrow(BitWidth::W16) => "intB16",
        }
    }
}

/// The string banks named in spec.md §3: `S`, `M` (scenario-local), and a
/// global string bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringBank {
    /// General-purpose string bank.
    S,
    /// Scenario-local string bank, snapshotted with local memory.
    M,
    /// Global string bank, persists across scenarios.
    Global,
}

impl StringBank {
    /// Decode a raw bank-tag byte for a string memory reference.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x12 => StringBank::S,
            0x13 => StringBank::M,
            0x14 => StringBank::Global,
            _ => return None,
        })
    }

    /// The inverse of [`Self::from_tag`].
    pub fn to_tag(self) -> u8 {
        match self {
            StringBank::S => 0x12,
            StringBank::M => 0x13,
            StringBank::Global => 0x14,
        }
    }

    /// The debug-string bank name, e.g. `"strS"`.
    pub fn debug_name(self) -> &'static str {
        match self {
            StringBank::S => "strS",
            StringBank::M => "strM",
            StringBank::Global => "strK",
        }
    }
}

/// Either an integer or string memory reference, as resolved from a raw
/// bank tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankTag {
    /// An integer bank or bit-width sub-view.
    Int(IntBankRef),
    /// A string bank.
    Str(StringBank),
}

impl BankTag {
    /// Decode a raw bank-tag byte, checking string banks first since
    /// their range doesn't overlap the integer bank range.
    pub fn from_tag(tag: u8) -> Option<Self> {
        StringBank::from_tag(tag)
            .map(BankTag::Str)
            .or_else(|| IntBankRef::from_tag(tag).map(BankTag::Int))
    }
}
