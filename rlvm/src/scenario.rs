//! Scenario decode: the per-scenario header and the parsed script body.
//!
//! Grounded on `original_source/src/libreallive/scenario.{hpp,cpp}`. The
//! exact byte layout of `Header` lives in a `header.cpp` that the
//! retrieval pack does not carry, so the field offsets below are a
//! self-consistent reconstruction from the field list in spec.md §6
//! rather than a byte-for-byte port; see `DESIGN.md` for the tradeoff.
//! `Script` construction (the bytecode scan that builds `element_map`
//! and `entrypoints`) replaces `original_source`'s on-disk entrypoint
//! side table with a derivation from the same scan that already has to
//! walk every `Meta` element to find the kidoku table anyway.

use std::collections::BTreeMap;

use rlvm_types::{EntryPoint, Error, Offset, Result};

use crate::bytecode::{parse_element, BytecodeElement};

/// Total size in bytes of the fixed scenario header block.
pub const HEADER_SIZE: usize = 0x30;

/// RealLive's documented text-encoding ids (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// Shift-JIS (CP932). The default for untagged scenarios.
    Cp932,
    /// Simplified Chinese (CP936).
    Cp936,
    /// Windows Latin-1 (CP1252).
    Cp1252,
    /// Korean (CP949).
    Cp949,
    /// UTF-8, used by some fan translations.
    Utf8,
}

impl TextEncoding {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(TextEncoding::Cp932),
            1 => Ok(TextEncoding::Cp936),
            2 => Ok(TextEncoding::Cp1252),
            3 => Ok(TextEncoding::Cp949),
            10 => Ok(TextEncoding::Utf8),
            other => Err(Error::BadFormat(format!(
                "unknown scenario text encoding id {other}"
            ))),
        }
    }

    /// The raw id, for round-tripping into diagnostics.
    pub fn id(self) -> u8 {
        match self {
            TextEncoding::Cp932 => 0,
            TextEncoding::Cp936 => 1,
            TextEncoding::Cp1252 => 2,
            TextEncoding::Cp949 => 3,
            TextEncoding::Utf8 => 10,
        }
    }
}

/// The fixed-offset fields at the start of a decompressed scenario body.
#[derive(Debug, Clone)]
pub struct Header {
    /// Starting around the release of Little Busters!, scenario files get
    /// a second round of XOR applied. This flag, read from the header,
    /// tells the archive loader whether to apply it.
    pub use_xor_2: bool,
    /// Legacy compiler field, kept but unused by this core.
    pub z_minus_one: i32,
    /// Legacy compiler field, kept but unused by this core.
    pub z_minus_two: i32,
    /// Savepoint-on-message-box policy: 0/1/2, see [`crate::scriptor::ScenarioConfig`].
    pub savepoint_message: i32,
    /// Savepoint-on-selcom policy.
    pub savepoint_selcom: i32,
    /// Savepoint-on-seentop policy.
    pub savepoint_seentop: i32,
    /// The scenario's declared text encoding.
    pub text_encoding: TextEncoding,
    /// Character-name metadata; not consulted by this core, carried so
    /// that a dumper can print it.
    pub dramatis_personae: Vec<String>,
    /// Byte offset (from the header start) of the bytecode span's end /
    /// the kidoku table's start, or `None` if this scenario has no
    /// kidoku table.
    kidoku_table_offset: Option<u32>,
    /// Number of `u32` entries in the kidoku table.
    kidoku_table_len: u32,
}

fn read_i32(data: &[u8], at: usize) -> Result<i32> {
    let bytes: [u8; 4] = data
        .get(at..at + 4)
        .ok_or_else(|| Error::Truncated(format!("header field at {at} out of range")))?
        .try_into()
        .unwrap();
    Ok(i32::from_le_bytes(bytes))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    Ok(read_i32(data, at)? as u32)
}

impl Header {
    /// Parse the fixed header block from the start of a decompressed
    /// scenario body.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated(format!(
                "scenario header needs {HEADER_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let z_minus_one = read_i32(data, 0x00)?;
        let z_minus_two = read_i32(data, 0x04)?;
        let use_xor_2 = read_i32(data, 0x08)? != 0;
        let savepoint_message = read_i32(data, 0x0c)?;
        let savepoint_selcom = read_i32(data, 0x10)?;
        let savepoint_seentop = read_i32(data, 0x14)?;
        let text_encoding = TextEncoding::from_byte(data[0x18])?;
        let kidoku_table_offset = match read_u32(data, 0x1c)? {
            0 => None,
            off => Some(off),
        };
        let kidoku_table_len = read_u32(data, 0x20)?;
        let dramatis_count = read_u32(data, 0x24)? as usize;
        let mut dramatis_personae = Vec::with_capacity(dramatis_count.min(64));
        for i in 0..dramatis_count.min(64) {
            let slot = 0x28 + i * 8;
            let (Ok(off), Ok(len)) = (read_u32(data, slot), read_u32(data, slot + 4)) else {
                break;
            };
            let (off, len) = (off as usize, len as usize);
            let Some(bytes) = data.get(off..off.saturating_add(len)) else {
                continue;
            };
            dramatis_personae.push(String::from_utf8_lossy(bytes).into_owned());
        }
        Ok(Header {
            use_xor_2,
            z_minus_one,
            z_minus_two,
            savepoint_message,
            savepoint_selcom,
            savepoint_seentop,
            text_encoding,
            dramatis_personae,
            kidoku_table_offset,
            kidoku_table_len,
        })
    }
}

/// A fully parsed scenario script: every bytecode element keyed by its
/// byte offset, plus the entrypoint table derived from scanning them.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Every parsed element, keyed by the byte offset it starts at.
    pub element_map: BTreeMap<Offset, BytecodeElement>,
    /// Entrypoint index to the offset execution should resume at
    /// (the element immediately following the `Meta::Entrypoint` marker).
    pub entrypoints: BTreeMap<i32, Offset>,
}

impl Script {
    /// Scan `bytecode` end to end, building the element map and deriving
    /// the entrypoint table as `Meta::Entrypoint` markers are found.
    ///
    /// `kidoku_table`, if the header declared one, disambiguates plain
    /// kidoku counters from entrypoint markers (spec.md §4.6).
    pub fn parse(bytecode: &[u8], kidoku_table: Option<&[u32]>) -> Result<Self> {
        let mut element_map = BTreeMap::new();
        let mut entrypoints = BTreeMap::new();
        let mut entrypoint_marker = b'@';
        let mut pos = 0usize;
        while pos < bytecode.len() {
            let (element, consumed) = parse_element(bytecode, pos, kidoku_table, &mut entrypoint_marker)?;
            if consumed == 0 {
                return Err(Error::BadFormat(format!(
                    "bytecode parser made no progress at offset {pos}"
                )));
            }
            let start = pos as Offset;
            let next = pos + consumed;
            if let Some(idx) = element.entrypoint() {
                entrypoints.insert(idx, next as Offset);
            }
            element_map.insert(start, element);
            pos = next;
        }
        Ok(Script {
            element_map,
            entrypoints,
        })
    }

    /// The location execution should resume at for `entrypoint`, if the
    /// script declares one.
    pub fn entrypoint(&self, entrypoint: i32) -> Option<Offset> {
        self.entrypoints.get(&entrypoint).copied()
    }
}

/// One compiled script unit, numbered within its archive.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Decoded fixed-offset header fields.
    pub header: Header,
    /// The parsed bytecode and entrypoint table.
    pub script: Script,
    /// This scenario's number within the owning archive.
    pub scenario_number: u32,
}

impl Scenario {
    /// Parse a fully decompressed scenario payload: header, then
    /// bytecode scanned into a [`Script`].
    pub fn parse(data: &[u8], scenario_number: u32) -> Result<Self> {
        let header = Header::parse(data)?;
        let (bytecode, kidoku_table) = match header.kidoku_table_offset {
            Some(off) if (off as usize) >= HEADER_SIZE && (off as usize) <= data.len() => {
                let bytecode = &data[HEADER_SIZE..off as usize];
                let table_bytes = &data[off as usize..];
                let want = header.kidoku_table_len as usize;
                let mut table = Vec::with_capacity(want);
                for i in 0..want {
                    let at = i * 4;
                    let Some(word) = table_bytes.get(at..at + 4) else {
                        break;
                    };
                    table.push(u32::from_le_bytes(word.try_into().unwrap()));
                }
                (bytecode, Some(table))
            }
            _ => (&data[HEADER_SIZE..], None),
        };
        let script = Script::parse(bytecode, kidoku_table.as_deref())?;
        Ok(Scenario {
            header,
            script,
            scenario_number,
        })
    }

    /// This scenario's declared text encoding.
    pub fn encoding(&self) -> TextEncoding {
        self.header.text_encoding
    }

    /// The message-box savepoint policy: 0, 1, or 2.
    pub fn savepoint_message(&self) -> i32 {
        self.header.savepoint_message
    }

    /// The selcom savepoint policy: 0, 1, or 2.
    pub fn savepoint_selcom(&self) -> i32 {
        self.header.savepoint_selcom
    }

    /// The seentop savepoint policy: 0, 1, or 2.
    pub fn savepoint_seentop(&self) -> i32 {
        self.header.savepoint_seentop
    }

    /// Resolve `entrypoint` to the offset execution should begin at.
    pub fn find_entrypoint(&self, entrypoint: i32) -> Result<Offset> {
        self.script
            .entrypoint(entrypoint)
            .ok_or_else(|| Error::NotFound(format!("entrypoint {entrypoint}")))
    }
}
