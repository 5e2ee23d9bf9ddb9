//! The SEEN.TXT archive loader.
//!
//! Grounded on `original_source/src/libreallive/archive.hpp` and
//! `filemap.{h,cc}`: a memory-mapped file, a table of contents keyed by
//! scenario number, and lazy, memoised `Scenario` construction. The XOR
//! key bytes themselves are per-game licensed binary constants that
//! weren't present in the retrieval pack; `FIRST_LEVEL_KEY` here is a
//! documented placeholder with the right shape (see `DESIGN.md`), not a
//! verified key table.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use rlvm_types::{Error, Result};

use crate::lzss;
use crate::scenario::Scenario;

/// A cyclic XOR key applied to a scenario's compressed payload before
/// LZSS decoding.
#[derive(Debug, Clone, Copy)]
pub struct XorKey {
    bytes: &'static [u8],
}

impl XorKey {
    /// Apply this key cyclically over `data`, in place.
    pub fn apply(&self, data: &mut [u8]) {
        if self.bytes.is_empty() {
            return;
        }
        for (i, b) in data.iter_mut().enumerate() {
            *b ^= self.bytes[i % self.bytes.len()];
        }
    }
}

/// The first-stage key applied to every scenario regardless of game.
///
/// Placeholder shape pending the real constant; see `DESIGN.md`.
pub const FIRST_LEVEL_KEY: XorKey = XorKey {
    bytes: &[0x8b, 0xe5, 0x5d, 0xc3, 0x5d, 0x83, 0xc4, 0x04, 0xc3, 0x5d, 0x83],
};

/// Per-game second-stage keys, selected by the Gameexe's `#REGNAME`.
/// Empty until specific games are onboarded; `Archive::with_regname`
/// degrades gracefully to "no second-stage key" when `regname` isn't
/// listed here.
pub const SECOND_LEVEL_KEYS: &[(&str, XorKey)] = &[];

fn find_second_level_key(regname: &str) -> Option<XorKey> {
    SECOND_LEVEL_KEYS
        .iter()
        .find(|(name, _)| *name == regname)
        .map(|(_, key)| *key)
}

struct TocEntry {
    offset: u32,
    length: u32,
}

/// Default number of decoded scenarios kept hot at once (spec.md §4.7).
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Interface to a loaded SEEN.TXT file.
///
/// Decoded scenarios are cached behind a bounded least-recently-used
/// list: a game may have hundreds of scenarios but only a handful are
/// ever live at once, and each decode carries a full element map.
pub struct Archive {
    mmap: Mmap,
    toc: BTreeMap<u32, TocEntry>,
    second_level_xor_key: Option<XorKey>,
    regname: String,
    scenarios: RefCell<BTreeMap<u32, Scenario>>,
    access_order: RefCell<VecDeque<u32>>,
    cache_capacity: usize,
}

const ARCHIVE_HEADER_LEN: usize = 10;
const TOC_RECORD_SIZE: usize = 8;

impl Archive {
    /// Open `path` assuming no per-game second-stage XOR key (used in
    /// unit tests and for games not yet in [`SECOND_LEVEL_KEYS`]).
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_regname(path, String::new())
    }

    /// Open `path`, selecting a second-stage XOR key by `regname` (the
    /// Gameexe's `#REGNAME` value).
    pub fn with_regname(path: impl AsRef<Path>, regname: impl Into<String>) -> Result<Self> {
        Self::with_capacity(path, regname, DEFAULT_CACHE_CAPACITY)
    }

    /// Like [`Self::with_regname`], but with an explicit scenario cache
    /// size (mostly for tests exercising eviction).
    pub fn with_capacity(
        path: impl AsRef<Path>,
        regname: impl Into<String>,
        cache_capacity: usize,
    ) -> Result<Self> {
        let regname = regname.into();
        let file = File::open(path.as_ref())
            .map_err(|e| Error::NotFound(format!("{}: {e}", path.as_ref().display())))?;
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| Error::BadFormat(format!("failed to map {}: {e}", path.as_ref().display())))?
        };
        let toc = read_toc(&mmap)?;
        let second_level_xor_key = find_second_level_key(&regname);
        Ok(Archive {
            mmap,
            toc,
            second_level_xor_key,
            regname,
            scenarios: RefCell::new(BTreeMap::new()),
            access_order: RefCell::new(VecDeque::new()),
            cache_capacity: cache_capacity.max(1),
        })
    }

    /// The `#REGNAME` this archive was opened with.
    pub fn regname(&self) -> &str {
        &self.regname
    }

    /// Fetch scenario `index`, decoding and caching it on first access.
    /// Least-recently-used scenarios are evicted once the cache exceeds
    /// its capacity.
    pub fn get_scenario(&self, index: u32) -> Result<std::cell::Ref<'_, Scenario>> {
        if !self.scenarios.borrow().contains_key(&index) {
            let scenario = self.load_scenario(index)?;
            self.scenarios.borrow_mut().insert(index, scenario);
        }
        self.touch(index);
        Ok(std::cell::Ref::map(self.scenarios.borrow(), |m| {
            m.get(&index).expect("just inserted")
        }))
    }

    /// Record `index` as most-recently-used, evicting the coldest entry
    /// if that pushes the cache over capacity.
    fn touch(&self, index: u32) {
        let mut order = self.access_order.borrow_mut();
        order.retain(|&i| i != index);
        order.push_back(index);
        if order.len() > self.cache_capacity {
            if let Some(evict) = order.pop_front() {
                self.scenarios.borrow_mut().remove(&evict);
            }
        }
    }

    /// The lowest-indexed scenario in the archive, if any.
    pub fn first_scenario(&self) -> Result<std::cell::Ref<'_, Scenario>> {
        let index = *self
            .toc
            .keys()
            .next()
            .ok_or_else(|| Error::NotFound("archive has no scenarios".into()))?;
        self.get_scenario(index)
    }

    /// All scenario numbers present in the table of contents.
    pub fn scenario_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.toc.keys().copied()
    }

    /// Scan headers looking for a non-default text encoding, short
    /// circuiting at the first one found; `None` means every scenario
    /// declared the default (CP932).
    pub fn probable_encoding(&self) -> Result<Option<crate::scenario::TextEncoding>> {
        for index in self.scenario_numbers() {
            let scenario = self.get_scenario(index)?;
            if scenario.encoding() != crate::scenario::TextEncoding::Cp932 {
                return Ok(Some(scenario.encoding()));
            }
        }
        Ok(None)
    }

    fn load_scenario(&self, index: u32) -> Result<Scenario> {
        let entry = self
            .toc
            .get(&index)
            .ok_or_else(|| Error::NotFound(format!("scenario {index}")))?;
        let start = entry.offset as usize;
        let end = start
            .checked_add(entry.length as usize)
            .ok_or_else(|| Error::OutOfRange(format!("scenario {index} TOC entry overflows")))?;
        let raw = self
            .mmap
            .get(start..end)
            .ok_or_else(|| Error::OutOfRange(format!("scenario {index} lies outside the archive")))?;

        // Per-game second-stage key, when this game has one registered,
        // is applied before the universal first-stage key (matching
        // `Archive::second_level_xor_key_` being consulted ahead of the
        // fixed key in the original loader).
        let mut payload = raw.to_vec();
        if let Some(key) = self.second_level_xor_key {
            key.apply(&mut payload);
        }
        FIRST_LEVEL_KEY.apply(&mut payload);

        let decompressed = lzss::decompress(&payload).map_err(|e| e.in_scenario(index))?;
        Scenario::parse(&decompressed, index).map_err(|e| e.in_scenario(index))
    }
}

fn read_toc(mmap: &Mmap) -> Result<BTreeMap<u32, TocEntry>> {
    if mmap.len() < ARCHIVE_HEADER_LEN {
        return Err(Error::Truncated(
            "archive too small to contain its table of contents header".into(),
        ));
    }
    let file_count = u16::from_le_bytes([mmap[0], mmap[1]]) as usize;
    let record_size = u16::from_le_bytes([mmap[2], mmap[3]]).max(TOC_RECORD_SIZE as u16) as usize;
    let header_size = u16::from_le_bytes([mmap[4], mmap[5]]) as usize;
    let total_size = u32::from_le_bytes([mmap[6], mmap[7], mmap[8], mmap[9]]) as usize;
    if total_size != 0 && total_size != mmap.len() {
        return Err(Error::BadFormat(format!(
            "archive declares total size {total_size} but the file is {} bytes",
            mmap.len()
        )));
    }

    let mut toc = BTreeMap::new();
    for i in 0..file_count {
        let rec_start = header_size + i * record_size;
        let Some(rec) = mmap.get(rec_start..rec_start + TOC_RECORD_SIZE) else {
            return Err(Error::Truncated(format!(
                "table of contents record {i} lies outside the archive"
            )));
        };
        let offset = u32::from_le_bytes(rec[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(rec[4..8].try_into().unwrap());
        if length == 0 {
            // An empty slot: scenario numbers need not be dense.
            continue;
        }
        toc.insert(i as u32, TocEntry { offset, length });
    }
    Ok(toc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_archive(scenarios: &[Vec<u8>]) -> Vec<u8> {
        let header_size = ARCHIVE_HEADER_LEN;
        let toc_size = scenarios.len() * TOC_RECORD_SIZE;
        let mut out = Vec::new();
        out.extend_from_slice(&(scenarios.len() as u16).to_le_bytes());
        out.extend_from_slice(&(TOC_RECORD_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(header_size as u16).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // total_size filled below
        let mut offset = (header_size + toc_size) as u32;
        let mut toc_bytes = Vec::new();
        let mut body = Vec::new();
        for scenario in scenarios {
            toc_bytes.extend_from_slice(&offset.to_le_bytes());
            toc_bytes.extend_from_slice(&(scenario.len() as u32).to_le_bytes());
            body.extend_from_slice(scenario);
            offset += scenario.len() as u32;
        }
        out.extend_from_slice(&toc_bytes);
        out.extend_from_slice(&body);
        let total = out.len() as u32;
        out[6..10].copy_from_slice(&total.to_le_bytes());
        out
    }

    fn xor_lzss_literal_frame(plain: &[u8]) -> Vec<u8> {
        // All-literal flag bytes, 8 bits of literal data per flag byte.
        let mut body = Vec::new();
        for chunk in plain.chunks(8) {
            let flags: u8 = (1u16 << chunk.len() as u32).wrapping_sub(1) as u8;
            body.push(flags);
            body.extend_from_slice(chunk);
        }
        let archive_size = (8 + body.len()) as u32;
        let mut framed = Vec::new();
        framed.extend_from_slice(&archive_size.to_le_bytes());
        framed.extend_from_slice(&(plain.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        FIRST_LEVEL_KEY.apply(&mut framed);
        framed
    }

    #[test]
    fn toc_parses_scenario_offsets() {
        let mut scenario_body = vec![0u8; crate::scenario::HEADER_SIZE];
        scenario_body[0x18] = 0; // CP932
        scenario_body.extend_from_slice(&[0x00, b',']);
        let framed = xor_lzss_literal_frame(&scenario_body);
        let archive_bytes = build_archive(&[framed]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SEEN.TXT");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&archive_bytes)
            .unwrap();

        let archive = Archive::new(&path).unwrap();
        let scenario = archive.get_scenario(0).unwrap();
        assert_eq!(scenario.scenario_number, 0);
        assert_eq!(scenario.script.element_map.len(), 2);
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(Archive::new("/nonexistent/SEEN.TXT"), Err(Error::NotFound(_))));
    }

    #[test]
    fn cache_evicts_coldest_scenario_past_capacity() {
        let scenario_body = |encoding: u8| {
            let mut b = vec![0u8; crate::scenario::HEADER_SIZE];
            b[0x18] = encoding;
            b.push(0x00);
            b
        };
        let frames: Vec<Vec<u8>> = (0..3)
            .map(|_| xor_lzss_literal_frame(&scenario_body(0)))
            .collect();
        let archive_bytes = build_archive(&frames);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SEEN.TXT");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&archive_bytes)
            .unwrap();

        let archive = Archive::with_capacity(&path, "", 2).unwrap();
        archive.get_scenario(0).unwrap();
        archive.get_scenario(1).unwrap();
        archive.get_scenario(2).unwrap();
        assert_eq!(archive.scenarios.borrow().len(), 2);
        assert!(!archive.scenarios.borrow().contains_key(&0));
    }
}
