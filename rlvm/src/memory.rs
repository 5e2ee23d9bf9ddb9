//! Typed, snapshot-friendly memory banks.
//!
//! Grounded on spec.md §4.8: each bank is a run-length/segment map rather
//! than a flat array, so a `fill` over a huge range and a whole-bank
//! clone (taken on every `gosub`/`farcall` for local memory) stay cheap.
//! The layout mirrors how the teacher crate keeps register/memory state
//! behind small `Copy` index types (`rlvm_types::IntBankRef` here plays
//! the role `RegId` plays there) with the actual storage elsewhere.

use std::collections::BTreeMap;
use std::fmt::Debug;

use rlvm_types::{BankTag, BitWidth, Error, IntBank, IntBankRef, Result, StringBank};
use strum::IntoEnumIterator;

use crate::expr::MemoryAccess;

/// A segment map from a start index to `(end_exclusive, value)`, with the
/// invariant that adjacent segments never hold equal values (they would
/// otherwise have been merged into one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBank<T> {
    len: usize,
    default: T,
    runs: BTreeMap<usize, (usize, T)>,
}

impl<T: Clone + PartialEq + Debug> MemoryBank<T> {
    pub fn new(len: usize, default: T) -> Self {
        MemoryBank {
            len,
            default,
            runs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow-only resize; shrinking truncates any runs past the new
    /// length but this is never expected to be called with `n < len()`.
    pub fn resize(&mut self, n: usize) {
        if n < self.len {
            self.runs.retain(|&start, (end, _)| {
                if start >= n {
                    false
                } else {
                    *end = (*end).min(n);
                    true
                }
            });
        }
        self.len = n;
    }

    fn run_containing(&self, index: usize) -> Option<(&usize, &(usize, T))> {
        self.runs
            .range(..=index)
            .next_back()
            .filter(|(_, (end, _))| index < *end)
    }

    pub fn get(&self, index: usize) -> Result<T> {
        if index >= self.len {
            return Err(Error::OutOfRange(format!(
                "index {index} out of range (len {})",
                self.len
            )));
        }
        Ok(self
            .run_containing(index)
            .map(|(_, (_, v))| v.clone())
            .unwrap_or_else(|| self.default.clone()))
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.fill(index, index + 1, value)
    }

    /// Assign `value` to every index in `[begin, end)`, splitting or
    /// removing overlapping runs and merging with identical neighbours.
    pub fn fill(&mut self, begin: usize, end: usize, value: T) -> Result<()> {
        if end > self.len {
            return Err(Error::OutOfRange(format!(
                "range {begin}..{end} out of range (len {})",
                self.len
            )));
        }
        if begin >= end {
            return Ok(());
        }

        let mut to_remove = Vec::new();
        let mut to_insert = Vec::new();

        for (&start, &(run_end, ref v)) in self.runs.range(..end) {
            if run_end <= begin {
                continue;
            }
            // This run overlaps [begin, end).
            to_remove.push(start);
            if start < begin {
                to_insert.push((start, begin, v.clone()));
            }
            if run_end > end {
                to_insert.push((end, run_end, v.clone()));
            }
        }
        for start in to_remove {
            self.runs.remove(&start);
        }
        for (s, e, v) in to_insert {
            self.runs.insert(s, (e, v));
        }

        if value != self.default {
            self.runs.insert(begin, (end, value));
        }

        self.normalise_around(begin, end);
        Ok(())
    }

    /// Merge `[begin, end)` with an immediately adjacent run of the same
    /// value on either side, keeping the no-two-equal-adjacent-runs
    /// invariant.
    fn normalise_around(&mut self, begin: usize, end: usize) {
        let current = self.runs.get(&begin).cloned();
        let Some((cur_end, cur_val)) = current else {
            return;
        };

        if let Some((&prev_start, &(prev_end, ref prev_val))) =
            self.runs.range(..begin).next_back()
        {
            if prev_end == begin && *prev_val == cur_val {
                self.runs.remove(&begin);
                self.runs.insert(prev_start, (cur_end, cur_val.clone()));
                return self.normalise_around(prev_start, cur_end);
            }
        }

        if let Some(&(next_end, ref next_val)) = self.runs.get(&end) {
            if *next_val == cur_val {
                self.runs.remove(&end);
                self.runs.insert(begin, (next_end, cur_val));
            }
        }
    }

    /// The number of distinct runs currently stored, used by tests to
    /// reason about the complexity bound rather than the committed O().
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Serialise as a length-prefixed run list: `len`, then each run as
    /// `(begin, end, value)`. `encode_value` renders one value; callers
    /// pick the width (banks of `i32` vs `String` need different
    /// encodings).
    pub fn serialise_runs(&self) -> (usize, Vec<(usize, usize, T)>) {
        let runs = self
            .runs
            .iter()
            .map(|(&s, &(e, ref v))| (s, e, v.clone()))
            .collect();
        (self.len, runs)
    }

    pub fn from_runs(len: usize, default: T, runs: Vec<(usize, usize, T)>) -> Self {
        let mut bank = MemoryBank::new(len, default);
        for (s, e, v) in runs {
            bank.runs.insert(s, (e, v));
        }
        bank
    }
}

/// All addressable memory for one machine instance: the nine integer
/// banks plus B's bit-width sub-views, and the three string banks.
#[derive(Debug, Clone)]
pub struct Memory {
    pub int_banks: std::collections::HashMap<IntBank, MemoryBank<i32>>,
    pub str_banks: std::collections::HashMap<StringBank, MemoryBank<String>>,
    store_register: i32,
}

/// The default bank size used by the original engine's int/string
/// banks absent any scenario-specific resize.
pub const DEFAULT_BANK_LEN: usize = 2000;

impl Default for Memory {
    fn default() -> Self {
        let mut int_banks = std::collections::HashMap::new();
        for bank in IntBank::iter() {
            int_banks.insert(bank, MemoryBank::new(DEFAULT_BANK_LEN, 0));
        }
        let mut str_banks = std::collections::HashMap::new();
        for bank in [StringBank::S, StringBank::M, StringBank::Global] {
            str_banks.insert(bank, MemoryBank::new(DEFAULT_BANK_LEN, String::new()));
        }
        Memory {
            int_banks,
            str_banks,
            store_register: 0,
        }
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of bank `L` (frame-local), taken on `gosub`/`farcall`
    /// and restored on return. Cheap because `MemoryBank::clone` only
    /// copies the run list, not every cell.
    pub fn snapshot_local(&self) -> MemoryBank<i32> {
        self.int_banks[&IntBank::L].clone()
    }

    pub fn restore_local(&mut self, snapshot: MemoryBank<i32>) {
        self.int_banks.insert(IntBank::L, snapshot);
    }

    fn read_narrow(&self, width: BitWidth, index: i32) -> Result<i32> {
        let bits = width.bits();
        let per_word = 32 / bits;
        let word_index = (index as u32) / per_word;
        let shift = ((index as u32) % per_word) * bits;
        let word = self.int_banks[&IntBank::B].get(word_index as usize)?;
        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        Ok(((word as u32 >> shift) & mask) as i32)
    }

    fn write_narrow(&mut self, width: BitWidth, index: i32, value: i32) -> Result<()> {
        let bits = width.bits();
        let per_word = 32 / bits;
        let word_index = (index as u32) / per_word;
        let shift = ((index as u32) % per_word) * bits;
        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        let bank = self.int_banks.get_mut(&IntBank::B).unwrap();
        let current = bank.get(word_index as usize)? as u32;
        let cleared = current & !(mask << shift);
        let updated = cleared | ((value as u32 & mask) << shift);
        bank.set(word_index as usize, updated as i32)
    }
}

impl MemoryAccess for Memory {
    fn read_int(&self, type_tag: u8, location: i32) -> Result<i32> {
        match BankTag::from_tag(type_tag) {
            Some(BankTag::Int(IntBankRef::Plain(bank))) => {
                self.int_banks[&bank].get(location as usize)
            }
            Some(BankTag::Int(IntBankRef::Narrow(width))) => self.read_narrow(width, location),
            Some(BankTag::Str(_)) | None => Err(Error::TypeMismatch(format!(
                "0x{type_tag:02x} is not an integer bank tag"
            ))),
        }
    }

    fn write_int(&mut self, type_tag: u8, location: i32, value: i32) -> Result<()> {
        match BankTag::from_tag(type_tag) {
            Some(BankTag::Int(IntBankRef::Plain(bank))) => self
                .int_banks
                .get_mut(&bank)
                .unwrap()
                .set(location as usize, value),
            Some(BankTag::Int(IntBankRef::Narrow(width))) => {
                self.write_narrow(width, location, value)
            }
            Some(BankTag::Str(_)) | None => Err(Error::TypeMismatch(format!(
                "0x{type_tag:02x} is not an integer bank tag"
            ))),
        }
    }

    fn read_str(&self, type_tag: u8, location: i32) -> Result<String> {
        match BankTag::from_tag(type_tag) {
            Some(BankTag::Str(bank)) => self.str_banks[&bank].get(location as usize),
            _ => Err(Error::TypeMismatch(format!(
                "0x{type_tag:02x} is not a string bank tag"
            ))),
        }
    }

    fn write_str(&mut self, type_tag: u8, location: i32, value: String) -> Result<()> {
        match BankTag::from_tag(type_tag) {
            Some(BankTag::Str(bank)) => self
                .str_banks
                .get_mut(&bank)
                .unwrap()
                .set(location as usize, value),
            _ => Err(Error::TypeMismatch(format!(
                "0x{type_tag:02x} is not a string bank tag"
            ))),
        }
    }

    fn store_register(&self) -> i32 {
        self.store_register
    }

    fn set_store_register(&mut self, value: i32) {
        self.store_register = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_model(len: usize, default: i32, ops: &[(usize, usize, i32)]) -> Vec<i32> {
        let mut model = vec![default; len];
        for &(begin, end, value) in ops {
            for slot in model.iter_mut().take(end).skip(begin) {
                *slot = value;
            }
        }
        model
    }

    #[test]
    fn fill_and_get_agree_with_naive_array_model() {
        let ops = [(2usize, 5usize, 7i32), (0, 3, 9), (4, 10, 1)];
        let mut bank = MemoryBank::new(10, 0);
        for &(b, e, v) in &ops {
            bank.fill(b, e, v).unwrap();
        }
        let model = naive_model(10, 0, &ops);
        for i in 0..10 {
            assert_eq!(bank.get(i).unwrap(), model[i], "index {i}");
        }
    }

    #[test]
    fn adjacent_runs_with_equal_value_are_merged() {
        let mut bank = MemoryBank::new(10, 0);
        bank.fill(0, 3, 5).unwrap();
        bank.fill(3, 6, 5).unwrap();
        assert_eq!(bank.run_count(), 1);
    }

    #[test]
    fn set_single_index_splits_a_run() {
        let mut bank = MemoryBank::new(10, 0);
        bank.fill(0, 10, 1).unwrap();
        bank.set(5, 2).unwrap();
        assert_eq!(bank.get(4).unwrap(), 1);
        assert_eq!(bank.get(5).unwrap(), 2);
        assert_eq!(bank.get(6).unwrap(), 1);
        assert_eq!(bank.run_count(), 3);
    }

    #[test]
    fn serialise_round_trips() {
        let mut bank = MemoryBank::new(20, 0);
        bank.fill(2, 9, 3).unwrap();
        bank.fill(12, 15, -4).unwrap();
        let (len, runs) = bank.serialise_runs();
        let restored = MemoryBank::from_runs(len, 0, runs);
        for i in 0..len {
            assert_eq!(bank.get(i).unwrap(), restored.get(i).unwrap());
        }
    }

    #[test]
    fn out_of_range_get_is_an_error() {
        let bank = MemoryBank::new(4, 0);
        assert!(matches!(bank.get(4), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn narrow_bit_view_writes_do_not_disturb_neighbouring_bits() {
        let mut mem = Memory::new();
        mem.write_int(IntBankRef::Narrow(BitWidth::W4).to_tag(), 0, 0xf)
            .unwrap();
        mem.write_int(IntBankRef::Narrow(BitWidth::W4).to_tag(), 1, 0x3)
            .unwrap();
        assert_eq!(
            mem.read_int(IntBankRef::Narrow(BitWidth::W4).to_tag(), 0)
                .unwrap(),
            0xf
        );
        assert_eq!(
            mem.read_int(IntBankRef::Narrow(BitWidth::W4).to_tag(), 1)
                .unwrap(),
            0x3
        );
    }

    #[test]
    fn local_bank_snapshot_round_trips_through_gosub() {
        let mut mem = Memory::new();
        mem.write_int(IntBankRef::Plain(IntBank::L).to_tag(), 0, 42)
            .unwrap();
        let snap = mem.snapshot_local();
        mem.write_int(IntBankRef::Plain(IntBank::L).to_tag(), 0, 99)
            .unwrap();
        mem.restore_local(snap);
        assert_eq!(
            mem.read_int(IntBankRef::Plain(IntBank::L).to_tag(), 0)
                .unwrap(),
            42
        );
    }

    #[test]
    fn whole_memory_snapshot_via_clone_is_independent_of_later_writes() {
        let f_tag = IntBankRef::Plain(IntBank::F).to_tag();
        let mut mem = Memory::new();
        mem.int_banks.get_mut(&IntBank::F).unwrap().resize(5_000);
        mem.write_int(f_tag, 4_000, 11).unwrap();

        let m1 = mem.clone();

        mem.write_int(f_tag, 4_000, 22).unwrap();
        let m2 = mem.clone();

        mem.int_banks
            .get_mut(&IntBank::F)
            .unwrap()
            .fill(0, 5_000, 0)
            .unwrap();

        assert_eq!(m1.read_int(f_tag, 4_000).unwrap(), 11);
        assert_eq!(m2.read_int(f_tag, 4_000).unwrap(), 22);
        assert_eq!(mem.read_int(f_tag, 4_000).unwrap(), 0);
        assert_eq!(m1.int_banks[&IntBank::F].len(), 5_000);
    }
}
