//! Scriptor: a facade over the archive that speaks in cursors and
//! closed-form instructions instead of raw scenarios and elements.
//!
//! Grounded on `original_source/src/libreallive/scriptor.{hpp,cpp}` and
//! `src/machine/instruction.hpp`. The original's `Instruction` variant
//! holds raw pointers into a `shared_ptr<BytecodeElement>`; Rust's
//! aliasing rules make that awkward against a cache that can evict, so
//! [`Instruction`] here owns its payload (cloned out of the element) —
//! one level of cloning traded for no self-referential lifetimes. The
//! on-disk entrypoint side table is likewise not modeled separately;
//! `Scenario::parse` already derives `entrypoints` while scanning for the
//! kidoku table, so `load_entry` just looks it up there.

use rlvm_types::{Cursor, Error, Offset, OpcodeTriple, Result};

use crate::archive::Archive;
use crate::bytecode::BytecodeElement;
use crate::expr::Expression;
use crate::scenario::TextEncoding;

/// CP932 bytes for the literal string "SeenEnd", which some shipping
/// scenarios use as a sentinel textout run marking the end of a route.
const SEEN_END: [u8; 14] = [
    0x82, 0x72, 0x82, 0x85, 0x82, 0x85, 0x82, 0x8e, 0x82, 0x64, 0x82, 0x8e, 0x82, 0x84,
];

/// A flattened, closed-form instruction: what the machine actually
/// dispatches on, with the `Command`/`Expression` payload cloned out of
/// the scenario's owned element so it can outlive a cache eviction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Nothing to do: a comma separator or an entrypoint marker (whose
    /// effect was already captured at parse time).
    Nop,
    /// A read-marker kidoku counter.
    Kidoku(i16),
    /// A source line-number marker.
    Line(i16),
    /// A general opcode call.
    Command {
        /// The dispatched `(type, module, opcode)` triple.
        triple: OpcodeTriple,
        /// The overload selector.
        overload: u8,
        /// Already-parsed argument expressions.
        params: Vec<Expression>,
    },
    /// A standalone expression statement.
    Expression(Expression),
    /// Raw, still codepage-encoded display text (verbatim, per the
    /// "codepage handling kept outside this core" design note).
    Textout(Vec<u8>),
    /// The sentinel "SeenEnd" textout run: the scenario has ended.
    End(Vec<u8>),
    /// An unconditional jump; `target_id` resolves via
    /// [`Scriptor::resolve_target`] in the current scenario.
    Goto { target_id: u32 },
    /// A conditional jump: taken iff `condition` (absent meaning "use the
    /// store register") evaluates truthy.
    GotoIf {
        condition: Option<Expression>,
        target_id: u32,
    },
    /// A computed jump through a table of targets, indexed by
    /// `condition`'s value.
    GotoOn {
        condition: Expression,
        target_ids: Vec<u32>,
    },
    /// A jump to whichever target's case expression matches `condition`.
    GotoCase {
        condition: Expression,
        cases: Vec<Option<Expression>>,
        target_ids: Vec<u32>,
    },
    /// A subroutine call that also passes evaluated arguments to the
    /// callee's frame.
    GosubWith { params: Vec<Expression>, target_id: u32 },
    /// A menu of text options, each with an optional guarding condition.
    Select {
        window: Expression,
        options: Vec<crate::bytecode::SelectOption>,
    },
}

/// Per-scenario playback policy resolved from the header, falling back
/// to machine-wide defaults (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioConfig {
    /// The scenario's declared text encoding.
    pub text_encoding: TextEncoding,
    /// Whether showing a message box creates an implicit savepoint.
    pub enable_message_savepoint: bool,
    /// Whether a `selcom` (menu) creates an implicit savepoint.
    pub enable_selcom_savepoint: bool,
    /// Whether reaching a previously-unseen point (seentop) creates an
    /// implicit savepoint.
    pub enable_seentop_savepoint: bool,
}

fn value_or(value: i32, default_value: bool) -> bool {
    match value {
        1 => true,
        2 => false,
        _ => default_value,
    }
}

/// A thin, cursor-oriented view over an [`Archive`].
pub struct Scriptor<'a> {
    archive: &'a Archive,
    default_config: ScenarioConfig,
}

impl<'a> Scriptor<'a> {
    /// Build a Scriptor over `archive`, using `default_config` for any
    /// savepoint flag a scenario's header leaves unset (value 0).
    pub fn new(archive: &'a Archive, default_config: ScenarioConfig) -> Self {
        Scriptor {
            archive,
            default_config,
        }
    }

    /// Position a cursor at the exact byte `loc` inside `scenario_number`.
    /// Fails if no element starts there.
    pub fn load(&self, scenario_number: u32, loc: Offset) -> Result<Cursor> {
        let scenario = self.archive.get_scenario(scenario_number)?;
        let index = scenario
            .script
            .element_map
            .keys()
            .position(|&k| k == loc)
            .ok_or_else(|| {
                Error::NotFound(format!("location {loc} in scenario {scenario_number}"))
            })?;
        Ok(Cursor {
            scenario_number,
            index,
        })
    }

    /// A cursor at the very start of `scenario_number`.
    pub fn load_start(&self, scenario_number: u32) -> Result<Cursor> {
        self.archive.get_scenario(scenario_number)?;
        Ok(Cursor::start(scenario_number))
    }

    /// Resolve `entrypoint` in `scenario_number` to a cursor at its
    /// declared location.
    pub fn load_entry(&self, scenario_number: u32, entrypoint: i32) -> Result<Cursor> {
        let loc = {
            let scenario = self.archive.get_scenario(scenario_number)?;
            scenario.script.entrypoint(entrypoint).ok_or_else(|| {
                Error::NotFound(format!(
                    "entrypoint {entrypoint} in scenario {scenario_number}"
                ))
            })?
        };
        self.load(scenario_number, loc)
    }

    /// Whether `cursor` still addresses an element (one past the last
    /// element has no next).
    pub fn has_next(&self, cursor: Cursor) -> Result<bool> {
        let scenario = self.archive.get_scenario(cursor.scenario_number)?;
        Ok(cursor.index < scenario.script.element_map.len())
    }

    /// The cursor immediately following `cursor`.
    pub fn next(&self, cursor: Cursor) -> Cursor {
        cursor.next()
    }

    /// Translate a raw `target_id` (as read off a `Goto`-family element)
    /// into a cursor within `scenario_number`.
    pub fn resolve_target(&self, scenario_number: u32, target_id: u32) -> Result<Cursor> {
        self.load(scenario_number, target_id)
    }

    /// Flatten the element at `cursor` into the closed-form instruction
    /// set the machine dispatches on.
    pub fn resolve(&self, cursor: Cursor) -> Result<Instruction> {
        let scenario = self.archive.get_scenario(cursor.scenario_number)?;
        let (_, element) = scenario
            .script
            .element_map
            .iter()
            .nth(cursor.index)
            .ok_or_else(|| Error::OutOfRange(format!("cursor {cursor} has no element")))?;
        Ok(flatten(element))
    }

    /// This scenario's resolved savepoint/encoding policy.
    pub fn scenario_config(&self, scenario_number: u32) -> Result<ScenarioConfig> {
        let scenario = self.archive.get_scenario(scenario_number)?;
        Ok(ScenarioConfig {
            text_encoding: scenario.encoding(),
            enable_message_savepoint: value_or(
                scenario.savepoint_message(),
                self.default_config.enable_message_savepoint,
            ),
            enable_selcom_savepoint: value_or(
                scenario.savepoint_selcom(),
                self.default_config.enable_selcom_savepoint,
            ),
            enable_seentop_savepoint: value_or(
                scenario.savepoint_seentop(),
                self.default_config.enable_seentop_savepoint,
            ),
        })
    }
}

fn flatten(element: &BytecodeElement) -> Instruction {
    match element {
        BytecodeElement::Comma => Instruction::Nop,
        BytecodeElement::Meta { kind, value } => match kind {
            crate::bytecode::MetaKind::Line => Instruction::Line(*value),
            crate::bytecode::MetaKind::Kidoku => Instruction::Kidoku(*value),
            crate::bytecode::MetaKind::Entrypoint(_) => Instruction::Nop,
        },
        BytecodeElement::Textout { raw } => {
            let text = crate::bytecode::unescape_textout(raw);
            if text.starts_with(&SEEN_END) {
                Instruction::End(text)
            } else {
                Instruction::Textout(text)
            }
        }
        BytecodeElement::Expression(expr) => Instruction::Expression(expr.clone()),
        BytecodeElement::Command {
            triple,
            overload,
            params,
        } => Instruction::Command {
            triple: *triple,
            overload: *overload,
            params: params.clone(),
        },
        BytecodeElement::Goto { target_id } => Instruction::Goto {
            target_id: *target_id,
        },
        BytecodeElement::GotoIf {
            condition,
            target_id,
        } => Instruction::GotoIf {
            condition: condition.clone(),
            target_id: *target_id,
        },
        BytecodeElement::GotoOn {
            condition,
            target_ids,
        } => Instruction::GotoOn {
            condition: condition.clone(),
            target_ids: target_ids.clone(),
        },
        BytecodeElement::GotoCase {
            condition,
            cases,
            target_ids,
        } => Instruction::GotoCase {
            condition: condition.clone(),
            cases: cases.clone(),
            target_ids: target_ids.clone(),
        },
        BytecodeElement::GosubWith { params, target_id } => Instruction::GosubWith {
            params: params.clone(),
            target_id: *target_id,
        },
        BytecodeElement::Select { window, options } => Instruction::Select {
            window: window.clone(),
            options: options.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_archive(scenario_body: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let mut body = Vec::new();
        for chunk in scenario_body.chunks(8) {
            let flags: u8 = (1u16 << chunk.len() as u32).wrapping_sub(1) as u8;
            body.push(flags);
            body.extend_from_slice(chunk);
        }
        let archive_size = (8 + body.len()) as u32;
        let mut framed = Vec::new();
        framed.extend_from_slice(&archive_size.to_le_bytes());
        framed.extend_from_slice(&(scenario_body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        crate::archive::FIRST_LEVEL_KEY.apply(&mut framed);

        let header_size = 10usize;
        let mut out = Vec::new();
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&(header_size as u16).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        let offset = (header_size + 8) as u32;
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(framed.len() as u32).to_le_bytes());
        out.extend_from_slice(&framed);
        let total = out.len() as u32;
        out[6..10].copy_from_slice(&total.to_le_bytes());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SEEN.TXT");
        std::fs::File::create(&path).unwrap().write_all(&out).unwrap();
        (dir, path)
    }

    fn default_config() -> ScenarioConfig {
        ScenarioConfig {
            text_encoding: TextEncoding::Cp932,
            enable_message_savepoint: true,
            enable_selcom_savepoint: true,
            enable_seentop_savepoint: true,
        }
    }

    #[test]
    fn load_and_traversal_visits_every_element_in_order() {
        let mut scenario_body = vec![0u8; crate::scenario::HEADER_SIZE];
        scenario_body[0x18] = 0;
        scenario_body.extend_from_slice(&[0x00, b',', 0x00]);
        let (_dir, path) = write_archive(&scenario_body);
        let archive = Archive::new(&path).unwrap();
        let scriptor = Scriptor::new(&archive, default_config());

        let mut cur = scriptor.load_start(0).unwrap();
        let mut seen = Vec::new();
        while scriptor.has_next(cur).unwrap() {
            seen.push(scriptor.resolve(cur).unwrap());
            cur = scriptor.next(cur);
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|i| matches!(i, Instruction::Nop)));
    }

    #[test]
    fn load_missing_location_errors() {
        let mut scenario_body = vec![0u8; crate::scenario::HEADER_SIZE];
        scenario_body[0x18] = 0;
        scenario_body.push(0x00);
        let (_dir, path) = write_archive(&scenario_body);
        let archive = Archive::new(&path).unwrap();
        let scriptor = Scriptor::new(&archive, default_config());
        assert!(matches!(scriptor.load(0, 999), Err(Error::NotFound(_))));
    }

    #[test]
    fn scenario_config_falls_back_to_default() {
        let mut scenario_body = vec![0u8; crate::scenario::HEADER_SIZE];
        scenario_body[0x18] = 0;
        scenario_body.push(0x00);
        let (_dir, path) = write_archive(&scenario_body);
        let archive = Archive::new(&path).unwrap();
        let scriptor = Scriptor::new(&archive, default_config());
        let cfg = scriptor.scenario_config(0).unwrap();
        assert!(cfg.enable_message_savepoint);
    }
}
