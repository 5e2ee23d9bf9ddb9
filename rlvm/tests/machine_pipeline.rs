//! End-to-end pipeline tests: a real archive on disk, decompressed and
//! XOR-decoded through [`rlvm::Archive`], flattened through
//! [`rlvm::Scriptor`], and driven by a [`rlvm::Machine`] against a
//! registered opcode handler. Colocated unit tests already cover each
//! stage (LZSS framing, header parsing, element parsing, memory
//! snapshotting) in isolation; these exercise the seams between them.

use std::io::Write;
use std::rc::Rc;

use rlvm::archive::FIRST_LEVEL_KEY;
use rlvm::machine::Machine;
use rlvm::scriptor::{Instruction, ScenarioConfig, Scriptor};
use rlvm::{Archive, Expression, OpcodeHandler, OpcodeRegistry, TextEncoding};
use rlvm_types::{OpcodeTriple, Result};

const ARCHIVE_HEADER_LEN: usize = 10;
const TOC_RECORD_SIZE: usize = 8;
const HEADER_SIZE: usize = rlvm::scenario::HEADER_SIZE;

const SEEN_END: [u8; 14] = [
    0x82, 0x72, 0x82, 0x85, 0x82, 0x85, 0x82, 0x8e, 0x82, 0x64, 0x82, 0x8e, 0x82, 0x84,
];

/// Mirrors `archive.rs`'s own test helper of the same name: an all-literal
/// LZSS frame (one flag byte per up-to-8 literal bytes), wrapped in the
/// `{archive_size, plain_size}` header and run through the first-stage
/// XOR key.
fn xor_lzss_literal_frame(plain: &[u8]) -> Vec<u8> {
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

/// Mirrors `archive.rs`'s own `build_archive` helper: a
/// `{count, record_size, header_size, total_size}` table-of-contents
/// header followed by `{offset, length}` records, then the scenario
/// bodies themselves.
fn build_archive(scenarios: &[Vec<u8>]) -> Vec<u8> {
    let header_size = ARCHIVE_HEADER_LEN;
    let toc_size = scenarios.len() * TOC_RECORD_SIZE;
    let mut out = Vec::new();
    out.extend_from_slice(&(scenarios.len() as u16).to_le_bytes());
    out.extend_from_slice(&(TOC_RECORD_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(header_size as u16).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
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

fn default_scenario_config() -> ScenarioConfig {
    ScenarioConfig {
        text_encoding: TextEncoding::Cp932,
        enable_message_savepoint: true,
        enable_selcom_savepoint: true,
        enable_seentop_savepoint: true,
    }
}

fn write_archive(scenarios: &[Vec<u8>]) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SEEN.TXT");
    let framed: Vec<Vec<u8>> = scenarios.iter().map(|s| xor_lzss_literal_frame(s)).collect();
    let archive_bytes = build_archive(&framed);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&archive_bytes)
        .unwrap();
    (dir, path)
}

const FARCALL_TRIPLE: OpcodeTriple = OpcodeTriple {
    type_: 10,
    module: 20,
    opcode: 30,
};

struct FarcallToScenario1;

impl OpcodeHandler for FarcallToScenario1 {
    fn name(&self) -> &str {
        "farcall_to_scenario1"
    }

    fn call(&self, machine: &mut Machine<'_>, _overload: u8, _params: &[Expression]) -> Result<()> {
        machine.farcall(1, 0)
    }
}

/// Scenario 0: header plus a single 8-byte, no-argument `Command` element
/// (`#<type><module><opcode_lo><opcode_hi><argc_lo><argc_hi><overload>`,
/// see `bytecode::parser::parse_generic_function`) matching
/// [`FARCALL_TRIPLE`].
fn scenario_zero_body() -> Vec<u8> {
    let mut body = vec![0u8; HEADER_SIZE];
    body.push(b'#');
    body.push(FARCALL_TRIPLE.type_);
    body.push(FARCALL_TRIPLE.module);
    body.extend_from_slice(&FARCALL_TRIPLE.opcode.to_le_bytes());
    body.extend_from_slice(&0u16.to_le_bytes()); // argc
    body.push(0); // overload
    body
}

/// Scenario 1: declares entrypoint 0 via a kidoku table with one entry
/// (`1_000_000`, the entrypoint threshold from `rlvm_types::EntryPoint`),
/// pointed at by the `@`-meta element at the start of the bytecode; the
/// entrypoint resolves to the `SeenEnd` sentinel textout immediately
/// after it, which the machine reads as `Instruction::End`.
fn scenario_one_body() -> Vec<u8> {
    let bytecode_len = 3 + SEEN_END.len();
    let kidoku_table_offset = (HEADER_SIZE + bytecode_len) as u32;

    let mut header = vec![0u8; HEADER_SIZE];
    header[0x1c..0x20].copy_from_slice(&kidoku_table_offset.to_le_bytes());
    header[0x20..0x24].copy_from_slice(&1u32.to_le_bytes());

    let mut body = header;
    body.push(b'@');
    body.extend_from_slice(&0u16.to_le_bytes());
    body.extend_from_slice(&SEEN_END);
    body.extend_from_slice(&1_000_000u32.to_le_bytes());
    body
}

#[test]
fn farcall_through_a_registered_opcode_reaches_the_callee_scenario_and_halts() {
    let (_dir, path) = write_archive(&[scenario_zero_body(), scenario_one_body()]);
    let archive = Archive::new(&path).unwrap();
    let scriptor = Scriptor::new(&archive, default_scenario_config());

    let mut registry = OpcodeRegistry::new();
    registry.register(FARCALL_TRIPLE, 0, Box::new(FarcallToScenario1));

    let mut machine = Machine::new(scriptor, Rc::new(registry), 0).unwrap();

    let mut steps = 0;
    while !machine.halted() {
        machine.step().unwrap();
        steps += 1;
        assert!(steps < 100, "machine should halt long before this many ticks");
    }

    assert_eq!(machine.current_scenario(), 1);
}

/// A scenario mixing every element family the flattener distinguishes
/// (`Comma`, `Line`, `Textout`, `Command`, the `SeenEnd` sentinel), laid
/// out at non-contiguous offsets, verifies the archive-to-scriptor path
/// preserves both element order and exact offsets end to end.
#[test]
fn full_archive_decode_preserves_element_order_and_offsets() {
    let triple = OpcodeTriple {
        type_: 10,
        module: 20,
        opcode: 31,
    };

    let mut bytecode = Vec::new();
    bytecode.push(0x00); // offset 0: Comma
    bytecode.push(b'\n'); // offset 1: Line(0)
    bytecode.extend_from_slice(&0i16.to_le_bytes());
    bytecode.extend_from_slice(b"hello"); // offset 4: Textout("hello")
    bytecode.push(0x00); // offset 9: Comma
    bytecode.push(b'#'); // offset 10: Command
    bytecode.push(triple.type_);
    bytecode.push(triple.module);
    bytecode.extend_from_slice(&triple.opcode.to_le_bytes());
    bytecode.extend_from_slice(&0u16.to_le_bytes());
    bytecode.push(0);
    bytecode.extend_from_slice(&SEEN_END); // offset 18: End

    let mut body = vec![0u8; HEADER_SIZE];
    body.extend_from_slice(&bytecode);

    let (_dir, path) = write_archive(&[body]);
    let archive = Archive::new(&path).unwrap();
    let scriptor = Scriptor::new(&archive, default_scenario_config());

    let mut cursor = scriptor.load_start(0).unwrap();
    let mut seen = Vec::new();
    while scriptor.has_next(cursor).unwrap() {
        seen.push((cursor.index, scriptor.resolve(cursor).unwrap()));
        cursor = scriptor.next(cursor);
    }

    let indices: Vec<usize> = seen.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);

    let instructions: Vec<Instruction> = seen.into_iter().map(|(_, i)| i).collect();
    assert_eq!(
        instructions,
        vec![
            Instruction::Nop,
            Instruction::Line(0),
            Instruction::Textout(b"hello".to_vec()),
            Instruction::Nop,
            Instruction::Command {
                triple,
                overload: 0,
                params: vec![],
            },
            Instruction::End(SEEN_END.to_vec()),
        ]
    );
}
