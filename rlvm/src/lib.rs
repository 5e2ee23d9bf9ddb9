//! The RLVM scenario runtime: archive loading, bytecode decode, the
//! expression evaluator, and the cooperatively-scheduled machine that
//! ties them together.
//!
//! Mirrors how `fuel-vm` sits on top of `fuel-types`: this crate owns
//! parsing and execution, `rlvm-types` owns the small `Copy` types
//! shared across the workspace. Module layout follows the pipeline a
//! scenario travels through end to end: [`archive`] opens a SEEN.TXT and
//! hands out [`scenario`] payloads through [`lzss`]; [`bytecode`] and
//! [`expr`] turn a decompressed payload into parsed elements; [`scriptor`]
//! flattens those into a closed-form instruction stream; [`machine`]
//! dispatches that stream against [`memory`]. [`gameexe`], [`assets`], and
//! [`audio`] are the configuration/asset side of a game directory, outside
//! the scenario pipeline proper.

pub mod archive;
pub mod assets;
pub mod audio;
pub mod bitstream;
pub mod bytecode;
pub mod bytes;
pub mod expr;
pub mod gameexe;
pub mod lzss;
pub mod machine;
pub mod memory;
pub mod scenario;
pub mod scriptor;

pub use archive::Archive;
pub use assets::AssetIndex;
pub use audio::AudioTable;
pub use bytecode::BytecodeElement;
pub use expr::Expression;
pub use gameexe::Gameexe;
pub use machine::{Machine, OpcodeHandler, OpcodeRegistry, TextSink};
pub use memory::Memory;
pub use scenario::{Scenario, TextEncoding};
pub use scriptor::{Instruction, Scriptor};
