//! The bytecode element model.
//!
//! Grounded on `original_source/src/libreallive/elements/{bytecode,meta,
//! textout,expression,command}.h(.cc)`: that hierarchy is a dozen-odd
//! `BytecodeElement` subclasses dispatched through virtual calls. Here
//! they collapse into one tagged [`BytecodeElement`] enum, per the
//! "tagged variants, not RTTI" design note — each variant carries
//! exactly the fields its original subclass stored.

use crate::expr::Expression;
use rlvm_types::OpcodeTriple;

/// What kind of line marker a [`BytecodeElement::Meta`] represents.
/// Distinguished, per `MetaElement::MetaElement`, by looking the raw
/// kidoku-table value up: `>= 1_000_000` means "this is secretly an
/// entry point marker", anything else is a plain kidoku counter (or, if
/// there is no kidoku table at all — a `\n`-introduced meta — a source
/// line number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    /// A `\n` source-line marker.
    Line,
    /// A `@`/`!`-introduced kidoku counter.
    Kidoku,
    /// A kidoku counter whose table value decodes to an entry point.
    Entrypoint(i32),
}

/// One option of a `Select` command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectOption {
    /// The raw, unparsed condition span (including its parens), if any.
    pub condition: Vec<u8>,
    /// The option's display text (still `\`-escaped; see
    /// [`crate::bytecode::parser::unescape_textout`]).
    pub text: String,
    /// The line number following the text.
    pub line: i16,
}

/// A single parsed bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum BytecodeElement {
    /// A bare `,` or NUL separator with no effect of its own.
    Comma,
    /// A `\n`/`@`/`!`-introduced marker: a line number, a kidoku counter,
    /// or (if the kidoku table says so) an entry point.
    Meta { kind: MetaKind, value: i16 },
    /// A run of display text, still containing its quoting/escapes.
    Textout { raw: Vec<u8> },
    /// A `$`-led standalone expression statement (almost always an
    /// assignment).
    Expression(Expression),
    /// A `#`-led opcode call with no special control-flow meaning.
    Command {
        triple: OpcodeTriple,
        overload: u8,
        params: Vec<Expression>,
    },
    /// An unconditional jump to a kidoku id.
    Goto { target_id: u32 },
    /// A conditional jump: jump to `target_id` iff `condition` (absent
    /// meaning "use the store register") is true.
    GotoIf {
        condition: Option<Expression>,
        target_id: u32,
    },
    /// A computed jump through a table of targets indexed by
    /// `condition`'s value.
    GotoOn {
        condition: Expression,
        target_ids: Vec<u32>,
    },
    /// A jump to the target whose guarding case expression matches
    /// `condition`'s value; an empty case (`()`) matches anything not
    /// otherwise matched.
    GotoCase {
        condition: Expression,
        cases: Vec<Option<Expression>>,
        target_ids: Vec<u32>,
    },
    /// A subroutine call that also pushes parameters into the callee's
    /// frame.
    GosubWith {
        params: Vec<Expression>,
        target_id: u32,
    },
    /// A menu of text options, each with an optional guarding condition.
    Select {
        window: Expression,
        options: Vec<SelectOption>,
    },
}

impl BytecodeElement {
    /// The kidoku ids this element can transfer control to, in the order
    /// a `Goto*`/`GosubWith`'s pointer table lists them.
    pub fn target_ids(&self) -> Vec<u32> {
        match self {
            BytecodeElement::Goto { target_id } | BytecodeElement::GosubWith { target_id, .. } => {
                vec![*target_id]
            }
            BytecodeElement::GotoIf { target_id, .. } => vec![*target_id],
            BytecodeElement::GotoOn { target_ids, .. } => target_ids.clone(),
            BytecodeElement::GotoCase { target_ids, .. } => target_ids.clone(),
            _ => Vec::new(),
        }
    }

    /// The entry point index this element declares, if it is a
    /// [`MetaKind::Entrypoint`] meta element.
    pub fn entrypoint(&self) -> Option<i32> {
        match self {
            BytecodeElement::Meta {
                kind: MetaKind::Entrypoint(idx),
                ..
            } => Some(*idx),
            _ => None,
        }
    }
}
