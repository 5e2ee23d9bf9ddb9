//! The expression tree produced by parsing bytecode operands.
//!
//! Grounded on `original_source/src/libreallive/expression.h` and
//! `expression.cpp`'s `ExpressionFactory`/`IExpression` hierarchy. That
//! hierarchy is virtual dispatch over a handful of concrete leaf/branch
//! types; here it collapses into one tagged [`Expression`] enum, per the
//! "tagged variants, not RTTI" design note.

use std::fmt;

use rlvm_types::IntBankRef;

/// A single node of a parsed expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// The machine's scratch accumulator register (`$c8` in bytecode).
    StoreRegister,
    /// A literal integer.
    IntConstant(i32),
    /// A literal string.
    StringConstant(String),
    /// An indexed memory cell: `type_tag[location]`.
    MemoryReference {
        type_tag: u8,
        location: Box<Expression>,
    },
    /// A prefix operator, currently only unary negation (`op == 0x01`).
    Unary { op: u8, operand: Box<Expression> },
    /// An infix operator. `op` is the raw bytecode operator byte and
    /// covers arithmetic, comparison, boolean, and assignment forms (see
    /// [`op_name`]).
    Binary {
        op: u8,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    /// A parenthesised comma list, used for compound parameter types.
    Complex(Vec<Expression>),
    /// A tagged compound parameter (the `a<tag>(...)` bytecode form).
    Special { tag: i32, pieces: Vec<Expression> },
}

impl Expression {
    /// Whether this expression addresses a memory cell (directly, or via
    /// the store register).
    pub fn is_memory_reference(&self) -> bool {
        matches!(self, Expression::MemoryReference { .. } | Expression::StoreRegister)
    }

    /// A human-readable rendering matching the shape of
    /// `IExpression::GetDebugString` (spec.md §8 scenario 6 fixes a
    /// precise example for this).
    pub fn debug_string(&self) -> String {
        match self {
            Expression::StoreRegister => "<store_reg>".to_string(),
            Expression::IntConstant(v) => v.to_string(),
            Expression::StringConstant(s) => format!("\"{s}\""),
            Expression::MemoryReference { type_tag, location } => {
                let bank = IntBankRef::from_tag(*type_tag)
                    .map(|r| r.debug_name().to_string())
                    .unwrap_or_else(|| type_tag.to_string());
                format!("{bank}[{}]", location.debug_string())
            }
            Expression::Unary { op, operand } => {
                format!("{}{}", op_name(*op), operand.debug_string())
            }
            Expression::Binary { op, lhs, rhs } => {
                format!("{} {} {}", lhs.debug_string(), op_name(*op), rhs.debug_string())
            }
            Expression::Complex(pieces) => {
                let inner: Vec<String> = pieces.iter().map(Expression::debug_string).collect();
                format!("({})", inner.join(", "))
            }
            Expression::Special { tag, pieces } => {
                let inner: Vec<String> = pieces.iter().map(Expression::debug_string).collect();
                format!("a<{tag}>({})", inner.join(", "))
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

/// Render a raw bytecode operator byte the way `Op::ToString` does.
/// Unknown operators render as `"???"`, matching the original's
/// `default:` case rather than panicking.
pub fn op_name(op: u8) -> &'static str {
    match op {
        0x00 => "+",
        0x01 => "-",
        0x02 => "*",
        0x03 => "/",
        0x04 => "%",
        0x05 => "&",
        0x06 => "|",
        0x07 => "^",
        0x08 => "<<",
        0x09 => ">>",
        0x14 => "+=",
        0x15 => "-=",
        0x16 => "*=",
        0x17 => "/=",
        0x18 => "%=",
        0x19 => "&=",
        0x1a => "|=",
        0x1b => "^=",
        0x1c => "<<=",
        0x1d => ">>=",
        0x1e => "=",
        0x28 => "==",
        0x29 => "!=",
        0x2a => "<=",
        0x2b => "<",
        0x2c => ">=",
        0x2d => ">",
        0x3c => "&&",
        0x3d => "||",
        _ => "???",
    }
}

/// Whether `op` is one of the "hi-prec" arithmetic operators
/// (`0x02..=0x09`, or the assignment-form `0x16..=0x1d`).
pub fn is_hi_prec_arithmetic(op: u8) -> bool {
    (0x02..=0x09).contains(&op)
}

/// Whether `op` is a "lo-prec" arithmetic operator (plain `+`/`-`).
pub fn is_lo_prec_arithmetic(op: u8) -> bool {
    op == 0x00 || op == 0x01
}

/// Whether `op` is a condition (comparison) operator.
pub fn is_condition(op: u8) -> bool {
    (0x28..=0x2d).contains(&op)
}

/// Whether `op` is a valid assignment operator for `GetAssignment`.
pub fn is_assignment(op: u8) -> bool {
    (0x14..=0x24).contains(&op)
}
