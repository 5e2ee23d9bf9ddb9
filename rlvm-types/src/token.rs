//! The Gameexe leaf value type.

use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide counter handing out surrogate ids to [`Token::Str`]
/// values, so that `to_int()` on a string token returns something stable
/// for the lifetime of the process. Per spec.md Design Note 9, these ids
/// are not persisted and need not be stable across runs.
static NEXT_STRING_ID: AtomicU32 = AtomicU32::new(0);

/// A single Gameexe value: either an integer or a string carrying a
/// unique surrogate id for its `to_int()` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An integer literal.
    Int(i32),
    /// A string literal, with a stable-for-this-process surrogate id.
    Str { value: String, id: u32 },
}

impl Token {
    /// Build an integer token.
    pub fn int(v: i32) -> Self {
        Token::Int(v)
    }

    /// Build a string token, allocating the next surrogate id.
    pub fn string(value: impl Into<String>) -> Self {
        let id = NEXT_STRING_ID.fetch_add(1, Ordering::Relaxed);
        Token::Str {
            value: value.into(),
            id,
        }
    }

    /// The integer view: the literal value for `Int`, or the surrogate id
    /// for `Str`.
    pub fn to_int(&self) -> i32 {
        match self {
            Token::Int(v) => *v,
            Token::Str { id, .. } => *id as i32,
        }
    }

    /// The string view: the decimal rendering for `Int`, or the literal
    /// value for `Str`.
    pub fn to_string_value(&self) -> String {
        match self {
            Token::Int(v) => v.to_string(),
            Token::Str { value, .. } => value.clone(),
        }
    }
}
