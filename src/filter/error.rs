//! Filter compile errors.
//!
//! Every variant carries the byte offset into the source expression where
//! the problem was detected, so callers can point at the offending spot.
//! Evaluation has no error type at all: a predicate that faults at runtime
//! simply does not match.

use thiserror::Error;

/// An error produced while compiling a filter expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    /// Malformed input: unknown character, misplaced token, bad arity.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the expression.
        offset: usize,
        /// What went wrong.
        message: String,
    },

    /// A string literal was opened but never closed.
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        offset: usize,
    },

    /// A `(` without `)`, or a `)` without `(`.
    #[error("unbalanced parenthesis at offset {offset}")]
    UnbalancedParen {
        /// Byte offset of the unmatched parenthesis.
        offset: usize,
    },

    /// A number literal that does not parse.
    #[error("invalid number at offset {offset}")]
    InvalidNumber {
        /// Byte offset where the number starts.
        offset: usize,
    },
}

impl FilterError {
    /// Byte offset into the source expression.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            FilterError::Syntax { offset, .. }
            | FilterError::UnterminatedString { offset }
            | FilterError::UnbalancedParen { offset }
            | FilterError::InvalidNumber { offset } => *offset,
        }
    }
}
