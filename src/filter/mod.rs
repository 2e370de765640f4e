//! Filter expression compiler and evaluator.
//!
//! Similarity queries can be restricted by a predicate over each node's
//! JSON attributes. The predicate is written in a small infix language
//! (`.year > 1950 and .genre == 'jazz'`), compiled once into a postfix
//! [`Program`], and evaluated per candidate during filtered search.
//!
//! # Pipeline
//!
//! - **Tokenizer (`token`)**: walks the expression left to right, producing
//!   numbers, strings, `.dotted.selectors` and operators, each carrying its
//!   byte offset. `-` is a sign exactly where a value may start.
//! - **Compiler (`compile`)**: Dijkstra's shunting-yard, emitting values
//!   directly and ordering operators by precedence. A stack-depth simulator
//!   validates arity at compile time: a program is rejected unless it nets
//!   exactly one value, and a literal non-tuple on the right of `in` is a
//!   compile error at that literal's offset.
//! - **VM (`eval`)**: a typed postfix machine over
//!   `number | string | null | tuple`. Selectors resolve against the
//!   candidate's JSON; a missing key yields `null`, `null` is falsy, and
//!   every runtime fault is a silent no-match, never an error.
//!
//! # Operators
//!
//! Lowest precedence first: `or`/`||`; `and`/`&&`; `<
//! <= > >= == != in`; `+ -`; `* / %`; `**` (right-associative); unary
//! `!`/`not`; parentheses. Tuple literals `[1, 2, 'x']` are the right
//! operand of `in`.
//!
//! # Example
//!
//! ```rust
//! use quiver::filter::compile;
//!
//! let program = compile(".year > 1950 and .genre == 'jazz'").unwrap();
//! assert!(program.matches(r#"{"year":1970,"genre":"jazz"}"#));
//! assert!(!program.matches(r#"{"year":1940,"genre":"jazz"}"#));
//! assert!(!program.matches("{}"));
//! ```

mod compile;
mod error;
mod eval;
mod token;

pub use compile::{compile, Program};
pub use error::FilterError;
