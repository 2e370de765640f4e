//! Shunting-yard compiler from infix tokens to a postfix program.

use super::error::FilterError;
use super::token::{tokenize, Op, SpannedTok, Tok};

/// A literal tuple element. Tuples admit literals only; a selector or
/// sub-expression inside `[...]` is a compile error.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Literal {
    Num(f64),
    Str(Box<str>),
}

/// One postfix instruction.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Instr {
    PushNum(f64),
    PushStr(Box<str>),
    /// Push the value behind a dotted selector path, or `null`.
    PushSel(Box<[Box<str>]>),
    PushTuple(Box<[Literal]>),
    Apply(Op),
}

/// A compiled filter predicate.
///
/// Programs are immutable and cheap to share between searches; evaluation
/// needs only a small per-call value stack. See [`Program::matches`] and
/// [`Program::eval`] in this module's parent for the runtime contract.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub(crate) code: Vec<Instr>,
}

/// What the compile-time simulator knows about a stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SimKind {
    /// A literal number or string, definitely not a tuple.
    Scalar,
    /// A literal tuple.
    Tuple,
    /// A selector or an operator result; shape known only at runtime.
    Unknown,
}

/// Emits instructions while simulating the value stack they would build.
///
/// The simulator turns arity mistakes into compile errors without running
/// the VM: every `Apply` must find its operands, and the finished program
/// must net exactly one value.
#[derive(Default)]
struct Emitter {
    code: Vec<Instr>,
    sim: Vec<(SimKind, usize)>,
}

impl Emitter {
    fn push_value(&mut self, instr: Instr, kind: SimKind, pos: usize) {
        self.code.push(instr);
        self.sim.push((kind, pos));
    }

    fn apply(&mut self, op: Op, pos: usize) -> Result<(), FilterError> {
        let arity = op.arity();
        if self.sim.len() < arity {
            return Err(FilterError::Syntax {
                offset: pos,
                message: format!("missing operand for '{}'", op.symbol()),
            });
        }
        if op == Op::In {
            // The tuple requirement on the right operand is checkable now
            // for literals; selectors stay a runtime concern.
            let &(kind, operand_pos) = self.sim.last().expect("arity checked");
            if kind == SimKind::Scalar {
                return Err(FilterError::Syntax {
                    offset: operand_pos,
                    message: "right operand of 'in' must be a tuple".to_string(),
                });
            }
        }
        for _ in 0..arity {
            self.sim.pop();
        }
        self.sim.push((SimKind::Unknown, pos));
        self.code.push(Instr::Apply(op));
        Ok(())
    }
}

/// Compiles an infix filter expression into a postfix [`Program`].
///
/// # Errors
///
/// Returns a [`FilterError`] carrying the byte offset of the offending
/// token: unknown characters, unterminated strings, unbalanced
/// parentheses, malformed numbers, missing operands, non-literal tuple
/// elements, a literal non-tuple right of `in`, or an expression that does
/// not reduce to exactly one value.
pub fn compile(input: &str) -> Result<Program, FilterError> {
    let toks = tokenize(input)?;
    let mut em = Emitter::default();
    // Pending operators; `None` marks an open parenthesis.
    let mut ops: Vec<(Option<Op>, usize)> = Vec::new();

    let mut i = 0;
    while i < toks.len() {
        let SpannedTok { ref tok, pos } = toks[i];
        match tok {
            Tok::Num(n) => {
                em.push_value(Instr::PushNum(*n), SimKind::Scalar, pos);
            }
            Tok::Str(s) => {
                em.push_value(
                    Instr::PushStr(s.clone().into_boxed_str()),
                    SimKind::Scalar,
                    pos,
                );
            }
            Tok::Sel(path) => {
                let path: Box<[Box<str>]> = path
                    .iter()
                    .map(|seg| seg.clone().into_boxed_str())
                    .collect();
                em.push_value(Instr::PushSel(path), SimKind::Unknown, pos);
            }
            Tok::LBracket => {
                i = scan_tuple(&toks, i, &mut em)?;
                continue;
            }
            Tok::Op(op) => {
                while let Some(&(Some(top), top_pos)) = ops.last() {
                    let pops = top.precedence() > op.precedence()
                        || (top.precedence() == op.precedence() && !op.right_associative());
                    if !pops {
                        break;
                    }
                    ops.pop();
                    em.apply(top, top_pos)?;
                }
                ops.push((Some(*op), pos));
            }
            Tok::LParen => ops.push((None, pos)),
            Tok::RParen => loop {
                match ops.pop() {
                    Some((Some(op), op_pos)) => em.apply(op, op_pos)?,
                    Some((None, _)) => break,
                    None => return Err(FilterError::UnbalancedParen { offset: pos }),
                }
            },
            Tok::RBracket => {
                return Err(FilterError::Syntax {
                    offset: pos,
                    message: "unexpected ']'".to_string(),
                })
            }
            Tok::Comma => {
                return Err(FilterError::Syntax {
                    offset: pos,
                    message: "',' outside a tuple".to_string(),
                })
            }
        }
        i += 1;
    }

    while let Some((op, pos)) = ops.pop() {
        match op {
            Some(op) => em.apply(op, pos)?,
            None => return Err(FilterError::UnbalancedParen { offset: pos }),
        }
    }

    match em.sim.len() {
        1 => Ok(Program { code: em.code }),
        0 => Err(FilterError::Syntax {
            offset: 0,
            message: "empty expression".to_string(),
        }),
        _ => {
            let &(_, pos) = em.sim.last().expect("len > 1");
            Err(FilterError::Syntax {
                offset: pos,
                message: "expression must reduce to a single value".to_string(),
            })
        }
    }
}

/// Consumes a `[lit, lit, ...]` tuple starting at `toks[start]` (the `[`)
/// and emits it as one value. Returns the index just past the `]`.
fn scan_tuple(
    toks: &[SpannedTok],
    start: usize,
    em: &mut Emitter,
) -> Result<usize, FilterError> {
    let open_pos = toks[start].pos;
    let mut elems = Vec::new();
    let mut i = start + 1;

    // Leading `]` closes an empty tuple.
    if let Some(SpannedTok {
        tok: Tok::RBracket, ..
    }) = toks.get(i)
    {
        em.push_value(
            Instr::PushTuple(elems.into_boxed_slice()),
            SimKind::Tuple,
            open_pos,
        );
        return Ok(i + 1);
    }

    loop {
        match toks.get(i) {
            Some(SpannedTok {
                tok: Tok::Num(n), ..
            }) => elems.push(Literal::Num(*n)),
            Some(SpannedTok {
                tok: Tok::Str(s), ..
            }) => elems.push(Literal::Str(s.clone().into_boxed_str())),
            Some(SpannedTok { pos, .. }) => {
                return Err(FilterError::Syntax {
                    offset: *pos,
                    message: "tuple elements must be literals".to_string(),
                })
            }
            None => {
                return Err(FilterError::Syntax {
                    offset: open_pos,
                    message: "unterminated tuple".to_string(),
                })
            }
        }
        i += 1;

        match toks.get(i) {
            Some(SpannedTok {
                tok: Tok::Comma, ..
            }) => i += 1,
            Some(SpannedTok {
                tok: Tok::RBracket,
                ..
            }) => {
                i += 1;
                break;
            }
            Some(SpannedTok { pos, .. }) => {
                return Err(FilterError::Syntax {
                    offset: *pos,
                    message: "expected ',' or ']' in tuple".to_string(),
                })
            }
            None => {
                return Err(FilterError::Syntax {
                    offset: open_pos,
                    message: "unterminated tuple".to_string(),
                })
            }
        }
    }

    em.push_value(
        Instr::PushTuple(elems.into_boxed_slice()),
        SimKind::Tuple,
        open_pos,
    );
    Ok(i)
}
