//! Tokenizer for filter expressions.

use super::error::FilterError;

/// Binary and unary operators, in source form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Or,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Not,
}

impl Op {
    /// Precedence, lowest first. Grouping is handled by the parenthesis
    /// tokens and does not appear here.
    pub(crate) fn precedence(self) -> u8 {
        match self {
            Op::Or => 0,
            Op::And => 1,
            Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Eq | Op::Ne | Op::In => 2,
            Op::Add | Op::Sub => 3,
            Op::Mul | Op::Div | Op::Mod => 4,
            Op::Pow => 5,
            Op::Not => 6,
        }
    }

    /// `**` and unary `!` bind to the right; everything else pops on equal
    /// precedence.
    pub(crate) fn right_associative(self) -> bool {
        matches!(self, Op::Pow | Op::Not)
    }

    /// Number of stack values the operator consumes.
    pub(crate) fn arity(self) -> usize {
        if self == Op::Not {
            1
        } else {
            2
        }
    }

    /// Source spelling, for error messages.
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Op::Or => "or",
            Op::And => "and",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::In => "in",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Pow => "**",
            Op::Not => "!",
        }
    }
}

/// One lexical token.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Tok {
    Num(f64),
    Str(String),
    /// Dotted selector path, without the leading dots: `.a.b` -> `["a","b"]`.
    Sel(Vec<String>),
    Op(Op),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

/// A token plus the byte offset where it starts.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpannedTok {
    pub(crate) tok: Tok,
    pub(crate) pos: usize,
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits `input` into tokens.
///
/// The only context the tokenizer keeps is whether a *value* may start at
/// the current position: right after a value or a closing bracket a `-` is
/// the binary minus, everywhere else it signs a number literal. `&&` and
/// `||` are aliases for `and` / `or` and are matched without any trailing
/// character.
pub(crate) fn tokenize(input: &str) -> Result<Vec<SpannedTok>, FilterError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    // True where a value (number, string, selector, tuple, group) may begin.
    let mut value_ok = true;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            _ if c.is_whitespace() => {
                i += 1;
            }

            '\'' | '"' => {
                let (s, next) = scan_string(&chars, i)?;
                toks.push(SpannedTok {
                    tok: Tok::Str(s),
                    pos,
                });
                i = next;
                value_ok = false;
            }

            '.' => {
                let (path, next) = scan_selector(&chars, i)?;
                toks.push(SpannedTok {
                    tok: Tok::Sel(path),
                    pos,
                });
                i = next;
                value_ok = false;
            }

            '0'..='9' => {
                let (n, next) = scan_number(input, &chars, i)?;
                toks.push(SpannedTok {
                    tok: Tok::Num(n),
                    pos,
                });
                i = next;
                value_ok = false;
            }

            '-' if value_ok => {
                let starts_number = matches!(chars.get(i + 1), Some(&(_, d)) if d.is_ascii_digit());
                if !starts_number {
                    return Err(FilterError::Syntax {
                        offset: pos,
                        message: "expected a number after '-'".to_string(),
                    });
                }
                let (n, next) = scan_number(input, &chars, i)?;
                toks.push(SpannedTok {
                    tok: Tok::Num(n),
                    pos,
                });
                i = next;
                value_ok = false;
            }

            '(' => {
                toks.push(SpannedTok {
                    tok: Tok::LParen,
                    pos,
                });
                i += 1;
                value_ok = true;
            }
            ')' => {
                toks.push(SpannedTok {
                    tok: Tok::RParen,
                    pos,
                });
                i += 1;
                value_ok = false;
            }
            '[' => {
                toks.push(SpannedTok {
                    tok: Tok::LBracket,
                    pos,
                });
                i += 1;
                value_ok = true;
            }
            ']' => {
                toks.push(SpannedTok {
                    tok: Tok::RBracket,
                    pos,
                });
                i += 1;
                value_ok = false;
            }
            ',' => {
                toks.push(SpannedTok {
                    tok: Tok::Comma,
                    pos,
                });
                i += 1;
                value_ok = true;
            }

            _ => {
                let (op, width) = scan_operator(&chars, i, pos)?;
                toks.push(SpannedTok {
                    tok: Tok::Op(op),
                    pos,
                });
                i += width;
                value_ok = true;
            }
        }
    }

    Ok(toks)
}

/// Scans an operator starting at `i`; returns it and its width in chars.
fn scan_operator(
    chars: &[(usize, char)],
    i: usize,
    pos: usize,
) -> Result<(Op, usize), FilterError> {
    let c = chars[i].1;
    let next = chars.get(i + 1).map(|&(_, d)| d);
    let (op, width) = match (c, next) {
        ('*', Some('*')) => (Op::Pow, 2),
        ('&', Some('&')) => (Op::And, 2),
        ('|', Some('|')) => (Op::Or, 2),
        ('=', Some('=')) => (Op::Eq, 2),
        ('!', Some('=')) => (Op::Ne, 2),
        ('<', Some('=')) => (Op::Le, 2),
        ('>', Some('=')) => (Op::Ge, 2),
        ('<', _) => (Op::Lt, 1),
        ('>', _) => (Op::Gt, 1),
        ('!', _) => (Op::Not, 1),
        ('+', _) => (Op::Add, 1),
        ('-', _) => (Op::Sub, 1),
        ('*', _) => (Op::Mul, 1),
        ('/', _) => (Op::Div, 1),
        ('%', _) => (Op::Mod, 1),
        _ if c.is_ascii_alphabetic() || c == '_' => return scan_word(chars, i, pos),
        _ => {
            return Err(FilterError::Syntax {
                offset: pos,
                message: format!("unexpected character '{c}'"),
            })
        }
    };
    Ok((op, width))
}

/// Scans a word operator: `and`, `or`, `not`, `in`.
fn scan_word(chars: &[(usize, char)], i: usize, pos: usize) -> Result<(Op, usize), FilterError> {
    let mut j = i;
    let mut word = String::new();
    while let Some(&(_, d)) = chars.get(j) {
        if !is_ident(d) {
            break;
        }
        word.push(d);
        j += 1;
    }
    let op = match word.as_str() {
        "and" => Op::And,
        "or" => Op::Or,
        "not" => Op::Not,
        "in" => Op::In,
        _ => {
            return Err(FilterError::Syntax {
                offset: pos,
                message: format!("unknown keyword '{word}'"),
            })
        }
    };
    Ok((op, j - i))
}

/// Scans a quoted string with backslash escapes; returns it and the index
/// just past the closing quote.
fn scan_string(chars: &[(usize, char)], i: usize) -> Result<(String, usize), FilterError> {
    let (start, quote) = chars[i];
    let mut s = String::new();
    let mut j = i + 1;
    while let Some(&(_, d)) = chars.get(j) {
        match d {
            _ if d == quote => return Ok((s, j + 1)),
            '\\' => match chars.get(j + 1) {
                Some(&(_, esc)) => {
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    j += 2;
                }
                None => break,
            },
            _ => {
                s.push(d);
                j += 1;
            }
        }
    }
    Err(FilterError::UnterminatedString { offset: start })
}

/// Scans a selector path: `.name` or `.a.b`.
fn scan_selector(
    chars: &[(usize, char)],
    i: usize,
) -> Result<(Vec<String>, usize), FilterError> {
    let start = chars[i].0;
    let mut path = Vec::new();
    let mut j = i;
    loop {
        // chars[j] is the '.'
        j += 1;
        let mut segment = String::new();
        while let Some(&(_, d)) = chars.get(j) {
            if !is_ident(d) {
                break;
            }
            segment.push(d);
            j += 1;
        }
        if segment.is_empty() {
            return Err(FilterError::Syntax {
                offset: start,
                message: "empty selector segment".to_string(),
            });
        }
        path.push(segment);
        match chars.get(j) {
            Some(&(_, '.')) if matches!(chars.get(j + 1), Some(&(_, d)) if is_ident(d)) => {}
            _ => return Ok((path, j)),
        }
    }
}

/// Scans a number literal (optional leading `-`, optional fraction and
/// exponent); returns it and the index just past its last char.
fn scan_number(
    input: &str,
    chars: &[(usize, char)],
    i: usize,
) -> Result<(f64, usize), FilterError> {
    let start = chars[i].0;
    let mut j = i;
    if chars[j].1 == '-' {
        j += 1;
    }
    while matches!(chars.get(j), Some(&(_, d)) if d.is_ascii_digit()) {
        j += 1;
    }
    if matches!(chars.get(j), Some(&(_, '.')))
        && matches!(chars.get(j + 1), Some(&(_, d)) if d.is_ascii_digit())
    {
        j += 1;
        while matches!(chars.get(j), Some(&(_, d)) if d.is_ascii_digit()) {
            j += 1;
        }
    }
    if matches!(chars.get(j), Some(&(_, 'e' | 'E'))) {
        let mut k = j + 1;
        if matches!(chars.get(k), Some(&(_, '+' | '-'))) {
            k += 1;
        }
        if matches!(chars.get(k), Some(&(_, d)) if d.is_ascii_digit()) {
            j = k;
            while matches!(chars.get(j), Some(&(_, d)) if d.is_ascii_digit()) {
                j += 1;
            }
        }
    }

    let end = chars.get(j).map_or(input.len(), |&(b, _)| b);
    input[start..end]
        .parse::<f64>()
        .map(|n| (n, j))
        .map_err(|_| FilterError::InvalidNumber { offset: start })
}
