//! Postfix VM for compiled filter programs.

use std::cmp::Ordering;

use serde_json::Value as Json;

use super::compile::{Instr, Literal, Program};
use super::token::Op;

/// A runtime value on the VM stack.
#[derive(Clone, Debug, PartialEq)]
enum Value {
    Num(f64),
    Str(String),
    Null,
    Tuple(Vec<Value>),
}

impl Program {
    /// Evaluates the program against a JSON attribute string.
    ///
    /// Invalid JSON is a silent no-match: hybrid search treats a node with
    /// broken attributes as filtered out, never as an error.
    #[must_use]
    pub fn matches(&self, attributes: &str) -> bool {
        match serde_json::from_str::<Json>(attributes) {
            Ok(json) => self.eval(&json),
            Err(_) => false,
        }
    }

    /// Evaluates the program against parsed JSON attributes.
    ///
    /// The final stack value is coerced to a boolean: a non-zero number or
    /// a non-empty string or tuple is true; `null` and `0` are false.
    /// Passing `Json::Null` stands in for a node with no attributes:
    /// selectors all resolve to `null` but constant programs still run.
    #[must_use]
    pub fn eval(&self, attributes: &Json) -> bool {
        self.run(attributes).is_some_and(|v| truthy(&v))
    }

    /// Runs the VM. `None` only on stack underflow, which the compile-time
    /// depth simulator rules out for programs built by [`super::compile`].
    fn run(&self, attributes: &Json) -> Option<Value> {
        let mut stack: Vec<Value> = Vec::with_capacity(8);
        for instr in &self.code {
            match instr {
                Instr::PushNum(n) => stack.push(Value::Num(*n)),
                Instr::PushStr(s) => stack.push(Value::Str(s.to_string())),
                Instr::PushSel(path) => stack.push(resolve(path, attributes)),
                Instr::PushTuple(elems) => {
                    stack.push(Value::Tuple(elems.iter().map(literal_value).collect()));
                }
                Instr::Apply(Op::Not) => {
                    let operand = stack.pop()?;
                    stack.push(bool_value(!truthy(&operand)));
                }
                Instr::Apply(op) => {
                    let rhs = stack.pop()?;
                    let lhs = stack.pop()?;
                    stack.push(apply_binary(*op, &lhs, &rhs));
                }
            }
        }
        stack.pop()
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Num(n) => Value::Num(*n),
        Literal::Str(s) => Value::Str(s.to_string()),
    }
}

/// Resolves a dotted selector path against the attribute object.
/// Any missing key or non-object intermediate yields `null`.
fn resolve(path: &[Box<str>], attributes: &Json) -> Value {
    let mut current = attributes;
    for segment in path {
        match current {
            Json::Object(map) => match map.get(segment.as_ref()) {
                Some(next) => current = next,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    json_value(current)
}

/// Converts resolved JSON into a VM value. Booleans become 0/1; arrays
/// become tuples of scalars; objects (and anything nested deeper) are
/// opaque and resolve to `null`.
fn json_value(json: &Json) -> Value {
    match json {
        Json::Null | Json::Object(_) => Value::Null,
        Json::Bool(b) => bool_value(*b),
        Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Num),
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::Tuple(items.iter().map(json_scalar).collect()),
    }
}

fn json_scalar(json: &Json) -> Value {
    match json {
        Json::Null | Json::Object(_) | Json::Array(_) => Value::Null,
        Json::Bool(b) => bool_value(*b),
        Json::Number(n) => n.as_f64().map_or(Value::Null, Value::Num),
        Json::String(s) => Value::Str(s.clone()),
    }
}

fn bool_value(b: bool) -> Value {
    Value::Num(if b { 1.0 } else { 0.0 })
}

/// Truthiness: non-zero finite numbers, non-empty strings and tuples.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Tuple(items) => !items.is_empty(),
        Value::Null => false,
    }
}

/// Equality across equal types; anything else is indeterminate.
fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => Some(x == y),
        (Value::Str(x), Value::Str(y)) => Some(x == y),
        _ => None,
    }
}

fn values_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Numeric arithmetic; `null` propagates, non-numbers and non-finite
/// results collapse to `null`.
fn arith(a: &Value, b: &Value, f: impl FnOnce(f64, f64) -> f64) -> Value {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => {
            let r = f(*x, *y);
            if r.is_finite() {
                Value::Num(r)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

fn comparison(a: &Value, b: &Value, pred: impl FnOnce(Ordering) -> bool) -> Value {
    values_ordering(a, b).map_or(Value::Null, |o| bool_value(pred(o)))
}

fn membership(needle: &Value, haystack: &Value) -> Value {
    match haystack {
        Value::Tuple(items) => {
            if *needle == Value::Null {
                return Value::Null;
            }
            bool_value(
                items
                    .iter()
                    .any(|item| values_equal(needle, item) == Some(true)),
            )
        }
        _ => Value::Null,
    }
}

fn apply_binary(op: Op, lhs: &Value, rhs: &Value) -> Value {
    match op {
        Op::Or => bool_value(truthy(lhs) || truthy(rhs)),
        Op::And => bool_value(truthy(lhs) && truthy(rhs)),
        Op::Eq => values_equal(lhs, rhs).map_or(Value::Null, bool_value),
        Op::Ne => values_equal(lhs, rhs).map_or(Value::Null, |e| bool_value(!e)),
        Op::Lt => comparison(lhs, rhs, |o| o == Ordering::Less),
        Op::Le => comparison(lhs, rhs, |o| o != Ordering::Greater),
        Op::Gt => comparison(lhs, rhs, |o| o == Ordering::Greater),
        Op::Ge => comparison(lhs, rhs, |o| o != Ordering::Less),
        Op::In => membership(lhs, rhs),
        Op::Add => arith(lhs, rhs, |x, y| x + y),
        Op::Sub => arith(lhs, rhs, |x, y| x - y),
        Op::Mul => arith(lhs, rhs, |x, y| x * y),
        Op::Div => arith(lhs, rhs, |x, y| x / y),
        Op::Mod => arith(lhs, rhs, |x, y| x % y),
        Op::Pow => arith(lhs, rhs, f64::powf),
        Op::Not => unreachable!("unary operator handled by the VM loop"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::compile::compile;
    use serde_json::json;

    #[test]
    fn constant_arithmetic_is_truthy() {
        let p = compile("(5+2)*3").unwrap();
        assert!(p.eval(&json!({})));
        assert!(p.eval(&serde_json::Value::Null));
    }

    #[test]
    fn selectors_resolve_and_compare() {
        let p = compile(".year > 1950 and .genre == 'jazz'").unwrap();
        assert!(p.eval(&json!({"year": 1970, "genre": "jazz"})));
        assert!(!p.eval(&json!({"year": 1940, "genre": "jazz"})));
        assert!(!p.eval(&json!({"year": 1970, "genre": "rock"})));
        assert!(!p.eval(&json!({})));
    }

    #[test]
    fn dotted_paths_walk_nested_objects() {
        let p = compile(".a.b == 7").unwrap();
        assert!(p.eval(&json!({"a": {"b": 7}})));
        assert!(!p.eval(&json!({"a": {"c": 7}})));
        assert!(!p.eval(&json!({"a": 3})));
    }

    #[test]
    fn membership_uses_equality() {
        assert!(compile("1 in [1,2,3]").unwrap().eval(&json!({})));
        assert!(!compile("'x' in [1,2,3]").unwrap().eval(&json!({})));
        assert!(compile("'b' in ['a','b']").unwrap().eval(&json!({})));
    }

    #[test]
    fn membership_against_selector_array() {
        let p = compile("'jazz' in .genres").unwrap();
        assert!(p.eval(&json!({"genres": ["rock", "jazz"]})));
        assert!(!p.eval(&json!({"genres": ["rock"]})));
        // Selector resolving to a non-tuple is a runtime no-match.
        assert!(!p.eval(&json!({"genres": 5})));
        assert!(!p.eval(&json!({})));
    }

    #[test]
    fn null_is_falsy_and_not_null_is_true() {
        assert!(compile("not .missing").unwrap().eval(&json!({})));
        assert!(!compile(".missing").unwrap().eval(&json!({})));
        assert!(compile("!0").unwrap().eval(&json!({})));
    }

    #[test]
    fn null_poisons_arithmetic() {
        let p = compile(".missing + 1 == 1").unwrap();
        assert!(!p.eval(&json!({})));
    }

    #[test]
    fn division_by_zero_is_a_no_match() {
        assert!(!compile("1 / 0").unwrap().eval(&json!({})));
        assert!(!compile("1 % 0 == 0").unwrap().eval(&json!({})));
    }

    #[test]
    fn booleans_coerce_to_numbers() {
        let p = compile(".active == 1").unwrap();
        assert!(p.eval(&json!({"active": true})));
        assert!(!p.eval(&json!({"active": false})));
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        assert!(compile("'apple' < 'banana'").unwrap().eval(&json!({})));
        assert!(!compile("'b' <= 'a'").unwrap().eval(&json!({})));
    }

    #[test]
    fn cross_type_comparison_is_indeterminate() {
        assert!(!compile("1 == 'one'").unwrap().eval(&json!({})));
        assert!(!compile("1 != 'one'").unwrap().eval(&json!({})));
        assert!(!compile("'a' < 1").unwrap().eval(&json!({})));
    }

    #[test]
    fn pow_and_mod() {
        assert!(compile("2 ** 10 == 1024").unwrap().eval(&json!({})));
        assert!(compile("7 % 3 == 1").unwrap().eval(&json!({})));
        assert!(compile("2 ** 3 ** 2 == 512").unwrap().eval(&json!({})));
    }

    #[test]
    fn matches_swallows_invalid_json() {
        let p = compile(".year > 1950").unwrap();
        assert!(!p.matches("not json at all"));
        assert!(!p.matches(""));
        assert!(p.matches(r#"{"year": 2000}"#));
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let p = compile(".x * 3 > 10 or .y == 'z'").unwrap();
        let attrs = json!({"x": 4, "y": "q"});
        let first = p.eval(&attrs);
        for _ in 0..10 {
            assert_eq!(p.eval(&attrs), first);
        }
    }
}
