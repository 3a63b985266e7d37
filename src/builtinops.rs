//! Reserved operator vocabulary and its primitive implementations.
//!
//! Every word of the operator vocabulary has exactly one [`BuiltinOp`] entry, so
//! the analyzer can classify a token as an operator by a single registry lookup.
//! Entries come in three kinds:
//!
//! - **Primitives**: all arguments are evaluated left to right, then the function
//!   runs on the collected values (e.g. `+`, `<`, `display`, `car`)
//! - **Special forms**: the evaluator takes the argument subtrees raw and decides
//!   what to evaluate (`lambda`, `if`)
//! - **Reserved**: part of the vocabulary, but applying them is an
//!   `Unimplemented` error (`def`, `let`, `import`, ...)
//!
//! Arity is validated when the operator is dispatched, before any argument is
//! evaluated.
//!
//! ## Strictness
//!
//! - Arithmetic and comparisons reject anything but numbers
//! - `not`, `and`, `or` reject anything but booleans
//! - `/` and `%` reject a zero divisor instead of producing infinities
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the [`PrimitiveFn`] signature
//! 2. **Add it to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::ast::Value;
use crate::{Error, InterpreterErrorKind};

/// Canonical primitive signature. `out` is the interpreter's `display` sink.
pub type PrimitiveFn = fn(args: &[Value], out: &mut dyn Write) -> Result<Value, Error>;

/// Forms the evaluator implements itself because they control argument evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Lambda,
    If,
}

/// How an operator is applied
#[derive(Clone, Copy)]
pub enum OpKind {
    Primitive(PrimitiveFn),
    SpecialForm(SpecialForm),
    /// In the vocabulary, but without an implementation
    Reserved,
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Primitive(_) => write!(f, "Primitive(<fn>)"),
            OpKind::SpecialForm(form) => write!(f, "SpecialForm({form:?})"),
            OpKind::Reserved => write!(f, "Reserved"),
        }
    }
}

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive on both ends
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok { Ok(()) } else { Err(Error::arity(self, got)) }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Definition of a reserved operator
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The operator's spelling in source text
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Argument helpers
//

fn number(op: &str, value: &Value) -> Result<f64, Error> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(Error::type_error(format!(
            "{op} expects numbers, got {}",
            other.type_atom()
        ))),
    }
}

fn numbers(op: &str, args: &[Value]) -> Result<Vec<f64>, Error> {
    args.iter().map(|v| number(op, v)).collect()
}

fn boolean(op: &str, value: &Value) -> Result<bool, Error> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(Error::type_error(format!(
            "{op} expects booleans, got {}",
            other.type_atom()
        ))),
    }
}

fn list<'a>(op: &str, value: &'a Value) -> Result<&'a [Value], Error> {
    match value {
        Value::List(items) => Ok(&items[..]),
        other => Err(Error::type_error(format!(
            "{op} expects a list, got {}",
            other.type_atom()
        ))),
    }
}

fn non_zero(op: &str, divisor: f64) -> Result<f64, Error> {
    if divisor == 0.0 {
        Err(Error::interpreter(
            InterpreterErrorKind::DivisionByZero,
            format!("{op} by zero"),
        ))
    } else {
        Ok(divisor)
    }
}

fn exactly<const N: usize>(args: &[Value]) -> Result<&[Value; N], Error> {
    args.try_into().map_err(|_| Error::arity(N, args.len()))
}

//
// Builtin Function Implementations
//

fn builtin_add(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    Ok(Value::Number(numbers("+", args)?.into_iter().sum()))
}

fn builtin_sub(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let nums = numbers("-", args)?;
    let Some((&first, rest)) = nums.split_first() else {
        return Err(Error::arity(Arity::AtLeast(1), 0));
    };
    if rest.is_empty() {
        return Ok(Value::Number(-first));
    }
    Ok(Value::Number(rest.iter().fold(first, |acc, n| acc - n)))
}

fn builtin_mul(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    Ok(Value::Number(numbers("*", args)?.into_iter().product()))
}

fn builtin_div(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let nums = numbers("/", args)?;
    let Some((&first, rest)) = nums.split_first() else {
        return Err(Error::arity(Arity::AtLeast(1), 0));
    };
    if rest.is_empty() {
        return Ok(Value::Number(1.0 / non_zero("/", first)?));
    }
    let mut result = first;
    for &n in rest {
        result /= non_zero("/", n)?;
    }
    Ok(Value::Number(result))
}

fn builtin_rem(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [a, b] = exactly::<2>(args)?;
    let (a, b) = (number("%", a)?, number("%", b)?);
    Ok(Value::Number(a % non_zero("%", b)?))
}

macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
            let [a, b] = exactly::<2>(args)?;
            Ok(Value::Bool(number($op_str, a)? $op number($op_str, b)?))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_eq, ==, "eq");

fn builtin_not(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [b] = exactly::<1>(args)?;
    Ok(Value::Bool(!boolean("not", b)?))
}

fn builtin_and(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let mut result = true;
    for arg in args {
        result &= boolean("and", arg)?;
    }
    Ok(Value::Bool(result))
}

fn builtin_or(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let mut result = false;
    for arg in args {
        result |= boolean("or", arg)?;
    }
    Ok(Value::Bool(result))
}

fn builtin_car(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [items] = exactly::<1>(args)?;
    match list("car", items)?.first() {
        Some(first) => Ok(first.clone()),
        None => Err(Error::type_error("car of empty list")),
    }
}

fn builtin_cdr(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [items] = exactly::<1>(args)?;
    match list("cdr", items)?.split_first() {
        Some((_, rest)) => Ok(Value::List(Rc::new(rest.to_vec()))),
        None => Err(Error::type_error("cdr of empty list")),
    }
}

fn builtin_cons(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [head, tail] = exactly::<2>(args)?;
    let tail = list("cons", tail)?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(head.clone());
    items.extend_from_slice(tail);
    Ok(Value::List(Rc::new(items)))
}

fn builtin_length(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [value] = exactly::<1>(args)?;
    let len = match value {
        Value::List(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(Error::type_error(format!(
                "length expects a list or string, got {}",
                other.type_atom()
            )));
        }
    };
    Ok(Value::Number(len as f64))
}

fn builtin_begin(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    args.last()
        .cloned()
        .ok_or_else(|| Error::arity(Arity::AtLeast(1), 0))
}

fn builtin_type(args: &[Value], _: &mut dyn Write) -> Result<Value, Error> {
    let [value] = exactly::<1>(args)?;
    Ok(Value::Type(value.type_atom()))
}

fn builtin_display(args: &[Value], out: &mut dyn Write) -> Result<Value, Error> {
    for arg in args {
        let written = match arg {
            Value::String(s) => writeln!(out, "{s}"),
            Value::Char(c) => writeln!(out, "{c}"),
            other => writeln!(out, "{other}"),
        };
        written.map_err(|e| {
            Error::interpreter(InterpreterErrorKind::Output, format!("display failed: {e}"))
        })?;
    }
    Ok(Value::Nil)
}

/// Global registry of the whole operator vocabulary.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn primitive(id: &'static str, arity: Arity, f: PrimitiveFn) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Primitive(f),
            arity,
        }
    }

    fn reserved(id: &'static str) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Reserved,
            arity: Arity::Any,
        }
    }

    vec![
        // Special forms
        BuiltinOp {
            id: "lambda",
            op_kind: OpKind::SpecialForm(SpecialForm::Lambda),
            // parameter list plus at least one body expression
            arity: Arity::AtLeast(2),
        },
        BuiltinOp {
            id: "if",
            op_kind: OpKind::SpecialForm(SpecialForm::If),
            arity: Arity::Range(2, 3),
        },
        // Arithmetic
        primitive("+", Arity::AtLeast(0), builtin_add),
        primitive("-", Arity::AtLeast(1), builtin_sub),
        primitive("*", Arity::AtLeast(0), builtin_mul),
        primitive("/", Arity::AtLeast(1), builtin_div),
        primitive("%", Arity::Exact(2), builtin_rem),
        // Comparison
        primitive("<", Arity::Exact(2), builtin_lt),
        primitive(">", Arity::Exact(2), builtin_gt),
        primitive("eq", Arity::Exact(2), builtin_eq),
        // Logic
        primitive("not", Arity::Exact(1), builtin_not),
        primitive("and", Arity::AtLeast(1), builtin_and),
        primitive("or", Arity::AtLeast(1), builtin_or),
        // Lists
        primitive("car", Arity::Exact(1), builtin_car),
        primitive("cdr", Arity::Exact(1), builtin_cdr),
        primitive("cons", Arity::Exact(2), builtin_cons),
        primitive("length", Arity::Exact(1), builtin_length),
        // Sequencing, reflection, output
        primitive("begin", Arity::AtLeast(1), builtin_begin),
        primitive("type", Arity::Exact(1), builtin_type),
        primitive("display", Arity::Any, builtin_display),
        reserved("cond"),
        reserved("def"),
        reserved("set!"),
        reserved("apply"),
        reserved("let"),
        reserved("import"),
        reserved("export"),
        reserved("exit"),
    ]
});

static BUILTIN_INDEX: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Every reserved operator, in registry order
pub fn builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a reserved operator by its spelling
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_INDEX.get(id).copied()
}
