//! Core syntax and value types shared by every pipeline stage.
//!
//! [`NodeKind`] is the tagged union carried by syntax tree nodes. Leaves start out
//! as [`NodeKind::Unknown`] and containers with an unset arity; the analyzer moves
//! each node into its classified state exactly once. [`Value`] is what the
//! evaluator pushes on its value stack and binds in environments.
//!
//! Lists nest without limit, so dropping, printing and comparing a [`Value`]
//! walk nested lists with an explicit work list rather than the host stack.

use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::builtinops::BuiltinOp;
use crate::evaluator::Closure;

/// Index of a node inside its [`SyntaxTree`](crate::parser::SyntaxTree) arena
pub type NodeId = usize;

/// Reserved type atoms, written with a leading colon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeAtom {
    Number,
    String,
    Char,
    Bool,
    List,
    Lambda,
    Nil,
    Type,
}

impl TypeAtom {
    pub const ALL: [TypeAtom; 8] = [
        TypeAtom::Number,
        TypeAtom::String,
        TypeAtom::Char,
        TypeAtom::Bool,
        TypeAtom::List,
        TypeAtom::Lambda,
        TypeAtom::Nil,
        TypeAtom::Type,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            TypeAtom::Number => ":number",
            TypeAtom::String => ":string",
            TypeAtom::Char => ":char",
            TypeAtom::Bool => ":bool",
            TypeAtom::List => ":list",
            TypeAtom::Lambda => ":lambda",
            TypeAtom::Nil => ":nil",
            TypeAtom::Type => ":type",
        }
    }

    pub fn from_keyword(text: &str) -> Option<TypeAtom> {
        Self::ALL.into_iter().find(|atom| atom.keyword() == text)
    }
}

impl fmt::Display for TypeAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Kind and payload of a syntax tree node.
///
/// `arity` on containers is `None` until analysis, then the child count.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `( ... )`: a call or special form
    Expr { arity: Option<usize> },
    /// `[ ... ]`: a literal list
    List { arity: Option<usize> },
    /// Leaf not yet classified; its text lives on the node's token
    Unknown,
    Symbol(String),
    Number(f64),
    String(String),
    Char(char),
    Bool(bool),
    Nil,
    Type(TypeAtom),
    Operator(&'static BuiltinOp),
}

impl NodeKind {
    /// The value a self-evaluating leaf pushes, or `None` for containers,
    /// symbols and unclassified leaves
    pub fn literal_value(&self) -> Option<Value> {
        Some(match self {
            NodeKind::Number(n) => Value::Number(*n),
            NodeKind::String(s) => Value::String(s.clone()),
            NodeKind::Char(c) => Value::Char(*c),
            NodeKind::Bool(b) => Value::Bool(*b),
            NodeKind::Nil => Value::Nil,
            NodeKind::Type(atom) => Value::Type(*atom),
            NodeKind::Operator(op) => Value::Operator(op),
            NodeKind::Expr { .. } | NodeKind::List { .. } | NodeKind::Unknown | NodeKind::Symbol(_) => {
                return None;
            }
        })
    }
}

/// Runtime values
#[derive(Clone)]
pub enum Value {
    /// Double-precision numbers
    Number(f64),
    String(String),
    Char(char),
    Bool(bool),
    /// The `#nil` value
    Nil,
    Type(TypeAtom),
    /// Result of evaluating a `[ ... ]` literal
    List(Rc<Vec<Value>>),
    /// A reserved operator used as a value
    Operator(&'static BuiltinOp),
    /// A closure created by a `lambda` form
    Lambda(Rc<Closure>),
}

impl Value {
    /// The type atom `(type v)` reports. Operators count as `:lambda`.
    pub fn type_atom(&self) -> TypeAtom {
        match self {
            Value::Number(_) => TypeAtom::Number,
            Value::String(_) => TypeAtom::String,
            Value::Char(_) => TypeAtom::Char,
            Value::Bool(_) => TypeAtom::Bool,
            Value::Nil => TypeAtom::Nil,
            Value::Type(_) => TypeAtom::Type,
            Value::List(_) => TypeAtom::List,
            Value::Operator(_) | Value::Lambda(_) => TypeAtom::Lambda,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Nil => write!(f, "Nil"),
            Value::Type(atom) => write!(f, "Type({atom})"),
            Value::List(_) => write_nested(f, self, ("List(", ", ", ")"), <Value as fmt::Debug>::fmt),
            Value::Operator(op) => write!(f, "Operator({})", op.id),
            Value::Lambda(closure) => write!(f, "Lambda(arity={})", closure.arity),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Char(c) => write!(f, "'{c}'"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Nil => write!(f, "#nil"),
            Value::Type(atom) => write!(f, "{atom}"),
            Value::List(_) => write_nested(f, self, ("[", " ", "]"), <Value as fmt::Display>::fmt),
            Value::Operator(op) => write!(f, "#<operator:{}>", op.id),
            Value::Lambda(closure) => write!(f, "#<lambda/{}>", closure.arity),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::List(a), Value::List(b)) => lists_equal(a, b),
            (Value::Operator(a), Value::Operator(b)) => a.id == b.id,
            // closures are equal only to themselves
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Pending output while rendering a nested list
enum Piece<'a> {
    Value(&'a Value),
    Text(&'static str),
}

/// Render `root` with `(open, separator, close)` around every list. `leaf` is
/// only ever called on non-list values.
fn write_nested(
    f: &mut fmt::Formatter<'_>,
    root: &Value,
    (open, separator, close): (&'static str, &'static str, &'static str),
    leaf: fn(&Value, &mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    let mut pending = vec![Piece::Value(root)];
    while let Some(piece) = pending.pop() {
        match piece {
            Piece::Text(text) => f.write_str(text)?,
            Piece::Value(Value::List(items)) => {
                f.write_str(open)?;
                pending.push(Piece::Text(close));
                for (i, item) in items.iter().enumerate().rev() {
                    pending.push(Piece::Value(item));
                    if i > 0 {
                        pending.push(Piece::Text(separator));
                    }
                }
            }
            Piece::Value(value) => leaf(value, f)?,
        }
    }
    Ok(())
}

fn lists_equal(a: &[Value], b: &[Value]) -> bool {
    let mut pending = vec![(a, b)];
    while let Some((a, b)) = pending.pop() {
        if a.len() != b.len() {
            return false;
        }
        for (x, y) in a.iter().zip(b) {
            match (x, y) {
                (Value::List(x), Value::List(y)) => pending.push((x.as_slice(), y.as_slice())),
                // at most one side is a list here, so `!=` does not recurse
                _ if x != y => return false,
                _ => {}
            }
        }
    }
    true
}

impl Drop for Value {
    fn drop(&mut self) {
        let Value::List(items) = self else { return };
        let Some(items) = Rc::get_mut(items) else {
            return;
        };
        // Move every uniquely owned descendant into one flat vector, so each
        // value dropped below holds at most an empty list
        let mut pending = mem::take(items);
        while let Some(mut value) = pending.pop() {
            if let Value::List(inner) = &mut value
                && let Some(inner) = Rc::get_mut(inner)
            {
                pending.append(inner);
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<TypeAtom> for Value {
    fn from(atom: TypeAtom) -> Self {
        Value::Type(atom)
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Value {
            fn from(n: $num_type) -> Self {
                Value::Number(f64::from(n))
            }
        }
    };
}

impl_from_number!(i32);
impl_from_number!(u32);
impl_from_number!(f64);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(Rc::new(v.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(Rc::new(arr.into_iter().map(Into::into).collect()))
    }
}

/// Helper for building values in tests: `val(3)`, `val("s")`, `val([1, 2])`
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtinops::find_op;

    #[test]
    fn test_value_display() {
        let plus = find_op("+").map(Value::Operator);
        let cases = vec![
            (val(3), "3"),
            (val(0.5), "0.5"),
            (val(-2.25), "-2.25"),
            (val(true), "#t"),
            (val(false), "#f"),
            (Value::Nil, "#nil"),
            (val("a \"q\"\n"), r#""a \"q\"\n""#),
            (val('x'), "'x'"),
            (val(TypeAtom::Number), ":number"),
            (val([1, 2, 3]), "[1 2 3]"),
            (val(Vec::<Value>::new()), "[]"),
            (val(vec![val(1), val("two"), val([3])]), r#"[1 "two" [3]]"#),
        ];

        for (i, (value, expected)) in cases.into_iter().enumerate() {
            assert_eq!(value.to_string(), expected, "case {i}: {value:?}");
        }
        assert_eq!(plus.map(|v| v.to_string()).as_deref(), Some("#<operator:+>"));
    }

    #[test]
    fn test_type_atoms() {
        for atom in TypeAtom::ALL {
            assert_eq!(TypeAtom::from_keyword(atom.keyword()), Some(atom));
        }
        assert_eq!(TypeAtom::from_keyword("#nil"), None);
        assert_eq!(TypeAtom::from_keyword("number"), None);
        assert_eq!(TypeAtom::from_keyword(":operator"), None);

        let cases = vec![
            (val(1), TypeAtom::Number),
            (val("s"), TypeAtom::String),
            (val('c'), TypeAtom::Char),
            (val(false), TypeAtom::Bool),
            (Value::Nil, TypeAtom::Nil),
            (val(TypeAtom::Bool), TypeAtom::Type),
            (val([1]), TypeAtom::List),
        ];
        for (i, (value, expected)) in cases.into_iter().enumerate() {
            assert_eq!(value.type_atom(), expected, "case {i}");
        }
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(val([1, 2]), val([1, 2]));
        assert_ne!(val([1, 2]), val([2, 1]));
        assert_ne!(val(1), val("1"));
        assert_ne!(Value::Nil, val(Vec::<Value>::new()));
        assert_eq!(val('a'), val('a'));
        assert_eq!(find_op("car").map(Value::Operator), find_op("car").map(Value::Operator));
        assert_ne!(find_op("car").map(Value::Operator), find_op("cdr").map(Value::Operator));
    }

    #[test]
    fn test_literal_values() {
        assert_eq!(NodeKind::Number(2.0).literal_value(), Some(val(2)));
        assert_eq!(NodeKind::Nil.literal_value(), Some(Value::Nil));
        assert_eq!(NodeKind::Symbol("x".into()).literal_value(), None);
        assert_eq!(NodeKind::Unknown.literal_value(), None);
        assert_eq!(NodeKind::Expr { arity: Some(1) }.literal_value(), None);
    }
}
