//! StackLisp - a small bracket Lisp with an explicit-stack evaluator
//!
//! Programs pass through four stages, each consuming the previous stage's output:
//!
//! 1. [`lexer`]: raw text into positioned tokens
//! 2. [`parser`]: tokens into a forest of syntax trees (bracket matching only)
//! 3. [`analyzer`]: classifies every leaf and records every container's arity
//! 4. [`evaluator`]: walks one root at a time with a control stack and a value stack
//!
//! ```scheme
//! (+ 1 2)                                  ; 3
//! (if (< 1 2) 10 20)                       ; 10
//! ((lambda (n) (+ n 1)) 5)                 ; 6
//! [1 "two" '3']                            ; literal list
//! ((lambda (n) (if (< n 100000) (#lambda (+ n 1)) n)) 0)
//! ```
//!
//! The evaluator never recurses on the host stack. Every suspension point
//! (argument evaluation, operator dispatch, function return) is a marker on the
//! control stack, and calls in tail position reuse the caller's `Return` marker,
//! so self-recursive loops run in constant control-stack space.
//!
//! Inside a lambda body, `#lambda` is bound to the running closure and `#args`
//! to the list of supplied arguments.
//!
//! ## Strict Typing
//!
//! - Numbers are double-precision floats
//! - Conditionals require actual booleans (no "truthiness")
//! - Arithmetic and comparison reject non-numbers
//! - Arity is checked before arguments are evaluated
//!
//! ## Modules
//!
//! - `lexer`: tokenizer with string, char and comment modes
//! - `parser`: arena-backed syntax tree construction
//! - `analyzer`: leaf classification and arity annotation
//! - `ast`: node kinds, runtime values and type atoms
//! - `builtinops`: the reserved operator vocabulary and its primitives
//! - `evaluator`: the stack machine and lexical environments

use std::fmt;
use std::rc::Rc;

use crate::lexer::Token;

/// Source name stamped on tokens when the caller does not provide one
pub const DEFAULT_SOURCE_NAME: &str = "__main__";

/// Categorizes lexer failures. Every one of them leaves a literal open.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LexerErrorKind {
    /// End of input reached inside `"..."`
    UnterminatedString,
    /// End of input reached inside `'...'`
    UnterminatedChar,
    /// A raw newline inside `"..."`
    NewlineInString,
    /// A raw newline inside `'...'`
    NewlineInChar,
}

/// Lexer failure, positioned at the first character of the offending literal.
#[derive(Debug, PartialEq, Clone)]
pub struct LexerError {
    pub kind: LexerErrorKind,
    pub source: Rc<str>,
    pub row: usize,
    pub column: usize,
}

impl LexerError {
    fn description(&self) -> &'static str {
        match self.kind {
            LexerErrorKind::UnterminatedString => "unterminated string literal",
            LexerErrorKind::UnterminatedChar => "unterminated character literal",
            LexerErrorKind::NewlineInString => "newline inside string literal",
            LexerErrorKind::NewlineInChar => "newline inside character literal",
        }
    }
}

/// Categorizes evaluation failures. All of them surface as [`Error::InterpreterError`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterpreterErrorKind {
    /// Wrong number of arguments for a lambda, `if`, or a primitive
    Arity,
    /// A lambda parameter list that is not a `(...)` of symbols
    InvalidParams,
    /// Something other than a lambda or operator in operator position
    NotCallable,
    /// Symbol lookup fell off the end of the environment chain
    UnboundSymbol,
    /// A primitive or `if` received a value of the wrong type
    Type,
    /// `/` or `%` with a zero divisor
    DivisionByZero,
    /// Reserved operator without an implementation, or an unanalyzed node
    Unimplemented,
    /// The value stack did not hold exactly one result after a root
    StackImbalance,
    /// `display` could not write to its output sink
    Output,
}

/// A structured evaluation failure.
#[derive(Debug, PartialEq, Clone)]
pub struct InterpreterError {
    pub kind: InterpreterErrorKind,
    pub message: String,
    /// Call site or symbol being evaluated when the failure happened
    pub token: Option<Token>,
}

impl InterpreterError {
    pub fn new(kind: InterpreterErrorKind, message: impl Into<String>) -> Self {
        InterpreterError {
            kind,
            message: message.into(),
            token: None,
        }
    }

    /// Attach a diagnostic token unless one is already present
    pub fn at(mut self, token: &Token) -> Self {
        if self.token.is_none() {
            self.token = Some(token.clone());
        }
        self
    }
}

/// Error types for every pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    LexerError(LexerError),
    /// Unmatched or mismatched close, or the innermost unclosed open at end of input
    ParserError(Token),
    /// A `'...'` literal that does not hold exactly one character
    AnalyzerError(Token),
    InterpreterError(InterpreterError),
}

impl Error {
    /// Shorthand for an [`Error::InterpreterError`] without a token
    pub(crate) fn interpreter(kind: InterpreterErrorKind, message: impl Into<String>) -> Self {
        Error::InterpreterError(InterpreterError::new(kind, message))
    }

    pub(crate) fn arity(expected: impl fmt::Display, got: usize) -> Self {
        Self::interpreter(
            InterpreterErrorKind::Arity,
            format!("expected {expected} arguments, got {got}"),
        )
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::interpreter(InterpreterErrorKind::Type, message)
    }

    /// The interpreter error kind, if this is an evaluation failure
    pub fn interpreter_kind(&self) -> Option<InterpreterErrorKind> {
        match self {
            Error::InterpreterError(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Attach a diagnostic token to an interpreter error that has none
    pub(crate) fn at(self, token: &Token) -> Self {
        match self {
            Error::InterpreterError(e) => Error::InterpreterError(e.at(token)),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LexerError(e) => write!(
                f,
                "LexerError: {} at {}#{}:{}",
                e.description(),
                e.source,
                e.row,
                e.column
            ),
            Error::ParserError(token) => {
                write!(f, "ParserError: {} {}", token.location(), token.text)
            }
            Error::AnalyzerError(token) => write!(
                f,
                "AnalyzerError: character literal must hold exactly one character: {} {}",
                token.location(),
                token.text
            ),
            Error::InterpreterError(e) => {
                write!(f, "InterpreterError: {}", e.message)?;
                if let Some(token) = &e.token {
                    write!(f, " (at {} {})", token.location(), token.text)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

pub mod analyzer;
pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use ast::Value;
pub use evaluator::Interpreter;

/// Evaluate a whole program with a default [`Interpreter`], returning the last root's value.
pub fn evaluate(program: &str) -> Result<Value, Error> {
    Interpreter::new().evaluate(program)
}
