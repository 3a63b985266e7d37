//! Leaf classification and arity annotation.
//!
//! Walks the forest depth-first with an explicit work list. Containers get their
//! child count recorded as arity; unknown leaves are classified by [`classify`],
//! which tries, in order: type atom, boolean, reserved operator, `#nil`, number,
//! string, character, and finally symbol.

use nom::branch::alt;
use nom::character::complete::{char, digit0, digit1, one_of};
use nom::combinator::{all_consuming, opt, recognize};
use nom::sequence::pair;
use nom::{IResult, Parser};

use crate::Error;
use crate::ast::{NodeId, NodeKind, TypeAtom};
use crate::builtinops::find_op;
use crate::lexer::Token;
use crate::parser::SyntaxTree;

/// Classify every unknown leaf and annotate every container in place.
pub fn analyze(tree: &mut SyntaxTree) -> Result<(), Error> {
    let mut pending: Vec<NodeId> = tree.roots().iter().rev().copied().collect();

    while let Some(id) = pending.pop() {
        let node = tree.node_mut(id);
        match node.kind {
            NodeKind::Expr { .. } => {
                node.kind = NodeKind::Expr {
                    arity: Some(node.children.len()),
                };
                pending.extend(node.children.iter().rev());
            }
            NodeKind::List { .. } => {
                node.kind = NodeKind::List {
                    arity: Some(node.children.len()),
                };
                pending.extend(node.children.iter().rev());
            }
            NodeKind::Unknown => node.kind = classify(&node.token)?,
            _ => {}
        }
    }

    tracing::debug!(nodes = tree.len(), "analyzed program");
    Ok(())
}

/// Classify a single leaf token. The result depends on the token text alone;
/// the token itself is only used to report a malformed character literal.
pub fn classify(token: &Token) -> Result<NodeKind, Error> {
    let text = token.text.as_str();

    if let Some(atom) = TypeAtom::from_keyword(text) {
        return Ok(NodeKind::Type(atom));
    }
    match text {
        "#t" => return Ok(NodeKind::Bool(true)),
        "#f" => return Ok(NodeKind::Bool(false)),
        _ => {}
    }
    if let Some(op) = find_op(text) {
        return Ok(NodeKind::Operator(op));
    }
    if text == "#nil" {
        return Ok(NodeKind::Nil);
    }
    if let Some(n) = parse_number(text) {
        return Ok(NodeKind::Number(n));
    }
    if let Some(inner) = delimited_by(text, '"') {
        return Ok(NodeKind::String(unescape(inner)));
    }
    if let Some(inner) = delimited_by(text, '\'') {
        let mut chars = inner.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(NodeKind::Char(c)),
            _ => Err(Error::AnalyzerError(token.clone())),
        };
    }

    Ok(NodeKind::Symbol(text.to_owned()))
}

/// `[+-]? (digits? '.' digits | digits) ([eE] [+-]? digits)?`
fn number_literal(input: &str) -> IResult<&str, &str> {
    let mantissa = alt((recognize(pair(pair(digit0, char('.')), digit1)), digit1));
    let exponent = pair(pair(one_of("eE"), opt(one_of("+-"))), digit1);
    all_consuming(recognize(pair(
        pair(opt(one_of("+-")), mantissa),
        opt(exponent),
    )))
    .parse(input)
}

fn parse_number(text: &str) -> Option<f64> {
    let (_, lexeme) = number_literal(text).ok()?;
    lexeme.parse().ok()
}

/// Inner text if `text` is wrapped in a matching pair of `quote`s
fn delimited_by(text: &str, quote: char) -> Option<&str> {
    if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Decode `\" \\ \n \t \r`; any other backslash pair is kept as written.
fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
