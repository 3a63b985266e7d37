//! Bracket matching into an arena-backed syntax forest.
//!
//! The parser knows nothing about meaning: `(` opens an `Expr`, `[` opens a `List`,
//! and every other token becomes an [`NodeKind::Unknown`] leaf under the innermost
//! open container, or a root of its own when nothing is open.

use crate::Error;
use crate::ast::{NodeId, NodeKind};
use crate::lexer::Token;

/// A node in the arena. `parent` is a plain index and never owns anything.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub token: Token,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Every node of a program, plus the ids of its top-level forms in source order.
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    roots: Vec<NodeId>,
}

impl SyntaxTree {
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node. Ids are only ever handed out by this tree.
    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SyntaxNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The container holding `id`, if it is not a root
    pub fn enclosing_form(&self, id: NodeId) -> Option<&SyntaxNode> {
        self.node(id).parent.map(|parent| self.node(parent))
    }

    fn attach(&mut self, kind: NodeKind, token: Token, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SyntaxNode {
            kind,
            token,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }
}

/// Build the syntax forest for a token sequence.
///
/// An unmatched or mismatched close fails with that closing token; an unclosed
/// container at end of input fails with the innermost opening token.
pub fn parse(tokens: Vec<Token>) -> Result<SyntaxTree, Error> {
    let mut tree = SyntaxTree::default();
    let mut open: Vec<NodeId> = Vec::new();

    for token in tokens {
        match token.text.as_str() {
            "(" => {
                let id = tree.attach(NodeKind::Expr { arity: None }, token, open.last().copied());
                open.push(id);
            }
            "[" => {
                let id = tree.attach(NodeKind::List { arity: None }, token, open.last().copied());
                open.push(id);
            }
            ")" | "]" => {
                let Some(id) = open.pop() else {
                    return Err(Error::ParserError(token));
                };
                let closes = matches!(
                    (&tree.node(id).kind, token.text.as_str()),
                    (NodeKind::Expr { .. }, ")") | (NodeKind::List { .. }, "]")
                );
                if !closes {
                    return Err(Error::ParserError(token));
                }
            }
            _ => {
                tree.attach(NodeKind::Unknown, token, open.last().copied());
            }
        }
    }

    if let Some(&id) = open.last() {
        return Err(Error::ParserError(tree.node(id).token.clone()));
    }

    tracing::debug!(roots = tree.roots.len(), nodes = tree.len(), "parsed program");
    Ok(tree)
}
