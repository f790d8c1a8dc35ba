//! Addressable statement tree
//!
//! A [`SyntaxTree`] keeps the original source text and, for every function
//! body in the file, the statements the pruner may remove. Each node knows its
//! start position (for coverage lookups), the byte range it occupies in the
//! source (its *hole* once removed) and the identifiers it mentions (for the
//! unused-binding rule). Removing a node records its hole; rendering copies
//! the source while skipping holes, so retained code keeps its formatting and
//! comments.

use crate::coverage::Position;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

/// Parsed source file reduced to prunable statements
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub(crate) path: String,
    pub(crate) source: Arc<str>,
    pub(crate) bodies: Vec<Body>,
    pub(crate) holes: Vec<Range<usize>>,
}

impl SyntaxTree {
    pub(crate) fn new(path: &str, source: &str, bodies: Vec<Body>) -> Self {
        Self {
            path: path.to_string(),
            source: Arc::from(source),
            bodies,
            holes: Vec::new(),
        }
    }

    /// Path the tree was parsed from
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Original source text
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Function bodies, in source order
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Byte ranges removed so far
    #[must_use]
    pub fn holes(&self) -> &[Range<usize>] {
        &self.holes
    }

    /// Total prunable nodes left in the tree
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.bodies.iter().map(Body::statement_count).sum()
    }

    /// Whether nothing was removed yet
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.holes.is_empty()
    }
}

/// A brace-delimited statement list
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) open: Position,
    pub(crate) close_end: usize,
    pub(crate) nodes: Vec<Node>,
    /// Set once any statement of this body has been removed
    pub(crate) pruned: bool,
}

impl Body {
    /// Position of the opening brace
    #[must_use]
    pub const fn open(&self) -> Position {
        self.open
    }

    /// Statements of the body
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether the body has no statements left
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Prunable nodes in this body, nested ones included
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.nodes.iter().map(Node::statement_count).sum()
    }

    fn collect_idents(&self, out: &mut BTreeSet<String>) {
        for node in &self.nodes {
            node.collect_idents(out);
        }
    }

    fn references(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.references(name))
    }
}

/// A statement
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) start: Position,
    pub(crate) hole: Range<usize>,
    /// Identifiers mentioned outside nested bodies
    pub(crate) idents: BTreeSet<String>,
    pub(crate) kind: NodeKind,
}

/// What a statement is, as far as pruning cares
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Anything without prunable children
    Leaf,
    /// `let` binding; `name` is set for single-identifier patterns
    Let {
        /// Bound identifier
        name: Option<String>,
        /// Whether a later sibling referenced the binding before pruning
        used_at_parse: bool,
    },
    /// Bare or `unsafe` block
    Block {
        /// Block contents
        body: Body,
        /// Whether an emptied block may be dropped (labeled blocks may not)
        removable: bool,
    },
    /// `for`, `while` or `loop`
    Loop {
        /// Loop body
        body: Body,
        /// Whether an emptied loop may be dropped (`loop` may not)
        removable: bool,
    },
    /// `if` with an optional `else`
    If {
        /// Then branch
        then: Body,
        /// Else branch
        otherwise: Option<ElseBranch>,
        /// Set once the else branch was removed
        lost_else: bool,
    },
    /// `match`
    Match {
        /// Remaining arms
        arms: Vec<Arm>,
        /// Set once any arm was removed
        pruned: bool,
    },
}

/// The `else` part of an `if`
#[derive(Debug, Clone)]
pub struct ElseBranch {
    /// From just past the then-block's `}` to the end of the branch
    pub(crate) hole: Range<usize>,
    pub(crate) kind: ElseKind,
}

/// Shape of an `else` branch
#[derive(Debug, Clone)]
pub enum ElseKind {
    /// `else { .. }`
    Block(Body),
    /// `else if ..`
    Chain(Box<Node>),
}

/// A `match` arm
#[derive(Debug, Clone)]
pub struct Arm {
    /// Start of the arm's body expression
    pub(crate) start: Position,
    pub(crate) hole: Range<usize>,
    /// Identifiers of the pattern, guard and non-block body
    pub(crate) idents: BTreeSet<String>,
    /// Block body, when the arm has one
    pub(crate) body: Option<Body>,
}

impl Arm {
    /// Start of the arm's body expression
    #[must_use]
    pub const fn start(&self) -> Position {
        self.start
    }

    /// Block body, when the arm has one
    #[must_use]
    pub const fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }
}

impl Node {
    /// Position the coverage lookup uses
    #[must_use]
    pub const fn start(&self) -> Position {
        self.start
    }

    /// Kind of the statement
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// This node plus every prunable node nested in it
    #[must_use]
    pub fn statement_count(&self) -> usize {
        let nested = match &self.kind {
            NodeKind::Leaf | NodeKind::Let { .. } => 0,
            NodeKind::Block { body, .. } | NodeKind::Loop { body, .. } => body.statement_count(),
            NodeKind::If {
                then, otherwise, ..
            } => {
                then.statement_count()
                    + otherwise.as_ref().map_or(0, |branch| {
                        1 + match &branch.kind {
                            ElseKind::Block(body) => body.statement_count(),
                            ElseKind::Chain(node) => node.statement_count(),
                        }
                    })
            }
            NodeKind::Match { arms, .. } => arms
                .iter()
                .map(|arm| 1 + arm.body.as_ref().map_or(0, Body::statement_count))
                .sum(),
        };
        1 + nested
    }

    /// Whether the node, or anything nested in it, mentions `name`
    #[must_use]
    pub fn references(&self, name: &str) -> bool {
        if self.idents.contains(name) {
            return true;
        }
        match &self.kind {
            NodeKind::Leaf | NodeKind::Let { .. } => false,
            NodeKind::Block { body, .. } | NodeKind::Loop { body, .. } => body.references(name),
            NodeKind::If {
                then, otherwise, ..
            } => {
                then.references(name)
                    || otherwise.as_ref().is_some_and(|branch| match &branch.kind {
                        ElseKind::Block(body) => body.references(name),
                        ElseKind::Chain(node) => node.references(name),
                    })
            }
            NodeKind::Match { arms, .. } => arms.iter().any(|arm| {
                arm.idents.contains(name) || arm.body.as_ref().is_some_and(|b| b.references(name))
            }),
        }
    }

    pub(crate) fn collect_idents(&self, out: &mut BTreeSet<String>) {
        out.extend(self.idents.iter().cloned());
        match &self.kind {
            NodeKind::Leaf | NodeKind::Let { .. } => {}
            NodeKind::Block { body, .. } | NodeKind::Loop { body, .. } => body.collect_idents(out),
            NodeKind::If {
                then, otherwise, ..
            } => {
                then.collect_idents(out);
                if let Some(branch) = otherwise {
                    match &branch.kind {
                        ElseKind::Block(body) => body.collect_idents(out),
                        ElseKind::Chain(node) => node.collect_idents(out),
                    }
                }
            }
            NodeKind::Match { arms, .. } => {
                for arm in arms {
                    out.extend(arm.idents.iter().cloned());
                    if let Some(body) = &arm.body {
                        body.collect_idents(out);
                    }
                }
            }
        }
    }

    /// Whether pruning emptied the node so that it no longer does anything
    /// worth showing
    pub(crate) fn is_vacuous(&self) -> bool {
        match &self.kind {
            NodeKind::Block { body, removable } | NodeKind::Loop { body, removable } => {
                *removable && body.pruned && body.nodes.is_empty()
            }
            NodeKind::If {
                then,
                otherwise: None,
                lost_else,
            } => then.nodes.is_empty() && (then.pruned || *lost_else),
            NodeKind::Match { arms, pruned } => *pruned && arms.is_empty(),
            _ => false,
        }
    }
}

/// Byte offsets of line starts
#[derive(Debug, Clone)]
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { starts }
    }

    /// Byte offset of a 1-based line and 0-based character column
    pub(crate) fn offset(&self, text: &str, line: usize, column: usize) -> usize {
        let Some(&start) = line.checked_sub(1).and_then(|idx| self.starts.get(idx)) else {
            return text.len();
        };
        let end = self.starts.get(line).copied().unwrap_or(text.len());
        let line_text = &text[start..end];
        start
            + line_text
                .char_indices()
                .nth(column)
                .map_or(line_text.len(), |(idx, _)| idx)
    }
}

/// Widen a statement's byte range to whole lines when it sits alone on them,
/// so removing it leaves no blank line behind
pub(crate) fn line_hole(source: &str, range: Range<usize>) -> Range<usize> {
    let bytes = source.as_bytes();
    let mut start = range.start;
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    if start > 0 && bytes[start - 1] != b'\n' {
        return range;
    }

    let mut end = range.end;
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t' | b'\r') {
        end += 1;
    }
    match bytes.get(end) {
        None => start..end,
        Some(b'\n') => start..end + 1,
        Some(_) => range,
    }
}
