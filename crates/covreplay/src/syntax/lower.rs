//! Lowering of `syn` syntax trees into [`SyntaxTree`]
//!
//! Only function bodies are lowered (free functions, methods, trait default
//! methods, and functions of inline modules). Spans come from `proc-macro2`
//! with `span-locations`, which reports 1-based lines and 0-based character
//! columns; positions are stored with 1-based columns to match coverage
//! profiles.

use super::tree::{line_hole, Arm, Body, ElseBranch, ElseKind, LineIndex, Node, NodeKind, SyntaxTree};
use crate::coverage::Position;
use crate::result::{ReplayError, ReplayResult};
use proc_macro2::{LineColumn, Span, TokenStream, TokenTree};
use quote::ToTokens;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;
use syn::spanned::Spanned;
use syn::{Expr, ImplItem, Item, Pat, Stmt, TraitItem};

const BOM: &str = "\u{feff}";

/// Parse `source` and lower it into a prunable tree
pub fn parse_source(path: &str, source: &str) -> ReplayResult<SyntaxTree> {
    // syn strips a leading BOM before computing spans
    let (offset, text) = source
        .strip_prefix(BOM)
        .map_or((0, source), |rest| (BOM.len(), rest));

    let lowered = match syn::parse_file(text) {
        Ok(file) => Lowering::new(source, text, offset).map(|lowering| {
            let mut bodies = Vec::new();
            lowering.items(&file.items, &mut bodies);
            SyntaxTree::new(path, source, bodies)
        }),
        Err(err) => {
            let at = err.span().start();
            Err(ReplayError::parse(path, format!("{err} at {}:{}", at.line, at.column + 1)))
        }
    };
    // Every span has been read. proc-macro2 keeps a per-thread copy of each
    // parsed source until told otherwise.
    proc_macro2::extra::invalidate_current_thread_spans();
    lowered
}

struct Lowering<'a> {
    source: &'a str,
    text: &'a str,
    offset: usize,
    index: LineIndex,
    format_capture: Regex,
}

impl<'a> Lowering<'a> {
    fn new(source: &'a str, text: &'a str, offset: usize) -> ReplayResult<Self> {
        let format_capture = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)")
            .map_err(|e| ReplayError::config(format!("format capture pattern: {e}")))?;
        Ok(Self {
            source,
            text,
            offset,
            index: LineIndex::new(text),
            format_capture,
        })
    }

    fn position(at: LineColumn) -> Position {
        let line = u32::try_from(at.line).unwrap_or(u32::MAX);
        let column = u32::try_from(at.column + 1).unwrap_or(u32::MAX);
        Position::new(line, column)
    }

    fn byte(&self, at: LineColumn) -> usize {
        self.offset + self.index.offset(self.text, at.line, at.column)
    }

    fn span_bytes(&self, span: Span) -> Range<usize> {
        self.byte(span.start())..self.byte(span.end())
    }

    fn hole(&self, span: Span) -> Range<usize> {
        line_hole(self.source, self.span_bytes(span))
    }

    fn items(&self, items: &[Item], out: &mut Vec<Body>) {
        for item in items {
            match item {
                Item::Fn(func) => out.push(self.block(&func.block)),
                Item::Impl(imp) => {
                    for inner in &imp.items {
                        if let ImplItem::Fn(method) = inner {
                            out.push(self.block(&method.block));
                        }
                    }
                }
                Item::Trait(tr) => {
                    for inner in &tr.items {
                        if let TraitItem::Fn(method) = inner {
                            if let Some(block) = &method.default {
                                out.push(self.block(block));
                            }
                        }
                    }
                }
                Item::Mod(module) => {
                    if let Some((_, inner)) = &module.content {
                        self.items(inner, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn block(&self, block: &syn::Block) -> Body {
        let braces = &block.brace_token.span;
        let mut nodes: Vec<Node> = block.stmts.iter().map(|s| self.stmt(s)).collect();
        mark_used_lets(&mut nodes);
        Body {
            open: Self::position(braces.open().start()),
            close_end: self.byte(braces.close().end()),
            nodes,
            pruned: false,
        }
    }

    fn stmt(&self, stmt: &Stmt) -> Node {
        let span = stmt.span();
        let hole = self.hole(span);
        match stmt {
            Stmt::Local(local) => {
                let mut idents = BTreeSet::new();
                if let Some(init) = &local.init {
                    self.collect(init.expr.to_token_stream(), &mut idents);
                    if let Some((_, diverge)) = &init.diverge {
                        self.collect(diverge.to_token_stream(), &mut idents);
                    }
                }
                Node {
                    start: Self::position(local.let_token.span.start()),
                    hole,
                    idents,
                    kind: NodeKind::Let {
                        name: binding_name(&local.pat),
                        used_at_parse: false,
                    },
                }
            }
            Stmt::Expr(expr, _) => self.expr_node(expr, Self::position(span.start()), hole),
            Stmt::Item(item) => self.leaf(item, span, hole),
            Stmt::Macro(mac) => self.leaf(mac, span, hole),
        }
    }

    fn leaf<T: ToTokens>(&self, node: &T, span: Span, hole: Range<usize>) -> Node {
        Node {
            start: Self::position(span.start()),
            hole,
            idents: self.idents_of(node),
            kind: NodeKind::Leaf,
        }
    }

    fn expr_node(&self, expr: &Expr, start: Position, hole: Range<usize>) -> Node {
        let (idents, kind) = match expr {
            Expr::If(e) => {
                let then = self.block(&e.then_branch);
                let otherwise = e
                    .else_branch
                    .as_ref()
                    .map(|(_, other)| self.else_branch(&then, other));
                (
                    self.idents_of(&*e.cond),
                    NodeKind::If {
                        then,
                        otherwise,
                        lost_else: false,
                    },
                )
            }
            Expr::ForLoop(e) => {
                let mut idents = self.idents_of(&*e.pat);
                self.collect(e.expr.to_token_stream(), &mut idents);
                (
                    idents,
                    NodeKind::Loop {
                        body: self.block(&e.body),
                        removable: true,
                    },
                )
            }
            Expr::While(e) => (
                self.idents_of(&*e.cond),
                NodeKind::Loop {
                    body: self.block(&e.body),
                    removable: true,
                },
            ),
            Expr::Loop(e) => (
                BTreeSet::new(),
                NodeKind::Loop {
                    body: self.block(&e.body),
                    removable: false,
                },
            ),
            Expr::Block(e) => (
                BTreeSet::new(),
                NodeKind::Block {
                    body: self.block(&e.block),
                    removable: e.label.is_none(),
                },
            ),
            Expr::Unsafe(e) => (
                BTreeSet::new(),
                NodeKind::Block {
                    body: self.block(&e.block),
                    removable: true,
                },
            ),
            Expr::Match(e) => (
                self.idents_of(&*e.expr),
                NodeKind::Match {
                    arms: e.arms.iter().map(|arm| self.arm(arm)).collect(),
                    pruned: false,
                },
            ),
            other => (self.idents_of(other), NodeKind::Leaf),
        };
        Node {
            start,
            hole,
            idents,
            kind,
        }
    }

    fn else_branch(&self, then: &Body, other: &Expr) -> ElseBranch {
        let span = other.span();
        let hole = then.close_end..self.byte(span.end());
        let kind = match other {
            Expr::Block(block) => ElseKind::Block(self.block(&block.block)),
            chained => {
                let start = Self::position(span.start());
                ElseKind::Chain(Box::new(self.expr_node(
                    chained,
                    start,
                    self.span_bytes(span),
                )))
            }
        };
        ElseBranch { hole, kind }
    }

    fn arm(&self, arm: &syn::Arm) -> Arm {
        let mut idents = self.idents_of(&arm.pat);
        if let Some((_, guard)) = &arm.guard {
            self.collect(guard.to_token_stream(), &mut idents);
        }
        let body = match &*arm.body {
            Expr::Block(block) if block.label.is_none() => Some(self.block(&block.block)),
            other => {
                self.collect(other.to_token_stream(), &mut idents);
                None
            }
        };
        Arm {
            start: Self::position(arm.body.span().start()),
            hole: self.hole(arm.span()),
            idents,
            body,
        }
    }

    fn idents_of<T: ToTokens + ?Sized>(&self, node: &T) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect(node.to_token_stream(), &mut out);
        out
    }

    fn collect(&self, tokens: TokenStream, out: &mut BTreeSet<String>) {
        for tree in tokens {
            match tree {
                TokenTree::Ident(ident) => {
                    out.insert(ident.to_string());
                }
                TokenTree::Group(group) => self.collect(group.stream(), out),
                // Inline format arguments such as `{name}` reference bindings too
                TokenTree::Literal(lit) => {
                    let text = lit.to_string();
                    if text.contains('{') {
                        for caps in self.format_capture.captures_iter(&text) {
                            out.insert(caps[1].to_string());
                        }
                    }
                }
                TokenTree::Punct(_) => {}
            }
        }
    }
}

fn binding_name(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(p) if p.subpat.is_none() => Some(p.ident.to_string()),
        Pat::Type(typed) => binding_name(&typed.pat),
        _ => None,
    }
}

fn mark_used_lets(nodes: &mut [Node]) {
    for idx in 0..nodes.len() {
        let NodeKind::Let { name: Some(name), .. } = &nodes[idx].kind else {
            continue;
        };
        let used = nodes[idx + 1..].iter().any(|n| n.references(name));
        if let NodeKind::Let { used_at_parse, .. } = &mut nodes[idx].kind {
            *used_at_parse = used;
        }
    }
}
