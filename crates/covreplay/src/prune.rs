//! Dead-code pruning against merged coverage
//!
//! A pass walks every function body once and removes:
//!
//! 1. statements whose start position is dead (instrumented, never executed),
//! 2. `else` branches that are dead or that pruning emptied,
//! 3. `match` arms whose body start is dead or whose block body pruning emptied,
//! 4. structures pruning left empty (`if` without branches, `for`/`while`,
//!    bare blocks, arm-less `match`); an emptied `loop` stays,
//! 5. `let` bindings of a single identifier (not starting with `_`) that were
//!    referenced before pruning and no longer are.
//!
//! Passes repeat until one removes nothing. Bodies emptied by pruning stay as
//! empty bodies; function bodies are never removed.

use crate::coverage::{FileCoverage, MergedCoverage};
use crate::result::{ReplayError, ReplayResult};
use crate::syntax::{Arm, Body, ElseBranch, ElseKind, Node, NodeKind, SyntaxTree};
use std::collections::BTreeSet;
use std::ops::Range;
use tracing::trace;

/// Default ceiling on passes per file
pub const DEFAULT_MAX_PASSES: usize = 256;

/// Outcome of pruning one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Passes run, the final no-op pass included
    pub passes: usize,
    /// Nodes removed across all passes
    pub removed: usize,
}

/// Removes code the merged coverage proves dead
#[derive(Debug, Clone, Copy)]
pub struct Pruner<'a> {
    coverage: &'a MergedCoverage,
    max_passes: usize,
}

impl<'a> Pruner<'a> {
    /// Prune against `coverage`
    #[must_use]
    pub const fn new(coverage: &'a MergedCoverage) -> Self {
        Self {
            coverage,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Set the pass ceiling
    #[must_use]
    pub const fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Prune `tree` to a fixpoint
    pub fn prune(&self, tree: SyntaxTree) -> ReplayResult<SyntaxTree> {
        self.prune_with_stats(tree).map(|(tree, _)| tree)
    }

    /// Prune `tree` to a fixpoint and report what happened
    ///
    /// # Errors
    ///
    /// [`ReplayError::PruneDiverged`] when the last allowed pass still
    /// removed something.
    pub fn prune_with_stats(&self, mut tree: SyntaxTree) -> ReplayResult<(SyntaxTree, PruneStats)> {
        let mut stats = PruneStats::default();
        while stats.passes < self.max_passes {
            let (next, removed) = self.pass(tree);
            tree = next;
            stats.passes += 1;
            stats.removed += removed;
            trace!(path = tree.path(), pass = stats.passes, removed, "prune pass");
            if removed == 0 {
                return Ok((tree, stats));
            }
        }
        Err(ReplayError::PruneDiverged {
            path: tree.path().to_string(),
            passes: self.max_passes,
        })
    }

    /// Run a single pass, returning the tree and the number of removals
    #[must_use]
    pub fn pass(&self, mut tree: SyntaxTree) -> (SyntaxTree, usize) {
        let Some(file) = self.coverage.file(tree.path()) else {
            return (tree, 0);
        };
        let removed = {
            let SyntaxTree { bodies, holes, .. } = &mut tree;
            let mut sweep = Sweep {
                file,
                holes,
                removed: 0,
            };
            for body in bodies.iter_mut() {
                sweep.body(body);
            }
            sweep.removed
        };
        (tree, removed)
    }
}

struct Sweep<'a> {
    file: &'a FileCoverage,
    holes: &'a mut Vec<Range<usize>>,
    removed: usize,
}

impl Sweep<'_> {
    fn cut(&mut self, hole: Range<usize>) {
        self.holes.push(hole);
        self.removed += 1;
    }

    fn body(&mut self, body: &mut Body) {
        let before = body.nodes.len();
        let mut kept = Vec::with_capacity(before);
        for mut node in std::mem::take(&mut body.nodes) {
            if self.file.is_dead(node.start) {
                self.cut(node.hole.clone());
                continue;
            }
            self.children(&mut node);
            if node.is_vacuous() {
                self.cut(node.hole.clone());
                continue;
            }
            kept.push(node);
        }
        self.drop_unused_lets(&mut kept);
        if kept.len() < before {
            body.pruned = true;
        }
        body.nodes = kept;
    }

    fn children(&mut self, node: &mut Node) {
        match &mut node.kind {
            NodeKind::Leaf | NodeKind::Let { .. } => {}
            NodeKind::Block { body, .. } | NodeKind::Loop { body, .. } => self.body(body),
            NodeKind::If {
                then,
                otherwise,
                lost_else,
            } => {
                self.body(then);
                let drop_else = otherwise.as_mut().is_some_and(|branch| self.else_is_gone(branch));
                if drop_else {
                    if let Some(branch) = otherwise.take() {
                        self.cut(branch.hole);
                    }
                    *lost_else = true;
                }
            }
            NodeKind::Match { arms, pruned } => {
                if self.arms(arms) {
                    *pruned = true;
                }
            }
        }
    }

    /// Prune inside an else branch and decide whether the branch goes
    fn else_is_gone(&mut self, branch: &mut ElseBranch) -> bool {
        match &mut branch.kind {
            ElseKind::Block(body) => {
                self.body(body);
                body.pruned && body.nodes.is_empty()
            }
            ElseKind::Chain(node) => {
                if self.file.is_dead(node.start) {
                    return true;
                }
                self.children(node);
                node.is_vacuous()
            }
        }
    }

    /// Returns whether any arm was removed
    fn arms(&mut self, arms: &mut Vec<Arm>) -> bool {
        let before = arms.len();
        let mut kept = Vec::with_capacity(before);
        for mut arm in std::mem::take(arms) {
            if self.file.is_dead(arm.start) {
                self.cut(arm.hole.clone());
                continue;
            }
            if let Some(body) = arm.body.as_mut() {
                self.body(body);
                if body.pruned && body.nodes.is_empty() {
                    self.cut(arm.hole.clone());
                    continue;
                }
            }
            kept.push(arm);
        }
        *arms = kept;
        arms.len() < before
    }

    /// Remove bindings that lost every reference to pruning. Scans backwards
    /// so a binding only read by another dropped binding goes too.
    fn drop_unused_lets(&mut self, nodes: &mut Vec<Node>) {
        let mut later: BTreeSet<String> = BTreeSet::new();
        let mut keep = vec![true; nodes.len()];
        for (idx, node) in nodes.iter().enumerate().rev() {
            if let NodeKind::Let {
                name: Some(name),
                used_at_parse: true,
            } = &node.kind
            {
                if !name.starts_with('_') && !later.contains(name) {
                    keep[idx] = false;
                    self.cut(node.hole.clone());
                    continue;
                }
            }
            node.collect_idents(&mut later);
        }
        let mut flags = keep.into_iter();
        nodes.retain(|_| flags.next().unwrap_or(true));
    }
}
