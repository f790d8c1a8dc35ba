//! Merged coverage: the monotonically growing union of test profiles
//!
//! Per file the set keeps two coalesced range lists. *Instrumented* ranges
//! remember every block ever reported, whatever its count; *covered* ranges
//! only the blocks that executed. A position is dead when it is instrumented
//! but not covered.

use super::{CoverageProfile, Position, SourceRange};
use std::collections::{BTreeMap, BTreeSet};

/// Sorted, disjoint, coalesced list of ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<SourceRange>,
}

impl RangeSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a range, coalescing it with overlapping or touching neighbours
    pub fn insert(&mut self, range: SourceRange) {
        if range.is_empty() {
            return;
        }
        // First range that ends at or after the new start can touch it.
        let first = self.ranges.partition_point(|r| r.end < range.start);
        let mut merged = range;
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].start <= merged.end {
            merged.start = merged.start.min(self.ranges[last].start);
            merged.end = merged.end.max(self.ranges[last].end);
            last += 1;
        }
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Whether `pos` lies in one of the ranges
    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= pos);
        self.ranges.get(idx).is_some_and(|r| r.start <= pos)
    }

    /// Whether `range` lies entirely inside one of the ranges
    #[must_use]
    pub fn covers(&self, range: SourceRange) -> bool {
        if range.is_empty() {
            return true;
        }
        let idx = self.ranges.partition_point(|r| r.end <= range.start);
        self.ranges
            .get(idx)
            .is_some_and(|r| r.start <= range.start && range.end <= r.end)
    }

    /// Whether every range of `other` is inside this set
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.ranges.iter().all(|r| self.covers(*r))
    }

    /// The ranges in order
    #[must_use]
    pub fn ranges(&self) -> &[SourceRange] {
        &self.ranges
    }

    /// Number of disjoint ranges
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Coverage state of one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCoverage {
    instrumented: RangeSet,
    covered: RangeSet,
}

impl FileCoverage {
    /// Whether any block reported `pos`
    #[must_use]
    pub fn is_instrumented(&self, pos: Position) -> bool {
        self.instrumented.contains(pos)
    }

    /// Whether an executed block contains `pos`
    #[must_use]
    pub fn is_covered(&self, pos: Position) -> bool {
        self.covered.contains(pos)
    }

    /// Instrumented and never executed
    #[must_use]
    pub fn is_dead(&self, pos: Position) -> bool {
        self.is_instrumented(pos) && !self.is_covered(pos)
    }

    /// Executed ranges
    #[must_use]
    pub fn covered(&self) -> &RangeSet {
        &self.covered
    }

    /// All reported ranges
    #[must_use]
    pub fn instrumented(&self) -> &RangeSet {
        &self.instrumented
    }
}

/// Union of the profiles of the tests replayed so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedCoverage {
    files: BTreeMap<String, FileCoverage>,
    statements: BTreeMap<(String, SourceRange), u32>,
}

impl MergedCoverage {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a profile into the set. The set never shrinks.
    pub fn merge(&mut self, profile: &CoverageProfile) {
        for block in profile.blocks() {
            let file = self.files.entry(block.file.clone()).or_default();
            file.instrumented.insert(block.range);
            if block.is_covered() {
                file.covered.insert(block.range);
                let key = (block.file.clone(), block.range);
                let count = self.statements.entry(key).or_insert(0);
                *count = (*count).max(block.statements);
            }
        }
    }

    /// Consuming variant of [`MergedCoverage::merge`]
    #[must_use]
    pub fn merged(mut self, profile: &CoverageProfile) -> Self {
        self.merge(profile);
        self
    }

    /// Files referenced by any merged block, in path order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Coverage state of one file
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    /// Executed ranges of one file
    #[must_use]
    pub fn covered_ranges(&self, path: &str) -> Option<&RangeSet> {
        self.files.get(path).map(FileCoverage::covered)
    }

    /// Distinct executed statements across all files
    #[must_use]
    pub fn covered_statements(&self) -> u64 {
        self.statements.values().map(|s| u64::from(*s)).sum()
    }

    /// Whether this set includes everything `other` includes
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        other.files.iter().all(|(path, theirs)| {
            self.files.get(path).is_some_and(|ours| {
                ours.instrumented.is_superset(&theirs.instrumented)
                    && ours.covered.is_superset(&theirs.covered)
            })
        })
    }

    /// Number of referenced files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Referenced file paths as a set
    #[must_use]
    pub fn file_set(&self) -> BTreeSet<String> {
        self.files.keys().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageBlock, CoverageMode};

    fn range(l0: u32, c0: u32, l1: u32, c1: u32) -> SourceRange {
        SourceRange::new(Position::new(l0, c0), Position::new(l1, c1))
    }

    fn block(file: &str, r: SourceRange, stmts: u32, count: u32) -> CoverageBlock {
        CoverageBlock::new(file, r.start, r.end, stmts, count)
    }

    #[test]
    fn test_range_set_coalesces_overlap() {
        let mut set = RangeSet::new();
        set.insert(range(1, 1, 3, 1));
        set.insert(range(2, 5, 5, 1));
        assert_eq!(set.ranges(), &[range(1, 1, 5, 1)]);
    }

    #[test]
    fn test_range_set_coalesces_touching() {
        let mut set = RangeSet::new();
        set.insert(range(4, 1, 6, 1));
        set.insert(range(1, 1, 4, 1));
        assert_eq!(set.len(), 1);
        assert!(set.contains(Position::new(4, 1)));
    }

    #[test]
    fn test_range_set_keeps_gaps() {
        let mut set = RangeSet::new();
        set.insert(range(1, 1, 2, 1));
        set.insert(range(5, 1, 6, 1));
        set.insert(range(3, 1, 4, 1));
        assert_eq!(set.len(), 3);
        assert!(!set.contains(Position::new(2, 5)));
        assert!(set.contains(Position::new(3, 9)));
    }

    #[test]
    fn test_range_set_bridges_many() {
        let mut set = RangeSet::new();
        set.insert(range(1, 1, 2, 1));
        set.insert(range(3, 1, 4, 1));
        set.insert(range(5, 1, 6, 1));
        set.insert(range(1, 5, 5, 3));
        assert_eq!(set.ranges(), &[range(1, 1, 6, 1)]);
    }

    #[test]
    fn test_range_set_covers() {
        let mut set = RangeSet::new();
        set.insert(range(1, 1, 10, 1));
        assert!(set.covers(range(2, 1, 3, 1)));
        assert!(!set.covers(range(9, 1, 11, 1)));
    }

    #[test]
    fn test_merge_tracks_dead_positions() {
        let profile = CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![
                block("a.rs", range(1, 1, 3, 1), 2, 1),
                block("a.rs", range(3, 1, 5, 1), 1, 0),
            ],
        );
        let merged = MergedCoverage::new().merged(&profile);
        let file = merged.file("a.rs").unwrap();
        assert!(!file.is_dead(Position::new(2, 3)));
        assert!(file.is_dead(Position::new(4, 3)));
        assert!(!file.is_dead(Position::new(9, 1)));
        assert_eq!(merged.covered_statements(), 2);
    }

    #[test]
    fn test_merge_is_monotonic() {
        let first = CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![block("a.rs", range(1, 1, 3, 1), 2, 1)],
        );
        let second = CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![
                block("a.rs", range(1, 1, 3, 1), 2, 0),
                block("b.rs", range(1, 1, 3, 1), 2, 1),
            ],
        );
        let before = MergedCoverage::new().merged(&first);
        let after = before.clone().merged(&second);
        assert!(after.contains(&before));
        assert!(after.file("a.rs").unwrap().is_covered(Position::new(2, 1)));
        assert_eq!(after.file_count(), 2);
    }

    #[test]
    fn test_same_block_counted_once() {
        let profile = CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![block("a.rs", range(1, 1, 3, 1), 2, 1)],
        );
        let merged = MergedCoverage::new().merged(&profile).merged(&profile);
        assert_eq!(merged.covered_statements(), 2);
    }

    #[test]
    fn test_zero_count_file_is_referenced() {
        let profile = CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![block("b.rs", range(1, 1, 3, 1), 2, 0)],
        );
        let merged = MergedCoverage::new().merged(&profile);
        assert_eq!(merged.files().collect::<Vec<_>>(), vec!["b.rs"]);
        assert!(merged.covered_ranges("b.rs").unwrap().is_empty());
    }
}
