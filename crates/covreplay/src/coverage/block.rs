//! Coverage blocks and source positions

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based line/column position in a source file
///
/// Columns count characters, not bytes, matching `proc_macro2::LineColumn`
/// shifted to 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line (1-based)
    pub line: u32,
    /// Column (1-based)
    pub column: u32,
}

impl Position {
    /// Create a position
    #[inline]
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

/// Half-open source range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    /// First position inside the range
    pub start: Position,
    /// First position past the range
    pub end: Position,
}

impl SourceRange {
    /// Create a range
    #[inline]
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Whether `pos` falls inside the range
    #[inline]
    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Whether the range is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// One instrumented region of a file, as reported by the coverage oracle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageBlock {
    /// File the block belongs to
    pub file: String,
    /// Source range of the block
    pub range: SourceRange,
    /// Number of statements inside the block
    pub statements: u32,
    /// Times the block executed
    pub executed: u32,
}

impl CoverageBlock {
    /// Create a block
    #[must_use]
    pub fn new(
        file: impl Into<String>,
        start: Position,
        end: Position,
        statements: u32,
        executed: u32,
    ) -> Self {
        Self {
            file: file.into(),
            range: SourceRange::new(start, end),
            statements,
            executed,
        }
    }

    /// Whether the block executed at least once
    #[inline]
    #[must_use]
    pub const fn is_covered(&self) -> bool {
        self.executed > 0
    }

    /// Identity of the block across profiles
    #[must_use]
    pub fn key(&self) -> BlockKey {
        BlockKey {
            file: self.file.clone(),
            range: self.range,
        }
    }
}

/// Identity of a block: the same region in two profiles is the same block
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    /// File the block belongs to
    pub file: String,
    /// Source range of the block
    pub range: SourceRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering_is_line_major() {
        assert!(Position::new(1, 80) < Position::new(2, 1));
        assert!(Position::new(3, 2) < Position::new(3, 5));
    }

    #[test]
    fn test_range_is_half_open() {
        let range = SourceRange::new(Position::new(2, 1), Position::new(4, 2));
        assert!(range.contains(Position::new(2, 1)));
        assert!(range.contains(Position::new(3, 99)));
        assert!(range.contains(Position::new(4, 1)));
        assert!(!range.contains(Position::new(4, 2)));
        assert!(!range.contains(Position::new(1, 5)));
    }

    #[test]
    fn test_block_covered() {
        let hit = CoverageBlock::new("a.rs", Position::new(1, 1), Position::new(2, 1), 1, 3);
        let miss = CoverageBlock::new("a.rs", Position::new(1, 1), Position::new(2, 1), 1, 0);
        assert!(hit.is_covered());
        assert!(!miss.is_covered());
        assert_eq!(hit.key(), miss.key());
    }

    #[test]
    fn test_position_display() {
        assert_eq!(Position::new(12, 4).to_string(), "12.4");
    }
}
