//! Coverage profiles and the profile text format
//!
//! ```text
//! mode: set
//! src/lib.rs:3.24,5.2 2 1
//! src/lib.rs:7.1,9.2 1 0
//! ```
//!
//! Each block line is `file:startLine.startCol,endLine.endCol statements count`.

use super::{BlockKey, CoverageBlock, Position};
use crate::result::{ReplayError, ReplayResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// How execution counts were recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageMode {
    /// Counts are 0 or 1
    #[default]
    Set,
    /// Counts are execution totals
    Count,
    /// Counts are execution totals recorded atomically
    Atomic,
}

impl CoverageMode {
    /// Combine two counts of the same block
    #[must_use]
    pub const fn combine(self, a: u32, b: u32) -> u32 {
        match self {
            Self::Set => {
                if a > b {
                    a
                } else {
                    b
                }
            }
            Self::Count | Self::Atomic => a.saturating_add(b),
        }
    }
}

impl FromStr for CoverageMode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Self::Set),
            "count" => Ok(Self::Count),
            "atomic" => Ok(Self::Atomic),
            other => Err(ReplayError::profile(1, format!("unknown mode {other:?}"))),
        }
    }
}

impl fmt::Display for CoverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Set => "set",
            Self::Count => "count",
            Self::Atomic => "atomic",
        };
        f.write_str(name)
    }
}

/// The coverage blocks recorded for one (package, test) pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageProfile {
    mode: CoverageMode,
    blocks: Vec<CoverageBlock>,
}

impl CoverageProfile {
    /// Build a profile from blocks, merging duplicates of the same region
    #[must_use]
    pub fn from_blocks(mode: CoverageMode, blocks: impl IntoIterator<Item = CoverageBlock>) -> Self {
        let mut merged: BTreeMap<BlockKey, CoverageBlock> = BTreeMap::new();
        for block in blocks {
            match merged.get_mut(&block.key()) {
                Some(existing) => {
                    existing.executed = mode.combine(existing.executed, block.executed);
                    existing.statements = existing.statements.max(block.statements);
                }
                None => {
                    merged.insert(block.key(), block);
                }
            }
        }
        Self {
            mode,
            blocks: merged.into_values().collect(),
        }
    }

    /// Parse the profile text format
    pub fn parse(text: &str) -> ReplayResult<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let mode = match lines.next() {
            Some((number, header)) => {
                let name = header
                    .strip_prefix("mode:")
                    .ok_or_else(|| ReplayError::profile(number, "missing `mode:` header"))?
                    .trim();
                name.parse::<CoverageMode>()
                    .map_err(|_| ReplayError::profile(number, format!("unknown mode {name:?}")))?
            }
            None => return Ok(Self::default()),
        };

        let mut blocks = Vec::new();
        for (number, line) in lines {
            blocks.push(parse_block_line(number, line)?);
        }
        Ok(Self::from_blocks(mode, blocks))
    }

    /// Recording mode
    #[must_use]
    pub const fn mode(&self) -> CoverageMode {
        self.mode
    }

    /// All blocks, sorted by file and range
    #[must_use]
    pub fn blocks(&self) -> &[CoverageBlock] {
        &self.blocks
    }

    /// Blocks that executed at least once
    pub fn covered_blocks(&self) -> impl Iterator<Item = &CoverageBlock> {
        self.blocks.iter().filter(|b| b.is_covered())
    }

    /// Total statements in executed blocks
    #[must_use]
    pub fn covered_statements(&self) -> u64 {
        self.covered_blocks().map(|b| u64::from(b.statements)).sum()
    }

    /// Files mentioned by any block
    #[must_use]
    pub fn files(&self) -> BTreeSet<&str> {
        self.blocks.iter().map(|b| b.file.as_str()).collect()
    }

    /// Whether the profile has no blocks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn parse_block_line(number: usize, line: &str) -> ReplayResult<CoverageBlock> {
    // File names may contain ':' (drive letters), so split at the last one.
    let (file, rest) = line
        .rsplit_once(':')
        .ok_or_else(|| ReplayError::profile(number, "expected `file:range statements count`"))?;
    if file.is_empty() {
        return Err(ReplayError::profile(number, "empty file name"));
    }

    let mut fields = rest.split_whitespace();
    let range = fields
        .next()
        .ok_or_else(|| ReplayError::profile(number, "missing range"))?;
    let statements = parse_number(number, fields.next(), "statement count")?;
    let executed = parse_number(number, fields.next(), "execution count")?;
    if fields.next().is_some() {
        return Err(ReplayError::profile(number, "trailing fields"));
    }

    let (start, end) = range
        .split_once(',')
        .ok_or_else(|| ReplayError::profile(number, format!("bad range {range:?}")))?;
    let start = parse_position(number, start)?;
    let end = parse_position(number, end)?;
    if end < start {
        return Err(ReplayError::profile(number, format!("range {range} ends before it starts")));
    }

    Ok(CoverageBlock::new(file, start, end, statements, executed))
}

fn parse_position(number: usize, text: &str) -> ReplayResult<Position> {
    let (line, column) = text
        .split_once('.')
        .ok_or_else(|| ReplayError::profile(number, format!("bad position {text:?}")))?;
    let line = parse_number(number, Some(line), "line")?;
    let column = parse_number(number, Some(column), "column")?;
    if line == 0 || column == 0 {
        return Err(ReplayError::profile(number, "positions are 1-based"));
    }
    Ok(Position::new(line, column))
}

fn parse_number(number: usize, field: Option<&str>, what: &str) -> ReplayResult<u32> {
    let field = field.ok_or_else(|| ReplayError::profile(number, format!("missing {what}")))?;
    field
        .parse()
        .map_err(|_| ReplayError::profile(number, format!("invalid {what} {field:?}")))
}
