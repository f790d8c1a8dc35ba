//! Coverage data model
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Oracle ──► CoverageProfile ──► MergedCoverage ──► Pruner   │
//! │             (per test)          (running union)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Profiles are immutable once produced. The merged set only grows: merging
//! a profile can add instrumented or covered ranges, never remove them.

mod block;
mod merge;
mod profile;

pub use block::{BlockKey, CoverageBlock, Position, SourceRange};
pub use merge::{FileCoverage, MergedCoverage, RangeSet};
pub use profile::{CoverageMode, CoverageProfile};
