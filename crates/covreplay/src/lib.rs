//! Covreplay: replay a test suite's coverage growth as source snapshots
//!
//! Given a package and its tests, Covreplay asks a coverage oracle for each
//! test's profile, orders the tests, and emits one snapshot of the touched
//! source files per test. Snapshot `i` shows only the code executed by tests
//! `0..=i`; everything the merged coverage proves dead is pruned away. A final
//! baseline snapshot holds the unmodified files.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        COVREPLAY Architecture                        │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐              │
//! │  │ Orchestrator │──►│  Assembler   │──►│ TestOrderer  │              │
//! │  │ (tokio pool) │   │              │   └──────────────┘              │
//! │  └──────┬───────┘   │              │   ┌──────────────┐              │
//! │         │           │              │──►│ MergedCov.   │──► Pruner    │
//! │         ▼           └──────┬───────┘   └──────────────┘      │       │
//! │  ┌──────────────┐          │                                 ▼       │
//! │  │ jobs cache   │   ┌──────▼───────┐                  SourcePrinter  │
//! │  │ (actor)      │   │ CachedOracle │──► profiles cache               │
//! │  └──────────────┘   └──────────────┘                                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use covreplay::{JobConfig, Orchestrator, ProfileDirOracle, ReplayConfig, SortStrategy, SourceSet};
//! use std::sync::Arc;
//!
//! # async fn demo() -> covreplay::ReplayResult<()> {
//! let orchestrator = Orchestrator::new(
//!     ReplayConfig::default(),
//!     Arc::new(ProfileDirOracle::new("profiles")),
//!     SourceSet::filesystem(".", true),
//! )?;
//! let id = orchestrator
//!     .start_job(JobConfig::new("mypkg", ["TestA", "TestB"]).with_sort(SortStrategy::NetNew))
//!     .await?;
//! orchestrator.wait_idle().await;
//! println!("{:?}", orchestrator.job_status(id).await?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod assemble;
mod cache;
mod config;
pub mod coverage;
mod job;
mod oracle;
#[allow(clippy::suboptimal_flops)]
mod order;
mod prune;
mod result;
pub mod syntax;

pub use assemble::{collect_profiles, Assembler, JobResult, NoProgress, ProgressSink, Snapshot};
pub use cache::{CacheHandle, CachePayload};
pub use config::{ImportanceWeights, ReplayConfig};
pub use coverage::{CoverageBlock, CoverageMode, CoverageProfile, MergedCoverage, Position, SourceRange};
pub use job::{JobConfig, JobId, JobStatus, Orchestrator};
pub use oracle::{CachedOracle, CoverageOracle, InMemoryOracle, ProfileDirOracle};
pub use order::{explain, RankedTest, SortStrategy, TestOrderer, TestProfiles};
pub use prune::{PruneStats, Pruner, DEFAULT_MAX_PASSES};
pub use result::{ReplayError, ReplayResult};
pub use syntax::{
    FsSource, MemorySource, SourceParser, SourcePrinter, SourceReader, SourceSet, SplicePrinter,
    SyntaxTree,
};
