//! Result assembly: one pruned snapshot per test plus a baseline
//!
//! ```text
//! tests ──► oracle ──► TestProfiles ──► TestOrderer ──► order
//!                                                         │
//!        ┌────────────────────────────────────────────────┘
//!        ▼
//!   for each test i:  merged ∪= profile(i)
//!                     snapshot[i] = { file: render(prune(parse(file))) }
//!   snapshot[n] = { file: original bytes }      (baseline)
//! ```
//!
//! Each file is parsed once per job; later snapshots prune a clone of the
//! pristine tree against the grown coverage.

use crate::coverage::MergedCoverage;
use crate::oracle::CoverageOracle;
use crate::order::{TestOrderer, TestProfiles};
use crate::prune::{Pruner, DEFAULT_MAX_PASSES};
use crate::result::{ReplayError, ReplayResult};
use crate::syntax::{SourceSet, SyntaxTree};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// File path to file contents
pub type Snapshot = BTreeMap<String, Vec<u8>>;

/// Ordered tests and their snapshots; the last snapshot is the baseline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Tests in replay order
    pub tests: Vec<String>,
    /// `tests.len() + 1` snapshots
    pub snapshots: Vec<Snapshot>,
}

impl JobResult {
    /// The unpruned snapshot
    #[must_use]
    pub fn baseline(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }
}

/// Receives human-readable progress while a job runs
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Report the current step
    async fn report(&self, details: String);
}

/// Discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _details: String) {}
}

/// Builds the snapshots of one job
#[derive(Debug, Clone)]
pub struct Assembler {
    sources: SourceSet,
    orderer: TestOrderer,
    max_prune_passes: usize,
}

impl Assembler {
    /// Create an assembler
    #[must_use]
    pub const fn new(sources: SourceSet, orderer: TestOrderer) -> Self {
        Self {
            sources,
            orderer,
            max_prune_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Set the per-file pass ceiling
    #[must_use]
    pub const fn with_max_prune_passes(mut self, passes: usize) -> Self {
        self.max_prune_passes = passes;
        self
    }

    /// Profile, order and snapshot `tests`
    pub async fn run(
        &self,
        oracle: &dyn CoverageOracle,
        package: &str,
        tests: &[String],
        progress: &dyn ProgressSink,
    ) -> ReplayResult<JobResult> {
        let profiles = collect_profiles(oracle, package, tests, progress).await?;
        progress.report("Computing test ordering".to_string()).await;
        let order = self.orderer.order(&profiles);
        debug!(strategy = %self.orderer.strategy(), ?order, "tests ordered");
        self.assemble(&order, &profiles, progress).await
    }

    /// Build one snapshot per test of `order` plus the baseline
    pub async fn assemble(
        &self,
        order: &[String],
        profiles: &TestProfiles,
        progress: &dyn ProgressSink,
    ) -> ReplayResult<JobResult> {
        let mut merged = MergedCoverage::new();
        let mut bench = Workbench::new(self.sources.clone(), self.max_prune_passes);
        let mut snapshots = Vec::with_capacity(order.len() + 1);

        for (idx, test) in order.iter().enumerate() {
            progress
                .report(format!("Constructing snapshot {} of {}", idx + 1, order.len()))
                .await;
            let profile = profiles
                .get(test)
                .ok_or_else(|| ReplayError::config(format!("no profile for test {test}")))?;
            merged.merge(profile);

            // File reads, parsing and pruning block; keep them off the
            // async worker threads.
            let coverage = merged.clone();
            let (snapshot, returned) = tokio::task::spawn_blocking(move || {
                let snapshot = bench.snapshot(&coverage);
                (snapshot, bench)
            })
            .await
            .map_err(|err| ReplayError::WorkerPanicked {
                message: format!("snapshot {} of {}: {err}", idx + 1, order.len()),
            })?;
            bench = returned;
            snapshots.push(snapshot?);
        }

        snapshots.push(bench.baseline);
        Ok(JobResult {
            tests: order.to_vec(),
            snapshots,
        })
    }
}

/// Per-job state carried between snapshots: parsed trees and original bytes
struct Workbench {
    sources: SourceSet,
    max_prune_passes: usize,
    pristine: HashMap<String, SyntaxTree>,
    baseline: Snapshot,
}

impl Workbench {
    fn new(sources: SourceSet, max_prune_passes: usize) -> Self {
        Self {
            sources,
            max_prune_passes,
            pristine: HashMap::new(),
            baseline: Snapshot::new(),
        }
    }

    fn snapshot(&mut self, merged: &MergedCoverage) -> ReplayResult<Snapshot> {
        let pruner = Pruner::new(merged).with_max_passes(self.max_prune_passes);
        let mut contents = Snapshot::new();
        for file in merged.files() {
            let tree = match self.pristine.get(file) {
                Some(tree) => tree.clone(),
                None => {
                    let tree = self.sources.parser.parse(file)?;
                    self.pristine.insert(file.to_string(), tree.clone());
                    tree
                }
            };
            let (pruned, stats) = pruner.prune_with_stats(tree)?;
            debug!(file, passes = stats.passes, removed = stats.removed, "file pruned");
            contents.insert(file.to_string(), self.sources.printer.render(&pruned)?);

            if !self.baseline.contains_key(file) {
                self.baseline.insert(file.to_string(), self.sources.reader.read(file)?);
            }
        }
        Ok(contents)
    }
}

/// Ask the oracle for every test's profile, in input order
///
/// A test named twice is a `Config` error: every entry gets its own snapshot,
/// so the list must be a set.
pub async fn collect_profiles(
    oracle: &dyn CoverageOracle,
    package: &str,
    tests: &[String],
    progress: &dyn ProgressSink,
) -> ReplayResult<TestProfiles> {
    ensure_distinct(tests)?;
    let mut profiles = TestProfiles::new();
    for (idx, test) in tests.iter().enumerate() {
        progress
            .report(format!("Computing coverage for {} of {} tests", idx + 1, tests.len()))
            .await;
        let profile = oracle.profile(package, test).await?;
        profiles.insert(test.clone(), profile);
    }
    Ok(profiles)
}

pub(crate) fn ensure_distinct(tests: &[String]) -> ReplayResult<()> {
    let mut seen = HashSet::with_capacity(tests.len());
    match tests.iter().find(|test| !seen.insert(test.as_str())) {
        Some(test) => Err(ReplayError::config(format!("test {test} is listed more than once"))),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageBlock, CoverageMode, CoverageProfile, Position};
    use crate::oracle::InMemoryOracle;
    use crate::order::SortStrategy;
    use crate::syntax::{MemorySource, SourceParser, SplicePrinter};
    use std::sync::{Arc, Mutex};

    const F1: &str = "fn alpha() -> u32 {\n    let base = 40;\n    base + 2\n}\n";
    const F2: &str = "fn beta(flag: bool) -> u32 {\n    if flag {\n        return 1;\n    }\n    7\n}\n";

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl ProgressSink for Recorder {
        async fn report(&self, details: String) {
            self.0.lock().unwrap().push(details);
        }
    }

    fn profile(f1: u32, f2: u32) -> CoverageProfile {
        CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![
                CoverageBlock::new("f1.rs", Position::new(1, 19), Position::new(4, 2), 2, f1),
                CoverageBlock::new("f2.rs", Position::new(1, 28), Position::new(6, 2), 2, f2),
            ],
        )
    }

    fn assembler(sort: SortStrategy) -> Assembler {
        let source = MemorySource::new().with_file("f1.rs", F1).with_file("f2.rs", F2);
        Assembler::new(SourceSet::in_memory(source, true), TestOrderer::new(sort))
    }

    fn oracle() -> InMemoryOracle {
        InMemoryOracle::new()
            .with_profile("pkg", "TestA", profile(1, 0))
            .with_profile("pkg", "TestB", profile(0, 1))
    }

    fn names(tests: &[&str]) -> Vec<String> {
        tests.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_snapshots_grow_with_coverage() {
        let result = assembler(SortStrategy::Hardcoded)
            .run(&oracle(), "pkg", &names(&["TestA", "TestB"]), &NoProgress)
            .await
            .unwrap();

        assert_eq!(result.tests, names(&["TestA", "TestB"]));
        assert_eq!(result.snapshots.len(), 3);

        let first = &result.snapshots[0];
        assert_eq!(first["f1.rs"], F1.as_bytes());
        assert_eq!(first["f2.rs"], b"fn beta(flag: bool) -> u32 {\n}\n");

        let second = &result.snapshots[1];
        assert_eq!(second["f1.rs"], F1.as_bytes());
        assert_eq!(second["f2.rs"], F2.as_bytes());

        let baseline = result.baseline().unwrap();
        assert_eq!(baseline.len(), 2);
        assert_eq!(baseline["f2.rs"], F2.as_bytes());
    }

    #[tokio::test]
    async fn test_oracle_failure_aborts() {
        let oracle = InMemoryOracle::new()
            .with_profile("pkg", "TestA", profile(1, 0))
            .with_failure("pkg", "TestB", "does not compile");
        let err = assembler(SortStrategy::Raw)
            .run(&oracle, "pkg", &names(&["TestA", "TestB"]), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Oracle { .. }));
    }

    #[tokio::test]
    async fn test_repeated_test_name_is_rejected() {
        for strategy in SortStrategy::ALL {
            let err = assembler(strategy)
                .run(&oracle(), "pkg", &names(&["TestA", "TestA", "TestB"]), &NoProgress)
                .await
                .unwrap_err();
            assert!(matches!(err, ReplayError::Config { .. }));
            assert!(err.to_string().contains("TestA"));
        }
    }

    #[tokio::test]
    async fn test_snapshot_per_listed_test() {
        let tests = names(&["TestB", "TestA"]);
        let result = assembler(SortStrategy::Hardcoded)
            .run(&oracle(), "pkg", &tests, &NoProgress)
            .await
            .unwrap();
        assert_eq!(result.tests, tests);
        assert_eq!(result.snapshots.len(), tests.len() + 1);
    }

    #[tokio::test]
    async fn test_empty_test_list() {
        let result = assembler(SortStrategy::NetNew)
            .run(&oracle(), "pkg", &[], &NoProgress)
            .await
            .unwrap();
        assert!(result.tests.is_empty());
        assert_eq!(result.snapshots, vec![Snapshot::new()]);
    }

    #[tokio::test]
    async fn test_progress_messages() {
        let recorder = Recorder::default();
        assembler(SortStrategy::Hardcoded)
            .run(&oracle(), "pkg", &names(&["TestA", "TestB"]), &recorder)
            .await
            .unwrap();
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "Computing coverage for 1 of 2 tests",
                "Computing coverage for 2 of 2 tests",
                "Computing test ordering",
                "Constructing snapshot 1 of 2",
                "Constructing snapshot 2 of 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_unparseable_file_fails() {
        let source = MemorySource::new().with_file("f1.rs", "fn (").with_file("f2.rs", F2);
        let assembler = Assembler::new(
            SourceSet::in_memory(source, true),
            TestOrderer::new(SortStrategy::Hardcoded),
        );
        let err = assembler
            .run(&oracle(), "pkg", &names(&["TestA"]), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Parse { ref path, .. } if path == "f1.rs"));
    }

    /// Records the thread each parse runs on, optionally panicking
    struct ThreadTrackingParser {
        inner: MemorySource,
        threads: Mutex<Vec<std::thread::ThreadId>>,
        panics: bool,
    }

    impl SourceParser for ThreadTrackingParser {
        fn parse(&self, path: &str) -> ReplayResult<SyntaxTree> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            assert!(!self.panics, "parser blew up on {path}");
            self.inner.parse(path)
        }
    }

    fn tracking_assembler(panics: bool) -> (Assembler, Arc<ThreadTrackingParser>) {
        let source = MemorySource::new().with_file("f1.rs", F1).with_file("f2.rs", F2);
        let parser = Arc::new(ThreadTrackingParser {
            inner: source.clone(),
            threads: Mutex::new(Vec::new()),
            panics,
        });
        let sources = SourceSet::new(
            Arc::clone(&parser) as Arc<dyn SourceParser>,
            Arc::new(SplicePrinter::new()),
            Arc::new(source),
        );
        let assembler = Assembler::new(sources, TestOrderer::new(SortStrategy::Hardcoded));
        (assembler, parser)
    }

    #[tokio::test]
    async fn test_snapshots_built_off_the_runtime_thread() {
        let (assembler, parser) = tracking_assembler(false);
        let result = assembler
            .run(&oracle(), "pkg", &names(&["TestA", "TestB"]), &NoProgress)
            .await
            .unwrap();
        assert_eq!(result.snapshots.len(), 3);

        let runtime_thread = std::thread::current().id();
        let threads = parser.threads.lock().unwrap().clone();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test]
    async fn test_panicking_parser_is_reported() {
        let (assembler, _) = tracking_assembler(true);
        let err = assembler
            .run(&oracle(), "pkg", &names(&["TestA"]), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::WorkerPanicked { ref message } if message.contains("snapshot 1 of 1")));
    }
}
