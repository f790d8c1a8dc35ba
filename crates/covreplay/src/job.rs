//! Job orchestration
//!
//! # Architecture
//!
//! ```text
//!  start_job ──► JobId ──► jobs cache: InProgress("Initializing job")
//!      │
//!      └─► tokio task ──► semaphore permit ──► Assembler::run ──► Complete | Failed
//!                              │                     │
//!                              │                     └─ progress ──► jobs cache
//!                              └─ "Waiting for a worker slot"
//!
//!  job_status(id) ──► jobs cache read
//! ```
//!
//! Every status transition goes through the jobs cache worker, so readers
//! never see a partially written status. A worker that panics is reported as
//! `Failed` and does not take the orchestrator down.

use crate::assemble::{ensure_distinct, Assembler, JobResult, ProgressSink, Snapshot};
use crate::cache::CacheHandle;
use crate::config::ReplayConfig;
use crate::oracle::{CachedOracle, CoverageOracle};
use crate::order::{SortStrategy, TestOrderer};
use crate::result::{ReplayError, ReplayResult};
use crate::syntax::SourceSet;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Opaque job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ReplayError::config(format!("invalid job id {s:?}: {e}")))
    }
}

/// What to replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Package the tests belong to
    pub package: String,
    /// Tests, in caller order
    pub tests: Vec<String>,
    /// Ordering strategy
    #[serde(default)]
    pub sort: SortStrategy,
}

impl JobConfig {
    /// Replay `tests` of `package` in caller order
    #[must_use]
    pub fn new(package: impl Into<String>, tests: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            package: package.into(),
            tests: tests.into_iter().map(Into::into).collect(),
            sort: SortStrategy::Hardcoded,
        }
    }

    /// Use a different ordering strategy
    #[must_use]
    pub const fn with_sort(mut self, sort: SortStrategy) -> Self {
        self.sort = sort;
        self
    }

    /// Reject a test list naming the same test twice
    pub fn validate(&self) -> ReplayResult<()> {
        ensure_distinct(&self.tests)
    }
}

/// Observable state of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Still running; `details` names the current step
    InProgress {
        /// Current step
        details: String,
    },
    /// Finished; one snapshot per test plus the baseline
    Complete {
        /// Tests in replay order
        tests: Vec<String>,
        /// Snapshots, baseline last
        snapshots: Vec<Snapshot>,
    },
    /// Aborted
    Failed {
        /// What went wrong
        error: String,
    },
}

impl JobStatus {
    fn in_progress(details: impl Into<String>) -> Self {
        Self::InProgress {
            details: details.into(),
        }
    }

    /// Whether the job will not change state again
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress { .. })
    }

    /// Progress text of a running job
    #[must_use]
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::InProgress { details } => Some(details),
            _ => None,
        }
    }

    /// The result of a completed job
    #[must_use]
    pub fn into_result(self) -> Option<JobResult> {
        match self {
            Self::Complete { tests, snapshots } => Some(JobResult { tests, snapshots }),
            _ => None,
        }
    }
}

impl From<ReplayResult<JobResult>> for JobStatus {
    fn from(outcome: ReplayResult<JobResult>) -> Self {
        match outcome {
            Ok(JobResult { tests, snapshots }) => Self::Complete { tests, snapshots },
            Err(err) => Self::Failed {
                error: err.to_string(),
            },
        }
    }
}

/// Runs replay jobs on a bounded pool of tokio tasks
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: ReplayConfig,
    jobs: CacheHandle,
    oracle: Arc<dyn CoverageOracle>,
    sources: SourceSet,
    permits: Arc<Semaphore>,
    active: watch::Sender<usize>,
}

impl Orchestrator {
    /// Create an orchestrator with its jobs and profiles caches
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: ReplayConfig,
        oracle: Arc<dyn CoverageOracle>,
        sources: SourceSet,
    ) -> ReplayResult<Self> {
        config.validate()?;
        let jobs = CacheHandle::spawn("jobs", config.cache_queue_depth);
        let profiles = CacheHandle::spawn("profiles", config.cache_queue_depth);
        let oracle: Arc<dyn CoverageOracle> = Arc::new(CachedOracle::new(oracle, profiles));
        let (active, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
                config,
                jobs,
                oracle,
                sources,
                active,
            }),
        })
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.inner.config
    }

    /// Register a job and start it in the background
    ///
    /// An invalid [`JobConfig`] is refused before any id is allocated.
    pub async fn start_job(&self, job: JobConfig) -> ReplayResult<JobId> {
        job.validate()?;
        let id = JobId::generate();
        self.inner
            .publish(id, JobStatus::in_progress("Initializing job"))
            .await?;

        self.inner.active.send_modify(|n| *n += 1);
        let inner = Arc::clone(&self.inner);
        info!(job_id = %id, package = %job.package, tests = job.tests.len(), sort = %job.sort, "job started");
        tokio::spawn(async move {
            inner.run(id, job).await;
            inner.active.send_modify(|n| *n -= 1);
        });
        Ok(id)
    }

    /// Current status of a job, `None` for an unknown id
    pub async fn job_status(&self, id: JobId) -> ReplayResult<Option<JobStatus>> {
        Ok(self
            .inner
            .jobs
            .read_as::<JobStatus>(&id.to_string())
            .await?
            .map(|status| (*status).clone()))
    }

    /// Wait until no job is running
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("active", &*self.inner.active.borrow())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn publish(&self, id: JobId, status: JobStatus) -> ReplayResult<()> {
        self.jobs.write_value(&id.to_string(), status).await
    }

    async fn run(&self, id: JobId, job: JobConfig) {
        let permit = if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            permit
        } else {
            JobProgress { inner: self, id }
                .report("Waiting for a worker slot".to_string())
                .await;
            match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    self.finish(id, Err(ReplayError::config(err.to_string()))).await;
                    return;
                }
            }
        };

        let outcome = AssertUnwindSafe(self.pipeline(id, &job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ReplayError::WorkerPanicked {
                    message: panic_message(panic.as_ref()),
                })
            });
        drop(permit);
        self.finish(id, outcome).await;
    }

    async fn pipeline(&self, id: JobId, job: &JobConfig) -> ReplayResult<JobResult> {
        let orderer = TestOrderer::new(job.sort).with_weights(self.config.importance_weights);
        let assembler = Assembler::new(self.sources.clone(), orderer)
            .with_max_prune_passes(self.config.max_prune_passes);
        let progress = JobProgress { inner: self, id };
        assembler
            .run(self.oracle.as_ref(), &job.package, &job.tests, &progress)
            .await
    }

    async fn finish(&self, id: JobId, outcome: ReplayResult<JobResult>) {
        match &outcome {
            Ok(result) => info!(job_id = %id, snapshots = result.snapshots.len(), "job complete"),
            Err(err) => warn!(job_id = %id, %err, "job failed"),
        }
        if let Err(err) = self.publish(id, JobStatus::from(outcome)).await {
            error!(job_id = %id, %err, "could not record final job status");
        }
    }
}

/// Writes progress of one job into the jobs cache
struct JobProgress<'a> {
    inner: &'a Inner,
    id: JobId,
}

#[async_trait]
impl ProgressSink for JobProgress<'_> {
    async fn report(&self, details: String) {
        if let Err(err) = self.inner.publish(self.id, JobStatus::in_progress(details)).await {
            warn!(job_id = %self.id, %err, "could not record job progress");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageBlock, CoverageMode, CoverageProfile, Position};
    use crate::oracle::InMemoryOracle;
    use crate::syntax::MemorySource;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::Notify;

    const SRC: &str = "fn f() {\n    a();\n}\n";

    fn profile(count: u32) -> CoverageProfile {
        CoverageProfile::from_blocks(
            CoverageMode::Set,
            vec![CoverageBlock::new("f.rs", Position::new(1, 8), Position::new(3, 2), 1, count)],
        )
    }

    fn sources() -> SourceSet {
        SourceSet::in_memory(MemorySource::new().with_file("f.rs", SRC), true)
    }

    fn orchestrator(oracle: impl CoverageOracle + 'static, jobs: usize) -> Orchestrator {
        let config = ReplayConfig::new().with_max_concurrent_jobs(jobs);
        Orchestrator::new(config, Arc::new(oracle), sources()).unwrap()
    }

    /// Oracle that blocks until released
    struct Gate {
        open: Notify,
    }

    #[async_trait]
    impl CoverageOracle for Gate {
        async fn profile(&self, _package: &str, _test: &str) -> ReplayResult<CoverageProfile> {
            self.open.notified().await;
            Ok(profile(1))
        }
    }

    struct Panicking;

    #[async_trait]
    impl CoverageOracle for Panicking {
        async fn profile(&self, _package: &str, _test: &str) -> ReplayResult<CoverageProfile> {
            panic!("oracle exploded");
        }
    }

    async fn poll_until<F: Fn(&JobStatus) -> bool>(orch: &Orchestrator, id: JobId, done: F) -> JobStatus {
        for _ in 0..500 {
            let status = orch.job_status(id).await.unwrap().unwrap();
            if done(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached the expected state");
    }

    #[tokio::test]
    async fn test_job_completes_with_snapshots() {
        let oracle = InMemoryOracle::new()
            .with_profile("pkg", "TestLive", profile(1))
            .with_profile("pkg", "TestDead", profile(0));
        let orch = orchestrator(oracle, 2);
        let id = orch
            .start_job(JobConfig::new("pkg", ["TestDead", "TestLive"]))
            .await
            .unwrap();
        orch.wait_idle().await;

        let result = orch.job_status(id).await.unwrap().unwrap().into_result().unwrap();
        assert_eq!(result.tests, vec!["TestDead", "TestLive"]);
        assert_eq!(result.snapshots.len(), 3);
        assert_eq!(result.snapshots[0]["f.rs"], b"fn f() {\n}\n");
        assert_eq!(result.snapshots[1]["f.rs"], SRC.as_bytes());
        assert_eq!(result.snapshots[2]["f.rs"], SRC.as_bytes());
    }

    #[tokio::test]
    async fn test_job_ids_are_distinct() {
        let oracle = InMemoryOracle::new().with_profile("pkg", "T", profile(1));
        let orch = orchestrator(oracle, 4);
        let mut ids = HashSet::new();
        for _ in 0..10 {
            ids.insert(orch.start_job(JobConfig::new("pkg", ["T"])).await.unwrap());
        }
        orch.wait_idle().await;
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test]
    async fn test_repeated_test_refused_at_start() {
        let oracle = InMemoryOracle::new()
            .with_profile("pkg", "A", profile(1))
            .with_profile("pkg", "B", profile(1));
        let orch = orchestrator(oracle, 1);
        let err = orch
            .start_job(JobConfig::new("pkg", ["A", "A", "B"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Config { .. }));

        let id = orch.start_job(JobConfig::new("pkg", ["A", "B"])).await.unwrap();
        orch.wait_idle().await;
        let result = orch.job_status(id).await.unwrap().unwrap().into_result().unwrap();
        assert_eq!(result.snapshots.len(), result.tests.len() + 1);
    }

    #[tokio::test]
    async fn test_unknown_job_is_none() {
        let orch = orchestrator(InMemoryOracle::new(), 1);
        let id: JobId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert!(orch.job_status(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oracle_failure_marks_job_failed() {
        let oracle = InMemoryOracle::new().with_failure("pkg", "TestB", "build failed");
        let orch = orchestrator(oracle, 1);
        let id = orch.start_job(JobConfig::new("pkg", ["TestB"])).await.unwrap();
        orch.wait_idle().await;
        let status = orch.job_status(id).await.unwrap().unwrap();
        assert!(matches!(status, JobStatus::Failed { ref error } if error.contains("build failed")));
    }

    #[tokio::test]
    async fn test_panicking_worker_is_contained() {
        let orch = orchestrator(Panicking, 1);
        let id = orch.start_job(JobConfig::new("pkg", ["T"])).await.unwrap();
        orch.wait_idle().await;
        let status = orch.job_status(id).await.unwrap().unwrap();
        assert!(matches!(status, JobStatus::Failed { ref error } if error.contains("oracle exploded")));

        // The orchestrator keeps serving jobs
        let other = orch.start_job(JobConfig::new("pkg", ["T"])).await.unwrap();
        orch.wait_idle().await;
        assert!(orch.job_status(other).await.unwrap().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_pool_bound_queues_extra_jobs() {
        let gate = Arc::new(Gate { open: Notify::new() });
        let config = ReplayConfig::new().with_max_concurrent_jobs(1);
        let orch = Orchestrator::new(config, Arc::clone(&gate) as Arc<dyn CoverageOracle>, sources()).unwrap();

        let first = orch.start_job(JobConfig::new("pkg", ["A"])).await.unwrap();
        let second = orch.start_job(JobConfig::new("pkg", ["B"])).await.unwrap();

        poll_until(&orch, first, |s| s.details() == Some("Computing coverage for 1 of 1 tests")).await;
        poll_until(&orch, second, |s| s.details() == Some("Waiting for a worker slot")).await;

        gate.open.notify_one();
        poll_until(&orch, second, |s| s.details() == Some("Computing coverage for 1 of 1 tests")).await;
        gate.open.notify_one();
        orch.wait_idle().await;

        for id in [first, second] {
            assert!(orch.job_status(id).await.unwrap().unwrap().into_result().is_some());
        }
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let status = JobStatus::in_progress("Computing test ordering");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"state":"in_progress","details":"Computing test ordering"}"#);
    }

    #[test]
    fn test_job_id_rejects_garbage() {
        assert!(matches!("nope".parse::<JobId>(), Err(ReplayError::Config { .. })));
    }
}
