//! Coverage oracles: where per-test profiles come from
//!
//! [`CoverageOracle`] is the seam to the outside world. Running a test under
//! coverage is the host's business; this crate ships an oracle reading
//! pre-recorded profiles from disk, an in-memory one, and a memoizing wrapper
//! backed by a [`CacheHandle`].

use crate::cache::CacheHandle;
use crate::coverage::CoverageProfile;
use crate::result::{ReplayError, ReplayResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Produces the coverage profile of one test
#[async_trait]
pub trait CoverageOracle: Send + Sync {
    /// Run (or look up) `test` of `package` and return its profile
    async fn profile(&self, package: &str, test: &str) -> ReplayResult<CoverageProfile>;
}

#[async_trait]
impl<T: CoverageOracle + ?Sized> CoverageOracle for Arc<T> {
    async fn profile(&self, package: &str, test: &str) -> ReplayResult<CoverageProfile> {
        (**self).profile(package, test).await
    }
}

/// Profiles held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryOracle {
    outcomes: HashMap<(String, String), Result<CoverageProfile, String>>,
}

impl InMemoryOracle {
    /// Create an oracle that knows no tests
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `test` of `package` with `profile`
    #[must_use]
    pub fn with_profile(mut self, package: &str, test: &str, profile: CoverageProfile) -> Self {
        self.outcomes
            .insert((package.to_string(), test.to_string()), Ok(profile));
        self
    }

    /// Fail `test` of `package` with `message`
    #[must_use]
    pub fn with_failure(mut self, package: &str, test: &str, message: impl Into<String>) -> Self {
        self.outcomes
            .insert((package.to_string(), test.to_string()), Err(message.into()));
        self
    }
}

#[async_trait]
impl CoverageOracle for InMemoryOracle {
    async fn profile(&self, package: &str, test: &str) -> ReplayResult<CoverageProfile> {
        match self.outcomes.get(&(package.to_string(), test.to_string())) {
            Some(Ok(profile)) => Ok(profile.clone()),
            Some(Err(message)) => Err(ReplayError::oracle(package, test, message.clone())),
            None => Err(ReplayError::oracle(package, test, "no coverage recorded")),
        }
    }
}

/// Profiles recorded on disk as `<dir>/<package>/<test>.out`
#[derive(Debug, Clone)]
pub struct ProfileDirOracle {
    dir: PathBuf,
}

impl ProfileDirOracle {
    /// Read profiles under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the profile for `test` of `package`
    #[must_use]
    pub fn profile_path(&self, package: &str, test: &str) -> PathBuf {
        self.dir.join(package).join(format!("{test}.out"))
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CoverageOracle for ProfileDirOracle {
    async fn profile(&self, package: &str, test: &str) -> ReplayResult<CoverageProfile> {
        let path = self.profile_path(package, test);
        debug!(path = %path.display(), "reading coverage profile");
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ReplayError::oracle(package, test, format!("{}: {e}", path.display()))
        })?;
        CoverageProfile::parse(&text)
    }
}

/// Memoizes another oracle in a cache keyed by `"<package>-<test>"`
///
/// Only successful profiles are stored; a failure is retried next time.
#[derive(Debug, Clone)]
pub struct CachedOracle<O> {
    inner: O,
    cache: CacheHandle,
}

impl<O: CoverageOracle> CachedOracle<O> {
    /// Wrap `inner`, memoizing into `cache`
    #[must_use]
    pub const fn new(inner: O, cache: CacheHandle) -> Self {
        Self { inner, cache }
    }

    /// Cache key of a test
    #[must_use]
    pub fn cache_key(package: &str, test: &str) -> String {
        format!("{package}-{test}")
    }
}

#[async_trait]
impl<O: CoverageOracle> CoverageOracle for CachedOracle<O> {
    async fn profile(&self, package: &str, test: &str) -> ReplayResult<CoverageProfile> {
        let key = Self::cache_key(package, test);
        if let Some(hit) = self.cache.read_as::<CoverageProfile>(&key).await? {
            trace!(%key, "profile cache hit");
            return Ok((*hit).clone());
        }
        let profile = self.inner.profile(package, test).await?;
        self.cache.write_value(&key, profile.clone()).await?;
        Ok(profile)
    }
}
