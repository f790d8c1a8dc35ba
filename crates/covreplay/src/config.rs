//! Replay configuration
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! max_concurrent_jobs: 2
//! importance_weights:
//!   net_new: 3.0
//! ```

use crate::result::{ReplayError, ReplayResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weights of the importance ordering score
///
/// `score = raw * raw_statements + net_new * newly_covered_statements`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceWeights {
    /// Weight of the test's standalone covered statement count
    pub raw: f64,
    /// Weight of the statements the test adds over those already selected
    pub net_new: f64,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            raw: 1.0,
            net_new: 2.0,
        }
    }
}

/// Configuration of the job orchestrator and its pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Maximum number of jobs running their pipeline at the same time
    pub max_concurrent_jobs: usize,
    /// Depth of each cache worker's request queue
    pub cache_queue_depth: usize,
    /// Pass ceiling of the dead-code pruner
    pub max_prune_passes: usize,
    /// Re-parse every rendered snapshot file and fail the job if it is invalid
    pub verify_render: bool,
    /// Weights of the importance ordering
    pub importance_weights: ImportanceWeights,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            cache_queue_depth: 64,
            max_prune_passes: 256,
            verify_render: true,
            importance_weights: ImportanceWeights::default(),
        }
    }
}

impl ReplayConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(text: &str) -> ReplayResult<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> ReplayResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> ReplayResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(ReplayError::config("max_concurrent_jobs must be at least 1"));
        }
        if self.cache_queue_depth == 0 {
            return Err(ReplayError::config("cache_queue_depth must be at least 1"));
        }
        if self.max_prune_passes == 0 {
            return Err(ReplayError::config("max_prune_passes must be at least 1"));
        }
        let weights = self.importance_weights;
        if !weights.raw.is_finite() || !weights.net_new.is_finite() {
            return Err(ReplayError::config("importance weights must be finite"));
        }
        Ok(())
    }

    /// Set the job concurrency limit
    #[must_use]
    pub const fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs;
        self
    }

    /// Set the cache queue depth
    #[must_use]
    pub const fn with_cache_queue_depth(mut self, depth: usize) -> Self {
        self.cache_queue_depth = depth;
        self
    }

    /// Set the pruner pass ceiling
    #[must_use]
    pub const fn with_max_prune_passes(mut self, passes: usize) -> Self {
        self.max_prune_passes = passes;
        self
    }

    /// Enable or disable render verification
    #[must_use]
    pub const fn with_verify_render(mut self, verify: bool) -> Self {
        self.verify_render = verify;
        self
    }

    /// Set the importance weights
    #[must_use]
    pub const fn with_importance_weights(mut self, weights: ImportanceWeights) -> Self {
        self.importance_weights = weights;
        self
    }
}
