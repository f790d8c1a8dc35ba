//! Test ordering strategies
//!
//! An orderer is a pure function from the per-test profiles to a permutation
//! of the test names. Every strategy is deterministic and breaks ties by the
//! caller's original order.
//!
//! | Strategy | Rule |
//! |----------|------|
//! | `hardcoded` | caller order, verbatim |
//! | `raw` | descending standalone covered statements |
//! | `net` | greedy: most statements not yet covered by earlier picks |
//! | `importance` | greedy: `raw_weight * raw + net_weight * net_new` |

use crate::config::ImportanceWeights;
use crate::coverage::{BlockKey, CoverageProfile};
use crate::result::{ReplayError, ReplayResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Named test ordering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortStrategy {
    /// Caller-supplied order
    #[default]
    Hardcoded,
    /// Descending by standalone covered statements
    Raw,
    /// Greedy maximum coverage
    NetNew,
    /// Weighted blend of standalone and incremental coverage
    Importance,
}

impl SortStrategy {
    /// All strategies
    pub const ALL: [Self; 4] = [Self::Hardcoded, Self::Raw, Self::NetNew, Self::Importance];

    /// Canonical name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hardcoded => "hardcoded",
            Self::Raw => "raw",
            Self::NetNew => "net",
            Self::Importance => "importance",
        }
    }

    /// Parse a strategy name, falling back to [`SortStrategy::Hardcoded`]
    /// for anything unrecognized
    #[must_use]
    pub fn from_name_lossy(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(strategy = name, "unknown sort strategy, using hardcoded order");
            Self::Hardcoded
        })
    }
}

impl FromStr for SortStrategy {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardcoded" | "" => Ok(Self::Hardcoded),
            "raw" => Ok(Self::Raw),
            "net" | "net-new" => Ok(Self::NetNew),
            "importance" => Ok(Self::Importance),
            other => Err(ReplayError::config(format!("unknown sort strategy {other:?}"))),
        }
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Profiles keyed by test name, remembering the caller's order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestProfiles {
    entries: Vec<(String, CoverageProfile)>,
}

impl TestProfiles {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a test. A repeated name keeps its first position and profile.
    pub fn insert(&mut self, test: impl Into<String>, profile: CoverageProfile) -> bool {
        let test = test.into();
        if self.get(&test).is_some() {
            return false;
        }
        self.entries.push((test, profile));
        true
    }

    /// Profile of one test
    #[must_use]
    pub fn get(&self, test: &str) -> Option<&CoverageProfile> {
        self.entries
            .iter()
            .find(|(name, _)| name == test)
            .map(|(_, profile)| profile)
    }

    /// Test names in caller order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Entries in caller order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoverageProfile)> {
        self.entries.iter().map(|(name, profile)| (name.as_str(), profile))
    }

    /// Number of tests
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no tests
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, CoverageProfile)> for TestProfiles {
    fn from_iter<I: IntoIterator<Item = (S, CoverageProfile)>>(iter: I) -> Self {
        let mut profiles = Self::new();
        for (name, profile) in iter {
            profiles.insert(name, profile);
        }
        profiles
    }
}

/// A test's place in an ordering, with the counts that put it there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTest {
    /// Test name
    pub name: String,
    /// Statements the test covers on its own
    pub raw: u64,
    /// Statements the test adds over the tests before it
    pub net_new: u64,
}

/// Orders tests by a [`SortStrategy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TestOrderer {
    strategy: SortStrategy,
    weights: ImportanceWeights,
}

impl TestOrderer {
    /// Create an orderer with default importance weights
    #[must_use]
    pub fn new(strategy: SortStrategy) -> Self {
        Self {
            strategy,
            weights: ImportanceWeights::default(),
        }
    }

    /// Use custom importance weights
    #[must_use]
    pub const fn with_weights(mut self, weights: ImportanceWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Strategy in use
    #[must_use]
    pub const fn strategy(&self) -> SortStrategy {
        self.strategy
    }

    /// Order the tests
    #[must_use]
    pub fn order(&self, profiles: &TestProfiles) -> Vec<String> {
        let candidates = Candidate::collect(profiles);
        let picked = match self.strategy {
            SortStrategy::Hardcoded => (0..candidates.len()).collect(),
            SortStrategy::Raw => by_raw(&candidates),
            SortStrategy::NetNew => greedy(&candidates, |_, gain| gain as f64),
            SortStrategy::Importance => {
                let w = self.weights;
                greedy(&candidates, |raw, gain| w.raw * raw as f64 + w.net_new * gain as f64)
            }
        };
        picked
            .into_iter()
            .map(|idx| candidates[idx].name.to_string())
            .collect()
    }

    /// Order the tests and report raw and net-new counts along the order
    #[must_use]
    pub fn rank(&self, profiles: &TestProfiles) -> Vec<RankedTest> {
        explain(&self.order(profiles), profiles)
    }
}

/// Raw and net-new counts of the tests in `order`
#[must_use]
pub fn explain(order: &[String], profiles: &TestProfiles) -> Vec<RankedTest> {
    let mut seen: HashSet<BlockKey> = HashSet::new();
    order
        .iter()
        .filter_map(|name| profiles.get(name).map(|p| (name, Candidate::statements(p))))
        .map(|(name, statements)| {
            let raw = statements.values().map(|s| u64::from(*s)).sum();
            let mut net_new = 0;
            for (key, count) in statements {
                if seen.insert(key) {
                    net_new += u64::from(count);
                }
            }
            RankedTest {
                name: name.clone(),
                raw,
                net_new,
            }
        })
        .collect()
}

struct Candidate<'a> {
    name: &'a str,
    statements: BTreeMap<BlockKey, u32>,
    raw: u64,
}

impl<'a> Candidate<'a> {
    fn collect(profiles: &'a TestProfiles) -> Vec<Self> {
        profiles
            .iter()
            .map(|(name, profile)| {
                let statements = Self::statements(profile);
                let raw = statements.values().map(|s| u64::from(*s)).sum();
                Self {
                    name,
                    statements,
                    raw,
                }
            })
            .collect()
    }

    fn statements(profile: &CoverageProfile) -> BTreeMap<BlockKey, u32> {
        profile
            .covered_blocks()
            .map(|b| (b.key(), b.statements))
            .collect()
    }

    fn gain(&self, seen: &HashSet<BlockKey>) -> u64 {
        self.statements
            .iter()
            .filter(|(key, _)| !seen.contains(*key))
            .map(|(_, count)| u64::from(*count))
            .sum()
    }
}

fn by_raw(candidates: &[Candidate<'_>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // Stable sort keeps caller order among equal counts.
    order.sort_by_key(|idx| std::cmp::Reverse(candidates[*idx].raw));
    order
}

fn greedy(candidates: &[Candidate<'_>], score: impl Fn(u64, u64) -> f64) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut seen: HashSet<BlockKey> = HashSet::new();
    let mut order = Vec::with_capacity(candidates.len());

    while !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (pos, idx) in remaining.iter().enumerate() {
            let candidate = &candidates[*idx];
            let value = score(candidate.raw, candidate.gain(&seen));
            // Strictly greater: the earliest test wins ties.
            if value > best_score {
                best_score = value;
                best_pos = pos;
            }
        }
        let idx = remaining.remove(best_pos);
        seen.extend(candidates[idx].statements.keys().cloned());
        order.push(idx);
    }
    order
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageBlock, CoverageMode, Position};

    /// Profile covering the given `(line, statements)` blocks of `f.rs`
    fn profile(blocks: &[(u32, u32)]) -> CoverageProfile {
        CoverageProfile::from_blocks(
            CoverageMode::Set,
            blocks.iter().map(|(line, stmts)| {
                CoverageBlock::new(
                    "f.rs",
                    Position::new(*line, 1),
                    Position::new(*line + 1, 1),
                    *stmts,
                    1,
                )
            }),
        )
    }

    fn profiles() -> TestProfiles {
        // a: 3 stmts, b: 5 stmts overlapping a, c: 2 stmts disjoint
        [
            ("a", profile(&[(1, 3)])),
            ("b", profile(&[(1, 3), (2, 2)])),
            ("c", profile(&[(3, 2)])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in SortStrategy::ALL {
            assert_eq!(strategy.name().parse::<SortStrategy>().unwrap(), strategy);
        }
        assert_eq!("net-new".parse::<SortStrategy>().unwrap(), SortStrategy::NetNew);
    }

    #[test]
    fn test_unknown_strategy_falls_back() {
        assert!("fastest".parse::<SortStrategy>().is_err());
        assert_eq!(SortStrategy::from_name_lossy("fastest"), SortStrategy::Hardcoded);
    }

    #[test]
    fn test_hardcoded_keeps_caller_order() {
        let order = TestOrderer::new(SortStrategy::Hardcoded).order(&profiles());
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_raw_descending() {
        let order = TestOrderer::new(SortStrategy::Raw).order(&profiles());
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_raw_ties_keep_caller_order() {
        let tied: TestProfiles = [
            ("x", profile(&[(1, 2)])),
            ("y", profile(&[(5, 2)])),
            ("z", profile(&[(9, 4)])),
        ]
        .into_iter()
        .collect();
        let order = TestOrderer::new(SortStrategy::Raw).order(&tied);
        assert_eq!(order, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_net_new_skips_redundant_test() {
        // After b, a adds nothing while c adds 2.
        let order = TestOrderer::new(SortStrategy::NetNew).order(&profiles());
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_importance_blends_raw_and_gain() {
        let order = TestOrderer::new(SortStrategy::Importance).order(&profiles());
        // Step 2 scores: a = 3 + 2*0 = 3, c = 2 + 2*2 = 6.
        assert_eq!(order, vec!["b", "c", "a"]);

        let raw_heavy = ImportanceWeights {
            raw: 1.0,
            net_new: 0.0,
        };
        let order = TestOrderer::new(SortStrategy::Importance)
            .with_weights(raw_heavy)
            .order(&profiles());
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_uncovered_blocks_do_not_count() {
        let mut zero = profile(&[(1, 5)]);
        zero = CoverageProfile::from_blocks(
            CoverageMode::Set,
            zero.blocks().iter().cloned().map(|mut b| {
                b.executed = 0;
                b
            }),
        );
        let set: TestProfiles = [("zero", zero), ("one", profile(&[(2, 1)]))]
            .into_iter()
            .collect();
        let order = TestOrderer::new(SortStrategy::Raw).order(&set);
        assert_eq!(order, vec!["one", "zero"]);
    }

    #[test]
    fn test_duplicate_names_collapse() {
        let mut set = TestProfiles::new();
        assert!(set.insert("a", profile(&[(1, 1)])));
        assert!(!set.insert("a", profile(&[(2, 9)])));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().covered_statements(), 1);
    }

    #[test]
    fn test_rank_reports_counts() {
        let ranked = TestOrderer::new(SortStrategy::NetNew).rank(&profiles());
        let summary: Vec<(&str, u64, u64)> = ranked
            .iter()
            .map(|r| (r.name.as_str(), r.raw, r.net_new))
            .collect();
        assert_eq!(summary, vec![("b", 5, 5), ("c", 2, 2), ("a", 3, 0)]);
    }

    #[test]
    fn test_empty_input() {
        for strategy in SortStrategy::ALL {
            assert!(TestOrderer::new(strategy).order(&TestProfiles::new()).is_empty());
        }
    }
}
