//! On-disk layout of a replay run
//!
//! ```text
//! OUT/
//! ├── manifest.json
//! ├── 000-TestTokenize/src/parser.rs
//! ├── 001-TestDescribe/src/parser.rs
//! └── 002-baseline/src/parser.rs
//! ```

use crate::error::{CliError, CliResult};
use covreplay::{JobResult, SortStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Name of the manifest inside the output directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Label of the final, unpruned snapshot
pub const BASELINE_LABEL: &str = "baseline";

/// Index of a replay run's snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package the tests belong to
    pub package: String,
    /// Strategy that produced the order
    pub sort: SortStrategy,
    /// Tests in replay order
    pub tests: Vec<String>,
    /// One entry per snapshot, baseline last
    pub snapshots: Vec<SnapshotEntry>,
}

/// A snapshot directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Position in the replay
    pub index: usize,
    /// Test name, or `baseline`
    pub label: String,
    /// Directory name under the output directory
    pub dir: String,
    /// File paths as recorded in the coverage profiles
    pub files: Vec<String>,
}

impl Manifest {
    /// Describe a job result without writing anything
    #[must_use]
    pub fn describe(package: &str, sort: SortStrategy, result: &JobResult) -> Self {
        let snapshots = result
            .snapshots
            .iter()
            .enumerate()
            .map(|(index, snapshot)| {
                let label = result
                    .tests
                    .get(index)
                    .map_or(BASELINE_LABEL, String::as_str)
                    .to_string();
                SnapshotEntry {
                    index,
                    dir: snapshot_dir_name(index, &label),
                    label,
                    files: snapshot.keys().cloned().collect(),
                }
            })
            .collect();
        Self {
            package: package.to_string(),
            sort,
            tests: result.tests.clone(),
            snapshots,
        }
    }

    /// Read `OUT/manifest.json`
    pub fn load(out: &Path) -> CliResult<Self> {
        let path = out.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| CliError::invalid_argument(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write `OUT/manifest.json`
    pub fn save(&self, out: &Path) -> CliResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(out.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    /// Entry of snapshot `index`
    pub fn snapshot(&self, index: usize) -> CliResult<&SnapshotEntry> {
        self.snapshots.get(index).ok_or_else(|| {
            CliError::invalid_argument(format!(
                "snapshot index {index} out of range (run has {} snapshots)",
                self.snapshots.len()
            ))
        })
    }
}

/// `NNN-<label>`, with characters unsafe in a directory name replaced
#[must_use]
pub fn snapshot_dir_name(index: usize, label: &str) -> String {
    let label: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{index:03}-{label}")
}

/// Whether `name` has the shape [`snapshot_dir_name`] produces
///
/// A single path component, so joining it onto the output directory never
/// leaves that directory.
#[must_use]
pub fn is_snapshot_dir_name(name: &str) -> bool {
    let Some((index, label)) = name.split_once('-') else {
        return false;
    };
    index.len() >= 3
        && index.bytes().all(|b| b.is_ascii_digit())
        && !label.is_empty()
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

/// Relative form of a profile file path, for placing it under a directory
///
/// Leading roots are stripped; `..` is rejected.
pub fn sanitize_relative(file: &str) -> CliResult<PathBuf> {
    let mut rel = PathBuf::new();
    for component in Path::new(file).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::ParentDir => {
                return Err(CliError::output(format!("refusing path with '..': {file}")));
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    if rel.as_os_str().is_empty() {
        return Err(CliError::output(format!("empty file path {file:?}")));
    }
    Ok(rel)
}

/// [`sanitize_relative`] over a snapshot's files, paired with the original path
///
/// Two profile paths landing on the same relative path (`/x/a.rs` and
/// `x/a.rs`) are an error.
pub fn relative_paths<'a, I>(files: I) -> CliResult<Vec<(&'a str, PathBuf)>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashMap<PathBuf, &str> = HashMap::new();
    let mut paths = Vec::new();
    for file in files {
        let rel = sanitize_relative(file)?;
        if let Some(other) = seen.insert(rel.clone(), file) {
            return Err(CliError::output(format!(
                "{other} and {file} both map to {}",
                rel.display()
            )));
        }
        paths.push((file, rel));
    }
    Ok(paths)
}
