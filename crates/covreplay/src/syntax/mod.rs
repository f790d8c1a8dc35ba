//! Source collaborators: parsing, printing and raw reading
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  parse   ┌────────────┐  prune   ┌────────────┐  render
//! │ SourceParser │ ───────► │ SyntaxTree │ ───────► │ SyntaxTree │ ───────►  bytes
//! └──────────────┘          └────────────┘          │  + holes   │
//!                                                   └────────────┘
//! ┌──────────────┐
//! │ SourceReader │ ─────────────────────────────────────────────────────►  bytes
//! └──────────────┘                                      (baseline snapshot)
//! ```
//!
//! The traits are the seams a host can replace. [`FsSource`] and
//! [`SplicePrinter`] are the default Rust-source implementations;
//! [`MemorySource`] serves files from memory.

mod lower;
mod render;
mod tree;

pub use lower::parse_source;
pub use render::{splice, SplicePrinter};
pub use tree::{Arm, Body, ElseBranch, ElseKind, Node, NodeKind, SyntaxTree};

use crate::result::{ReplayError, ReplayResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Turns a file path into a prunable tree
pub trait SourceParser: Send + Sync {
    /// Parse the file at `path`
    fn parse(&self, path: &str) -> ReplayResult<SyntaxTree>;
}

/// Turns a (possibly pruned) tree back into bytes
pub trait SourcePrinter: Send + Sync {
    /// Render `tree`
    fn render(&self, tree: &SyntaxTree) -> ReplayResult<Vec<u8>>;
}

/// Reads original file contents
pub trait SourceReader: Send + Sync {
    /// Read the file at `path`
    fn read(&self, path: &str) -> ReplayResult<Vec<u8>>;
}

/// Files on disk, resolved against a root directory
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    /// Resolve relative paths against `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

impl SourceReader for FsSource {
    fn read(&self, path: &str) -> ReplayResult<Vec<u8>> {
        std::fs::read(self.resolve(path)).map_err(|e| ReplayError::read(path, e.to_string()))
    }
}

impl SourceParser for FsSource {
    fn parse(&self, path: &str) -> ReplayResult<SyntaxTree> {
        let bytes = std::fs::read(self.resolve(path)).map_err(|e| ReplayError::parse(path, e.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|e| ReplayError::parse(path, e.to_string()))?;
        parse_source(path, &text)
    }
}

/// Files held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }

    fn text(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

impl SourceReader for MemorySource {
    fn read(&self, path: &str) -> ReplayResult<Vec<u8>> {
        self.text(path)
            .map(|t| t.as_bytes().to_vec())
            .ok_or_else(|| ReplayError::read(path, "no such file"))
    }
}

impl SourceParser for MemorySource {
    fn parse(&self, path: &str) -> ReplayResult<SyntaxTree> {
        let text = self
            .text(path)
            .ok_or_else(|| ReplayError::parse(path, "no such file"))?;
        parse_source(path, text)
    }
}

/// Parser, printer and reader used by a job
#[derive(Clone)]
pub struct SourceSet {
    /// Builds prunable trees
    pub parser: Arc<dyn SourceParser>,
    /// Renders pruned trees
    pub printer: Arc<dyn SourcePrinter>,
    /// Reads originals for the baseline snapshot
    pub reader: Arc<dyn SourceReader>,
}

impl SourceSet {
    /// Assemble a set from explicit collaborators
    #[must_use]
    pub fn new(
        parser: Arc<dyn SourceParser>,
        printer: Arc<dyn SourcePrinter>,
        reader: Arc<dyn SourceReader>,
    ) -> Self {
        Self {
            parser,
            printer,
            reader,
        }
    }

    /// Rust sources under `root`, rendered by splicing
    #[must_use]
    pub fn filesystem(root: impl Into<PathBuf>, verify: bool) -> Self {
        let fs = Arc::new(FsSource::new(root));
        Self::new(
            Arc::clone(&fs) as Arc<dyn SourceParser>,
            Arc::new(SplicePrinter::new().verifying(verify)),
            fs,
        )
    }

    /// Rust sources held in memory
    #[must_use]
    pub fn in_memory(source: MemorySource, verify: bool) -> Self {
        let source = Arc::new(source);
        Self::new(
            Arc::clone(&source) as Arc<dyn SourceParser>,
            Arc::new(SplicePrinter::new().verifying(verify)),
            source,
        )
    }
}

impl fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSet").finish_non_exhaustive()
    }
}
