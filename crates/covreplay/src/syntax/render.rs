//! Rendering of pruned trees back to source text

use super::tree::SyntaxTree;
use super::SourcePrinter;
use crate::result::{ReplayError, ReplayResult};

/// Copy the source of `tree`, skipping every removed byte range
pub fn splice(tree: &SyntaxTree) -> ReplayResult<String> {
    let source = tree.source();
    let mut holes = tree.holes().to_vec();
    holes.sort_by_key(|h| (h.start, h.end));

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for hole in holes {
        let in_bounds = hole.start <= hole.end
            && hole.end <= source.len()
            && source.is_char_boundary(hole.start)
            && source.is_char_boundary(hole.end);
        if !in_bounds {
            return Err(ReplayError::render(
                tree.path(),
                format!("removed range {}..{} is outside the source", hole.start, hole.end),
            ));
        }
        if hole.start > cursor {
            out.push_str(&source[cursor..hole.start]);
        }
        cursor = cursor.max(hole.end);
    }
    out.push_str(&source[cursor..]);
    Ok(out)
}

/// Printer that splices the original text
///
/// With verification on, a pruned rendering must parse again or rendering
/// fails with [`ReplayError::Render`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SplicePrinter {
    verify: bool,
}

impl SplicePrinter {
    /// Create a printer without verification
    #[must_use]
    pub const fn new() -> Self {
        Self { verify: false }
    }

    /// Toggle re-parsing of pruned output
    #[must_use]
    pub const fn verifying(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

impl SourcePrinter for SplicePrinter {
    fn render(&self, tree: &SyntaxTree) -> ReplayResult<Vec<u8>> {
        let text = splice(tree)?;
        if self.verify && !tree.is_pristine() {
            let parsed = syn::parse_file(&text).map(drop).map_err(|err| {
                ReplayError::render(tree.path(), format!("pruned output does not parse: {err}"))
            });
            proc_macro2::extra::invalidate_current_thread_spans();
            parsed?;
        }
        Ok(text.into_bytes())
    }
}
