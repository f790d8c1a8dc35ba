//! Checkout command handler

use crate::commands::CheckoutArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::manifest::{is_snapshot_dir_name, relative_paths, Manifest};
use crate::output::ProgressReporter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the checkout command
pub fn execute_checkout(config: &CliConfig, args: &CheckoutArgs) -> CliResult<()> {
    let reporter = ProgressReporter::new(config.use_color(), config.verbosity.is_quiet());
    let written = checkout_snapshot(&args.out, args.index, &args.root)?;
    if config.verbosity.is_verbose() {
        for path in &written {
            reporter.info(&path.display().to_string());
        }
    }
    reporter.success(&format!(
        "Snapshot {} checked out ({} file(s))",
        args.index,
        written.len()
    ));
    Ok(())
}

/// Copy snapshot `index` of the run in `out` over the tree at `root`
///
/// Relative profile paths land under `root`; absolute ones are written in
/// place. Returns the paths written.
pub fn checkout_snapshot(out: &Path, index: usize, root: &Path) -> CliResult<Vec<PathBuf>> {
    let manifest = Manifest::load(out)?;
    let entry = manifest.snapshot(index)?;
    if !is_snapshot_dir_name(&entry.dir) {
        return Err(CliError::output(format!(
            "manifest names snapshot directory {:?} outside {}",
            entry.dir,
            out.display()
        )));
    }
    let dir = out.join(&entry.dir);

    let mut written = Vec::with_capacity(entry.files.len());
    for (file, rel) in relative_paths(entry.files.iter().map(String::as_str))? {
        let dest = if Path::new(file).is_absolute() {
            PathBuf::from(file)
        } else {
            root.join(&rel)
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(file = %file, dest = %dest.display(), "writing snapshot file");
        std::fs::copy(dir.join(&rel), &dest)?;
        written.push(dest);
    }
    Ok(written)
}
