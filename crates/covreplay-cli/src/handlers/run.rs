//! Run command handler

use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::manifest::{is_snapshot_dir_name, relative_paths, Manifest};
use crate::output::{OutputFormat, ProgressReporter};
use covreplay::{
    CoverageOracle, JobConfig, JobResult, JobStatus, Orchestrator, ProfileDirOracle, SourceSet,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Execute the run command
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let mut reporter = ProgressReporter::new(config.use_color(), config.verbosity.is_quiet());
    reporter.start_spinner("Initializing job");

    let rt = super::runtime()?;
    let outcome = rt.block_on(replay(config, args, &reporter));
    reporter.finish();
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            reporter.failure(&err.to_string());
            return Err(err);
        }
    };

    let manifest = write_snapshots(&args.out, &args.package, args.strategy(), &result)?;

    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&manifest)?),
        OutputFormat::Text => {
            reporter.header(&format!("Replay of {} ({})", manifest.package, manifest.sort));
            for entry in &manifest.snapshots {
                println!("  {}  {} file(s)", entry.dir, entry.files.len());
            }
            reporter.success(&format!(
                "{} snapshot(s) written to {}",
                manifest.snapshots.len(),
                args.out.display()
            ));
        }
    }
    Ok(())
}

/// Start a job over on-disk profiles and sources, and poll it to completion
pub async fn replay(
    config: &CliConfig,
    args: &RunArgs,
    reporter: &ProgressReporter,
) -> CliResult<JobResult> {
    let oracle: Arc<dyn CoverageOracle> = Arc::new(ProfileDirOracle::new(&args.profiles));
    let sources = SourceSet::filesystem(&args.root, config.replay.verify_render);
    let orchestrator = Orchestrator::new(config.replay.clone(), oracle, sources)?;

    let job = JobConfig::new(&args.package, args.tests.iter().cloned()).with_sort(args.strategy());
    let id = orchestrator.start_job(job).await?;
    info!(job_id = %id, "polling job");

    loop {
        match orchestrator.job_status(id).await? {
            Some(JobStatus::InProgress { details }) => reporter.set_message(&details),
            Some(JobStatus::Complete { tests, snapshots }) => {
                return Ok(JobResult { tests, snapshots });
            }
            Some(JobStatus::Failed { error }) => return Err(CliError::job_failed(error)),
            None => return Err(CliError::job_failed(format!("job {id} is not known"))),
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Write every snapshot under `out` and return the manifest describing them
///
/// Directories listed by a manifest already in `out` are removed first.
pub fn write_snapshots(
    out: &Path,
    package: &str,
    sort: covreplay::SortStrategy,
    result: &JobResult,
) -> CliResult<Manifest> {
    let manifest = Manifest::describe(package, sort, result);
    let layouts = manifest
        .snapshots
        .iter()
        .map(|entry| relative_paths(entry.files.iter().map(String::as_str)))
        .collect::<CliResult<Vec<_>>>()?;

    std::fs::create_dir_all(out)?;
    if let Ok(previous) = Manifest::load(out) {
        for entry in &previous.snapshots {
            if !is_snapshot_dir_name(&entry.dir) {
                warn!(dir = %entry.dir, "ignoring manifest entry outside the output directory");
                continue;
            }
            let dir = out.join(&entry.dir);
            if dir.is_dir() {
                debug!(dir = %dir.display(), "removing previous snapshot");
                std::fs::remove_dir_all(dir)?;
            }
        }
    }

    for ((entry, layout), snapshot) in manifest.snapshots.iter().zip(layouts).zip(&result.snapshots) {
        let dir = out.join(&entry.dir);
        for (file, rel) in layout {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if let Some(contents) = snapshot.get(file) {
                std::fs::write(&path, contents)?;
            }
        }
    }
    manifest.save(out)?;
    Ok(manifest)
}
