//! Order command handler

use crate::commands::OrderArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::OutputFormat;
use covreplay::{collect_profiles, NoProgress, ProfileDirOracle, RankedTest, TestOrderer};
use std::fmt::Write as _;

/// Execute the order command
pub fn execute_order(config: &CliConfig, args: &OrderArgs) -> CliResult<()> {
    let rt = super::runtime()?;
    let ranked = rt.block_on(rank_tests(config, args))?;

    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ranked)?),
        OutputFormat::Text => print!("{}", render_order_table(&ranked)),
    }
    Ok(())
}

/// Load each test's profile and order them by the requested strategy
pub async fn rank_tests(config: &CliConfig, args: &OrderArgs) -> CliResult<Vec<RankedTest>> {
    let oracle = ProfileDirOracle::new(&args.profiles);
    let profiles = collect_profiles(&oracle, &args.package, &args.tests, &NoProgress).await?;
    let orderer = TestOrderer::new(args.strategy()).with_weights(config.replay.importance_weights);
    Ok(orderer.rank(&profiles))
}

/// Plain-text table of an ordering
#[must_use]
pub fn render_order_table(ranked: &[RankedTest]) -> String {
    let width = ranked
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(0)
        .max("TEST".len());

    let mut out = String::new();
    let _ = writeln!(out, "{:>3}  {:<width$}  {:>8}  {:>8}", "#", "TEST", "RAW", "NET-NEW");
    for (idx, test) in ranked.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}  {:<width$}  {:>8}  {:>8}",
            idx + 1,
            test.name,
            test.raw,
            test.net_new
        );
    }
    out
}
