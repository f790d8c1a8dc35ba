//! Covreplay CLI: replay test coverage as source snapshots
//!
//! ## Usage
//!
//! ```bash
//! covreplay order --profiles cov -p parser -t TestA -t TestB --sort net
//! covreplay run --profiles cov -p parser -t TestA -t TestB --out target/covreplay
//! covreplay checkout --out target/covreplay --index 0
//! ```

use clap::Parser;
use covreplay_cli::{
    handlers::{execute_checkout, execute_order, execute_run},
    logging::init_logging,
    Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    // Build configuration from CLI args
    let config = build_config(&cli)?;
    init_logging(config.verbosity, config.log_json, config.use_color());

    match cli.command {
        Commands::Run(args) => execute_run(&config, &args),
        Commands::Order(args) => execute_order(&config, &args),
        Commands::Checkout(args) => execute_checkout(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliResult<CliConfig> {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.into();

    let config = CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_log_json(cli.log_json);

    match cli.config {
        Some(ref path) => config.with_replay_file(path),
        None => Ok(config),
    }
}
