//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use covreplay::SortStrategy;
use std::path::PathBuf;

/// Covreplay: replay recorded test coverage as a sequence of source snapshots
#[derive(Parser, Debug)]
#[command(name = "covreplay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Replay configuration file (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay tests and write one snapshot per test
    Run(RunArgs),

    /// Print the order tests would be replayed in
    Order(OrderArgs),

    /// Write a snapshot from a previous run over the working tree
    Checkout(CheckoutArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding `<package>/<test>.out` coverage profiles
    #[arg(long)]
    pub profiles: PathBuf,

    /// Root the profile's file paths are relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Package the tests belong to
    #[arg(short, long)]
    pub package: String,

    /// Test to replay (repeatable, order matters for `hardcoded`)
    #[arg(short, long = "test", required = true, num_args = 1..)]
    pub tests: Vec<String>,

    /// Ordering strategy (hardcoded, raw, net, importance)
    #[arg(short, long, default_value = "hardcoded")]
    pub sort: String,

    /// Output directory for snapshots
    #[arg(short, long, default_value = "target/covreplay")]
    pub out: PathBuf,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,
}

impl RunArgs {
    /// Ordering strategy, falling back to hardcoded when unrecognized
    #[must_use]
    pub fn strategy(&self) -> SortStrategy {
        SortStrategy::from_name_lossy(&self.sort)
    }
}

/// Arguments for the order command
#[derive(Parser, Debug)]
pub struct OrderArgs {
    /// Directory holding `<package>/<test>.out` coverage profiles
    #[arg(long)]
    pub profiles: PathBuf,

    /// Package the tests belong to
    #[arg(short, long)]
    pub package: String,

    /// Test to order (repeatable)
    #[arg(short, long = "test", required = true, num_args = 1..)]
    pub tests: Vec<String>,

    /// Ordering strategy (hardcoded, raw, net, importance)
    #[arg(short, long, default_value = "hardcoded")]
    pub sort: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,
}

impl OrderArgs {
    /// Ordering strategy, falling back to hardcoded when unrecognized
    #[must_use]
    pub fn strategy(&self) -> SortStrategy {
        SortStrategy::from_name_lossy(&self.sort)
    }
}

/// Arguments for the checkout command
#[derive(Parser, Debug)]
pub struct CheckoutArgs {
    /// Output directory of a previous `run`
    #[arg(short, long, default_value = "target/covreplay")]
    pub out: PathBuf,

    /// Snapshot index (0-based; the last one is the baseline)
    #[arg(short, long)]
    pub index: usize,

    /// Working tree to write the files into
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

/// Output format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Color output argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ColorChoice;
    use crate::output::OutputFormat;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_run_command() {
            let cli = Cli::parse_from([
                "covreplay", "run", "--profiles", "cov", "-p", "parser", "-t", "TestA", "-t",
                "TestB",
            ]);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.package, "parser");
            assert_eq!(args.tests, ["TestA", "TestB"]);
            assert_eq!(args.root, PathBuf::from("."));
            assert_eq!(args.out, PathBuf::from("target/covreplay"));
            assert_eq!(args.strategy(), SortStrategy::Hardcoded);
            assert_eq!(args.format, FormatArg::Text);
        }

        #[test]
        fn test_run_requires_a_test() {
            let parsed = Cli::try_parse_from(["covreplay", "run", "--profiles", "cov", "-p", "x"]);
            assert!(parsed.is_err());
        }

        #[test]
        fn test_unknown_sort_falls_back() {
            let cli = Cli::parse_from([
                "covreplay", "order", "--profiles", "cov", "-p", "x", "-t", "A", "--sort", "bogus",
            ]);
            let Commands::Order(args) = cli.command else {
                panic!("expected order");
            };
            assert_eq!(args.strategy(), SortStrategy::Hardcoded);
        }

        #[test]
        fn test_named_sort() {
            let cli = Cli::parse_from([
                "covreplay", "order", "--profiles", "cov", "-p", "x", "-t", "A", "--sort", "net",
                "--format", "json",
            ]);
            let Commands::Order(args) = cli.command else {
                panic!("expected order");
            };
            assert_eq!(args.strategy(), SortStrategy::NetNew);
            assert_eq!(args.format, FormatArg::Json);
        }

        #[test]
        fn test_parse_checkout_command() {
            let cli = Cli::parse_from(["covreplay", "checkout", "--index", "2", "--root", "/tmp"]);
            let Commands::Checkout(args) = cli.command else {
                panic!("expected checkout");
            };
            assert_eq!(args.index, 2);
            assert_eq!(args.root, PathBuf::from("/tmp"));
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from([
                "covreplay", "-vv", "--color", "never", "--log-json", "checkout", "--index", "0",
            ]);
            assert_eq!(cli.verbose, 2);
            assert_eq!(cli.color, ColorArg::Never);
            assert!(cli.log_json);
            assert!(cli.config.is_none());
        }
    }

    mod arg_conversion_tests {
        use super::*;

        #[test]
        fn test_color_arg_conversion() {
            assert_eq!(ColorChoice::from(ColorArg::Auto), ColorChoice::Auto);
            assert_eq!(ColorChoice::from(ColorArg::Always), ColorChoice::Always);
            assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
        }

        #[test]
        fn test_format_arg_conversion() {
            assert_eq!(OutputFormat::from(FormatArg::Text), OutputFormat::Text);
            assert_eq!(OutputFormat::from(FormatArg::Json), OutputFormat::Json);
        }
    }
}
