//! Covreplay CLI Library
//!
//! Command-line front end for the Covreplay replay engine: start a replay
//! job over recorded coverage profiles, write its snapshots to disk, and
//! check a snapshot out over the working tree.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
pub mod manifest;
mod output;

pub use commands::{CheckoutArgs, Cli, ColorArg, Commands, FormatArg, OrderArgs, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use manifest::{Manifest, SnapshotEntry};
pub use output::{OutputFormat, ProgressReporter};
