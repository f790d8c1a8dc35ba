//! Command handlers - extracted from main.rs for testability
//!
//! Each handler module contains:
//! - The execution logic for a CLI command
//! - Pure helper functions
//! - Tests

pub mod checkout;
pub mod order;
pub mod run;

// Re-export handlers for convenient access
pub use checkout::{checkout_snapshot, execute_checkout};
pub use order::{execute_order, rank_tests, render_order_table};
pub use run::{execute_run, replay, write_snapshots};

use crate::error::{CliError, CliResult};

/// Multi-threaded runtime for a handler's async work
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("failed to start async runtime: {e}")))
}
