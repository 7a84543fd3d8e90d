//! # stagehand CLI
//!
//! The command-line interface for stagehand, a CI tool that incrementally
//! stages deployable units in a monorepo using content-based change
//! detection.
//!
//! ## Commands
//!
//! - **deploy**: Main CI command - diffs the deploy plan, stages every
//!   pending environment, records the result
//! - **stage**: Stages a single environment
//! - **plan**: Prints which environments need deploying
//!
//! ## Quick Start
//!
//! In your CI pipeline, from the monorepo root:
//!
//! ```bash
//! stagehand deploy
//! ```
//!
//! ## Environment Variables
//!
//! - `STAGEHAND_ROOT`: Monorepo root to scan (default: .)
//! - `STAGEHAND_OUTPUT_ROOT`: Scratch directory for artifacts
//! - `STAGEHAND_STORE_DIR`: Directory backing the state store
//! - `STAGEHAND_PLAN_FILE`: Deploy plan location (default: deploy.yml)
//! - `STAGEHAND_JOBS`: Cap on concurrent unit workers
//!
//! See `stagehand --help` for the full list.

use std::io::IsTerminal;

use stagehand::cli::Cli;

fn main() -> miette::Result<()> {
    miette::set_panic_hook();

    // Rich reports on a TTY, plain ones for CI logs
    if std::io::stderr().is_terminal() {
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::unicode_nocolor())
                    .with_context_lines(3),
            )
        }))?;
    } else {
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::none())
                    .with_context_lines(0),
            )
        }))?;
    }

    let cli = Cli::parse_args();

    // Any fatal error terminates with a non-zero status; there is no
    // partial-success exit code.
    stagehand::commands::execute(&cli).map_err(Into::into)
}
