//! # stagehand
//!
//! A CI tool that incrementally builds and stages deployable units inside a
//! monorepo, skipping any unit whose contents have not changed since the
//! last recorded deployment.
//!
//! ## Overview
//!
//! Every deployable unit in the repository is declared by a reserved
//! `deployment_config.json` marker file; the marker's parent directory name
//! is the unit's identity. Each run content-hashes every unit with BLAKE3,
//! compares the hashes against the snapshot persisted for the target
//! environment, rebuilds only the stale buildable units in parallel, and
//! atomically publishes the new snapshot together with an
//! artifact-configuration file for the downstream provisioning step.
//!
//! ## Key Properties
//!
//! - **Content-based change detection**: BLAKE3 digests folded in a fixed
//!   sorted traversal order, so the answer to "did this unit change?" is
//!   deterministic across runs and machines
//! - **Concurrent fan-out with a full barrier**: one worker per unit on a
//!   bounded rayon pool; nothing is published until every worker finishes
//! - **Complete failure reports**: one unit's failure never stops its
//!   siblings; all failures are aggregated into a single diagnostic and the
//!   snapshot is left untouched
//! - **Pluggable collaborators**: the state store and the artifact builder
//!   are trait seams, so the remote parameter store and the build toolchain
//!   stay external
//!
//! ## Architecture
//!
//! - [`cli`]: Command-line interface definitions using clap
//! - [`commands`]: Implementation of the stagehand subcommands
//! - [`error`]: Error types and handling with thiserror + miette
//! - [`pipeline`]: The per-environment orchestrator (discover, hash, build,
//!   publish)
//! - [`builder`]: Artifact production behind the [`builder::ArtifactBuilder`]
//!   trait
//! - [`store`]: The state-store trait and its local adapters
//! - [`plan`]: The declarative deploy plan and needs-deployment diffing
//! - [`snapshot`]: Persisted hash snapshots and stale detection
//! - [`unit`]: The deployment-unit data model and manifest classification
//!
//! Internal modules (not part of the public API):
//! - `discovery`: Walking the monorepo for unit markers
//! - `hashing`: BLAKE3 file and directory hashing
//! - `logging`: Verbosity-aware stderr logging
//!
//! ## Usage in CI
//!
//! ```bash
//! # From the monorepo root, after cloning:
//! stagehand deploy
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use stagehand::cli::{Cli, Commands};
//! use stagehand::commands;
//!
//! let cli = Cli::builder()
//!     .root(".")
//!     .jobs(4)
//!     .command(Commands::Deploy)
//!     .build()?;
//!
//! commands::execute(&cli)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export public modules for library usage
pub mod builder;
pub mod cli;
pub mod commands;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod snapshot;
pub mod store;
pub mod unit;

// Internal modules
mod discovery;
mod hashing;
mod logging;

pub use logging::Logger;
