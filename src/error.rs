//! Error types for stagehand.
//!
//! This module defines all error types used throughout stagehand, using
//! a combination of `thiserror` for ergonomic error definitions and `miette`
//! for rich diagnostic output.
//!
//! # Error Handling Strategy
//!
//! - All errors derive from [`StageError`]
//! - Each variant includes helpful error messages and diagnostic codes
//! - Per-unit failures are collected at the fan-out barrier and reported
//!   together as one [`StageError::UnitFailures`] diagnostic
//! - Errors are automatically converted to `miette::Result` for CLI output

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error types that can occur in stagehand operations
#[derive(Error, Debug, Diagnostic)]
pub enum StageError {
    /// Required configuration is missing or inconsistent.
    ///
    /// Raised before any work starts: a missing plan file entry, a missing
    /// CLI parameter for programmatic construction, or an environment name
    /// that the deploy plan does not declare.
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(stagehand::config::error),
        help("Check the required configuration parameters.")
    )]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// No deployment unit markers were found anywhere under the scan root.
    ///
    /// The pipeline has nothing to deploy, which is always a configuration
    /// mistake in a monorepo that is expected to carry deployable units.
    #[error("No deployment units found under '{0}'")]
    #[diagnostic(
        code(stagehand::discovery::no_units),
        help(
            "At least one directory must contain a 'deployment_config.json' marker for \
             something to deploy."
        )
    )]
    NoUnitsFound(
        /// The root directory that was scanned
        PathBuf,
    ),

    /// Two discovered units resolve to the same identity.
    ///
    /// A unit's identity is the basename of the directory holding its
    /// manifest marker, and identities must be unique across the whole
    /// repository. This is detected before any hashing or building starts,
    /// because recovering from it after builds have partially run would
    /// leave inconsistent state.
    #[error("Duplicate unit identity '{identity}'")]
    #[diagnostic(
        code(stagehand::discovery::duplicate_unit),
        help("Rename one of the directories so that every unit identity is unique.")
    )]
    DuplicateUnit {
        /// The colliding identity
        identity: String,
        /// The marker file discovered first
        first: PathBuf,
        /// The marker file that collided with it
        second: PathBuf,
    },

    /// File system I/O error during stagehand operations.
    ///
    /// Common causes: permission denied, file not found, or memory mapping
    /// failures. Used throughout for file operations, directory creation,
    /// and metadata access.
    #[error("I/O error accessing '{path}'")]
    #[diagnostic(code(stagehand::io_error))]
    IoError {
        /// The path that caused the I/O error
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Attempted to hash a non-regular file (symlink or directory).
    #[error("Invalid file type for '{path}': {message}")]
    #[diagnostic(
        code(stagehand::file::invalid_type),
        help("stagehand only hashes regular files.")
    )]
    InvalidFileType {
        /// The path of the invalid file
        path: PathBuf,
        /// Description of the file type issue
        message: String,
    },

    /// A unit's manifest marker could not be parsed.
    ///
    /// The marker is a JSON document with a `type` discriminator and an
    /// optional HTTP method allowlist; anything the parser rejects is a
    /// configuration error for that unit.
    #[error("Failed to parse unit manifest '{path}'")]
    #[diagnostic(
        code(stagehand::unit::manifest_error),
        help("The manifest must be a JSON object, e.g. {{\"type\": \"API\"}}.")
    )]
    ManifestError {
        /// The manifest marker that failed to parse
        path: PathBuf,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// The declarative deploy plan file could not be parsed.
    #[error("Failed to parse deploy plan '{path}'")]
    #[diagnostic(
        code(stagehand::plan::parse_error),
        help("The plan file must be a YAML mapping with an 'environments' section.")
    )]
    PlanError {
        /// The plan file that failed to parse
        path: PathBuf,
        /// The underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// The external build toolchain exited with a non-zero status.
    ///
    /// Carries the captured combined stdout/stderr of the failing command
    /// for diagnostics. Fatal to the owning unit's worker, never to the
    /// siblings.
    #[error("Build failed for unit '{identity}'\n{output}")]
    #[diagnostic(
        code(stagehand::build::failed),
        help("Inspect the captured toolchain output above for the underlying compiler error.")
    )]
    BuildFailed {
        /// The unit whose build failed
        identity: String,
        /// Combined stdout/stderr captured from the toolchain
        output: String,
    },

    /// The state store could not serve a read or write.
    ///
    /// The run cannot continue without the store: the snapshot cannot be
    /// trusted if the previous one could not be read, and a new one that
    /// cannot be written would leave the environment inconsistent.
    #[error("State store error for key '{key}': {message}")]
    #[diagnostic(
        code(stagehand::store::error),
        help("Check connectivity and permissions for the state store backend.")
    )]
    StoreError {
        /// The store key involved
        key: String,
        /// Description of the store failure
        message: String,
    },

    /// A value could not be serialized to or deserialized from its wire
    /// format (snapshot payloads, manifest output, env-var maps).
    #[error("Serialization error: {message}")]
    #[diagnostic(code(stagehand::serialization_error))]
    SerializationError {
        /// Description of the serialization failure
        message: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// One unit's worker failed; wraps the underlying cause with the
    /// identity so the aggregate report names the failing unit.
    #[error("Unit '{identity}' failed")]
    #[diagnostic(code(stagehand::unit::failed))]
    UnitFailed {
        /// The unit whose worker failed
        identity: String,
        /// The underlying failure, preserved through the std error chain
        #[source]
        source: Box<StageError>,
    },

    /// One or more unit workers failed during the fan-out.
    ///
    /// Emitted at the barrier after every worker has finished, so the
    /// report is complete: one unit's failure never stops the siblings
    /// from finishing their hashing and building. Nothing is published.
    #[error("{} of {total} unit(s) failed; nothing was published", failures.len())]
    #[diagnostic(
        code(stagehand::pipeline::unit_failures),
        help("Fix the failing units and re-run; unchanged units will be skipped.")
    )]
    UnitFailures {
        /// Number of units that entered the fan-out
        total: usize,
        /// Every per-unit failure, in discovery order
        #[related]
        failures: Vec<StageError>,
    },
}

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, StageError>;
