//! Command-line interface definitions for stagehand.
//!
//! This module defines the CLI structure using clap, including all
//! subcommands and their arguments. The main entry point is the [`Cli`]
//! struct; tests and library consumers can build one programmatically via
//! [`Cli::builder`] instead of parsing argv.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::error::{Result, StageError};

/// Main command-line interface for stagehand.
#[derive(Parser)]
#[command(
    name = "stagehand",
    bin_name = "stagehand",
    author,
    version,
    about = "Incrementally stage deployable units in a monorepo",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    global_opts: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Global options that apply to all stagehand commands.
#[derive(Parser)]
pub struct GlobalOpts {
    /// Root of the monorepo to scan for deployment units
    #[arg(long, global = true, default_value = ".", env = "STAGEHAND_ROOT")]
    root: PathBuf,

    /// Scratch directory receiving per-environment artifacts and configs
    #[arg(
        long,
        global = true,
        default_value = "/tmp/stagehand",
        env = "STAGEHAND_OUTPUT_ROOT"
    )]
    output_root: PathBuf,

    /// Directory backing the state store (one file per key)
    #[arg(
        long,
        global = true,
        default_value = ".stagehand/store",
        env = "STAGEHAND_STORE_DIR"
    )]
    store_dir: PathBuf,

    /// Path to the declarative deploy plan
    #[arg(
        long,
        global = true,
        default_value = "deploy.yml",
        env = "STAGEHAND_PLAN_FILE"
    )]
    plan_file: PathBuf,

    /// Cap on concurrent unit workers (defaults to the number of cores)
    #[arg(long, global = true, env = "STAGEHAND_JOBS")]
    jobs: Option<usize>,

    /// Override the compile step ('{output}' expands to the unit's output
    /// directory)
    #[arg(long, global = true, env = "STAGEHAND_BUILD_COMMAND")]
    build_command: Option<String>,

    /// Override the package step (run inside the output directory)
    #[arg(long, global = true, env = "STAGEHAND_PACKAGE_COMMAND")]
    package_command: Option<String>,

    /// Enable verbose output (use multiple times for more verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count, env = "STAGEHAND_VERBOSE")]
    verbose: u8,

    /// Silence all output except for errors
    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        env = "STAGEHAND_QUIET"
    )]
    quiet: bool,
}

impl GlobalOpts {
    /// Create a new builder for constructing `GlobalOpts` programmatically.
    pub fn builder() -> GlobalOptsBuilder {
        GlobalOptsBuilder::default()
    }

    /// The absolute scan root.
    pub fn get_root(&self) -> PathBuf {
        absolutize(&self.root)
    }

    /// The absolute output root.
    pub fn get_output_root(&self) -> PathBuf {
        absolutize(&self.output_root)
    }

    /// The absolute store directory.
    pub fn get_store_dir(&self) -> PathBuf {
        absolutize(&self.store_dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn plan_file(&self) -> &Path {
        &self.plan_file
    }

    pub fn jobs(&self) -> Option<usize> {
        self.jobs
    }

    pub fn build_command(&self) -> Option<&str> {
        self.build_command.as_deref()
    }

    pub fn package_command(&self) -> Option<&str> {
        self.package_command.as_deref()
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    pub fn quiet(&self) -> bool {
        self.quiet
    }
}

/// Builder for constructing `GlobalOpts` without argv parsing.
#[derive(Default)]
pub struct GlobalOptsBuilder {
    root: Option<PathBuf>,
    output_root: Option<PathBuf>,
    store_dir: Option<PathBuf>,
    plan_file: Option<PathBuf>,
    jobs: Option<usize>,
    build_command: Option<String>,
    package_command: Option<String>,
    verbose: u8,
    quiet: bool,
}

impl GlobalOptsBuilder {
    pub fn root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root = Some(dir.into());
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_root = Some(dir.into());
        self
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn plan_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.plan_file = Some(path.into());
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = Some(command.into());
        self
    }

    pub fn package_command(mut self, command: impl Into<String>) -> Self {
        self.package_command = Some(command.into());
        self
    }

    pub fn verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn build(self) -> GlobalOpts {
        GlobalOpts {
            root: self.root.unwrap_or_else(|| PathBuf::from(".")),
            output_root: self
                .output_root
                .unwrap_or_else(|| PathBuf::from("/tmp/stagehand")),
            store_dir: self
                .store_dir
                .unwrap_or_else(|| PathBuf::from(".stagehand/store")),
            plan_file: self.plan_file.unwrap_or_else(|| PathBuf::from("deploy.yml")),
            jobs: self.jobs,
            build_command: self.build_command,
            package_command: self.package_command,
            verbose: self.verbose,
            quiet: self.quiet,
        }
    }
}

impl Cli {
    pub fn global_opts(&self) -> &GlobalOpts {
        &self.global_opts
    }

    pub fn command(&self) -> &Commands {
        &self.command
    }

    /// Create a builder for programmatic construction.
    pub fn builder() -> CliBuilder {
        CliBuilder::default()
    }

    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Builder for [`Cli`]
#[derive(Default)]
pub struct CliBuilder {
    opts: GlobalOptsBuilder,
    command: Option<Commands>,
}

impl CliBuilder {
    pub fn root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts = self.opts.root(dir);
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts = self.opts.output_root(dir);
        self
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts = self.opts.store_dir(dir);
        self
    }

    pub fn plan_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts = self.opts.plan_file(path);
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.opts = self.opts.jobs(jobs);
        self
    }

    pub fn build_command(mut self, command: impl Into<String>) -> Self {
        self.opts = self.opts.build_command(command);
        self
    }

    pub fn package_command(mut self, command: impl Into<String>) -> Self {
        self.opts = self.opts.package_command(command);
        self
    }

    pub fn verbose(mut self, level: u8) -> Self {
        self.opts = self.opts.verbose(level);
        self
    }

    pub fn quiet(mut self, enabled: bool) -> Self {
        self.opts = self.opts.quiet(enabled);
        self
    }

    pub fn command(mut self, command: Commands) -> Self {
        self.command = Some(command);
        self
    }

    pub fn build(self) -> Result<Cli> {
        let command = self.command.ok_or(StageError::ConfigError {
            message: "Command is required".to_string(),
        })?;

        Ok(Cli {
            global_opts: self.opts.build(),
            command,
        })
    }
}

/// Makes a path absolute against the current directory without requiring it
/// to exist or resolving symlinks.
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

/// Available stagehand subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Full run: diff the deploy plan against recorded deployments, stage
    /// every environment that needs it, record successes
    ///
    /// Environments are processed one at a time, each fully staged before
    /// the next begins. After all succeed, the newly staged versions are
    /// merged into the recorded deployment state.
    Deploy,

    /// Stage a single environment, bypassing the deploy plan diff
    ///
    /// Runs the discovery/hash/build pipeline for the named environment
    /// only. Useful for reproducing one environment's staging locally.
    Stage {
        /// The environment to stage
        environment: String,
    },

    /// Show which environments need deploying, without side effects
    Plan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::parse_from(["stagehand", "deploy"]);
        assert!(matches!(cli.command(), Commands::Deploy));
        assert_eq!(cli.global_opts().root(), Path::new("."));
        assert_eq!(cli.global_opts().plan_file(), Path::new("deploy.yml"));
        assert_eq!(cli.global_opts().jobs(), None);
        assert_eq!(cli.global_opts().verbose(), 0);
        assert!(!cli.global_opts().quiet());
    }

    #[test]
    fn test_stage_takes_environment() {
        let cli = Cli::parse_from(["stagehand", "stage", "staging"]);
        match cli.command() {
            Commands::Stage { environment } => assert_eq!(environment, "staging"),
            other => panic!("expected Stage, got {other:?}"),
        }
    }

    #[test]
    fn test_verbose_flag_counts() {
        let cli = Cli::parse_from(["stagehand", "-vv", "plan"]);
        assert_eq!(cli.global_opts().verbose(), 2);
        assert!(matches!(cli.command(), Commands::Plan));
    }

    #[test]
    fn test_jobs_and_command_overrides() {
        let cli = Cli::parse_from([
            "stagehand",
            "--jobs",
            "4",
            "--build-command",
            "make bundle OUT={output}",
            "deploy",
        ]);
        assert_eq!(cli.global_opts().jobs(), Some(4));
        assert_eq!(
            cli.global_opts().build_command(),
            Some("make bundle OUT={output}")
        );
        assert_eq!(cli.global_opts().package_command(), None);
    }

    #[test]
    fn test_global_flag_positioning() {
        let cli = Cli::parse_from(["stagehand", "plan", "--verbose"]);
        assert_eq!(cli.global_opts().verbose(), 1);
    }

    #[test]
    fn test_cli_builder() {
        let cli = Cli::builder()
            .root("repo")
            .store_dir("store")
            .jobs(2)
            .verbose(1)
            .command(Commands::Deploy)
            .build()
            .expect("failed to build CLI");

        assert_eq!(cli.global_opts().root(), Path::new("repo"));
        assert_eq!(cli.global_opts().store_dir(), Path::new("store"));
        assert_eq!(cli.global_opts().jobs(), Some(2));
        assert!(matches!(cli.command(), Commands::Deploy));

        let missing = Cli::builder().build();
        assert!(matches!(missing, Err(StageError::ConfigError { .. })));
    }

    #[test]
    fn test_absolutize() {
        let abs = absolutize(Path::new("/already/abs"));
        assert_eq!(abs, Path::new("/already/abs"));

        let rel = absolutize(Path::new("some/dir"));
        assert!(rel.is_absolute());
        assert!(rel.ends_with("some/dir"));
    }
}
