//! Artifact production for buildable service units.
//!
//! The external toolchain is invoked through a shell so the compile step can
//! chain commands the way CI images expect. Both steps are templated and
//! overridable, which also gives tests a seam that does not require the
//! real toolchain on the host.

use std::path::Path;
use std::process::Command;

use crate::error::{Result, StageError};
use crate::plan::DeployTarget;
use crate::unit::Unit;

/// Placeholder in the compile template that expands to the unit's output
/// directory.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Default compile step: a single linux/amd64 executable built from the
/// unit's entry point.
pub const DEFAULT_BUILD_COMMAND: &str =
    "go mod tidy && GOOS=linux GOARCH=amd64 go build -o {output}/app main.go";

/// Default package step, run inside the output directory.
pub const DEFAULT_PACKAGE_COMMAND: &str = "zip handler.zip app";

/// Produces a deployable artifact for one unit.
///
/// Invoked only for units that are both buildable and stale. Implementations
/// are shared across the worker pool.
pub trait ArtifactBuilder: Sync {
    /// Builds and packages `unit` for `target`, leaving the archive in
    /// `output_dir`.
    fn build(&self, unit: &Unit, target: &DeployTarget, output_dir: &Path) -> Result<()>;
}

/// Shells out to the configured compile and package commands.
#[derive(Debug, Clone)]
pub struct ShellBuilder {
    build_command: String,
    package_command: String,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self {
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            package_command: DEFAULT_PACKAGE_COMMAND.to_string(),
        }
    }
}

impl ShellBuilder {
    pub fn new(build_command: impl Into<String>, package_command: impl Into<String>) -> Self {
        Self {
            build_command: build_command.into(),
            package_command: package_command.into(),
        }
    }

    /// Runs one shell step with the target's env vars injected into the
    /// child process, capturing combined output for diagnostics.
    fn run_step(
        &self,
        unit: &Unit,
        target: &DeployTarget,
        command: &str,
        cwd: &Path,
    ) -> Result<()> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .envs(&target.env_vars)
            .output()
            .map_err(|source| StageError::IoError {
                path: cwd.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(StageError::BuildFailed {
                identity: unit.identity.clone(),
                output: combined,
            });
        }

        Ok(())
    }
}

impl ArtifactBuilder for ShellBuilder {
    fn build(&self, unit: &Unit, target: &DeployTarget, output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir).map_err(|source| StageError::IoError {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let compile = self
            .build_command
            .replace(OUTPUT_PLACEHOLDER, &output_dir.to_string_lossy());

        // Compile from the unit directory, package from the output directory
        self.run_step(unit, target, &compile, &unit.dir)?;
        self.run_step(unit, target, &self.package_command, output_dir)?;

        Ok(())
    }
}

/// Output directory for one unit's artifact, namespaced by environment and
/// unit identity.
pub fn unit_output_dir(output_root: &Path, environment: &str, identity: &str) -> std::path::PathBuf {
    output_root.join(environment).join("services").join(identity)
}
