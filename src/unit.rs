//! Deployment unit data model and manifest classification.
//!
//! A unit is one independently deployable component inside the monorepo,
//! declared by a reserved `deployment_config.json` marker file. The basename
//! of the marker's parent directory is the unit's identity.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StageError};

/// The reserved manifest filename that declares a directory as a unit.
pub const MANIFEST_FILENAME: &str = "deployment_config.json";

/// The kind of a deployment unit, read from the manifest's `type`
/// discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A buildable service: compiled by the external toolchain and packaged
    /// into a deployable archive.
    Service,
    /// A static asset bundle. Staging for this kind is not implemented yet;
    /// the unit still participates fully in hash bookkeeping.
    StaticAsset,
}

/// One deployable unit, discovered at scan time and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Basename of the directory containing the manifest marker. Unique
    /// across the discovered set.
    pub identity: String,
    /// Absolute path to the manifest marker file.
    pub manifest_path: PathBuf,
    /// The unit's directory, i.e. the marker's parent.
    pub dir: PathBuf,
}

impl Unit {
    /// Construct a unit from its manifest marker path.
    ///
    /// Returns a `ConfigError` if the path has no parent directory with a
    /// UTF-8 basename to derive an identity from.
    pub fn from_manifest_path(manifest_path: &Path) -> Result<Self> {
        let dir = manifest_path
            .parent()
            .ok_or_else(|| StageError::ConfigError {
                message: format!(
                    "manifest marker '{}' has no parent directory",
                    manifest_path.display()
                ),
            })?
            .to_path_buf();

        let identity = unit_identity(manifest_path).ok_or_else(|| StageError::ConfigError {
            message: format!(
                "cannot derive a unit identity from '{}'",
                manifest_path.display()
            ),
        })?;

        Ok(Self {
            identity,
            manifest_path: manifest_path.to_path_buf(),
            dir,
        })
    }

    /// Read the manifest marker and classify this unit.
    pub fn classify(&self) -> Result<UnitKind> {
        let raw = read_marker(&self.manifest_path)?;
        Ok(match raw.kind.as_deref() {
            Some("API") => UnitKind::Service,
            // Unrecognized or missing discriminators fall through to the
            // static-asset path rather than failing the unit.
            _ => UnitKind::StaticAsset,
        })
    }

    /// Build this unit's output manifest entry from the hash computed this
    /// run.
    ///
    /// The entry's hash is always the fresh hash, even when the unit was not
    /// rebuilt: skipping the build only affects artifact production, not the
    /// hash bookkeeping.
    pub fn manifest_entry(&self, hash: &str) -> Result<UnitManifest> {
        let raw = read_marker(&self.manifest_path)?;
        Ok(UnitManifest {
            directory: self.identity.clone(),
            allowed_http_methods: raw.allowed_http_methods,
            hash: hash.to_string(),
        })
    }
}

/// Derives a unit identity from a manifest marker path: the basename of the
/// marker's immediately enclosing directory. Pure function of the path.
pub fn unit_identity(manifest_path: &Path) -> Option<String> {
    manifest_path
        .parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Raw shape of the manifest marker file on disk.
#[derive(Debug, Deserialize)]
struct RawMarker {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "allowedHttpMethods", default)]
    allowed_http_methods: Vec<String>,
}

fn read_marker(path: &Path) -> Result<RawMarker> {
    let contents = std::fs::read_to_string(path).map_err(|source| StageError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StageError::ManifestError {
        path: path.to_path_buf(),
        source,
    })
}

/// A unit's entry in the artifact-configuration output, consumed by the
/// downstream infrastructure-provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitManifest {
    /// The unit identity.
    pub directory: String,
    /// Declared HTTP-method allowlist (service units only; empty otherwise).
    pub allowed_http_methods: Vec<String>,
    /// The content hash computed this run.
    pub hash: String,
}
