//! Discovery of deployment units in the monorepo tree.
//!
//! The full tree is walked with nothing excluded a priori; the scan is meant
//! to run against a freshly cloned repository in CI, where heavyweight
//! directories like `node_modules` do not exist yet.

use std::collections::HashMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, StageError};
use crate::unit::{MANIFEST_FILENAME, Unit};

/// Walks `root` and collects every deployment unit, in sorted path order.
///
/// # Errors
///
/// Returns an error if:
/// - The walk itself fails (unreadable directory)
/// - No manifest markers are found anywhere under `root`
/// - Two markers resolve to the same unit identity
pub fn discover_units(root: &Path) -> Result<Vec<Unit>> {
    let mut units = Vec::new();

    let walker = WalkDir::new(root).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            match err.into_io_error() {
                Some(source) => StageError::IoError { path, source },
                None => StageError::InvalidFileType {
                    path,
                    message: "Filesystem loop detected during traversal".to_string(),
                },
            }
        })?;

        if entry.file_type().is_dir() {
            continue;
        }
        if entry.file_name() == MANIFEST_FILENAME {
            units.push(Unit::from_manifest_path(entry.path())?);
        }
    }

    if units.is_empty() {
        return Err(StageError::NoUnitsFound(root.to_path_buf()));
    }

    confirm_unique_identities(&units)?;

    Ok(units)
}

/// Ensures no two discovered units share an identity.
///
/// Duplicates are a fatal configuration error reported before any building
/// starts.
fn confirm_unique_identities(units: &[Unit]) -> Result<()> {
    let mut seen: HashMap<&str, &Unit> = HashMap::new();
    for unit in units {
        if let Some(first) = seen.insert(&unit.identity, unit) {
            return Err(StageError::DuplicateUnit {
                identity: unit.identity.clone(),
                first: first.manifest_path.clone(),
                second: unit.manifest_path.clone(),
            });
        }
    }
    Ok(())
}
