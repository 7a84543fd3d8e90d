//! BLAKE3-based content hashing for files and directory trees.
//!
//! A unit's content hash is the fold of its files' digests in sorted path
//! order. The canonical order is load-bearing: a traversal that visited files
//! in a platform-dependent order would make every unit appear perpetually
//! dirty across runs and machines. Only file contents participate in the
//! digest; names and timestamps do not.

use std::fs::File;
use std::path::Path;

use blake3::{Hash, Hasher};
use memmap2::Mmap;
use walkdir::WalkDir;

use crate::error::{Result, StageError};

/// Computes the BLAKE3 hash of a single file using memory mapping and
/// parallel processing.
///
/// Symbolic links and directories are rejected; empty files are hashed
/// without mapping.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The path points to a symbolic link or directory
/// - Memory mapping fails
pub fn hash_file(path: &Path) -> Result<Hash> {
    let metadata = std::fs::symlink_metadata(path).map_err(|source| StageError::IoError {
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.is_symlink() {
        return Err(StageError::InvalidFileType {
            path: path.to_path_buf(),
            message: "Symbolic links are not supported".to_string(),
        });
    }

    if metadata.is_dir() {
        return Err(StageError::InvalidFileType {
            path: path.to_path_buf(),
            message: "Directories are not supported".to_string(),
        });
    }

    // Empty files cannot be memory mapped
    if metadata.len() == 0 {
        return Ok(Hasher::new().finalize());
    }

    let file = File::open(path).map_err(|source| StageError::IoError {
        path: path.to_path_buf(),
        source,
    })?;

    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| StageError::IoError {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Hasher::new();
    hasher.update_rayon(&mmap);

    Ok(hasher.finalize())
}

/// Computes the aggregate BLAKE3 digest of a directory tree.
///
/// Walks `dir` recursively in sorted path order, skips directory entries,
/// and folds each file digest's bytes into a single running hasher. The
/// result is a hex-encoded string stable across runs as long as file
/// contents (not names or mtimes) are unchanged and their sorted order is
/// preserved.
///
/// # Errors
///
/// Returns an error if the walk fails or any file cannot be hashed. The
/// caller treats this as fatal to the owning unit only.
pub fn hash_directory(dir: &Path) -> Result<String> {
    let mut hasher = Hasher::new();

    let walker = WalkDir::new(dir).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf());
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

        let file_hash = hash_file(entry.path())?;
        hasher.update(file_hash.as_bytes());
    }

    Ok(hasher.finalize().to_hex().to_string())
}
