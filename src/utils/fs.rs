//! File system helpers with atomic writes and safe tree operations.
//!
//! These helpers back the Config Store's crash-safe persistence and the
//! Update Engine's staging/swap plumbing. Writes go through a
//! write-then-rename strategy so readers never observe a partially written
//! file.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::warn;

use crate::core::Result;

/// Creates a directory and all parent directories if they don't exist.
///
/// Succeeds if the directory already exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// The content is written to a sibling `.tmp` file, synced to disk, and
/// renamed over the target. A crash mid-write leaves either the old file
/// or the new file, never a truncated mix. Parent directories are created
/// as needed.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Recursively copies a directory and all its contents.
///
/// Creates the destination if needed, overwrites existing files, and skips
/// symlinks and other special file types.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
        // Skip symlinks and other file types
    }

    Ok(())
}

/// Removes a file or directory tree if it exists. Missing paths are not an
/// error.
pub fn remove_entry_if_exists(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) => {
            if meta.is_dir() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Moves a file or directory to a new location, replacing any existing
/// destination.
///
/// Uses `rename` when source and destination share a filesystem and falls
/// back to copy-then-delete across devices (the staging area usually lives
/// in the system temp directory, which may be a different mount than the
/// installation directory).
pub fn move_entry(src: &Path, dst: &Path) -> Result<()> {
    remove_entry_if_exists(dst)?;

    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    // Cross-device fallback
    let meta = fs::symlink_metadata(src)?;
    if meta.is_dir() {
        copy_dir(src, dst)?;
        fs::remove_dir_all(src)?;
    } else {
        fs::copy(src, dst)?;
        fs::remove_file(src)?;
    }

    Ok(())
}

/// Best-effort removal used on cleanup paths. Failures are logged, never
/// propagated.
pub fn remove_entry_best_effort(path: &Path) {
    if let Err(e) = remove_entry_if_exists(path) {
        warn!("failed to clean up {}: {}", path.display(), e);
    }
}
