//! File system utilities for image population.
//!
//! Idempotent removal helpers plus the flat static-file copy used by every
//! flavor.

use crate::cli::OutputManager;
use crate::error::{ErrorExt, ImageError, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing", path),
    }
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing directory", path),
    }
}

/// Creates the given directory, succeeding if it already exists.
pub async fn create_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).fs_context("creating directory", path),
    }
}

/// Copies every top-level file of `src_dir` into `dst_dir`.
///
/// Permission bits are copied along with the contents and existing
/// destination files are overwritten. Subdirectories are not descended
/// into; they are skipped with a warning. Returns the copied destination
/// paths in name order.
pub async fn copy_static_files(
    src_dir: &Path,
    dst_dir: &Path,
    output: &OutputManager,
) -> Result<Vec<PathBuf>> {
    if !src_dir.is_dir() {
        return Err(ImageError::Fs {
            action: "reading static files from",
            path: src_dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        });
    }

    output.progress("Copying files...")?;

    let mut copied = Vec::new();
    for entry in walkdir::WalkDir::new(src_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ImageError::Fs {
            action: "listing",
            path: src_dir.to_path_buf(),
            source: e.into(),
        })?;

        let src = entry.path();
        if src.is_dir() {
            log::warn!("Skipping subdirectory {}", src.display());
            continue;
        }

        let name = entry.file_name();
        output.indent(&format!("... {}", name.to_string_lossy()))?;

        let dst = dst_dir.join(name);
        // fs::copy carries the source permission bits over on unix.
        fs::copy(src, &dst).await.fs_context("copying", src)?;
        let permissions = fs::metadata(src)
            .await
            .fs_context("reading permissions of", src)?
            .permissions();
        fs::set_permissions(&dst, permissions)
            .await
            .fs_context("setting permissions of", &dst)?;

        copied.push(dst);
    }

    Ok(copied)
}
