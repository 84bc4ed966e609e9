//! Archive extraction for downloaded SDKs and tool bundles.
//!
//! Extraction is blocking work, so it runs on tokio's blocking pool.

use crate::error::{ErrorExt, ImageError, Result};
use std::fs::File;
use std::path::{Component, Path, PathBuf};

/// Extracts a zip archive into `dest`, keeping unix permission bits.
pub async fn unpack_zip(archive: &Path, dest: &Path) -> Result<()> {
    log::info!("Unpacking {} into {}", archive.display(), dest.display());

    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = File::open(&archive).fs_context("opening archive", &archive)?;
        let mut bundle = zip::ZipArchive::new(file).map_err(|e| ImageError::Archive {
            path: archive.clone(),
            reason: e.to_string(),
        })?;
        log::debug!("{} entries in {}", bundle.len(), archive.display());

        bundle.extract(&dest).map_err(|e| ImageError::Archive {
            path: archive.clone(),
            reason: e.to_string(),
        })
    })
    .await?
}

/// Extracts a gzip-compressed tarball into `dest`, dropping the first
/// `strip_components` path components of every entry.
///
/// Entries that strip down to nothing (the top-level directory, pax headers)
/// are skipped; entries escaping `dest` are rejected.
pub async fn unpack_tarball(archive: &Path, dest: &Path, strip_components: usize) -> Result<()> {
    log::info!("Unpacking {} into {}", archive.display(), dest.display());

    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let archive_err = |reason: String| ImageError::Archive {
            path: archive.clone(),
            reason,
        };

        let file = File::open(&archive).fs_context("opening archive", &archive)?;
        let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
        tarball.set_preserve_permissions(true);

        std::fs::create_dir_all(&dest).fs_context("creating extraction directory", &dest)?;

        let mut unpacked = 0usize;
        for entry in tarball.entries().map_err(|e| archive_err(e.to_string()))? {
            let mut entry = entry.map_err(|e| archive_err(e.to_string()))?;
            let path = entry.path().map_err(|e| archive_err(e.to_string()))?;

            let Some(relative) = strip_path(&path, strip_components)? else {
                continue;
            };
            let target = dest.join(&relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
            }
            entry
                .unpack(&target)
                .map_err(|e| archive_err(format!("{}: {e}", relative.display())))?;
            unpacked += 1;
        }

        log::debug!("Unpacked {} entries from {}", unpacked, archive.display());
        Ok(())
    })
    .await?
}

/// Drops leading components; `None` when nothing is left.
fn strip_path(path: &Path, strip_components: usize) -> Result<Option<PathBuf>> {
    let mut stripped = PathBuf::new();
    for component in path.components().skip(strip_components) {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ImageError::Archive {
                    path: path.to_path_buf(),
                    reason: "entry escapes the extraction directory".to_string(),
                });
            }
        }
    }
    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}
