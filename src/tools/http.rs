//! HTTP downloads of SDK archives.

use crate::error::{ErrorExt, ImageError, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Downloads `url` to `dest`, streaming the body to disk.
///
/// Redirects are followed (GitHub tarball endpoints answer with one) and any
/// non-2xx status is an error. A partially written file is left in place.
pub async fn download(url: &Url, dest: &Path) -> Result<()> {
    log::info!("Downloading {}", url);

    let download_err = |source: reqwest::Error| ImageError::Download {
        url: url.to_string(),
        source,
    };

    let mut response = reqwest::get(url.clone())
        .await
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating download directory", parent)?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .fs_context("creating download file", dest)?;

    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(download_err)? {
        file.write_all(&chunk)
            .await
            .fs_context("writing download", dest)?;
        written += chunk.len() as u64;
    }
    file.flush().await.fs_context("writing download", dest)?;

    log::debug!("Downloaded {} bytes to {}", written, dest.display());
    Ok(())
}
