//! Flavor-specific population of the mounted scratch volume.
//!
//! Every flavor starts by copying its checked-in static files into the
//! volume root, then installs its toolchains:
//! - `core` - source tree snapshot and the Dart SDK
//! - `ios` - Homebrew with the manifest's packages, then Cocoapods
//! - `android` - SDK command-line tools, licenses and SDK packages

pub mod android;
pub mod core;
pub mod ios;

use super::{Flavor, PipelineContext, ScratchVolume};
use crate::error::Result;
use crate::utils::fs;
use std::path::Path;
use url::Url;

/// Fill `volume` with the contents of a `flavor` image.
pub async fn populate(
    flavor: Flavor,
    volume: &ScratchVolume,
    ctx: &PipelineContext<'_>,
) -> Result<()> {
    ctx.output
        .section(&format!("Populating {}", volume.name()))?;

    let static_dir = ctx.config.static_dir(flavor);
    fs::copy_static_files(&static_dir, volume.mount_path(), ctx.output).await?;

    match flavor {
        Flavor::Core => core::populate(volume, ctx).await,
        Flavor::Ios => ios::populate(volume, ctx).await,
        Flavor::Android => android::populate(volume, ctx).await,
    }
}

/// Download a zip archive, unpack it next to itself and delete it.
async fn download_and_unzip(ctx: &PipelineContext<'_>, url: &Url, archive: &Path) -> Result<()> {
    ctx.tools.download(url, archive).await?;

    let dest = archive.parent().unwrap_or_else(|| Path::new("."));
    ctx.tools.unpack_zip(archive, dest).await?;
    fs::remove_file(archive).await
}
