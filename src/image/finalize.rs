//! Conversion of the populated scratch volume into the distributable image.
//!
//! The output is a compressed read-only (ULFO) image with the same
//! filesystem and partition layout as the scratch volume. Nothing verifies
//! the result beyond hdiutil's exit status.

use super::volume::{FILESYSTEM, LAYOUT, ScratchVolume, detach_command};
use super::{ImageSpec, PipelineContext};
use crate::error::Result;
use crate::tools::CommandSpec;
use crate::utils::fs;
use std::path::{Path, PathBuf};

/// Compressed read-only format of the output image
pub const OUTPUT_FORMAT: &str = "ULFO";

/// Create the output image from `volume`, then detach and delete the volume.
pub async fn finalize(
    volume: ScratchVolume,
    spec: &ImageSpec,
    ctx: &PipelineContext<'_>,
) -> Result<PathBuf> {
    let output_path = spec.output_image_path();

    ctx.output
        .progress(&format!("Creating disk image ({})...", output_path.display()))?;
    ctx.tools
        .run_checked(&create_image_command(
            volume.name(),
            volume.mount_path(),
            &output_path,
        ))
        .await?;

    ctx.output.progress(&format!(
        "Unmounting disk image ({})...",
        volume.mount_path().display()
    ))?;
    ctx.tools
        .run_checked(&detach_command(volume.mount_path()))
        .await?;

    fs::remove_file(volume.image_path()).await?;
    log::debug!("Removed scratch volume {}", volume.image_path().display());

    Ok(output_path)
}

fn create_image_command(name: &str, src_dir: &Path, output_path: &Path) -> CommandSpec {
    CommandSpec::new("hdiutil")
        .args(["create", "-volname", name])
        .args(["-layout", LAYOUT])
        .args(["-format", OUTPUT_FORMAT])
        .args(["-fs", FILESYSTEM])
        .arg("-srcfolder")
        .arg(src_dir)
        .arg(output_path)
}
