//! Scratch volume allocation using hdiutil.
//!
//! The scratch volume is a sparse, growable APFS image that is written into
//! while the image is populated and thrown away once the compressed image
//! has been produced.

use super::{ImageSpec, PipelineContext};
use crate::error::{ImageError, Result};
use crate::tools::CommandSpec;
use crate::utils::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

/// Nominal capacity of the sparse scratch volume
pub const SCRATCH_SIZE: &str = "4g";
/// Filesystem of scratch and output images
pub const FILESYSTEM: &str = "APFS";
/// Partition layout of scratch and output images
pub const LAYOUT: &str = "GPTSPUD";

const MOUNT_POLL_RETRIES: u32 = 10;
const MOUNT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A mounted, writable scratch volume owned by the running build.
#[derive(Debug)]
pub struct ScratchVolume {
    name: String,
    image_path: PathBuf,
    mount_path: PathBuf,
}

impl ScratchVolume {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing `.sparseimage` file
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Directory the volume is mounted at
    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }
}

/// Create and mount a fresh scratch volume for `spec`.
///
/// # Process
/// 1. Remove a scratch file left behind by an earlier failed run
/// 2. `hdiutil create` a sparse APFS volume
/// 3. `hdiutil attach` it at `work_mount_path`
/// 4. Wait for the mount point to appear
pub async fn allocate(spec: &ImageSpec, ctx: &PipelineContext<'_>) -> Result<ScratchVolume> {
    let image_path = spec.scratch_image_path();
    let mount_path = spec.work_mount_path.clone();

    fs::remove_file(&image_path).await?;

    ctx.output
        .progress(&format!("Creating disk image ({})...", image_path.display()))?;
    ctx.tools
        .run_checked(&create_sparse_command(&spec.name, &image_path))
        .await?;

    ctx.output
        .progress(&format!("Mounting disk image ({})...", image_path.display()))?;
    ctx.tools
        .run_checked(&attach_command(&image_path, &mount_path))
        .await?;
    wait_for_mount(&mount_path).await?;

    ctx.output
        .progress(&format!("Working directory: {}", mount_path.display()))?;

    Ok(ScratchVolume {
        name: spec.name.clone(),
        image_path,
        mount_path,
    })
}

fn create_sparse_command(name: &str, image_path: &Path) -> CommandSpec {
    CommandSpec::new("hdiutil")
        .args(["create", "-volname", name])
        .args(["-type", "SPARSE"])
        .args(["-layout", LAYOUT])
        .args(["-fs", FILESYSTEM])
        .args(["-size", SCRATCH_SIZE])
        .arg(image_path)
}

fn attach_command(image_path: &Path, mount_path: &Path) -> CommandSpec {
    CommandSpec::new("hdiutil")
        .arg("attach")
        .arg(image_path)
        .arg("-mountpoint")
        .arg(mount_path)
        .arg("-nobrowse")
}

/// Detach command for a mounted volume
pub(super) fn detach_command(mount_path: &Path) -> CommandSpec {
    CommandSpec::new("hdiutil").arg("detach").arg(mount_path)
}

async fn wait_for_mount(mount_path: &Path) -> Result<()> {
    for _ in 0..MOUNT_POLL_RETRIES {
        if mount_path.is_dir() {
            log::debug!("Volume mounted at {}", mount_path.display());
            return Ok(());
        }
        tokio::time::sleep(MOUNT_POLL_INTERVAL).await;
    }
    Err(ImageError::MountTimeout {
        path: mount_path.to_path_buf(),
        retries: MOUNT_POLL_RETRIES,
    })
}
