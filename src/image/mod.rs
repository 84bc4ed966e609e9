//! Device-lab image assembly pipeline.
//!
//! # Process
//! 1. Refuse to run if the output image already exists
//! 2. Check that the host programs the flavor needs are installed
//! 3. Allocate and mount a sparse scratch volume ([`volume`])
//! 4. Populate it for the flavor ([`populate`])
//! 5. Convert it into a compressed read-only image and discard the
//!    scratch volume ([`finalize`])
//!
//! Every step runs to completion before the next begins; the first failure
//! stops the pipeline and leaves scratch state on disk.

pub mod finalize;
pub mod populate;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

use crate::cli::OutputManager;
use crate::config::ConfigSource;
use crate::error::{ImageError, Result};
use crate::tools::Tools;
use std::path::{Path, PathBuf};

pub use finalize::finalize;
pub use volume::{ScratchVolume, allocate};

/// Directory macOS mounts volumes under.
pub const VOLUMES_DIR: &str = "/Volumes";

/// Image type selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Flavor {
    /// Checked-in files, source snapshot and Dart SDK
    Core,
    /// Homebrew with iOS device tools, Cocoapods
    Ios,
    /// Android SDK command-line tools and packages
    Android,
}

impl Flavor {
    /// Volume and output file base name
    pub fn image_name(self) -> &'static str {
        match self {
            Self::Core => "DevicelabCore",
            Self::Ios => "DevicelabIOS",
            Self::Android => "DevicelabAndroid",
        }
    }

    /// Resource subdirectory and CLI value
    pub fn key(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    /// Host programs the flavor invokes, with what they are used for
    pub fn required_programs(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Core => &[
                ("hdiutil", "create and mount disk images"),
                ("git", "snapshot the source tree"),
            ],
            Self::Ios => &[
                ("hdiutil", "create and mount disk images"),
                (populate::ios::GEM, "install Cocoapods"),
            ],
            Self::Android => &[("hdiutil", "create and mount disk images")],
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Identity and locations of one image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Volume name, also the output file base name
    pub name: String,
    /// Directory receiving the output image and the scratch file
    pub output_dir: PathBuf,
    /// Where the scratch volume is mounted while it is populated
    pub work_mount_path: PathBuf,
}

impl ImageSpec {
    /// Spec for `flavor` writing into `output_dir`, mounted under `/Volumes`
    pub fn for_flavor(flavor: Flavor, output_dir: &Path) -> Self {
        let name = flavor.image_name();
        Self {
            name: name.to_string(),
            output_dir: output_dir.to_path_buf(),
            work_mount_path: Path::new(VOLUMES_DIR).join(name),
        }
    }

    /// Final compressed image, `<output_dir>/<name>.dmg`
    pub fn output_image_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.dmg", self.name))
    }

    /// Backing file of the scratch volume, `<output_dir>/<name>.sparseimage`
    pub fn scratch_image_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.sparseimage", self.name))
    }
}

/// Collaborators shared by every pipeline phase.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub tools: &'a dyn Tools,
    pub config: &'a dyn ConfigSource,
    pub output: &'a OutputManager,
}

/// Fails with [`ImageError::OutputExists`] when the output image is present.
pub fn ensure_output_free(spec: &ImageSpec) -> Result<()> {
    let path = spec.output_image_path();
    if path.exists() {
        return Err(ImageError::OutputExists { path });
    }
    Ok(())
}

/// Fails with [`ImageError::MissingTool`] for the first program not installed.
pub fn preflight(flavor: Flavor, tools: &dyn Tools) -> Result<()> {
    for (program, purpose) in flavor.required_programs() {
        if tools.locate(program).is_none() {
            return Err(ImageError::MissingTool {
                program: program.to_string(),
                purpose: purpose.to_string(),
            });
        }
    }
    Ok(())
}

/// Build the image for `flavor`; returns the output image path.
pub async fn build_image(
    flavor: Flavor,
    spec: &ImageSpec,
    ctx: &PipelineContext<'_>,
) -> Result<PathBuf> {
    ensure_output_free(spec)?;
    preflight(flavor, ctx.tools)?;

    log::info!("Building {} image {}", flavor, spec.name);

    let volume = allocate(spec, ctx).await?;
    populate::populate(flavor, &volume, ctx).await?;
    finalize(volume, spec, ctx).await
}
