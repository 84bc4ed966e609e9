//! DevicelabIOS contents: a self-contained Homebrew prefix with the iOS
//! device tools, and Cocoapods installed as a user gem.
//!
//! Package managers run with `HOME` pointing at the volume so everything
//! they install or cache lands inside the image instead of the host.

use crate::config::{COCOAPODS_VERSION, HOMEBREW_PACKAGES};
use crate::error::{ErrorExt, Result};
use crate::image::{PipelineContext, ScratchVolume};
use crate::tools::{CommandSpec, IsolatedEnv};
use crate::utils::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// System Ruby's gem, used for Cocoapods
pub const GEM: &str = "/usr/bin/gem";

const HOMEBREW_TARBALL: &str = "https://github.com/Homebrew/brew/tarball/master";

/// Homebrew checkout inside the volume.
#[derive(Debug)]
struct Homebrew {
    root: PathBuf,
    home: PathBuf,
}

impl Homebrew {
    fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.bin_dir().join("brew")).env(IsolatedEnv::with_home_and_bin(
            &self.home,
            Some(self.bin_dir().as_path()),
        ))
    }

    fn install(&self, name: &str, flags: &[String]) -> CommandSpec {
        self.command().arg("install").args(flags).arg(name)
    }

    fn uninstall(&self, name: &str) -> CommandSpec {
        self.command()
            .args(["uninstall", "--force", "--ignore-dependencies"])
            .arg(name)
    }

    fn cleanup(&self) -> CommandSpec {
        self.command().arg("cleanup")
    }
}

pub async fn populate(volume: &ScratchVolume, ctx: &PipelineContext<'_>) -> Result<()> {
    let brew = install_homebrew(volume.mount_path(), ctx).await?;
    install_packages(&brew, ctx).await?;
    install_cocoapods(volume.mount_path(), ctx).await
}

async fn install_homebrew(mount: &Path, ctx: &PipelineContext<'_>) -> Result<Homebrew> {
    ctx.output.progress("Cloning Homebrew...")?;

    let root = mount.join("homebrew");
    fs::create_dir(&root).await?;

    let tarball = mount.join("homebrew.tar.gz");
    ctx.tools
        .download(&Url::parse(HOMEBREW_TARBALL)?, &tarball)
        .await?;
    ctx.tools.unpack_tarball(&tarball, &root, 1).await?;
    fs::remove_file(&tarball).await?;

    Ok(Homebrew {
        root,
        home: mount.to_path_buf(),
    })
}

/// Installs run first, then removals, each in manifest order.
async fn install_packages(brew: &Homebrew, ctx: &PipelineContext<'_>) -> Result<()> {
    ctx.output.progress("Installing Homebrew packages...")?;
    let manifest = ctx.config.read_manifest(HOMEBREW_PACKAGES)?;

    for (name, flags) in manifest.installs() {
        ctx.output.indent(&format!("install {name}"))?;
        ctx.tools.run_checked(&brew.install(name, flags)).await?;
    }
    for name in manifest.removals() {
        ctx.output.indent(&format!("remove {name}"))?;
        ctx.tools.run_checked(&brew.uninstall(name)).await?;
    }
    ctx.tools.run_checked(&brew.cleanup()).await?;
    Ok(())
}

/// Installs the pinned Cocoapods into `<mount>/.gem`, then renames that to
/// `gem` so it is visible in the image.
async fn install_cocoapods(mount: &Path, ctx: &PipelineContext<'_>) -> Result<()> {
    let version = ctx.config.read_version(COCOAPODS_VERSION)?;
    ctx.output
        .progress(&format!("Installing Cocoapods {version}..."))?;

    let gem = CommandSpec::new(GEM)
        .args(["install", "cocoapods", "-v", version.as_str(), "--user-install"])
        .env(IsolatedEnv::with_home(mount));
    ctx.tools.run_checked(&gem).await?;

    let hidden = mount.join(".gem");
    tokio::fs::rename(&hidden, mount.join("gem"))
        .await
        .fs_context("renaming gem directory", &hidden)
}
