//! DevicelabAndroid contents: the Android SDK command-line tools with
//! licenses accepted and the listed SDK packages installed.

use super::download_and_unzip;
use crate::config::{ANDROID_PACKAGES, ANDROID_TOOLS_VERSION};
use crate::error::Result;
use crate::image::{PipelineContext, ScratchVolume};
use crate::tools::{CommandSpec, IsolatedEnv, PromptAnswers};
use crate::utils::fs;
use std::path::{Path, PathBuf};
use url::Url;

const ANDROID_REPOSITORY: &str = "https://dl.google.com/android/repository";

/// Download URL of the SDK tools bundle `version` for macOS
pub fn sdk_tools_url(version: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{ANDROID_REPOSITORY}/sdk-tools-darwin-{version}.zip"
    ))?)
}

/// `sdkmanager` of an unpacked SDK.
#[derive(Debug)]
struct SdkManager {
    sdk_root: PathBuf,
}

impl SdkManager {
    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.sdk_root.join("tools").join("bin").join("sdkmanager"))
            .arg(format!("--sdk_root={}", self.sdk_root.display()))
    }

    fn accept_licenses(&self) -> CommandSpec {
        self.command()
            .arg("--licenses")
            .answer_prompts(PromptAnswers::accept_all())
    }

    fn install(&self, package: &str, home: &Path) -> CommandSpec {
        self.command().arg(package).env(IsolatedEnv::with_home(home))
    }
}

pub async fn populate(volume: &ScratchVolume, ctx: &PipelineContext<'_>) -> Result<()> {
    let mount = volume.mount_path();

    ctx.output.progress("Downloading Android SDK tools...")?;
    let sdk_root = mount.join("sdk");
    fs::create_dir(&sdk_root).await?;
    let version = ctx.config.read_version(ANDROID_TOOLS_VERSION)?;
    download_and_unzip(ctx, &sdk_tools_url(&version)?, &sdk_root.join("android-sdk.zip")).await?;

    let sdkmanager = SdkManager { sdk_root };

    ctx.output.progress("Accepting licenses...")?;
    ctx.tools.run_checked(&sdkmanager.accept_licenses()).await?;

    ctx.output.progress("Downloading Android SDK packages...")?;
    for package in ctx.config.read_list(ANDROID_PACKAGES)? {
        ctx.output.indent(&package)?;
        ctx.tools
            .run_checked(&sdkmanager.install(&package, mount))
            .await?;
    }
    Ok(())
}
