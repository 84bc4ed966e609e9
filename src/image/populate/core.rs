//! DevicelabCore contents: a history-free snapshot of the source tree and
//! the Dart SDK.

use super::download_and_unzip;
use crate::config::DART_VERSION;
use crate::error::Result;
use crate::image::{PipelineContext, ScratchVolume};
use crate::tools::CommandSpec;
use crate::utils::fs;
use std::path::PathBuf;
use url::Url;

/// Dart release channel the SDK is taken from
pub const DART_CHANNEL: &str = "dev";
/// SDK archive for macOS hosts
pub const DART_ARCHIVE: &str = "dartsdk-macos-x64-release.zip";
/// Directory under the volume root holding the source snapshot
pub const SOURCE_DIR: &str = "cocoon";

const DART_ARCHIVE_BASE: &str = "https://storage.googleapis.com/dart-archive/channels";

/// Download URL of the Dart SDK `version` on `channel`
pub fn dart_sdk_url(channel: &str, version: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{DART_ARCHIVE_BASE}/{channel}/release/{version}/sdk/{DART_ARCHIVE}"
    ))?)
}

pub async fn populate(volume: &ScratchVolume, ctx: &PipelineContext<'_>) -> Result<()> {
    snapshot_source_tree(volume, ctx).await?;

    let version = ctx.config.read_version(DART_VERSION)?;
    ctx.output
        .progress(&format!("Downloading Dart SDK {version}..."))?;
    let url = dart_sdk_url(DART_CHANNEL, &version)?;
    download_and_unzip(ctx, &url, &volume.mount_path().join("dart-sdk.zip")).await
}

/// Clone the repository holding the resources into `<mount>/cocoon` and
/// strip its `.git` directory.
async fn snapshot_source_tree(volume: &ScratchVolume, ctx: &PipelineContext<'_>) -> Result<PathBuf> {
    let rev_parse = CommandSpec::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(ctx.config.root())
        .capture_stdout();
    let toplevel = ctx.tools.run_checked(&rev_parse).await?.stdout;
    let repo_root = PathBuf::from(toplevel.trim());
    let dest = volume.mount_path().join(SOURCE_DIR);

    ctx.output
        .progress(&format!("Cloning {}...", repo_root.display()))?;
    ctx.tools
        .run_checked(&CommandSpec::new("git").arg("clone").arg(&repo_root).arg(&dest))
        .await?;
    fs::remove_dir_all(&dest.join(".git")).await?;

    Ok(dest)
}
