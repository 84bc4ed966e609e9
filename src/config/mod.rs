//! File-resident configuration for the image pipeline.
//!
//! Version pins, package manifests and static-file directories live next to
//! each other in a resources directory. The pipeline only sees them through
//! [`ConfigSource`] so parsing stays out of the population logic.

mod manifest;

pub use manifest::{ManifestError, PackageDirective, PackageManifest};

use crate::error::{ErrorExt, ImageError, Result};
use crate::image::Flavor;
use std::path::{Path, PathBuf};

/// Resource directory checked in alongside this crate.
pub const DEFAULT_RESOURCES_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/images");

/// Pin file for the Dart SDK release
pub const DART_VERSION: &str = "dart_version";
/// Pin file for the Cocoapods gem
pub const COCOAPODS_VERSION: &str = "cocoapods_version";
/// Pin file for the Android SDK command-line tools
pub const ANDROID_TOOLS_VERSION: &str = "android_sdk_tools_version";
/// Homebrew install/remove manifest
pub const HOMEBREW_PACKAGES: &str = "homebrew_packages";
/// Android SDK packages, one per line
pub const ANDROID_PACKAGES: &str = "android_sdk_packages";

/// Source of pipeline configuration.
pub trait ConfigSource: Send + Sync {
    /// Read a single-line version pin, trimmed
    fn read_version(&self, name: &str) -> Result<String>;

    /// Read and parse a package manifest
    fn read_manifest(&self, name: &str) -> Result<PackageManifest>;

    /// Read a plain list, one non-empty entry per line
    fn read_list(&self, name: &str) -> Result<Vec<String>>;

    /// Directory of checked-in files copied into the flavor's image
    fn static_dir(&self, flavor: Flavor) -> PathBuf;

    /// Directory the configuration is read from
    fn root(&self) -> &Path;
}

/// Configuration read from flat files in one directory.
#[derive(Debug, Clone)]
pub struct DirConfig {
    root: PathBuf,
}

impl DirConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, name: &str, action: &'static str) -> Result<(PathBuf, String)> {
        let path = self.root.join(name);
        let text = std::fs::read_to_string(&path).fs_context(action, &path)?;
        Ok((path, text))
    }
}

impl Default for DirConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCES_DIR)
    }
}

impl ConfigSource for DirConfig {
    fn read_version(&self, name: &str) -> Result<String> {
        let (path, text) = self.read(name, "reading version pin")?;
        parse_version(&text).map_err(|reason| ImageError::InvalidVersion { path, reason })
    }

    fn read_manifest(&self, name: &str) -> Result<PackageManifest> {
        let (path, text) = self.read(name, "reading package manifest")?;
        PackageManifest::parse(&text).map_err(|source| ImageError::Manifest { path, source })
    }

    fn read_list(&self, name: &str) -> Result<Vec<String>> {
        let (_, text) = self.read(name, "reading package list")?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn static_dir(&self, flavor: Flavor) -> PathBuf {
        self.root.join(flavor.key())
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// The token is substituted into URL paths, so it must be a single word.
fn parse_version(text: &str) -> std::result::Result<String, String> {
    let version = text.trim();
    if version.is_empty() {
        return Err("file is empty".to_string());
    }
    if version.contains(char::is_whitespace) || version.contains('/') {
        return Err(format!("`{version}` is not a single version token"));
    }
    Ok(version.to_string())
}
