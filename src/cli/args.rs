//! Command line argument parsing.
//!
//! The command takes exactly one positional flavor. Anything else is a usage
//! error reported with the short usage line and exit status 1.

use clap::Parser;
use std::path::PathBuf;

use crate::config::DEFAULT_RESOURCES_DIR;
use crate::image::Flavor;

/// Builds a device-lab disk image in the current directory
#[derive(Parser, Debug)]
#[command(
    name = "devicelab_image_builder",
    version,
    about = "Builds device-lab disk images for macOS test runners",
    long_about = "Builds one device-lab disk image in the current working directory.

Flavors:
  core     DevicelabCore.dmg: checked-in files, source snapshot, Dart SDK
  ios      DevicelabIOS.dmg: Homebrew with iOS device tools, Cocoapods
  android  DevicelabAndroid.dmg: Android SDK tools and packages

Refuses to run when the output image already exists."
)]
pub struct Args {
    /// Image flavor to build
    #[arg(value_enum, value_name = "FLAVOR")]
    pub flavor: Flavor,
}

/// Short usage line printed for usage errors.
pub fn usage(program: &str) -> String {
    format!("usage: {program} core|ios|android")
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Image flavor being built
    flavor: Flavor,
    /// Output manager for terminal output
    output: super::OutputManager,
    /// Directory the image is written to
    output_dir: PathBuf,
    /// Directory holding version pins, manifests and static files
    resources_dir: PathBuf,
}

impl RuntimeConfig {
    /// Build the runtime configuration for `args`, writing into `output_dir`
    pub fn new(args: &Args, output_dir: PathBuf) -> Self {
        Self {
            flavor: args.flavor,
            output: super::OutputManager::new(false), // Never quiet
            output_dir,
            resources_dir: PathBuf::from(DEFAULT_RESOURCES_DIR),
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    pub fn resources_dir(&self) -> &std::path::Path {
        &self.resources_dir
    }
}
