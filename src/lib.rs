//! Device-lab disk image builder
//!
//! This library assembles macOS disk images used as disposable test-runner
//! environments:
//! - `DevicelabCore.dmg` (source snapshot, Dart SDK)
//! - `DevicelabIOS.dmg` (Homebrew with iOS device tools, Cocoapods)
//! - `DevicelabAndroid.dmg` (Android SDK tools and packages)
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use error::{ImageError, Result};
pub use image::{Flavor, ImageSpec, PipelineContext, build_image};
