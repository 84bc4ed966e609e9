//! Command line interface for the device-lab image builder.
//!
//! Parses the flavor argument, runs the matching pipeline in the current
//! working directory and maps the outcome onto an exit status.

mod args;
mod output;

pub use args::{Args, RuntimeConfig, usage};
pub use output::OutputManager;

use crate::config::DirConfig;
use crate::error::{ImageError, Result};
use crate::image::{self, ImageSpec, PipelineContext};
use crate::tools::HostTools;
use clap::Parser;
use clap::error::ErrorKind;
use std::ffi::OsString;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    run_with(std::env::args_os()).await
}

/// Run with explicit arguments; the first item is the program name
pub async fn run_with<I, T>(argv: I) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let program = program_name(&argv);

    let args = match Args::try_parse_from(&argv) {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(0);
        }
        Err(e) => {
            log::debug!("Argument error: {}", e);
            println!("{}", usage(&program));
            return Ok(1);
        }
    };

    let output_dir = std::env::current_dir()?;
    let runtime_config = RuntimeConfig::new(&args, output_dir);
    let output = runtime_config.output();

    let flavor = runtime_config.flavor();
    let spec = ImageSpec::for_flavor(flavor, runtime_config.output_dir());
    let config = DirConfig::new(runtime_config.resources_dir());
    let tools = HostTools;
    let ctx = PipelineContext {
        tools: &tools,
        config: &config,
        output,
    };

    match image::build_image(flavor, &spec, &ctx).await {
        Ok(path) => {
            output.success(&format!("Created {}", path.display()))?;
            Ok(0)
        }
        Err(ImageError::OutputExists { path }) => {
            println!("ERROR: Output disk image already exists: {}", path.display());
            Ok(1)
        }
        Err(e) => {
            output.error(&e.to_string())?;
            if !e.is_precondition() {
                output.warn(&format!(
                    "Scratch state may remain at {} and {}; remove it manually",
                    spec.scratch_image_path().display(),
                    spec.work_mount_path.display()
                ))?;
            }
            Ok(1)
        }
    }
}

fn program_name(argv: &[OsString]) -> String {
    argv.first()
        .map(std::path::Path::new)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "devicelab_image_builder".to_string())
}
