//! Device-lab image builder - creates macOS disk images for test runners.
//!
//! Builds one image flavor (core, ios or android) in the current working
//! directory and exits non-zero on any failure.

use devicelab_image_builder::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    process::exit(exit_code);
}
