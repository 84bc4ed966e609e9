//! Error types for image provisioning.
//!
//! Every failure the pipeline can hit maps onto one [`ImageError`] variant so the
//! dispatcher can report it and exit with a failure status.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ManifestError;

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ImageError>;

/// Main error type for all provisioning operations
#[derive(Error, Debug)]
pub enum ImageError {
    /// The output image is already present; nothing was touched
    #[error("Output disk image already exists: {}", path.display())]
    OutputExists {
        /// Path of the existing image
        path: PathBuf,
    },

    /// A host program the flavor depends on is not on PATH
    #[error("Required tool `{program}` not found in PATH (needed to {purpose})")]
    MissingTool {
        /// Program name
        program: String,
        /// What the program is used for
        purpose: String,
    },

    /// External program could not be started
    #[error("Failed to launch {command}: {source}")]
    ToolLaunch {
        /// Rendered command line
        command: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// External program ran but reported failure
    #[error("{command} failed ({status}): {stderr}")]
    ToolFailed {
        /// Rendered command line
        command: String,
        /// Exit code, or a description when killed by a signal
        status: String,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// Mount point never showed up after attaching the scratch volume
    #[error("Mount point {} not found after {retries} retries", path.display())]
    MountTimeout {
        /// Expected mount point
        path: PathBuf,
        /// Number of polls performed
        retries: u32,
    },

    /// HTTP download failure
    #[error("Download of {url} failed: {source}")]
    Download {
        /// Requested URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Archive could not be unpacked
    #[error("Failed to unpack {}: {reason}", path.display())]
    Archive {
        /// Archive path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Version pin file is empty or malformed
    #[error("Invalid version pin in {}: {reason}", path.display())]
    InvalidVersion {
        /// Pin file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Package manifest syntax errors
    #[error("Manifest error in {}: {source}", path.display())]
    Manifest {
        /// Manifest file path
        path: PathBuf,
        /// Parse error
        #[source]
        source: ManifestError,
    },

    /// Filesystem operation failed on a known path
    #[error("Failed {action} {}: {source}", path.display())]
    Fs {
        /// What was being done
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL construction errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Attaches the failing action and path to raw IO errors.
pub trait ErrorExt<T> {
    /// Wrap an IO error as [`ImageError::Fs`].
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| ImageError::Fs {
            action,
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ImageError {
    /// Whether the run stopped before touching the filesystem
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::OutputExists { .. } | Self::MissingTool { .. })
    }
}
