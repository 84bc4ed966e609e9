//! External operations the pipeline depends on.
//!
//! Everything that reaches outside the process (child programs, the network,
//! archive extraction) goes through the [`Tools`] trait. [`HostTools`] is the
//! real implementation; tests substitute a recording double.

mod archive;
mod http;
mod process;

pub use process::{
    CommandOutput, CommandSpec, IsolatedEnv, MAX_PROMPT_ANSWERS, PROMPT_IDLE_REPLY, PromptAnswers,
    SYSTEM_PATH, StdoutMode,
};

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use url::Url;

/// Collaborator performing external operations.
#[async_trait]
pub trait Tools: Send + Sync {
    /// Run a child process to completion; the status is not checked
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Download `url` to `dest`
    async fn download(&self, url: &Url, dest: &Path) -> Result<()>;

    /// Extract a zip archive into `dest`
    async fn unpack_zip(&self, archive: &Path, dest: &Path) -> Result<()>;

    /// Extract a gzip tarball into `dest`, dropping leading path components
    async fn unpack_tarball(&self, archive: &Path, dest: &Path, strip_components: usize)
    -> Result<()>;

    /// Resolve a program on PATH
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Run a child process and fail on a non-zero exit
    async fn run_checked(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.run(command).await?.check(command)
    }
}

/// Operations backed by the host: `tokio::process`, `reqwest`, `zip`, `tar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostTools;

#[async_trait]
impl Tools for HostTools {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        process::execute(command).await
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<()> {
        http::download(url, dest).await
    }

    async fn unpack_zip(&self, archive: &Path, dest: &Path) -> Result<()> {
        archive::unpack_zip(archive, dest).await
    }

    async fn unpack_tarball(
        &self,
        archive: &Path,
        dest: &Path,
        strip_components: usize,
    ) -> Result<()> {
        archive::unpack_tarball(archive, dest, strip_components).await
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        match which::which(program) {
            Ok(path) => {
                log::debug!("Found {} at: {}", program, path.display());
                Some(path)
            }
            Err(e) => {
                log::debug!("{} not found in PATH: {}", program, e);
                None
            }
        }
    }
}
