//! Recording test doubles for the pipeline's collaborators.

use super::{Flavor, ImageSpec, PipelineContext};
use crate::cli::OutputManager;
use crate::config::{self, ConfigSource, DirConfig, PackageManifest};
use crate::error::Result;
use crate::tools::{CommandOutput, CommandSpec, Tools};
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Repository root reported by the mocked `git rev-parse`
pub const MOCK_REPO_ROOT: &str = "/src/devicelab";

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run {
        line: String,
        home: Option<String>,
        path: Option<String>,
        answers: bool,
        /// Entries of the mount point when the command ran
        mount_listing: Vec<String>,
    },
    Download {
        url: String,
        dest: PathBuf,
    },
    UnpackZip {
        archive: PathBuf,
        dest: PathBuf,
    },
    UnpackTarball {
        archive: PathBuf,
        dest: PathBuf,
        strip: usize,
    },
    ReadConfig {
        name: String,
    },
}

impl Call {
    pub fn line(&self) -> String {
        match self {
            Self::Run { line, .. } => line.clone(),
            Self::Download { url, .. } => format!("download {url}"),
            Self::UnpackZip { archive, .. } => format!("unzip {}", archive.display()),
            Self::UnpackTarball { archive, dest, strip } => format!(
                "untar {} -> {} (strip {strip})",
                archive.display(),
                dest.display()
            ),
            Self::ReadConfig { name } => format!("read {name}"),
        }
    }
}

type Journal = Arc<Mutex<Vec<Call>>>;

fn record(journal: &Journal, call: Call) {
    journal.lock().unwrap().push(call);
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// [`Tools`] double that records calls and fakes their filesystem effects.
pub struct MockTools {
    journal: Journal,
    mount: PathBuf,
    failures: Mutex<Vec<String>>,
    hidden: Mutex<Vec<String>>,
    skip_mount: AtomicBool,
}

impl MockTools {
    fn new(journal: Journal, mount: PathBuf) -> Self {
        Self {
            journal,
            mount,
            failures: Mutex::new(Vec::new()),
            hidden: Mutex::new(Vec::new()),
            skip_mount: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::line).collect()
    }

    /// Commands whose rendered line starts with `prefix` exit with status 1
    pub fn fail_on(&self, prefix: &str) {
        self.failures.lock().unwrap().push(prefix.to_string());
    }

    /// `locate` reports `program` as missing
    pub fn hide_program(&self, program: &str) {
        self.hidden.lock().unwrap().push(program.to_string());
    }

    /// `hdiutil attach` succeeds without the mount point appearing
    pub fn skip_mount(&self) {
        self.skip_mount.store(true, Ordering::SeqCst);
    }

    fn simulate(&self, command: &CommandSpec, line: &str) -> std::io::Result<String> {
        let args = command.arg_strings();
        let last = args.last().map(PathBuf::from);

        if line.starts_with("hdiutil create") {
            if let Some(out) = last {
                let marker = if args.iter().any(|a| a == "SPARSE") { "sparse" } else { "dmg" };
                std::fs::write(out, marker)?;
            }
        } else if line.starts_with("hdiutil attach") {
            if !self.skip_mount.load(Ordering::SeqCst) {
                if let Some(idx) = args.iter().position(|a| a == "-mountpoint") {
                    std::fs::create_dir_all(&args[idx + 1])?;
                }
            }
        } else if line.starts_with("git rev-parse") {
            return Ok(format!("{MOCK_REPO_ROOT}\n"));
        } else if line.starts_with("git clone") {
            if let Some(dest) = last {
                std::fs::create_dir_all(dest.join(".git"))?;
                std::fs::write(dest.join(".git/HEAD"), "ref: refs/heads/main\n")?;
                std::fs::write(dest.join("README.md"), "devicelab\n")?;
            }
        } else if line.starts_with("gem install") {
            if let Some(home) = command.env.as_ref().and_then(|env| env.get("HOME")) {
                std::fs::create_dir_all(Path::new(home).join(".gem/ruby"))?;
            }
        }
        Ok(String::new())
    }
}

#[async_trait]
impl Tools for MockTools {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let args = command.arg_strings();
        let line = if args.is_empty() {
            command.program_name()
        } else {
            format!("{} {}", command.program_name(), args.join(" "))
        };
        let env = command.env.as_ref();
        record(
            &self.journal,
            Call::Run {
                line: line.clone(),
                home: env.and_then(|e| e.get("HOME")).map(str::to_string),
                path: env.and_then(|e| e.get("PATH")).map(str::to_string),
                answers: command.answers.is_some(),
                mount_listing: listing(&self.mount),
            },
        );

        let failing = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()));
        if failing {
            return Ok(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "mock failure".to_string(),
            });
        }

        let stdout = self.simulate(command, &line)?;
        Ok(CommandOutput {
            stdout,
            ..CommandOutput::success()
        })
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<()> {
        record(
            &self.journal,
            Call::Download {
                url: url.to_string(),
                dest: dest.to_path_buf(),
            },
        );
        std::fs::write(dest, "archive")?;
        Ok(())
    }

    async fn unpack_zip(&self, archive: &Path, dest: &Path) -> Result<()> {
        record(
            &self.journal,
            Call::UnpackZip {
                archive: archive.to_path_buf(),
                dest: dest.to_path_buf(),
            },
        );
        Ok(())
    }

    async fn unpack_tarball(
        &self,
        archive: &Path,
        dest: &Path,
        strip_components: usize,
    ) -> Result<()> {
        record(
            &self.journal,
            Call::UnpackTarball {
                archive: archive.to_path_buf(),
                dest: dest.to_path_buf(),
                strip: strip_components,
            },
        );
        Ok(())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if self.hidden.lock().unwrap().iter().any(|p| p == program) {
            return None;
        }
        Some(Path::new("/usr/bin").join(program))
    }
}

/// [`DirConfig`] that journals every read next to the tool calls.
pub struct JournaledConfig {
    inner: DirConfig,
    journal: Journal,
}

impl JournaledConfig {
    fn note(&self, name: &str) {
        record(
            &self.journal,
            Call::ReadConfig {
                name: name.to_string(),
            },
        );
    }
}

impl ConfigSource for JournaledConfig {
    fn read_version(&self, name: &str) -> Result<String> {
        self.note(name);
        self.inner.read_version(name)
    }

    fn read_manifest(&self, name: &str) -> Result<PackageManifest> {
        self.note(name);
        self.inner.read_manifest(name)
    }

    fn read_list(&self, name: &str) -> Result<Vec<String>> {
        self.note(name);
        self.inner.read_list(name)
    }

    fn static_dir(&self, flavor: Flavor) -> PathBuf {
        self.inner.static_dir(flavor)
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }
}

/// Temporary output directory, resources and mock collaborators for one flavor.
pub struct Fixture {
    _dir: tempfile::TempDir,
    pub spec: ImageSpec,
    pub tools: MockTools,
    pub config: JournaledConfig,
    pub output: OutputManager,
}

impl Fixture {
    pub fn ctx(&self) -> PipelineContext<'_> {
        PipelineContext {
            tools: &self.tools,
            config: &self.config,
            output: &self.output,
        }
    }

    /// Sorted entries of the output directory
    pub fn output_listing(&self) -> Vec<String> {
        listing(&self.spec.output_dir)
    }
}

pub fn fixture(flavor: Flavor) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let resources = dir.path().join("resources");
    std::fs::create_dir_all(&output_dir).unwrap();
    std::fs::create_dir_all(&resources).unwrap();

    for (name, contents) in [
        (config::DART_VERSION, "2.10.0-dev.3.0\n"),
        (config::COCOAPODS_VERSION, "1.9.3\n"),
        (config::ANDROID_TOOLS_VERSION, "4333796\n"),
        (
            config::HOMEBREW_PACKAGES,
            "libimobiledevice:--HEAD\nios-deploy\n-python\nideviceinstaller\n",
        ),
        (config::ANDROID_PACKAGES, "platform-tools\nplatforms;android-29\n"),
    ] {
        std::fs::write(resources.join(name), contents).unwrap();
    }
    for key in ["core", "ios", "android"] {
        let static_dir = resources.join(key);
        std::fs::create_dir_all(&static_dir).unwrap();
        let script = static_dir.join(format!("{key}-env.sh"));
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(static_dir.join("README"), key).unwrap();
    }

    let spec = ImageSpec {
        name: flavor.image_name().to_string(),
        output_dir,
        work_mount_path: dir.path().join("mnt").join(flavor.image_name()),
    };
    let journal: Journal = Arc::default();

    Fixture {
        tools: MockTools::new(journal.clone(), spec.work_mount_path.clone()),
        config: JournaledConfig {
            inner: DirConfig::new(resources),
            journal,
        },
        output: OutputManager::quiet(),
        spec,
        _dir: dir,
    }
}
