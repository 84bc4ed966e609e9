//! External process execution.
//!
//! Commands are described by a [`CommandSpec`] value and executed with
//! `tokio::process`. Environment shaping and interactive prompt answering
//! travel with the command, so nothing here touches the invoking process's
//! own environment.

use crate::error::{ImageError, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::task::JoinHandle;

/// System binary directories every isolated child may use.
pub const SYSTEM_PATH: &str = "/sbin:/usr/sbin:/bin:/usr/bin";

/// Upper bound on answered prompts before stdin is closed.
pub const MAX_PROMPT_ANSWERS: usize = 100;

/// Silence after which an interactive child is answered without a prompt.
pub const PROMPT_IDLE_REPLY: Duration = Duration::from_secs(2);

/// Minimal environment for a child process.
///
/// The child starts from an empty environment, so tools that keep state under
/// `$HOME` write it wherever `HOME` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedEnv {
    vars: BTreeMap<String, String>,
}

impl IsolatedEnv {
    /// `HOME` set to `home`, `PATH` restricted to the system directories
    pub fn with_home(home: &Path) -> Self {
        Self::with_home_and_bin(home, None)
    }

    /// Like [`IsolatedEnv::with_home`], with `bin_dir` searched first
    pub fn with_home_and_bin(home: &Path, bin_dir: Option<&Path>) -> Self {
        let path = match bin_dir {
            Some(bin) => format!("{}:{SYSTEM_PATH}", bin.display()),
            None => SYSTEM_PATH.to_string(),
        };

        let mut vars = BTreeMap::new();
        vars.insert("HOME".to_string(), home.display().to_string());
        vars.insert("PATH".to_string(), path);
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Replies written to an interactive child.
///
/// A reply goes out every time the child's output shows `prompt`, and also
/// whenever the child has been silent for `idle`, so prompts worded some
/// other way are still answered. Once `limit` replies are spent, the next
/// one closes stdin instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAnswers {
    pub prompt: String,
    pub reply: String,
    pub limit: usize,
    pub idle: Duration,
}

impl PromptAnswers {
    /// Answer every `(y/N)` confirmation with `y`
    pub fn accept_all() -> Self {
        Self {
            prompt: "(y/N)".to_string(),
            reply: "y\n".to_string(),
            limit: MAX_PROMPT_ANSWERS,
            idle: PROMPT_IDLE_REPLY,
        }
    }
}

/// How standard output of the child is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdoutMode {
    /// Pass through to our own stdout
    #[default]
    Inherit,
    /// Capture into [`CommandOutput::stdout`]
    Capture,
}

/// Description of one external invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Option<IsolatedEnv>,
    pub current_dir: Option<PathBuf>,
    pub stdout: StdoutMode,
    pub answers: Option<PromptAnswers>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: None,
            current_dir: None,
            stdout: StdoutMode::Inherit,
            answers: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: IsolatedEnv) -> Self {
        self.env = Some(env);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.stdout = StdoutMode::Capture;
        self
    }

    pub fn answer_prompts(mut self, answers: PromptAnswers) -> Self {
        self.answers = Some(answers);
        self
    }

    /// Program file name, e.g. `hdiutil` for `/usr/bin/hdiutil`
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Arguments as lossy UTF-8 strings
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(env) = &self.env {
            cmd.env_clear();
            cmd.envs(env.vars());
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Outcome of an external invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`ImageError::ToolFailed`]
    pub fn check(self, command: &CommandSpec) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ImageError::ToolFailed {
            command: command.to_string(),
            status: match self.code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            },
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Run `spec` to completion.
///
/// The child's stderr is passed through to ours and also kept for
/// [`CommandOutput::stderr`].
pub async fn execute(spec: &CommandSpec) -> Result<CommandOutput> {
    log::debug!("Running: {}", spec);

    if let Some(answers) = &spec.answers {
        return execute_answering(spec, answers).await;
    }

    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null()).stderr(Stdio::piped());
    match spec.stdout {
        StdoutMode::Inherit => cmd.stdout(Stdio::inherit()),
        StdoutMode::Capture => cmd.stdout(Stdio::piped()),
    };

    let mut child = spawn(spec, &mut cmd)?;
    let stderr_task = child.stderr.take().map(tee_stderr);

    let mut stdout = Vec::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_end(&mut stdout).await?;
    }
    let status = child.wait().await?;

    Ok(CommandOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: join_stderr(stderr_task).await,
    })
}

fn spawn(spec: &CommandSpec, cmd: &mut Command) -> Result<Child> {
    cmd.spawn().map_err(|source| ImageError::ToolLaunch {
        command: spec.to_string(),
        source,
    })
}

/// Copy the child's stderr to ours, returning everything it wrote.
fn tee_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut sink = tokio::io::stderr();
        let mut captured = Vec::new();
        let mut chunk = [0u8; 4096];
        while let Ok(n) = pipe.read(&mut chunk).await {
            if n == 0 {
                break;
            }
            let _ = sink.write_all(&chunk[..n]).await;
            captured.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&captured).into_owned()
    })
}

async fn join_stderr(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Writes replies to a child's stdin until the limit is spent or the pipe
/// closes.
struct Responder<'a> {
    stdin: Option<ChildStdin>,
    answers: &'a PromptAnswers,
    answered: usize,
    program: String,
}

impl Responder<'_> {
    fn is_open(&self) -> bool {
        self.stdin.is_some()
    }

    async fn reply(&mut self) {
        let Some(pipe) = self.stdin.as_mut() else {
            return;
        };
        if self.answered >= self.answers.limit {
            log::warn!(
                "{} is still waiting for input after {} replies; closing its stdin",
                self.program,
                self.answers.limit
            );
            self.stdin = None;
            return;
        }

        let written = match pipe.write_all(self.answers.reply.as_bytes()).await {
            Ok(()) => pipe.flush().await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => self.answered += 1,
            Err(e) => {
                log::debug!("{} stopped reading its stdin: {}", self.program, e);
                self.stdin = None;
            }
        }
    }
}

/// Run an interactive child, replying to its prompts until its output ends.
async fn execute_answering(spec: &CommandSpec, answers: &PromptAnswers) -> Result<CommandOutput> {
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn(spec, &mut cmd)?;
    let mut stdout = child.stdout.take().ok_or_else(|| ImageError::ToolLaunch {
        command: spec.to_string(),
        source: std::io::Error::other("stdout was not captured"),
    })?;
    let stderr_task = child.stderr.take().map(tee_stderr);

    let mut responder = Responder {
        stdin: child.stdin.take(),
        answers,
        answered: 0,
        program: spec.program_name(),
    };
    let mut echo = tokio::io::stdout();
    let mut scanner = PromptScanner::new(answers.prompt.as_bytes());
    let mut transcript = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = tokio::select! {
            read = stdout.read(&mut chunk) => read?,
            _ = tokio::time::sleep(answers.idle), if responder.is_open() => {
                log::debug!(
                    "{} silent for {:?}; replying without a prompt",
                    responder.program,
                    answers.idle
                );
                responder.reply().await;
                continue;
            }
        };
        if n == 0 {
            break;
        }
        echo.write_all(&chunk[..n]).await?;
        transcript.extend_from_slice(&chunk[..n]);

        for _ in 0..scanner.feed(&chunk[..n]) {
            responder.reply().await;
        }
    }
    echo.flush().await?;

    let answered = responder.answered;
    drop(responder);

    let status = child.wait().await?;
    log::info!("Answered {} prompt(s) from {}", answered, spec.program_name());

    Ok(CommandOutput {
        code: status.code(),
        stdout: String::from_utf8_lossy(&transcript).into_owned(),
        stderr: join_stderr(stderr_task).await,
    })
}

/// Counts occurrences of a prompt in a byte stream split into arbitrary chunks.
#[derive(Debug)]
struct PromptScanner {
    needle: Vec<u8>,
    carry: Vec<u8>,
}

impl PromptScanner {
    fn new(needle: &[u8]) -> Self {
        Self {
            needle: needle.to_vec(),
            carry: Vec::new(),
        }
    }

    /// Number of complete prompts that ended inside `chunk`
    fn feed(&mut self, chunk: &[u8]) -> usize {
        if self.needle.is_empty() {
            return 0;
        }
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(chunk);

        let mut count = 0;
        let mut pos = 0;
        let mut consumed = 0;
        while pos + self.needle.len() <= buf.len() {
            if buf[pos..].starts_with(&self.needle) {
                count += 1;
                pos += self.needle.len();
                consumed = pos;
            } else {
                pos += 1;
            }
        }

        // Keep a partial prompt that may complete in the next chunk.
        let keep_from = consumed.max(buf.len().saturating_sub(self.needle.len() - 1));
        self.carry = buf[keep_from..].to_vec();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_env_puts_bin_first() {
        let env = IsolatedEnv::with_home_and_bin(
            Path::new("/Volumes/DevicelabIOS"),
            Some(Path::new("/Volumes/DevicelabIOS/homebrew/bin")),
        );
        assert_eq!(env.get("HOME"), Some("/Volumes/DevicelabIOS"));
        assert_eq!(
            env.get("PATH"),
            Some("/Volumes/DevicelabIOS/homebrew/bin:/sbin:/usr/sbin:/bin:/usr/bin")
        );
        assert_eq!(env.vars().count(), 2);
    }

    #[test]
    fn display_renders_command_line() {
        let spec = CommandSpec::new("hdiutil").args(["detach", "/Volumes/DevicelabCore"]);
        assert_eq!(spec.to_string(), "hdiutil detach /Volumes/DevicelabCore");
        assert_eq!(spec.program_name(), "hdiutil");
    }

    #[test]
    fn check_maps_failure() {
        let spec = CommandSpec::new("git").arg("clone");
        let output = CommandOutput {
            code: Some(128),
            stdout: String::new(),
            stderr: "fatal: not a repo\n".into(),
        };
        match output.check(&spec).unwrap_err() {
            ImageError::ToolFailed { command, status, stderr } => {
                assert_eq!(command, "git clone");
                assert_eq!(status, "exit code 128");
                assert_eq!(stderr, "fatal: not a repo");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scanner_counts_split_prompts() {
        let mut scanner = PromptScanner::new(b"(y/N)");
        assert_eq!(scanner.feed(b"License A\nAccept? (y"), 0);
        assert_eq!(scanner.feed(b"/N): "), 1);
        assert_eq!(scanner.feed(b"License B (y/N): License C (y/N): "), 2);
        assert_eq!(scanner.feed(b"done\n"), 0);
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let spec = CommandSpec::new("/bin/sh").args(["-c", "echo oops >&2; exit 3"]);
        let output = execute(&spec).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
        assert!(output.check(&spec).is_err());
    }

    #[tokio::test]
    async fn isolated_env_replaces_parent_env() {
        let home = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", "echo \"$HOME|$PATH|${CARGO:-unset}\""])
            .env(IsolatedEnv::with_home(home.path()))
            .capture_stdout();

        let output = execute(&spec).await.unwrap().check(&spec).unwrap();
        assert_eq!(
            output.stdout.trim(),
            format!("{}|{SYSTEM_PATH}|unset", home.path().display())
        );
    }

    #[tokio::test]
    async fn answers_each_prompt() {
        let script = r#"
            printf 'Accept? (y/N): '; read a; echo "first=$a"
            printf 'Accept? (y/N): '; read b; echo "second=$b"
        "#;
        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", script])
            .answer_prompts(PromptAnswers::accept_all());

        let output = execute(&spec).await.unwrap();
        assert!(output.is_success());
        assert!(output.stdout.contains("first=y"));
        assert!(output.stdout.contains("second=y"));
    }

    #[tokio::test]
    async fn unrecognised_prompt_is_answered_after_silence() {
        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", "printf 'Review licenses ... [y/N]: '; read a; echo \"got=$a\""])
            .answer_prompts(PromptAnswers::accept_all());

        let output = tokio::time::timeout(Duration::from_secs(5), execute(&spec))
            .await
            .expect("child left waiting for input")
            .unwrap();

        assert!(output.is_success());
        assert!(output.stdout.contains("got=y"));
    }

    #[tokio::test]
    async fn closes_stdin_once_replies_run_out() {
        let script = r#"
            for i in 1 2 3; do
                printf 'Accept? (y/N): '
                if read a; then echo "answer$i=$a"; else echo "eof$i"; fi
            done
        "#;
        let answers = PromptAnswers {
            limit: 2,
            ..PromptAnswers::accept_all()
        };
        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", script])
            .answer_prompts(answers);

        let output = tokio::time::timeout(Duration::from_secs(10), execute(&spec))
            .await
            .expect("child left waiting for input")
            .unwrap();

        assert!(output.is_success());
        assert!(output.stdout.contains("answer1=y"));
        assert!(output.stdout.contains("answer2=y"));
        assert!(output.stdout.contains("eof3"));
        assert!(!output.stdout.contains("answer3"));
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let spec = CommandSpec::new("/nonexistent/devicelab-tool");
        let err = execute(&spec).await.unwrap_err();
        assert!(matches!(err, ImageError::ToolLaunch { .. }));
    }
}
