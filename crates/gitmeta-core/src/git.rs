use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{GitMetaError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl GitOutput {
    /// Stdout without the trailing newline and whitespace. Leading
    /// whitespace belongs to the output and is kept.
    pub fn trimmed(&self) -> &str {
        self.stdout.trim_end()
    }

    pub fn command_line(program: &str, args: &[String]) -> String {
        let words = std::iter::once(program).chain(args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

/// Shared flag that asks an in-flight git invocation to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct GitRunner {
    git_binary: String,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitRunner {
    pub fn new(git_binary: impl Into<String>) -> Self {
        Self {
            git_binary: git_binary.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn git_binary(&self) -> &str {
        &self.git_binary
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn validate_repo(&self, repo_path: &Path) -> Result<()> {
        let out = self.exec(
            repo_path,
            &["rev-parse".to_string(), "--is-inside-work-tree".to_string()],
            true,
        )?;
        if out.trimmed() == "true" {
            return Ok(());
        }
        Err(GitMetaError::NotARepository {
            path: repo_path.to_path_buf(),
            exit_code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        })
    }

    pub fn discover_repo_root(&self, start_path: &Path) -> Result<PathBuf> {
        let out = self.exec(
            start_path,
            &["rev-parse".to_string(), "--show-toplevel".to_string()],
            false,
        )?;
        let root = out.trimmed();
        if root.is_empty() {
            return Err(GitMetaError::NotARepository {
                path: start_path.to_path_buf(),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(PathBuf::from(root))
    }

    /// Runs git once in `repo_path` and blocks until it exits or the
    /// configured timeout elapses.
    pub fn exec(
        &self,
        repo_path: &Path,
        args: &[String],
        allow_non_zero: bool,
    ) -> Result<GitOutput> {
        self.run(repo_path, args, allow_non_zero, None)
    }

    /// Like [`GitRunner::exec`], but kills the child as soon as `cancel` fires.
    pub fn exec_cancellable(
        &self,
        repo_path: &Path,
        args: &[String],
        allow_non_zero: bool,
        cancel: &CancelToken,
    ) -> Result<GitOutput> {
        self.run(repo_path, args, allow_non_zero, Some(cancel))
    }

    fn run(
        &self,
        repo_path: &Path,
        args: &[String],
        allow_non_zero: bool,
        cancel: Option<&CancelToken>,
    ) -> Result<GitOutput> {
        // A missing working directory makes spawn fail with NotFound, which
        // would otherwise be reported as a missing git binary.
        if !repo_path.is_dir() {
            return Err(GitMetaError::NotARepository {
                path: repo_path.to_path_buf(),
                exit_code: None,
                stderr: "directory does not exist".to_string(),
            });
        }

        let mut cmd = Command::new(&self.git_binary);
        cmd.current_dir(repo_path).args(args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let captured = capture(&mut cmd, self.timeout, cancel)
            .map_err(|err| self.capture_error(err, args))?;
        let result = GitOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_code: captured.status.code(),
        };
        if captured.status.success() || allow_non_zero {
            return Ok(result);
        }
        let stderr = result.stderr.trim().to_string();
        if stderr.contains("not a git repository") {
            return Err(GitMetaError::NotARepository {
                path: repo_path.to_path_buf(),
                exit_code: result.exit_code,
                stderr,
            });
        }
        Err(GitMetaError::CommandFailed {
            program: self.git_binary.clone(),
            args: args.to_vec(),
            exit_code: result.exit_code,
            stderr,
            stdout: result.stdout,
        })
    }

    fn capture_error(&self, err: CaptureError, args: &[String]) -> GitMetaError {
        match err {
            CaptureError::Spawn(source)
                if matches!(
                    source.kind(),
                    ErrorKind::NotFound | ErrorKind::PermissionDenied
                ) =>
            {
                GitMetaError::GitNotFound {
                    program: self.git_binary.clone(),
                    source,
                }
            }
            CaptureError::Spawn(source) => GitMetaError::io("spawning git", source),
            CaptureError::Io(operation, source) => GitMetaError::io(operation, source),
            CaptureError::TimedOut(timeout) => GitMetaError::TimedOut {
                program: self.git_binary.clone(),
                args: args.to_vec(),
                timeout,
            },
            CaptureError::Cancelled => GitMetaError::Cancelled {
                program: self.git_binary.clone(),
                args: args.to_vec(),
            },
        }
    }
}

/// A child process that ran to completion with both streams drained.
#[derive(Debug)]
pub(crate) struct Captured {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Process-level failure, before it is mapped to a git or generator error.
#[derive(Debug)]
pub(crate) enum CaptureError {
    Spawn(io::Error),
    Io(&'static str, io::Error),
    TimedOut(Duration),
    Cancelled,
}

/// Spawns `cmd` with piped output, drains stdout and stderr on reader
/// threads and waits for exit, honouring `timeout` and `cancel`.
pub(crate) fn capture(
    cmd: &mut Command,
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
) -> std::result::Result<Captured, CaptureError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = cmd.spawn().map_err(CaptureError::Spawn)?;
    let mut guard = ChildGuard::new(child);
    let stdout_reader = spawn_reader(guard.child.stdout.take());
    let stderr_reader = spawn_reader(guard.child.stderr.take());

    let status = wait_for_exit(&mut guard, timeout, cancel)?;
    Ok(Captured {
        status,
        stdout: join_reader(stdout_reader)?,
        stderr: join_reader(stderr_reader)?,
    })
}

fn wait_for_exit(
    guard: &mut ChildGuard,
    timeout: Option<Duration>,
    cancel: Option<&CancelToken>,
) -> std::result::Result<ExitStatus, CaptureError> {
    if timeout.is_none() && cancel.is_none() {
        return guard
            .wait()
            .map_err(|source| CaptureError::Io("waiting for child process", source));
    }

    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    loop {
        if let Some(status) = guard
            .try_wait()
            .map_err(|source| CaptureError::Io("waiting for child process", source))?
        {
            return Ok(status);
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            guard.terminate();
            return Err(CaptureError::Cancelled);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            guard.terminate();
            return Err(CaptureError::TimedOut(timeout.unwrap_or_default()));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Owns the child process; kills and reaps it unless it was already waited on.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn spawn_reader<R>(source: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_reader(
    handle: JoinHandle<io::Result<Vec<u8>>>,
) -> std::result::Result<String, CaptureError> {
    let bytes = handle
        .join()
        .map_err(|_| {
            CaptureError::Io(
                "reading child output",
                io::Error::other("output reader thread panicked"),
            )
        })?
        .map_err(|source| CaptureError::Io("reading child output", source))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
