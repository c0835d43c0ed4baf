//! Registry of "generate git constants" handlers.
//!
//! Callers register handlers explicitly and get a typed outcome back, so an
//! empty registry is reported as [`GenerateOutcome::NoHandlerRegistered`]
//! rather than silently doing nothing.

use std::fmt;
use std::io::ErrorKind;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GitMetaError, Result};
use crate::git::{CaptureError, capture};
use crate::service::RepoSnapshot;

pub trait GenerateHook: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, snapshot: &RepoSnapshot) -> Result<HookOutput>;
}

/// What a generator printed while it ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRun {
    pub name: String,
    pub output: HookOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum GenerateOutcome {
    NoHandlerRegistered,
    Ran { hooks: Vec<HookRun> },
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn GenerateHook>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn GenerateHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in registration order; the first failure stops the run.
    pub fn trigger(&self, snapshot: &RepoSnapshot) -> Result<GenerateOutcome> {
        if self.hooks.is_empty() {
            return Ok(GenerateOutcome::NoHandlerRegistered);
        }
        let mut ran = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            let output = hook.generate(snapshot).map_err(|err| match err {
                GitMetaError::Hook { .. } => err,
                other => GitMetaError::Hook {
                    name: hook.name().to_string(),
                    message: other.to_string(),
                },
            })?;
            ran.push(HookRun {
                name: hook.name().to_string(),
                output,
            });
        }
        Ok(GenerateOutcome::Ran { hooks: ran })
    }
}

/// Runs an external generator with the snapshot exported as `GITMETA_*`
/// environment variables, in the repository root.
#[derive(Debug, Clone)]
pub struct CommandHook {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandHook {
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut words = shlex::split(command_line)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| GitMetaError::Hook {
                name: command_line.to_string(),
                message: "cannot parse generate command".to_string(),
            })?;
        let program = words.remove(0);
        Ok(Self {
            name: command_line.trim().to_string(),
            program,
            args: words,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self, snapshot: &RepoSnapshot) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&snapshot.repository)
            .args(&self.args)
            .env(
                "GITMETA_REPOSITORY",
                snapshot.repository.display().to_string(),
            )
            .env("GITMETA_BRANCH", &snapshot.branch_name)
            .env("GITMETA_COMMIT_HASH", &snapshot.commit_hash)
            .env("GITMETA_SHORT_COMMIT_HASH", &snapshot.short_commit_hash)
            .env("GITMETA_COMMIT_LOG", &snapshot.commit_log);
        cmd
    }

    fn failure(&self, message: String) -> GitMetaError {
        GitMetaError::Hook {
            name: self.name.clone(),
            message,
        }
    }

    fn describe(&self, err: CaptureError) -> String {
        let program = &self.program;
        match err {
            CaptureError::Spawn(source)
                if matches!(
                    source.kind(),
                    ErrorKind::NotFound | ErrorKind::PermissionDenied
                ) =>
            {
                format!("generator `{program}` not found or not runnable: {source}")
            }
            CaptureError::Spawn(source) => format!("cannot start `{program}`: {source}"),
            CaptureError::Io(operation, source) => {
                format!("I/O failure while {operation} of `{program}`: {source}")
            }
            CaptureError::TimedOut(timeout) => {
                format!("`{program}` timed out after {timeout:?}")
            }
            CaptureError::Cancelled => format!("`{program}` was cancelled"),
        }
    }
}

impl GenerateHook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, snapshot: &RepoSnapshot) -> Result<HookOutput> {
        if !snapshot.repository.is_dir() {
            return Err(self.failure(format!(
                "repository directory {} does not exist",
                snapshot.repository.display()
            )));
        }
        let captured = capture(&mut self.command(snapshot), self.timeout, None)
            .map_err(|err| self.failure(self.describe(err)))?;
        if !captured.status.success() {
            return Err(self.failure(format!(
                "`{}` exited with code {:?}: {}",
                self.program,
                captured.status.code(),
                captured.stderr.trim()
            )));
        }
        Ok(HookOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
        })
    }
}
