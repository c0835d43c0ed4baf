pub mod error;
pub mod git;
pub mod hooks;
pub mod options;
pub mod service;
pub mod settings;

pub use error::{GitMetaError, Result};
pub use git::{CancelToken, GitOutput, GitRunner};
pub use hooks::{CommandHook, GenerateHook, GenerateOutcome, HookOutput, HookRegistry, HookRun};
pub use options::CommitLogOption;
pub use service::{GitMeta, RepoSnapshot};
pub use settings::{Settings, SettingsStore};
