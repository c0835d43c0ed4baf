use serde::{Deserialize, Serialize};

use crate::error::{GitMetaError, Result};

pub const DEFAULT_LOG_COUNT: usize = 10;
pub const DEFAULT_LOG_FORMAT: &str = "%h %cd %cn %s";

/// Parameters of a `git log` query.
///
/// `count == 0` means no limit, the same as omitting `--max-count`.
/// `format` is a git pretty-format template such as `"%h %s"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitLogOption {
    pub count: usize,
    pub no_merges: bool,
    pub format: String,
}

impl Default for CommitLogOption {
    fn default() -> Self {
        Self {
            count: DEFAULT_LOG_COUNT,
            no_merges: false,
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl CommitLogOption {
    pub fn new(count: usize, no_merges: bool, format: impl Into<String>) -> Self {
        Self {
            count,
            no_merges,
            format: format.into(),
        }
    }

    pub fn to_args(&self) -> Result<Vec<String>> {
        if self.format.is_empty() {
            return Err(GitMetaError::InvalidOption(
                "pretty-format string must not be empty".to_string(),
            ));
        }
        let mut args = vec!["log".to_string()];
        if self.count > 0 {
            args.push(format!("--max-count={}", self.count));
        }
        if self.no_merges {
            args.push("--no-merges".to_string());
        }
        args.push(format!("--pretty=format:{}", self.format));
        Ok(args)
    }
}
