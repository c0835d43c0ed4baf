use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::git::{CancelToken, GitRunner};
use crate::options::CommitLogOption;

/// Everything the four queries report for one repository, taken in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub repository: PathBuf,
    pub branch_name: String,
    pub commit_hash: String,
    pub short_commit_hash: String,
    pub commit_log: String,
}

#[derive(Debug, Clone)]
pub struct GitMeta {
    git: GitRunner,
    repo: PathBuf,
    cancel: Option<CancelToken>,
}

impl GitMeta {
    pub fn new(git: GitRunner, repo: impl Into<PathBuf>) -> Self {
        Self {
            git,
            repo: repo.into(),
            cancel: None,
        }
    }

    pub fn open(repo: impl Into<PathBuf>) -> Self {
        Self::new(GitRunner::default(), repo)
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn runner(&self) -> &GitRunner {
        &self.git
    }

    pub fn load_branch_name(&self) -> Result<String> {
        self.query(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn load_commit_hash(&self) -> Result<String> {
        self.query(&["rev-parse", "HEAD"])
    }

    pub fn load_short_commit_hash(&self) -> Result<String> {
        self.query(&["rev-parse", "--short", "HEAD"])
    }

    /// Formatted log text, one line per commit, newest first.
    pub fn load_commit_log(&self, option: &CommitLogOption) -> Result<String> {
        let args = option.to_args()?;
        self.query_owned(&args)
    }

    pub fn snapshot(&self, log_option: &CommitLogOption) -> Result<RepoSnapshot> {
        Ok(RepoSnapshot {
            repository: self.git.discover_repo_root(&self.repo)?,
            branch_name: self.load_branch_name()?,
            commit_hash: self.load_commit_hash()?,
            short_commit_hash: self.load_short_commit_hash()?,
            commit_log: self.load_commit_log(log_option)?,
        })
    }

    fn query(&self, args: &[&str]) -> Result<String> {
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.query_owned(&args)
    }

    fn query_owned(&self, args: &[String]) -> Result<String> {
        let out = match &self.cancel {
            Some(token) => self.git.exec_cancellable(&self.repo, args, false, token)?,
            None => self.git.exec(&self.repo, args, false)?,
        };
        Ok(out.trimmed().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use regex::Regex;
    use tempfile::TempDir;

    use super::GitMeta;
    use crate::error::GitMetaError;
    use crate::git::{CancelToken, GitRunner};
    use crate::options::CommitLogOption;

    fn has_git() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(repo: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .expect("git must run")
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(tmp: &Path) {
        git(tmp, &["init"]);
        git(tmp, &["config", "user.name", "Test"]);
        git(tmp, &["config", "user.email", "test@example.com"]);
        git(tmp, &["config", "commit.gpgsign", "false"]);
    }

    fn commit(tmp: &Path, file: &str, message: &str) {
        fs::write(tmp.join(file), message).expect("write file");
        git(tmp, &["add", file]);
        git(tmp, &["commit", "-m", message]);
    }

    fn isolated(tmp: &Path) -> GitMeta {
        let runner = GitRunner::default()
            .with_env("GIT_CEILING_DIRECTORIES", tmp.display().to_string());
        GitMeta::new(runner, tmp)
    }

    #[test]
    fn hashes_are_full_and_prefix_consistent() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        commit(tmp.path(), "README.md", "init");

        let meta = GitMeta::open(tmp.path());
        let full = meta.load_commit_hash().expect("full hash");
        let short = meta.load_short_commit_hash().expect("short hash");

        assert!(Regex::new("^[0-9a-f]{40}$").expect("regex").is_match(&full));
        assert!(!short.is_empty());
        assert!(full.starts_with(&short), "{short} is not a prefix of {full}");
        assert_eq!(meta.load_commit_hash().expect("second read"), full);
    }

    #[test]
    fn reports_checked_out_branch() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        commit(tmp.path(), "README.md", "init");
        git(tmp.path(), &["checkout", "-b", "feature/x"]);

        let meta = GitMeta::open(tmp.path());
        assert_eq!(meta.load_branch_name().expect("branch"), "feature/x");
    }

    #[test]
    fn single_commit_log_round_trip() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        commit(tmp.path(), "README.md", "init");

        let log = GitMeta::open(tmp.path())
            .load_commit_log(&CommitLogOption::new(1, false, "%s"))
            .expect("log");
        assert_eq!(log, "init");
    }

    #[test]
    fn count_caps_log_lines_newest_first() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        for i in 0..5 {
            commit(tmp.path(), "file.txt", &format!("change {i}"));
        }

        let meta = GitMeta::open(tmp.path());
        let log = meta
            .load_commit_log(&CommitLogOption::new(3, false, "%s"))
            .expect("log");
        assert_eq!(log.lines().collect::<Vec<_>>(), ["change 4", "change 3", "change 2"]);

        let unlimited = meta
            .load_commit_log(&CommitLogOption::new(0, false, "%s"))
            .expect("unlimited log");
        assert_eq!(unlimited.lines().count(), 5);
    }

    #[test]
    fn indented_format_keeps_indent_on_every_line() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        commit(tmp.path(), "file.txt", "one");
        commit(tmp.path(), "file.txt", "two");

        let log = GitMeta::open(tmp.path())
            .load_commit_log(&CommitLogOption::new(0, false, "  %s"))
            .expect("log");
        assert_eq!(log, "  two\n  one");
    }

    #[test]
    fn outside_work_tree_every_query_fails() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        let meta = isolated(tmp.path());

        let results = [
            meta.load_branch_name(),
            meta.load_commit_hash(),
            meta.load_short_commit_hash(),
            meta.load_commit_log(&CommitLogOption::default()),
        ];
        for result in results {
            let err = result.expect_err("must fail outside a repository");
            assert!(
                matches!(
                    err,
                    GitMetaError::NotARepository { .. } | GitMetaError::CommandFailed { .. }
                ),
                "unexpected error: {err:?}"
            );
        }
    }

    #[test]
    fn repository_without_commits_fails_with_git_diagnostics() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());

        let err = GitMeta::open(tmp.path())
            .load_commit_hash()
            .expect_err("no commits yet");
        assert!(err.exit_code().is_some_and(|code| code != 0));
        assert!(err.stderr().is_some_and(|stderr| !stderr.is_empty()));
    }

    #[test]
    fn snapshot_collects_all_values() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        commit(tmp.path(), "README.md", "init");

        let meta = GitMeta::open(tmp.path());
        let snapshot = meta
            .snapshot(&CommitLogOption::new(1, false, "%s"))
            .expect("snapshot");
        assert_eq!(snapshot.commit_hash, meta.load_commit_hash().expect("hash"));
        assert!(snapshot.commit_hash.starts_with(&snapshot.short_commit_hash));
        assert_eq!(snapshot.commit_log, "init");
        assert_eq!(
            snapshot.repository.canonicalize().expect("canonical root"),
            tmp.path().canonicalize().expect("canonical tmp")
        );
    }

    #[test]
    fn cancelled_token_aborts_query() {
        if !has_git() {
            return;
        }
        let tmp = TempDir::new().expect("tempdir");
        init_repo(tmp.path());
        commit(tmp.path(), "README.md", "init");

        let token = CancelToken::new();
        token.cancel();
        let meta = GitMeta::open(tmp.path()).with_cancel_token(token);
        // git may finish before the first poll; either outcome is a clean stop.
        match meta.load_commit_hash() {
            Ok(hash) => assert_eq!(hash.len(), 40),
            Err(err) => assert!(matches!(err, GitMetaError::Cancelled { .. }), "got {err:?}"),
        }
    }
}
