use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{GitMetaError, Result};
use crate::git::GitRunner;
use crate::options::CommitLogOption;

const DEFAULT_SETTINGS_FILENAME: &str = "settings.json";
const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub schema_version: u32,
    pub git_binary: Option<String>,
    pub timeout_ms: Option<u64>,
    pub commit_log: CommitLogOption,
    pub generate_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            git_binary: None,
            timeout_ms: None,
            commit_log: CommitLogOption::default(),
            generate_command: None,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn runner(&self) -> GitRunner {
        let runner = GitRunner::new(self.git_binary.as_deref().unwrap_or("git"));
        match self.timeout() {
            Some(timeout) => runner.with_timeout(timeout),
            None => runner,
        }
    }

    /// Canonical form written to and read from disk: legacy schema versions
    /// are upgraded, a zero timeout means "no deadline", blank strings are
    /// unset and an empty log format falls back to the default one.
    pub fn normalized(mut self) -> Self {
        if self.schema_version == 0 {
            self.schema_version = CURRENT_SCHEMA_VERSION;
        }
        self.timeout_ms = self.timeout_ms.filter(|ms| *ms > 0);
        self.git_binary = self.git_binary.filter(|bin| !bin.trim().is_empty());
        self.generate_command = self
            .generate_command
            .filter(|cmd| !cmd.trim().is_empty());
        if self.commit_log.format.is_empty() {
            self.commit_log.format = CommitLogOption::default().format;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_location() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("dev", "GitMeta", "gitmeta")
            .ok_or_else(|| GitMetaError::State("cannot resolve project directories".to_string()))?;
        Ok(project_dirs.config_dir().join(DEFAULT_SETTINGS_FILENAME))
    }

    pub fn default_store() -> Result<Self> {
        Ok(Self {
            path: Self::default_location()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(&self.path)
            .map_err(|source| GitMetaError::io("reading settings file", source))?;
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| GitMetaError::State(format!("invalid settings json: {}", e)))?;
        Ok(settings.normalized())
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| GitMetaError::io("creating settings directory", source))?;
        }
        let text = serde_json::to_string_pretty(&settings.clone().normalized())
            .map_err(|e| GitMetaError::State(format!("serialize settings failed: {}", e)))?;
        fs::write(&self.path, text)
            .map_err(|source| GitMetaError::io("writing settings file", source))
    }

    /// Loads, applies `change`, and saves; returns what was written.
    pub fn update<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.load()?;
        change(&mut settings);
        let settings = settings.normalized();
        self.save(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::{Settings, SettingsStore};
    use crate::error::GitMetaError;
    use crate::options::CommitLogOption;

    #[test]
    fn roundtrip_settings_file() {
        let tmp = TempDir::new().expect("tempdir");
        let store = SettingsStore::at(tmp.path().join("nested").join("settings.json"));

        let settings = Settings {
            git_binary: Some("/usr/local/bin/git".to_string()),
            timeout_ms: Some(2_500),
            commit_log: CommitLogOption::new(20, true, "%h %s"),
            generate_command: Some("python gen.py".to_string()),
            ..Settings::default()
        };

        store.save(&settings).expect("save settings");
        let loaded = store.load().expect("load settings");
        assert_eq!(loaded, settings);
        assert_eq!(loaded.runner().git_binary(), "/usr/local/bin/git");
        assert_eq!(loaded.runner().timeout(), Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let store = SettingsStore::at(tmp.path().join("settings.json"));
        let loaded = store.load().expect("load");
        assert_eq!(loaded, Settings::default());
        assert_eq!(loaded.runner().git_binary(), "git");
        assert_eq!(loaded.runner().timeout(), None);
    }

    #[test]
    fn legacy_file_gets_current_schema_and_zero_timeout_disables_deadline() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{"schema_version": 0, "timeout_ms": 0}"#).expect("write");
        let loaded = SettingsStore::at(path).load().expect("load");
        assert_eq!(loaded.schema_version, 1);
        assert_eq!(loaded.timeout(), None);
    }

    #[test]
    fn update_normalizes_before_writing() {
        let tmp = TempDir::new().expect("tempdir");
        let store = SettingsStore::at(tmp.path().join("settings.json"));

        let written = store
            .update(|settings| {
                settings.timeout_ms = Some(0);
                settings.git_binary = Some("  ".to_string());
                settings.generate_command = Some("python gen.py".to_string());
                settings.commit_log.format = String::new();
            })
            .expect("update");
        assert_eq!(written.timeout_ms, None);
        assert_eq!(written.git_binary, None);
        assert_eq!(written.generate_command.as_deref(), Some("python gen.py"));
        assert_eq!(written.commit_log.format, "%h %cd %cn %s");
        assert_eq!(store.load().expect("reload"), written);

        let cleared = store
            .update(|settings| settings.generate_command = None)
            .expect("second update");
        assert_eq!(cleared.generate_command, None);
        assert_eq!(cleared.commit_log, written.commit_log);
    }

    #[test]
    fn corrupt_file_is_a_state_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = SettingsStore::at(path).load().expect_err("corrupt");
        assert!(matches!(err, GitMetaError::State(_)));
    }
}
