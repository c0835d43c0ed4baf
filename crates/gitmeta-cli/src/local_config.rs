use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use gitmeta_core::CommitLogOption;
use serde::Deserialize;

pub const LOCAL_CONFIG_FILE: &str = ".gitmeta.toml";

#[derive(Debug, Default, Deserialize)]
struct LocalConfigToml {
    #[serde(default)]
    gitmeta: GitMetaSection,
}

#[derive(Debug, Default, Deserialize)]
struct GitMetaSection {
    generate_command: Option<String>,
    #[serde(default)]
    log: LocalLogConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalLogConfig {
    pub count: Option<usize>,
    pub no_merges: Option<bool>,
    pub format: Option<String>,
}

/// Per-repository overrides read from `.gitmeta.toml`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub generate_command: Option<String>,
    pub log: LocalLogConfig,
}

impl LocalConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed: LocalConfigToml = toml::from_str(raw)?;
        Ok(Self {
            generate_command: parsed
                .gitmeta
                .generate_command
                .filter(|cmd| !cmd.trim().is_empty()),
            log: parsed.gitmeta.log,
        })
    }

    /// Reads the repository's config file. A missing file yields defaults; a
    /// malformed one is reported on stderr and ignored.
    pub fn load(repo: &Path) -> Result<Self> {
        let path = repo.join(LOCAL_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match Self::parse(&raw) {
            Ok(cfg) => {
                log::debug!("loaded {}", path.display());
                Ok(cfg)
            }
            Err(err) => {
                eprintln!(
                    "warning: failed to parse {}, using defaults: {}",
                    path.display(),
                    err
                );
                Ok(Self::default())
            }
        }
    }

    pub fn apply_log(&self, mut base: CommitLogOption) -> CommitLogOption {
        if let Some(count) = self.log.count {
            base.count = count;
        }
        if let Some(no_merges) = self.log.no_merges {
            base.no_merges = no_merges;
        }
        if let Some(format) = self.log.format.clone() {
            base.format = format;
        }
        base
    }
}
