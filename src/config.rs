//! JSON configuration for a covtrack run.
//!
//! All sections have working defaults except `runner.program`, which names
//! the coverage-emitting test command and has no sensible default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CovtrackError, Result};
use crate::select::Granularity;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub git: GitConfig,
    pub layout: LayoutConfig,
    pub runner: RunnerConfig,
    pub selection: SelectionConfig,
    pub store: StoreConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Repository root the diff paths are relative to.
    pub root: PathBuf,
    /// The git executable to invoke.
    pub program: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            program: "git".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory (relative to the repo root) holding test sources. Changed
    /// files under it select their whole test class instead of being
    /// tracked line by line.
    pub test_root: String,
    /// Separator used when deriving a class name from a nested test file
    /// path, and when stripping the method segment of a test id.
    pub namespace_separator: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            test_root: "tests".to_string(),
            namespace_separator: "::".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Test command that emits a JSON coverage snapshot.
    pub program: String,
    /// Fixed arguments passed on every invocation.
    pub args: Vec<String>,
    /// Flag carrying the path the runner must write its snapshot to.
    pub coverage_flag: String,
    /// Flag carrying the `|`-joined filter tokens on partial runs.
    pub filter_flag: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            coverage_flag: "--coverage-out".to_string(),
            filter_flag: "--filter".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite snapshot store.
    pub db: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from(".covtrack.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Clover XML output path; `{branch}` is replaced by the branch name.
    pub clover: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            clover: "coverage-{branch}.xml".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read(path).map_err(|e| {
            CovtrackError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_slice(&content).map_err(|e| {
            CovtrackError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        if config.runner.program.is_empty() {
            return Err(CovtrackError::Config(
                "runner.program must be set".to_string(),
            ));
        }
        Ok(config)
    }

    /// Clover report path for a branch.
    pub fn clover_path(&self, branch: &str) -> PathBuf {
        PathBuf::from(self.report.clover.replace("{branch}", branch))
    }
}
