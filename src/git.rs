//! Version-control adapter: branch and revision discovery plus the diff
//! header stream between two revisions.
//!
//! Failures here are fatal to the run — they abort before any snapshot
//! rewrite, carrying git's stderr verbatim.

use std::path::PathBuf;
use std::process::Command;

use crate::config::GitConfig;
use crate::error::{CovtrackError, Result};

/// Source of revision identity and diffs.
pub trait Vcs {
    fn current_branch(&self) -> Result<String>;

    fn head_revision(&self) -> Result<String>;

    /// The `+++`/`@@` header lines of a zero-context diff between two
    /// revisions, in the order git emits them.
    fn diff_headers(&self, old: &str, new: &str) -> Result<String>;
}

/// A git checkout driven through the `git` binary.
pub struct GitRepo {
    program: String,
    root: PathBuf,
}

impl GitRepo {
    pub fn new(config: &GitConfig) -> Self {
        Self {
            program: config.program.clone(),
            root: config.root.clone(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CovtrackError::ExternalTool {
                tool: format!("{} {}", self.program, args.join(" ")),
                detail: stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|_| CovtrackError::ExternalTool {
            tool: self.program.clone(),
            detail: "output is not valid UTF-8".to_string(),
        })
    }
}

impl Vcs for GitRepo {
    fn current_branch(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    fn head_revision(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn diff_headers(&self, old: &str, new: &str) -> Result<String> {
        let raw = self.git(&["diff", "-U0", old, new])?;
        Ok(filter_headers(&raw))
    }
}

/// Keep only the file-header and hunk-header lines of a unified diff.
fn filter_headers(raw: &str) -> String {
    let mut headers = String::new();
    for line in raw.lines() {
        if line.starts_with("+++") || line.starts_with("@@") {
            headers.push_str(line);
            headers.push('\n');
        }
    }
    headers
}
