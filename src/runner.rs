//! Test-execution adapter. The configured command runs the tests, writes a
//! JSON coverage snapshot to a handoff file we name, and exits; its own
//! stdout/stderr stream straight through to the terminal.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::config::RunnerConfig;
use crate::error::{CovtrackError, Result};
use crate::model::Snapshot;

/// Executes tests and produces a coverage snapshot.
pub trait TestRunner {
    /// Run the full suite.
    fn run_all(&self) -> Result<Snapshot>;

    /// Run only the tests matching the filter tokens. An empty selection
    /// means the full suite.
    fn run_filtered(&self, selection: &BTreeSet<String>) -> Result<Snapshot>;
}

/// Invokes the configured test command as a child process.
pub struct CommandRunner {
    config: RunnerConfig,
    workdir: PathBuf,
}

impl CommandRunner {
    pub fn new(config: RunnerConfig, workdir: PathBuf) -> Self {
        Self { config, workdir }
    }

    fn run(&self, filter: Option<&str>) -> Result<Snapshot> {
        let handoff = tempfile::Builder::new()
            .prefix("covtrack-")
            .suffix(".json")
            .tempfile()?;

        let mut cmd = Command::new(&self.config.program);
        cmd.current_dir(&self.workdir)
            .args(&self.config.args)
            .arg(&self.config.coverage_flag)
            .arg(handoff.path());
        if let Some(filter) = filter {
            cmd.arg(&self.config.filter_flag).arg(filter);
        }

        let status = cmd.status()?;
        if !status.success() {
            return Err(CovtrackError::ExternalTool {
                tool: self.config.program.clone(),
                detail: format!("exited with {status}"),
            });
        }

        let content = std::fs::read(handoff.path())?;
        let snapshot: Snapshot = serde_json::from_slice(&content)?;
        snapshot.check_integrity()?;
        Ok(snapshot)
    }
}

impl TestRunner for CommandRunner {
    fn run_all(&self) -> Result<Snapshot> {
        info!("running full test suite");
        self.run(None)
    }

    fn run_filtered(&self, selection: &BTreeSet<String>) -> Result<Snapshot> {
        if selection.is_empty() {
            return self.run_all();
        }
        let filter = selection
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("|");
        info!(%filter, "running filtered test suite");
        self.run(Some(&filter))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_all_reads_handoff_snapshot() {
        // `sh -c script --coverage-out <path>` binds the flag to $0 and the
        // handoff path to $1.
        let config = RunnerConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"printf '%s' '{"files":{"src/a.php":["Uncovered",{"CoveredBy":["T::a"]}]},"tests":{"T::a":{"status":"passed","duration_ms":4}}}' > "$1""#.to_string(),
            ],
            ..RunnerConfig::default()
        };
        let runner = CommandRunner::new(config, PathBuf::from("."));

        let snapshot = runner.run_all().unwrap();
        assert_eq!(snapshot.files["src/a.php"].len(), 2);
        assert!(snapshot.tests.contains_key("T::a"));
    }

    #[test]
    fn test_failing_runner_is_external_tool_error() {
        let config = RunnerConfig {
            program: "false".to_string(),
            ..RunnerConfig::default()
        };
        let runner = CommandRunner::new(config, PathBuf::from("."));
        let err = runner.run_all().unwrap_err();
        assert!(matches!(err, CovtrackError::ExternalTool { .. }));
    }

    #[test]
    fn test_filter_tokens_are_pipe_joined() {
        // The script echoes its filter argument ($3) into the snapshot's
        // test registry key so we can observe what was passed.
        let config = RunnerConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"printf '{"files":{},"tests":{"%s":{"status":"passed","duration_ms":0}}}' "$3" > "$1""#.to_string(),
            ],
            ..RunnerConfig::default()
        };
        let runner = CommandRunner::new(config, PathBuf::from("."));

        let selection: BTreeSet<String> =
            ["A::a".to_string(), "B::b".to_string()].into();
        let snapshot = runner.run_filtered(&selection).unwrap();
        assert!(snapshot.tests.contains_key("A::a|B::b"));
    }
}
