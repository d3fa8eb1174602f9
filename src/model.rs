//! In-memory representation of a coverage snapshot: which tests executed
//! which source lines, per file, as of a given revision. The test runner
//! exchanges this model as JSON; the store persists it per branch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CovtrackError, Result};

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// State of a single source line in a snapshot.
///
/// The distinction between `NotExecutable` and `Uncovered` matters: a file
/// whose records are all `NotExecutable`/`Uncovered` has never received real
/// execution data ("unhandled"), which is not the same as a file with
/// genuinely zero covering tests on an executed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineRecord {
    /// Line is not instrumentable (blank, comment, declaration).
    NotExecutable,
    /// Instrumentable, but no test executed it.
    Uncovered,
    /// Executed by a non-empty set of tests.
    CoveredBy(BTreeSet<String>),
}

impl LineRecord {
    /// The covering-test set, if this line was executed.
    pub fn covering_tests(&self) -> Option<&BTreeSet<String>> {
        match self {
            LineRecord::CoveredBy(tests) => Some(tests),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_covered(&self) -> bool {
        matches!(self, LineRecord::CoveredBy(_))
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        !matches!(self, LineRecord::NotExecutable)
    }

    /// Remove the given test ids from the covering set. A set that empties
    /// out degrades to `Uncovered`.
    pub fn purge(&mut self, stale: &BTreeSet<String>) {
        if let LineRecord::CoveredBy(tests) = self {
            tests.retain(|t| !stale.contains(t));
            if tests.is_empty() {
                *self = LineRecord::Uncovered;
            }
        }
    }

    /// Union of two records. A line is instrumentable if either side says
    /// so, and covered by the union of both covering sets.
    #[must_use]
    pub fn merged_with(&self, other: &LineRecord) -> LineRecord {
        match (self, other) {
            (LineRecord::CoveredBy(a), LineRecord::CoveredBy(b)) => {
                LineRecord::CoveredBy(a.union(b).cloned().collect())
            }
            (LineRecord::CoveredBy(a), _) | (_, LineRecord::CoveredBy(a)) => {
                LineRecord::CoveredBy(a.clone())
            }
            (LineRecord::Uncovered, _) | (_, LineRecord::Uncovered) => LineRecord::Uncovered,
            (LineRecord::NotExecutable, LineRecord::NotExecutable) => LineRecord::NotExecutable,
        }
    }
}

/// Outcome of one test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// Execution metadata recorded in the test registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMeta {
    pub status: TestStatus,
    #[serde(default)]
    pub duration_ms: u64,
}

/// A line-indexed coverage snapshot plus its test registry.
///
/// Line numbers are 1-indexed: the record for line `n` of a file lives at
/// index `n - 1`, and a file's record sequence is as long as the file at the
/// revision the snapshot represents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// File path -> one record per source line.
    pub files: BTreeMap<String, Vec<LineRecord>>,
    /// Test id -> execution metadata. Every test id referenced by a
    /// `CoveredBy` set must appear here.
    pub tests: BTreeMap<String, TestMeta>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of line records held for `path`, if present.
    pub fn line_count(&self, path: &str) -> Option<usize> {
        self.files.get(path).map(Vec::len)
    }

    /// The record for a 1-indexed line, if present.
    pub fn record(&self, path: &str, line: u32) -> Option<&LineRecord> {
        let idx = (line as usize).checked_sub(1)?;
        self.files.get(path)?.get(idx)
    }

    /// True when no record in `records` carries real execution data.
    #[must_use]
    pub fn records_unhandled(records: &[LineRecord]) -> bool {
        !records.iter().any(LineRecord::is_covered)
    }

    /// True when `path` has never received real execution data (absent
    /// entries count as unhandled).
    #[must_use]
    pub fn is_unhandled(&self, path: &str) -> bool {
        self.files
            .get(path)
            .map_or(true, |records| Self::records_unhandled(records))
    }

    /// Verify the registry invariant: every test id referenced by a
    /// covering set exists in the registry.
    pub fn check_integrity(&self) -> Result<()> {
        for (path, records) in &self.files {
            for (idx, record) in records.iter().enumerate() {
                if let Some(tests) = record.covering_tests() {
                    for test in tests {
                        if !self.tests.contains_key(test) {
                            return Err(CovtrackError::Store(format!(
                                "line {}:{} covered by unregistered test '{}'",
                                path,
                                idx + 1,
                                test
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
