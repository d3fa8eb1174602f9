//! Parse the header lines of a unified diff (`+++` file headers and `@@`
//! hunk headers) into per-file line edits.
//!
//! The diff source emits headers in file order, hunks in ascending line
//! order within each file. Changed files under the configured test root are
//! not tracked line by line; they contribute a whole-class filter token
//! instead.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::config::LayoutConfig;
use crate::error::{CovtrackError, Result};

/// Hunk header: `@@ -old_start[,old_count] +new_start[,new_count] @@`.
/// An omitted count means exactly 1; an explicit `,0` stays 0.
static HUNK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))?").unwrap());

/// Per-file line number -> count maps, keyed by file path.
pub type LineEdits = BTreeMap<String, BTreeMap<u32, u32>>;

/// Structured output of one diff parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffChanges {
    /// Old-file line -> number of lines removed there, per production file.
    pub deletions: LineEdits,
    /// New-file line -> number of lines inserted there, per production file.
    pub insertions: LineEdits,
    /// Full-class filter tokens for changed test files.
    pub test_classes: BTreeSet<String>,
}

impl DiffChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.values().all(BTreeMap::is_empty)
            && self.insertions.values().all(BTreeMap::is_empty)
            && self.test_classes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hunk {
    old_start: u32,
    old_count: u32,
    new_start: u32,
    new_count: u32,
}

/// Parses diff header text according to a repository layout.
pub struct DiffParser<'a> {
    layout: &'a LayoutConfig,
}

impl<'a> DiffParser<'a> {
    pub fn new(layout: &'a LayoutConfig) -> Self {
        Self { layout }
    }

    /// Walk the header lines, keeping a current-file cursor. Hunks arriving
    /// without a production-file cursor (test files, parse anomalies) are
    /// ignored; hunk headers that fail to parse are skipped with a warning.
    pub fn parse(&self, diff_text: &str) -> DiffChanges {
        let mut changes = DiffChanges::default();
        let mut current_file: Option<String> = None;

        for line in diff_text.lines() {
            if let Some(rest) = line.strip_prefix("+++ ") {
                current_file = None;
                if rest == "/dev/null" {
                    continue;
                }
                // Strip the VCS prefix ("b/" for the new side, "a/" from
                // some tools); --no-prefix diffs carry none.
                let path = rest
                    .strip_prefix("b/")
                    .or_else(|| rest.strip_prefix("a/"))
                    .unwrap_or(rest);
                if self.is_test_path(path) {
                    changes.test_classes.insert(self.class_token(path));
                } else {
                    changes.deletions.entry(path.to_string()).or_default();
                    changes.insertions.entry(path.to_string()).or_default();
                    current_file = Some(path.to_string());
                }
            } else if line.starts_with("@@") {
                let Some(file) = current_file.as_deref() else {
                    continue;
                };
                match parse_hunk_header(line) {
                    Ok(hunk) => {
                        if hunk.old_count > 0 {
                            if let Some(dels) = changes.deletions.get_mut(file) {
                                dels.insert(hunk.old_start, hunk.old_count);
                            }
                        }
                        if hunk.new_count > 0 {
                            if let Some(ins) = changes.insertions.get_mut(file) {
                                ins.insert(hunk.new_start, hunk.new_count);
                            }
                        }
                    }
                    Err(err) => warn!(%err, "skipping unparseable hunk header"),
                }
            }
        }

        changes
    }

    fn is_test_path(&self, path: &str) -> bool {
        let root = self.layout.test_root.trim_end_matches('/');
        path.strip_prefix(root)
            .map_or(false, |rest| rest.starts_with('/'))
    }

    /// Derive the class name from a test file path: relative to the test
    /// root, extension stripped, path separators replaced by the namespace
    /// separator (`tests/Sub/FooTest.php` -> `Sub::FooTest`).
    fn class_token(&self, path: &str) -> String {
        let root = self.layout.test_root.trim_end_matches('/');
        let rest = path
            .strip_prefix(root)
            .map_or(path, |r| r.trim_start_matches('/'));
        let rest = match rest.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => rest,
        };
        rest.replace('/', &self.layout.namespace_separator)
    }
}

fn parse_hunk_header(line: &str) -> Result<Hunk> {
    let caps = HUNK_RE
        .captures(line)
        .ok_or_else(|| CovtrackError::MalformedHunk(line.to_string()))?;

    let number = |idx: usize, default: u32| -> Result<u32> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| CovtrackError::MalformedHunk(line.to_string())),
            None => Ok(default),
        }
    };

    Ok(Hunk {
        old_start: number(1, 0)?,
        old_count: number(2, 1)?,
        new_start: number(3, 0)?,
        new_count: number(4, 1)?,
    })
}
