//! Decide which tests must be re-run for a revision transition: every test
//! whose recorded coverage touched a deleted line, plus the whole class of
//! every changed test file.
//!
//! Over-selection is fine; under-selection could mask a coverage regression.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use crate::diff::DiffChanges;
use crate::model::Snapshot;

/// Granularity of the filter tokens handed to the test runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `Class::method` tokens (data-set suffixes stripped).
    #[default]
    Method,
    /// Whole-class tokens.
    Class,
}

/// Compute the filter-token selection from the prior snapshot and the
/// parsed diff.
///
/// A changed file with no entry in the snapshot contributes no candidates;
/// there is nothing to look up, so nothing can be selected for it.
pub fn select_tests(
    snapshot: &Snapshot,
    changes: &DiffChanges,
    granularity: Granularity,
    separator: &str,
) -> BTreeSet<String> {
    let mut candidates: BTreeSet<String> = BTreeSet::new();

    for (file, deletions) in &changes.deletions {
        let Some(records) = snapshot.files.get(file) else {
            debug!(file = file.as_str(), "changed file has no baseline coverage");
            continue;
        };
        for (&start, &count) in deletions {
            for line in start..start + count {
                let Some(idx) = (line as usize).checked_sub(1) else {
                    continue;
                };
                if let Some(tests) = records.get(idx).and_then(|r| r.covering_tests()) {
                    candidates.extend(tests.iter().cloned());
                }
            }
        }
    }

    let mut selection = changes.test_classes.clone();
    for candidate in candidates {
        // A selected whole-class run already covers its methods.
        let subsumed = changes
            .test_classes
            .iter()
            .any(|class| candidate.contains(class.as_str()));
        if subsumed {
            continue;
        }
        selection.insert(filter_token(&candidate, granularity, separator));
    }

    debug!(tokens = selection.len(), "test selection computed");
    selection
}

/// Truncate a qualified test id into a filter token.
///
/// Coverage test ids look like `Class::method` or `Class::method with data
/// set #0`. Method granularity keeps `Class::method`; class granularity
/// drops the final method segment.
fn filter_token(test_id: &str, granularity: Granularity, separator: &str) -> String {
    let id = test_id.split_whitespace().next().unwrap_or(test_id);
    match granularity {
        Granularity::Method => id.to_string(),
        Granularity::Class => match id.rsplit_once(separator) {
            Some((class, _method)) => class.to_string(),
            None => id.to_string(),
        },
    }
}
