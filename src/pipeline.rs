//! Orchestrates one run: load baseline → diff → select → run tests →
//! realign → merge → persist → report.
//!
//! Nothing is written to the store until realign and merge have both
//! completed; a failure anywhere earlier leaves the prior snapshot and the
//! branch's last processed revision authoritative.

use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::Config;
use crate::diff::DiffParser;
use crate::error::Result;
use crate::git::Vcs;
use crate::model::Snapshot;
use crate::runner::TestRunner;
use crate::{merge, realign, report, select, store};

/// How a run advanced the branch's coverage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// No usable baseline: the full suite ran and its snapshot was adopted
    /// verbatim.
    Bootstrap,
    /// The branch was already at the current revision; nothing executed.
    NoChange,
    /// Incremental update with the given number of filter tokens (zero
    /// means realignment only, no tests re-run).
    Incremental { selected: usize },
}

/// Result of a completed run.
#[derive(Debug)]
pub struct Outcome {
    pub branch: String,
    pub revision: String,
    pub mode: RunMode,
    pub snapshot: Snapshot,
}

/// Execute one run against the given collaborators.
pub fn run(
    config: &Config,
    conn: &mut Connection,
    vcs: &dyn Vcs,
    runner: &dyn TestRunner,
) -> Result<Outcome> {
    let branch = vcs.current_branch()?;
    let head = vcs.head_revision()?;
    info!(
        branch = branch.as_str(),
        revision = head.as_str(),
        "starting coverage run"
    );

    let outcome = match load_baseline(conn, &branch) {
        None => {
            let snapshot = runner.run_all()?;
            store::save_run(conn, &branch, &head, &snapshot)?;
            Outcome {
                branch: branch.clone(),
                revision: head,
                mode: RunMode::Bootstrap,
                snapshot,
            }
        }
        Some((snapshot, last)) if last == head => {
            info!(branch = branch.as_str(), "revision already processed");
            Outcome {
                branch: branch.clone(),
                revision: head,
                mode: RunMode::NoChange,
                snapshot,
            }
        }
        Some((mut snapshot, last)) => {
            let diff_text = vcs.diff_headers(&last, &head)?;
            let changes = DiffParser::new(&config.layout).parse(&diff_text);
            let selection = select::select_tests(
                &snapshot,
                &changes,
                config.selection.granularity,
                &config.layout.namespace_separator,
            );

            // Realignment happens even when nothing is selected: pure
            // insertions still shift the line numbering.
            realign::realign(&mut snapshot, &changes);

            if !selection.is_empty() {
                let delta = runner.run_filtered(&selection)?;
                merge::merge(&mut snapshot, delta);
            }

            store::save_run(conn, &branch, &head, &snapshot)?;
            Outcome {
                branch: branch.clone(),
                revision: head,
                mode: RunMode::Incremental {
                    selected: selection.len(),
                },
                snapshot,
            }
        }
    };

    report::write_clover(&outcome.snapshot, &config.clover_path(&branch))?;
    Ok(outcome)
}

/// The prior snapshot and last processed revision, or `None` when the
/// branch must bootstrap. An unreadable or internally inconsistent store
/// downgrades to a full run instead of failing.
fn load_baseline(conn: &Connection, branch: &str) -> Option<(Snapshot, String)> {
    let revision = match store::last_revision(conn, branch) {
        Ok(revision) => revision,
        Err(err) => {
            warn!(%err, branch, "cannot read branch state; falling back to full run");
            return None;
        }
    };
    let snapshot = match store::load_snapshot(conn, branch) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%err, branch, "snapshot unreadable; falling back to full run");
            return None;
        }
    };
    match (snapshot, revision) {
        (Some(snapshot), Some(revision)) => Some((snapshot, revision)),
        _ => None,
    }
}
