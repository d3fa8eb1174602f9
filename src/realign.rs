//! Replay a diff's edits against a snapshot so every file's line records
//! are index-aligned with the new revision's source.
//!
//! Ordering contract: deletions run in descending start order (an earlier
//! removal must never shift the indices of one still pending), insertions in
//! ascending order (each hunk's new-file start already accounts for the
//! insertions of earlier hunks). Swapping either direction silently breaks
//! index validity.

use std::collections::BTreeMap;

use crate::diff::DiffChanges;
use crate::model::{LineRecord, Snapshot};

/// Realign `snapshot` in place. Files untouched by `changes` are left
/// exactly as they were; files named only by insertions (new files) get an
/// entry created on demand.
pub fn realign(snapshot: &mut Snapshot, changes: &DiffChanges) {
    for (file, deletions) in &changes.deletions {
        if deletions.is_empty() {
            continue;
        }
        let records = snapshot.files.entry(file.clone()).or_default();
        apply_deletions(records, deletions);
    }

    for (file, insertions) in &changes.insertions {
        if insertions.is_empty() {
            continue;
        }
        let records = snapshot.files.entry(file.clone()).or_default();
        apply_insertions(records, insertions);
    }
}

/// Remove `count` records at each start line, highest start first. The
/// sequence is padded with `NotExecutable` placeholders up to the maximum
/// referenced index beforehand, so a snapshot shorter than the diff expects
/// (stale data) still replays cleanly.
fn apply_deletions(records: &mut Vec<LineRecord>, deletions: &BTreeMap<u32, u32>) {
    let max_index = deletions
        .iter()
        .filter(|(&line, &count)| line > 0 && count > 0)
        .map(|(&line, &count)| (line + count - 1) as usize)
        .max();
    let Some(max_index) = max_index else {
        return;
    };
    if records.len() < max_index {
        records.resize(max_index, LineRecord::NotExecutable);
    }

    for (&line, &count) in deletions.iter().rev() {
        if line == 0 || count == 0 {
            continue;
        }
        let start = (line - 1) as usize;
        let end = (start + count as usize).min(records.len());
        records.drain(start..end);
    }
}

/// Insert `count` fresh `Uncovered` records at each start line, lowest
/// start first, shifting the tail right.
fn apply_insertions(records: &mut Vec<LineRecord>, insertions: &BTreeMap<u32, u32>) {
    for (&line, &count) in insertions {
        if line == 0 || count == 0 {
            continue;
        }
        let pos = (line - 1) as usize;
        if records.len() < pos {
            records.resize(pos, LineRecord::NotExecutable);
        }
        records.splice(
            pos..pos,
            std::iter::repeat(LineRecord::Uncovered).take(count as usize),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(test: &str) -> LineRecord {
        LineRecord::CoveredBy([test.to_string()].into())
    }

    /// Ten lines, each covered by a test named after its line number.
    fn numbered_records(count: u32) -> Vec<LineRecord> {
        (1..=count).map(|n| covered(&format!("T::l{n}"))).collect()
    }

    fn changes(
        deletions: &[(u32, u32)],
        insertions: &[(u32, u32)],
    ) -> DiffChanges {
        let mut c = DiffChanges::default();
        c.deletions
            .insert("f.php".to_string(), deletions.iter().copied().collect());
        c.insertions
            .insert("f.php".to_string(), insertions.iter().copied().collect());
        c
    }

    fn snapshot_of(records: Vec<LineRecord>) -> Snapshot {
        let mut s = Snapshot::new();
        s.files.insert("f.php".to_string(), records);
        s
    }

    #[test]
    fn test_delete_then_insert_shifts_indices() {
        // 10 lines; delete lines 4-6, insert 2 lines at new position 4.
        let mut snapshot = snapshot_of(numbered_records(10));
        realign(&mut snapshot, &changes(&[(4, 3)], &[(4, 2)]));

        let records = &snapshot.files["f.php"];
        assert_eq!(records.len(), 9);
        assert_eq!(records[2], covered("T::l3"));
        assert_eq!(records[3], LineRecord::Uncovered);
        assert_eq!(records[4], LineRecord::Uncovered);
        assert_eq!(records[5], covered("T::l7"));
        assert_eq!(records[8], covered("T::l10"));
    }

    #[test]
    fn test_descending_deletes_preserve_pending_indices() {
        // Two hunks; both refer to old-file numbering. Applying the lower
        // one first would shift the higher one onto the wrong lines.
        let mut snapshot = snapshot_of(numbered_records(8));
        realign(&mut snapshot, &changes(&[(2, 1), (6, 2)], &[]));

        let records = &snapshot.files["f.php"];
        assert_eq!(records.len(), 5);
        let survivors: Vec<_> = records.iter().cloned().collect();
        assert_eq!(
            survivors,
            vec![
                covered("T::l1"),
                covered("T::l3"),
                covered("T::l4"),
                covered("T::l5"),
                covered("T::l8"),
            ]
        );
    }

    #[test]
    fn test_ascending_inserts_use_new_file_numbering() {
        // Hunks emitted in file order: insert 1 line at new line 2, then 1
        // line at new line 5 (which already accounts for the first insert).
        let mut snapshot = snapshot_of(numbered_records(4));
        realign(&mut snapshot, &changes(&[], &[(2, 1), (5, 1)]));

        let records = &snapshot.files["f.php"];
        assert_eq!(records.len(), 6);
        assert_eq!(records[0], covered("T::l1"));
        assert_eq!(records[1], LineRecord::Uncovered);
        assert_eq!(records[2], covered("T::l2"));
        assert_eq!(records[3], covered("T::l3"));
        assert_eq!(records[4], LineRecord::Uncovered);
        assert_eq!(records[5], covered("T::l4"));
    }

    #[test]
    fn test_untouched_file_is_unchanged() {
        let mut snapshot = snapshot_of(numbered_records(5));
        snapshot
            .files
            .insert("other.php".to_string(), numbered_records(3));
        let before = snapshot.files["other.php"].clone();

        realign(&mut snapshot, &changes(&[(1, 2)], &[]));
        assert_eq!(snapshot.files["other.php"], before);
    }

    #[test]
    fn test_idempotent_on_empty_edits() {
        let mut snapshot = snapshot_of(numbered_records(10));
        realign(&mut snapshot, &changes(&[(4, 3)], &[(4, 2)]));
        let once = snapshot.clone();

        realign(&mut snapshot, &DiffChanges::default());
        assert_eq!(snapshot, once);
    }

    #[test]
    fn test_record_count_invariant() {
        let mut snapshot = snapshot_of(numbered_records(20));
        realign(&mut snapshot, &changes(&[(3, 2), (10, 4)], &[(3, 1), (8, 3)]));
        // 20 - (2 + 4) + (1 + 3)
        assert_eq!(snapshot.files["f.php"].len(), 18);
    }

    #[test]
    fn test_short_snapshot_is_padded_before_deleting() {
        // Snapshot only knows 3 lines but the diff deletes lines 5-6:
        // placeholders are padded in so the removal cannot panic.
        let mut snapshot = snapshot_of(numbered_records(3));
        realign(&mut snapshot, &changes(&[(5, 2)], &[]));

        let records = &snapshot.files["f.php"];
        assert_eq!(records.len(), 4);
        assert_eq!(records[3], LineRecord::NotExecutable);
    }

    #[test]
    fn test_new_file_creates_uncovered_entry() {
        let mut snapshot = Snapshot::new();
        let mut c = DiffChanges::default();
        c.deletions.insert("new.php".to_string(), BTreeMap::new());
        c.insertions
            .insert("new.php".to_string(), [(1, 3)].into_iter().collect());

        realign(&mut snapshot, &c);
        assert_eq!(
            snapshot.files["new.php"],
            vec![LineRecord::Uncovered; 3]
        );
    }
}
