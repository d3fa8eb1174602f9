//! Fold a delta snapshot (produced by re-running the selected tests) into
//! the realigned base snapshot.
//!
//! Re-execution is authoritative: every test the delta ran has its old
//! coverage facts purged from the base before the union, so a test whose
//! line set shrank does not keep phantom coverage.

use std::collections::BTreeSet;

use tracing::warn;

use crate::model::{LineRecord, Snapshot};

/// Merge `delta` into `base`, in order: stale-test purge, first-time-handled
/// guard, per-line union. Merging the same delta twice is a no-op.
pub fn merge(base: &mut Snapshot, delta: Snapshot) {
    let rerun: BTreeSet<String> = delta.tests.keys().cloned().collect();

    for records in base.files.values_mut() {
        for record in records.iter_mut() {
            record.purge(&rerun);
        }
    }
    base.tests.retain(|id, _| !rerun.contains(id));

    for (path, delta_records) in delta.files {
        let Some(base_records) = base.files.get_mut(&path) else {
            base.files.insert(path, delta_records);
            continue;
        };

        // The file wasn't touched during the partial run; the base's data
        // stays authoritative.
        if Snapshot::records_unhandled(&delta_records) {
            continue;
        }

        // First real execution data for a file the base only held
        // placeholders for: the placeholders must not mask it.
        if Snapshot::records_unhandled(base_records) {
            *base_records = delta_records;
            continue;
        }

        // The delta was produced at the new revision, so its line count
        // wins when the realigned base disagrees.
        if base_records.len() != delta_records.len() {
            warn!(
                file = path.as_str(),
                base = base_records.len(),
                delta = delta_records.len(),
                "realigned line count differs from delta; taking delta's"
            );
            base_records.resize(delta_records.len(), LineRecord::NotExecutable);
        }

        for (base_record, delta_record) in base_records.iter_mut().zip(delta_records.iter()) {
            *base_record = base_record.merged_with(delta_record);
        }
    }

    base.tests.extend(delta.tests);
}
