use std::path::PathBuf;

use rusqlite::Connection;
use tempfile::TempDir;

use covtrack::model::{LineRecord, Snapshot, TestMeta, TestStatus};

/// Create a fresh temporary store, returning the connection, dir handle, and
/// db path. The caller must hold onto `TempDir` to keep the directory alive.
pub fn setup_store() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = covtrack::store::open(&db_path).unwrap();
    covtrack::store::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

pub fn covered(tests: &[&str]) -> LineRecord {
    LineRecord::CoveredBy(tests.iter().map(|t| t.to_string()).collect())
}

pub fn passed() -> TestMeta {
    TestMeta {
        status: TestStatus::Passed,
        duration_ms: 12,
    }
}

/// Snapshot with one ten-line file where line 5 is covered by `TestA::m1`.
pub fn ten_line_baseline() -> Snapshot {
    let mut snapshot = Snapshot::new();
    let mut records = vec![LineRecord::Uncovered; 10];
    records[4] = covered(&["TestA::m1"]);
    snapshot.files.insert("src/f.php".to_string(), records);
    snapshot.tests.insert("TestA::m1".to_string(), passed());
    snapshot
}
