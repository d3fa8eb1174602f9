//! SQLite persistence for per-branch coverage snapshots and the
//! last-processed-revision state.
//!
//! `save_run` replaces a branch's snapshot and advances its revision in one
//! transaction: a run that fails anywhere earlier leaves both exactly as
//! they were, which is the system's whole recovery story.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CovtrackError, Result};
use crate::model::{LineRecord, Snapshot, TestMeta, TestStatus};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open (or create) the snapshot store at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized
/// store.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 =
        conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })?;
    if version != SCHEMA_VERSION {
        return Err(CovtrackError::Store(format!(
            "store schema version {} does not match this binary ({}). \
             Delete the store to rebuild it from a full run.",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// The last processed revision for a branch, if any run completed.
pub fn last_revision(conn: &Connection, branch: &str) -> Result<Option<String>> {
    let revision = conn
        .query_row(
            "SELECT last_revision FROM branch WHERE name = ?1",
            params![branch],
            |row| row.get(0),
        )
        .optional()?;
    Ok(revision)
}

/// Load the persisted snapshot for a branch. Returns `Ok(None)` when the
/// branch has never completed a run; a `Store` error means the on-disk data
/// is internally inconsistent and the caller should fall back to a full run.
pub fn load_snapshot(conn: &Connection, branch: &str) -> Result<Option<Snapshot>> {
    if last_revision(conn, branch)?.is_none() {
        return Ok(None);
    }

    let mut snapshot = Snapshot::new();
    let mut files_by_id: BTreeMap<i64, String> = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT id, path, line_count FROM snapshot_file WHERE branch = ?1 ORDER BY path",
    )?;
    let rows = stmt.query_map(params![branch], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (id, path, line_count) = row?;
        snapshot
            .files
            .insert(path.clone(), vec![LineRecord::NotExecutable; line_count as usize]);
        files_by_id.insert(id, path);
    }

    let mut stmt = conn.prepare(
        "SELECT lr.file_id, lr.line_number FROM line_record lr
         JOIN snapshot_file sf ON sf.id = lr.file_id
         WHERE sf.branch = ?1",
    )?;
    let rows = stmt.query_map(params![branch], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (file_id, line_number) = row?;
        *record_mut(&mut snapshot, &files_by_id, file_id, line_number)? = LineRecord::Uncovered;
    }

    let mut stmt = conn.prepare(
        "SELECT lt.file_id, lt.line_number, lt.test_id FROM line_test lt
         JOIN snapshot_file sf ON sf.id = lt.file_id
         WHERE sf.branch = ?1",
    )?;
    let rows = stmt.query_map(params![branch], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (file_id, line_number, test_id) = row?;
        let record = record_mut(&mut snapshot, &files_by_id, file_id, line_number)?;
        match record {
            LineRecord::CoveredBy(tests) => {
                tests.insert(test_id);
            }
            LineRecord::Uncovered => {
                *record = LineRecord::CoveredBy([test_id].into());
            }
            LineRecord::NotExecutable => {
                return Err(CovtrackError::Store(format!(
                    "covering test recorded for non-instrumentable line {}",
                    line_number
                )));
            }
        }
    }

    let mut stmt = conn.prepare(
        "SELECT test_id, status, duration_ms FROM test_registry WHERE branch = ?1",
    )?;
    let rows = stmt.query_map(params![branch], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (test_id, status, duration_ms) = row?;
        snapshot.tests.insert(
            test_id,
            TestMeta {
                status: status_from_str(&status)?,
                duration_ms: duration_ms as u64,
            },
        );
    }

    snapshot.check_integrity()?;
    Ok(Some(snapshot))
}

fn record_mut<'a>(
    snapshot: &'a mut Snapshot,
    files_by_id: &BTreeMap<i64, String>,
    file_id: i64,
    line_number: i64,
) -> Result<&'a mut LineRecord> {
    let path = files_by_id
        .get(&file_id)
        .ok_or_else(|| CovtrackError::Store(format!("unknown file id {}", file_id)))?;
    let records = snapshot
        .files
        .get_mut(path)
        .ok_or_else(|| CovtrackError::Store(format!("missing records for {}", path)))?;
    let idx = (line_number as usize)
        .checked_sub(1)
        .ok_or_else(|| CovtrackError::Store(format!("line number {} out of range", line_number)))?;
    records.get_mut(idx).ok_or_else(|| {
        CovtrackError::Store(format!(
            "line {}:{} outside recorded file bounds",
            path, line_number
        ))
    })
}

/// Persist a completed run: replace the branch's snapshot and advance its
/// last processed revision, atomically.
pub fn save_run(
    conn: &mut Connection,
    branch: &str,
    revision: &str,
    snapshot: &Snapshot,
) -> Result<()> {
    let tx = conn.transaction()?;
    save_run_tx(&tx, branch, revision, snapshot)?;
    tx.commit()?;
    Ok(())
}

fn save_run_tx(tx: &Transaction, branch: &str, revision: &str, snapshot: &Snapshot) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    // Cascades clear the previous snapshot and registry.
    tx.execute("DELETE FROM branch WHERE name = ?1", params![branch])?;
    tx.execute(
        "INSERT INTO branch (name, last_revision, updated_at) VALUES (?1, ?2, ?3)",
        params![branch, revision, now],
    )?;

    for (path, records) in &snapshot.files {
        tx.execute(
            "INSERT INTO snapshot_file (branch, path, line_count) VALUES (?1, ?2, ?3)",
            params![branch, path, records.len() as i64],
        )?;
        let file_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO line_record (file_id, line_number) VALUES (?1, ?2)",
            )?;
            for (idx, record) in records.iter().enumerate() {
                if record.is_executable() {
                    stmt.execute(params![file_id, (idx + 1) as i64])?;
                }
            }
        }

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO line_test (file_id, line_number, test_id) VALUES (?1, ?2, ?3)",
            )?;
            for (idx, record) in records.iter().enumerate() {
                if let Some(tests) = record.covering_tests() {
                    for test in tests {
                        stmt.execute(params![file_id, (idx + 1) as i64, test])?;
                    }
                }
            }
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO test_registry (branch, test_id, status, duration_ms) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (test_id, meta) in &snapshot.tests {
            stmt.execute(params![
                branch,
                test_id,
                status_to_str(meta.status),
                meta.duration_ms as i64,
            ])?;
        }
    }

    Ok(())
}

fn status_to_str(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "passed",
        TestStatus::Failed => "failed",
        TestStatus::Skipped => "skipped",
    }
}

fn status_from_str(status: &str) -> Result<TestStatus> {
    match status {
        "passed" => Ok(TestStatus::Passed),
        "failed" => Ok(TestStatus::Failed),
        "skipped" => Ok(TestStatus::Skipped),
        other => Err(CovtrackError::Store(format!(
            "unknown test status '{}'",
            other
        ))),
    }
}
