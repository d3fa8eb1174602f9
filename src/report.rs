//! Render a snapshot for humans and tools: a plain-text summary table and a
//! Clover-style XML file downstream consumers can ingest.

use std::fmt::Write as _;
use std::path::Path;

use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::Result;
use crate::model::{rate, LineRecord, Snapshot};

/// Per-file summary row.
#[derive(Debug)]
pub struct FileSummary {
    pub path: String,
    /// Instrumentable lines.
    pub total_lines: u64,
    /// Instrumentable lines with at least one covering test.
    pub covered_lines: u64,
}

impl FileSummary {
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.covered_lines, self.total_lines)
    }
}

/// Aggregated snapshot stats, ready to be formatted.
pub struct SnapshotReport {
    pub files: Vec<FileSummary>,
    pub total_lines: u64,
    pub covered_lines: u64,
    pub total_tests: u64,
}

impl SnapshotReport {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut files = Vec::new();
        let mut total_lines = 0;
        let mut covered_lines = 0;

        for (path, records) in &snapshot.files {
            let total = records.iter().filter(|r| r.is_executable()).count() as u64;
            let covered = records.iter().filter(|r| r.is_covered()).count() as u64;
            total_lines += total;
            covered_lines += covered;
            files.push(FileSummary {
                path: path.clone(),
                total_lines: total,
                covered_lines: covered,
            });
        }

        Self {
            files,
            total_lines,
            covered_lines,
            total_tests: snapshot.tests.len() as u64,
        }
    }

    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.covered_lines, self.total_lines)
    }

    /// Format using a specific formatter.
    #[must_use]
    pub fn format(&self, formatter: &dyn ReportFormatter) -> String {
        formatter.format(self)
    }
}

/// Trait for formatting snapshot reports.
pub trait ReportFormatter {
    fn format(&self, report: &SnapshotReport) -> String;
}

/// Plain text formatter.
pub struct TextFormatter;

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &SnapshotReport) -> String {
        let mut out = String::new();

        writeln!(out, "{:<60} {:>8} {:>8} {:>8}", "FILE", "LINES", "COVERED", "RATE").unwrap();
        writeln!(out, "{}", "-".repeat(88)).unwrap();
        for f in &report.files {
            writeln!(
                out,
                "{:<60} {:>8} {:>8} {:>7.1}%",
                f.path,
                f.total_lines,
                f.covered_lines,
                f.line_rate() * 100.0
            )
            .unwrap();
        }

        writeln!(out, "{}", "-".repeat(88)).unwrap();
        writeln!(
            out,
            "Lines:      {}/{} ({:.1}%)",
            report.covered_lines,
            report.total_lines,
            report.line_rate() * 100.0
        )
        .unwrap();
        writeln!(out, "Tests:      {}", report.total_tests).unwrap();

        out
    }
}

/// Serialize the snapshot as Clover XML.
///
/// Structure matches what Clover consumers expect:
///   <coverage generated="..." clover="...">
///     <project timestamp="...">
///       <file name="Foo.php" path="src/Foo.php">
///         <line num="1" type="stmt" count="2"/>
///         <metrics loc="..." statements="..." coveredstatements="..."/>
///       </file>
///       <metrics files="..." loc="..." statements="..." coveredstatements="..."/>
///     </project>
///   </coverage>
///
/// `count` for a line is the number of distinct covering tests; lines that
/// are not instrumentable are omitted.
pub fn clover_xml(snapshot: &Snapshot, generated: i64) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let generated = generated.to_string();

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut coverage = BytesStart::new("coverage");
    coverage.push_attribute(("generated", generated.as_str()));
    coverage.push_attribute(("clover", env!("CARGO_PKG_VERSION")));
    writer.write_event(Event::Start(coverage))?;

    let mut project = BytesStart::new("project");
    project.push_attribute(("timestamp", generated.as_str()));
    writer.write_event(Event::Start(project))?;

    let mut project_loc = 0u64;
    let mut project_statements = 0u64;
    let mut project_covered = 0u64;

    for (path, records) in &snapshot.files {
        let mut file_el = BytesStart::new("file");
        let name = path.rsplit('/').next().unwrap_or(path);
        file_el.push_attribute(("name", name));
        file_el.push_attribute(("path", path.as_str()));
        writer.write_event(Event::Start(file_el))?;

        let mut statements = 0u64;
        let mut covered = 0u64;
        for (idx, record) in records.iter().enumerate() {
            let count = match record {
                LineRecord::NotExecutable => continue,
                LineRecord::Uncovered => 0,
                LineRecord::CoveredBy(tests) => tests.len(),
            };
            statements += 1;
            if count > 0 {
                covered += 1;
            }
            let mut line_el = BytesStart::new("line");
            line_el.push_attribute(("num", (idx + 1).to_string().as_str()));
            line_el.push_attribute(("type", "stmt"));
            line_el.push_attribute(("count", count.to_string().as_str()));
            writer.write_event(Event::Empty(line_el))?;
        }

        let mut metrics = BytesStart::new("metrics");
        metrics.push_attribute(("loc", records.len().to_string().as_str()));
        metrics.push_attribute(("statements", statements.to_string().as_str()));
        metrics.push_attribute(("coveredstatements", covered.to_string().as_str()));
        writer.write_event(Event::Empty(metrics))?;
        writer.write_event(Event::End(BytesEnd::new("file")))?;

        project_loc += records.len() as u64;
        project_statements += statements;
        project_covered += covered;
    }

    let mut metrics = BytesStart::new("metrics");
    metrics.push_attribute(("files", snapshot.files.len().to_string().as_str()));
    metrics.push_attribute(("loc", project_loc.to_string().as_str()));
    metrics.push_attribute(("statements", project_statements.to_string().as_str()));
    metrics.push_attribute(("coveredstatements", project_covered.to_string().as_str()));
    writer.write_event(Event::Empty(metrics))?;

    writer.write_event(Event::End(BytesEnd::new("project")))?;
    writer.write_event(Event::End(BytesEnd::new("coverage")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Write the Clover XML report to disk, creating parent directories.
pub fn write_clover(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let xml = clover_xml(snapshot, Utc::now().timestamp())?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, xml)?;
    Ok(())
}
