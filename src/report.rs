//! Human-readable summary of a download run, written next to the documents.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;

pub const REPORT_FILE: &str = "download_report.txt";

/// One row that could not be completed, with the reason it failed.
#[derive(Debug, Clone)]
pub struct FailedRow {
    pub title: String,
    pub author: String,
    pub identifier: String,
    pub reason: String,
}

pub fn write_report(dir: &Path, succeeded: usize, failed: &[FailedRow]) -> anyhow::Result<PathBuf> {
    let mut documents: Vec<(String, u64)> = fs::read_dir(dir)
        .with_context(|| format!("could not list {}", dir.display()))?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.to_ascii_lowercase().ends_with(".pdf") {
                return None;
            }
            Some((name, entry.metadata().ok()?.len()))
        })
        .collect();
    documents.sort();

    let total = succeeded + failed.len();
    let mut out = String::new();
    let _ = writeln!(out, "Publication Download Report");
    let _ = writeln!(out, "{}", "=".repeat(40));
    let _ = writeln!(out);
    let _ = writeln!(out, "Total processed: {total}");
    let _ = writeln!(out, "Successful downloads: {succeeded}");
    let _ = writeln!(out, "Failed downloads: {}", failed.len());
    if total > 0 {
        let rate = succeeded as f64 / total as f64 * 100.0;
        let _ = writeln!(out, "Success rate: {rate:.1}%");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Downloaded Files:");
    let _ = writeln!(out, "{}", "-".repeat(20));
    for (name, size) in &documents {
        let size_mb = *size as f64 / (1024.0 * 1024.0);
        let _ = writeln!(out, "{name} ({size_mb:.1} MB)");
    }

    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failed Downloads ({}):", failed.len());
        let _ = writeln!(out, "{}", "-".repeat(30));
        for row in failed {
            let _ = writeln!(
                out,
                "{} | {} | {} | {}",
                row.title, row.author, row.identifier, row.reason
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Report generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let path = dir.join(REPORT_FILE);
    fs::write(&path, out).with_context(|| format!("could not write {}", path.display()))?;
    Ok(path)
}
