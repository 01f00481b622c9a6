//! Input table reading. An unreadable file or missing required columns are
//! the only conditions fatal to a whole run.

use std::path::Path;

use anyhow::{Context, bail};
use log::warn;
use serde::Deserialize;

pub const REQUIRED_COLUMNS: [&str; 4] = ["Title", "First Author", "Publication Year", "DOI"];

#[derive(Debug, Clone, Deserialize)]
pub struct Row {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "First Author", default)]
    pub first_author: String,
    #[serde(rename = "Publication Year", default)]
    pub year: String,
    #[serde(rename = "DOI", default)]
    pub doi: String,
}

pub fn read_rows(path: &Path) -> anyhow::Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("could not read input table {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("could not read header row of {}", path.display()))?
        .clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == **required))
        .copied()
        .collect();
    if !missing.is_empty() {
        bail!(
            "input table {} is missing required columns: {}",
            path.display(),
            missing.join(", ")
        );
    }

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<Row>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            // Header row is line 1, so data row N sits on line N + 1.
            Err(err) => warn!("skipping unreadable row {}: {err}", index + 2),
        }
    }
    Ok(rows)
}
