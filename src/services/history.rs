use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const HISTORY_FILE_NAME: &str = ".stamp-history.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StampRecord {
    pub run_at: String,
    pub source: String,
    pub output: String,
    pub date: String,
    pub time: String,
    pub location: String,
}

impl StampRecord {
    pub fn new(source: &Path, output: &Path, date: String, time: String, location: &str) -> Self {
        Self {
            run_at: Utc::now().to_rfc3339(),
            source: source.to_string_lossy().into_owned(),
            output: output.to_string_lossy().into_owned(),
            date,
            time,
            location: location.to_string(),
        }
    }
}

pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_FILE_NAME)
}

/// Append `records` as JSON lines under `root`.
pub fn append(root: &Path, records: &[StampRecord]) -> std::io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(history_path(root))?;
    for record in records {
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Read back all records; malformed lines are logged and skipped.
pub fn read(root: &Path) -> std::io::Result<Vec<StampRecord>> {
    let file = File::open(history_path(root))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StampRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping malformed history entry {}: {}", i, e),
        }
    }
    Ok(records)
}
