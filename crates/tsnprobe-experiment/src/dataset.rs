//! Per-iteration dataset assembly.
//!
//! The listener's receiver writes one CSV row per packet:
//! software transmit, hardware receive and software receive timestamps.
//! Intermediate traces from either side are spliced in by row index:
//!
//! ```text
//! sw_tx | talker sub-events... | hw_rx | listener sub-events... | sw_rx
//! ```

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tsnprobe_control::message::{PAYLOAD_SIZE, TRANSMISSION_INTERVAL};
use tsnprobe_control::{Factors, IntermediateTrace};

use crate::error::{ExperimentError, Result};

/// Columns written by the listener data-plane tool.
pub const RAW_COLUMNS: usize = 3;

/// Output of the listener data-plane tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDataset {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawDataset {
    /// Parse receiver output. Every record needs the three timestamp columns.
    pub fn parse(text: &str, source: &Path) -> Result<Self> {
        let invalid = |reason: String| ExperimentError::Dataset {
            path: source.to_path_buf(),
            reason,
        };
        let mut records = crate::csv::parse(text).map_err(invalid)?.into_iter();
        let header = records
            .next()
            .ok_or_else(|| invalid("no header row".to_string()))?;
        let rows: Vec<Vec<String>> = records.collect();

        for (line, record) in std::iter::once(&header).chain(&rows).enumerate() {
            if record.len() < RAW_COLUMNS {
                return Err(invalid(format!(
                    "record {} has {} columns, expected {RAW_COLUMNS}",
                    line + 1,
                    record.len()
                )));
            }
        }
        Ok(Self { header, rows })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExperimentError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&text, path)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Raw timestamps with intermediate traces spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MergedRecord {
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        crate::csv::write_record(&mut out, &self.header);
        for row in &self.rows {
            crate::csv::write_record(&mut out, row);
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv())
            .map_err(|e| ExperimentError::io(format!("writing {}", path.display()), e))
    }
}

fn splice(raw: &[String], talker: Option<&[String]>, listener: Option<&[String]>) -> Vec<String> {
    let mut out = Vec::with_capacity(
        RAW_COLUMNS + talker.map_or(0, <[String]>::len) + listener.map_or(0, <[String]>::len),
    );
    out.push(raw[0].clone());
    out.extend(talker.into_iter().flatten().cloned());
    out.push(raw[1].clone());
    out.extend(listener.into_iter().flatten().cloned());
    out.push(raw[2].clone());
    out
}

/// Join the raw dataset with optional talker and listener traces by row
/// index.
///
/// When the sources disagree on row count, the result is truncated to the
/// shortest one and a warning is logged; rows are never realigned.
pub fn merge(
    raw: &RawDataset,
    talker: Option<&IntermediateTrace>,
    listener: Option<&IntermediateTrace>,
) -> MergedRecord {
    let counts = [
        Some(raw.len()),
        talker.map(IntermediateTrace::len),
        listener.map(IntermediateTrace::len),
    ];
    let rows = counts.iter().flatten().copied().min().unwrap_or(0);
    if counts.iter().flatten().any(|&n| n != rows) {
        warn!(
            raw = raw.len(),
            talker = ?talker.map(IntermediateTrace::len),
            listener = ?listener.map(IntermediateTrace::len),
            kept = rows,
            "row counts differ; truncating to the shortest source"
        );
    }

    let header = splice(
        &raw.header,
        talker.map(IntermediateTrace::header),
        listener.map(IntermediateTrace::header),
    );
    let rows = (0..rows)
        .map(|i| {
            splice(
                &raw.rows[i],
                talker.map(|t| t.rows()[i].as_slice()),
                listener.map(|t| t.rows()[i].as_slice()),
            )
        })
        .collect();
    MergedRecord { header, rows }
}

/// `results-<PayloadSize>-<TransmissionInterval>.csv`
pub fn results_file_name(factors: &Factors) -> Result<String> {
    Ok(format!(
        "results-{}-{}.csv",
        factors.require(PAYLOAD_SIZE)?,
        factors.require(TRANSMISSION_INTERVAL)?
    ))
}

/// Produce the results file for one iteration from the receiver output at
/// `raw_path`.
///
/// With no trace at all the raw file is renamed into place. Otherwise the
/// merged dataset is written and the raw file removed.
pub fn persist(
    raw_path: &Path,
    results_dir: &Path,
    factors: &Factors,
    talker: Option<&IntermediateTrace>,
    listener: Option<&IntermediateTrace>,
) -> Result<PathBuf> {
    let target = results_dir.join(results_file_name(factors)?);

    if talker.is_none() && listener.is_none() {
        std::fs::rename(raw_path, &target).map_err(|e| {
            ExperimentError::io(
                format!("renaming {} to {}", raw_path.display(), target.display()),
                e,
            )
        })?;
    } else {
        let raw = RawDataset::read(raw_path)?;
        let merged = merge(&raw, talker, listener);
        merged.write(&target)?;
        std::fs::remove_file(raw_path)
            .map_err(|e| ExperimentError::io(format!("removing {}", raw_path.display()), e))?;
    }
    info!(path = %target.display(), "results written");
    Ok(target)
}
