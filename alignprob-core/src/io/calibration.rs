//! Calibration table parser
//!
//! A calibration table is tab-separated text with one row per aligned length:
//!
//! ```text
//! #alignprob-calibration v1
//! aligned_length  weight  true_size  true_prob  invalid_size  invalid_prob
//! 100             0.9     50         0.6        10            0.2
//! ```
//!
//! The version directive and the header row are optional. Other `#` lines and
//! blank lines are skipped. Files ending in `.gz` are decompressed on the fly.
//! Any malformed row fails the whole load; a table is never partially accepted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use flate2::read::GzDecoder;
use thiserror::Error;

use crate::types::{AlignedLength, CalibrationRow};

/// Table format version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Directive introducing the format version, e.g. `#alignprob-calibration v1`.
pub const VERSION_DIRECTIVE: &str = "#alignprob-calibration";

/// Column names in file order.
pub const COLUMNS: [&str; 6] = [
    "aligned_length",
    "weight",
    "true_size",
    "true_prob",
    "invalid_size",
    "invalid_prob",
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Calibration table not found: {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("Malformed calibration row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
    #[error("Unsupported calibration table version: {0} (expected v1)")]
    UnsupportedVersion(String),
    #[error("Calibration table contains no rows")]
    EmptyTable,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    fn malformed<S: Into<String>>(line: usize, reason: S) -> Self {
        Self::MalformedRow { line, reason: reason.into() }
    }
}

/// Parsed calibration rows keyed by aligned length.
pub type CalibrationTable = BTreeMap<AlignedLength, CalibrationRow>;

/// Calibration table parser
pub struct CalibrationParser;

impl CalibrationParser {
    /// Parse a single data line. `line_num` is 1-based and only used for diagnostics.
    pub fn parse_line(line_num: usize, line: &str) -> Result<CalibrationRow, LoadError> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();

        if fields.len() != COLUMNS.len() {
            return Err(LoadError::malformed(
                line_num,
                format!("expected {} fields, got {}", COLUMNS.len(), fields.len()),
            ));
        }

        let aligned_length = fields[0].parse::<AlignedLength>()
            .map_err(|_| LoadError::malformed(line_num, format!("invalid aligned_length: {}", fields[0])))?;

        let mut values = [0.0f64; 5];
        for (i, field) in fields[1..].iter().enumerate() {
            let value = field.parse::<f64>()
                .map_err(|_| LoadError::malformed(line_num, format!("invalid {}: {}", COLUMNS[i + 1], field)))?;
            if !value.is_finite() {
                return Err(LoadError::malformed(line_num, format!("non-finite {}: {}", COLUMNS[i + 1], field)));
            }
            values[i] = value;
        }

        let [weight, true_size, true_prob, invalid_size, invalid_prob] = values;
        CalibrationRow::new(aligned_length, weight, true_size, true_prob, invalid_size, invalid_prob)
            .map_err(|e| LoadError::malformed(line_num, e.to_string()))
    }

    /// Parse a calibration table file, plain or gzip-compressed.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<CalibrationTable, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound { path: path.to_path_buf() },
            _ => LoadError::Io(e),
        })?;

        let reader: Box<dyn Read> = if path.to_string_lossy().ends_with(".gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Self::parse_reader(BufReader::new(reader))
    }

    /// Parse calibration rows from any BufRead source
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<CalibrationTable, LoadError> {
        let mut table = CalibrationTable::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = idx + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix(VERSION_DIRECTIVE) {
                Self::check_version(rest.trim())?;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.split('\t').next() == Some(COLUMNS[0]) {
                continue;
            }

            let row = Self::parse_line(line_num, trimmed)?;
            if table.insert(row.aligned_length, row).is_some() {
                log::warn!(
                    "Duplicate calibration row for aligned length {} at line {}; keeping the later row",
                    row.aligned_length,
                    line_num
                );
            }
        }

        if table.is_empty() {
            return Err(LoadError::EmptyTable);
        }

        log::debug!("Parsed {} calibration rows", table.len());
        Ok(table)
    }

    fn check_version(token: &str) -> Result<(), LoadError> {
        match token.strip_prefix('v').and_then(|v| v.parse::<u32>().ok()) {
            Some(FORMAT_VERSION) => Ok(()),
            _ => Err(LoadError::UnsupportedVersion(token.to_string())),
        }
    }

    /// Render a table back to text, version directive and header included.
    pub fn to_text(table: &CalibrationTable) -> String {
        let mut out = format!("{} v{}\n{}\n", VERSION_DIRECTIVE, FORMAT_VERSION, COLUMNS.join("\t"));
        for row in table.values() {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\n",
                row.aligned_length,
                row.weight,
                row.true_dist.size(),
                row.true_dist.prob(),
                row.invalid_dist.size(),
                row.invalid_dist.prob(),
            ));
        }
        out
    }
}
