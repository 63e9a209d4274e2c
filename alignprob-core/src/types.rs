use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::negbin::{NegativeBinomial, ParamError};

/// Number of read bases participating in an alignment placement.
pub type AlignedLength = u32;

/// Raw alignment score as reported by the aligner.
pub type Score = i32;

/// Why a calibration row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RowError {
    #[error("weight must be in [0, 1], got {0}")]
    Weight(f64),
    #[error("true population: {0}")]
    TruePopulation(#[source] ParamError),
    #[error("invalid population: {0}")]
    InvalidPopulation(#[source] ParamError),
}

/// One calibration row: mixture weight plus the two populations' count distributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
    pub aligned_length: AlignedLength,
    /// Prior probability that a placement of this length is from the true population
    pub weight: f64,
    pub true_dist: NegativeBinomial,
    pub invalid_dist: NegativeBinomial,
}

impl CalibrationRow {
    /// Validate and assemble a row.
    pub fn new(
        aligned_length: AlignedLength,
        weight: f64,
        true_size: f64,
        true_prob: f64,
        invalid_size: f64,
        invalid_prob: f64,
    ) -> Result<Self, RowError> {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(RowError::Weight(weight));
        }
        let true_dist = NegativeBinomial::new(true_size, true_prob).map_err(RowError::TruePopulation)?;
        let invalid_dist =
            NegativeBinomial::new(invalid_size, invalid_prob).map_err(RowError::InvalidPopulation)?;

        Ok(Self {
            aligned_length,
            weight,
            true_dist,
            invalid_dist,
        })
    }
}

/// Three-way decision for a single alignment placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentClass {
    /// Correctly placed
    True,
    /// Correctly attempted but under-scored
    False,
    /// Spurious placement
    Invalid,
}

impl AlignmentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentClass::True => "true",
            AlignmentClass::False => "false",
            AlignmentClass::Invalid => "invalid",
        }
    }
}

impl fmt::Display for AlignmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" => Ok(AlignmentClass::True),
            "false" => Ok(AlignmentClass::False),
            "invalid" => Ok(AlignmentClass::Invalid),
            other => Err(format!("unknown alignment class: {}", other)),
        }
    }
}

/// Shape of a loaded calibration table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub match_score: i32,
    pub rows: usize,
    pub min_length: Option<AlignedLength>,
    pub max_length: Option<AlignedLength>,
    pub mean_weight: f64,
}
