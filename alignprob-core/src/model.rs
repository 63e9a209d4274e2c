//! Per-length two-population score model
//!
//! Each calibrated aligned length carries a mixture weight and two negative
//! binomial distributions over the score shortfall `max_score - score`, one for
//! correctly placed ("true") alignments and one for spurious ("invalid") ones.
//! `max_score` is `match_score * aligned_length`, the score of a perfect match.
//!
//! Lengths without their own row use the nearest shorter calibrated row.
//! Lengths shorter than every calibrated row have no row at all and every
//! density for them is zero.

use std::io::BufRead;
use std::path::Path;

use crate::io::calibration::{CalibrationParser, CalibrationTable, LoadError};
use crate::negbin::{log_add_exp, NegativeBinomial};
use crate::types::{AlignedLength, AlignmentClass, CalibrationRow, Score, TableSummary};

/// Calibrated score model. Read-only once a table has been loaded, so it can be
/// shared between threads behind an `Arc` or a plain reference.
#[derive(Debug, Clone)]
pub struct ScoreModel {
    match_score: i32,
    table: CalibrationTable,
}

impl ScoreModel {
    /// Create an empty model for a scoring scheme with the given per-base match reward.
    pub fn new(match_score: i32) -> Self {
        Self {
            match_score,
            table: CalibrationTable::new(),
        }
    }

    /// Create a model and load its calibration table in one step.
    pub fn from_path<P: AsRef<Path>>(match_score: i32, path: P) -> Result<Self, LoadError> {
        let mut model = Self::new(match_score);
        model.load_table(path)?;
        Ok(model)
    }

    /// Create a model from calibration rows read off any buffered source.
    pub fn from_reader<R: BufRead>(match_score: i32, reader: R) -> Result<Self, LoadError> {
        let table = CalibrationParser::parse_reader(reader)?;
        Ok(Self { match_score, table })
    }

    /// Load the calibration table. On error the model keeps whatever table it
    /// had before the call.
    pub fn load_table<P: AsRef<Path>>(&mut self, path: P) -> Result<(), LoadError> {
        let path = path.as_ref();
        let table = CalibrationParser::parse_file(path)?;
        log::info!(
            "Loaded {} calibration rows from {} (match score {})",
            table.len(),
            path.display(),
            self.match_score
        );
        self.table = table;
        Ok(())
    }

    pub fn match_score(&self) -> i32 {
        self.match_score
    }

    /// Number of calibrated lengths.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Calibrated lengths in ascending order.
    pub fn lengths(&self) -> impl Iterator<Item = AlignedLength> + '_ {
        self.table.keys().copied()
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// The calibrated length whose row serves `aligned_length`: the length itself
    /// if present, else the nearest shorter one.
    pub fn calibrated_length(&self, aligned_length: AlignedLength) -> Option<AlignedLength> {
        self.row(aligned_length).map(|row| row.aligned_length)
    }

    /// Calibration row serving `aligned_length`.
    pub fn row(&self, aligned_length: AlignedLength) -> Option<&CalibrationRow> {
        let (&len, row) = self.table.range(..=aligned_length).next_back()?;
        if len != aligned_length {
            log::trace!("No calibration row for length {}, using length {}", aligned_length, len);
        }
        Some(row)
    }

    /// Score of a perfect match over `aligned_length` bases.
    pub fn max_score(&self, aligned_length: AlignedLength) -> i64 {
        i64::from(self.match_score) * i64::from(aligned_length)
    }

    /// Shortfall from the maximum score, or `None` when the score exceeds it.
    fn score_diff(&self, aligned_length: AlignedLength, score: Score) -> Option<u64> {
        let diff = self.max_score(aligned_length) - i64::from(score);
        u64::try_from(diff).ok()
    }

    fn ln_density(&self, dist: &NegativeBinomial, aligned_length: AlignedLength, score: Score) -> f64 {
        match self.score_diff(aligned_length, score) {
            Some(k) => dist.ln_pmf(k),
            None => f64::NEG_INFINITY,
        }
    }

    /// Natural log of [`prob_true`](Self::prob_true).
    pub fn ln_prob_true(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        match self.row(aligned_length) {
            Some(row) => self.ln_density(&row.true_dist, aligned_length, score),
            None => f64::NEG_INFINITY,
        }
    }

    /// Natural log of [`prob_invalid`](Self::prob_invalid).
    pub fn ln_prob_invalid(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        match self.row(aligned_length) {
            Some(row) => self.ln_density(&row.invalid_dist, aligned_length, score),
            None => f64::NEG_INFINITY,
        }
    }

    /// Probability that a true alignment of this length scores exactly `score`.
    pub fn prob_true(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        self.ln_prob_true(aligned_length, score).exp()
    }

    /// Probability that an invalid alignment of this length scores exactly `score`.
    pub fn prob_invalid(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        self.ln_prob_invalid(aligned_length, score).exp()
    }

    /// Log of the true-population mass at scores strictly above `score`, that is
    /// shortfalls in `[0, max_score - score)`. Not normalised.
    pub fn ln_cdf_true(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        let Some(row) = self.row(aligned_length) else {
            return f64::NEG_INFINITY;
        };
        match self.score_diff(aligned_length, score) {
            Some(diff) => row.true_dist.ln_mass_below(diff),
            None => f64::NEG_INFINITY,
        }
    }

    /// Natural log of [`prob_false`](Self::prob_false).
    pub fn ln_prob_false(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        // Normalise over the achievable score range [0, max_score]
        let ln_total = self.ln_cdf_true(aligned_length, -1);
        if ln_total == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let ln_higher = self.ln_cdf_true(aligned_length, score.max(-1));

        (ln_higher - ln_total).min(0.0)
    }

    /// Probability that the true population would have scored strictly higher,
    /// normalised by the true mass over the achievable range. Zero at the
    /// maximum score, one below a score of zero.
    pub fn prob_false(&self, aligned_length: AlignedLength, score: Score) -> f64 {
        self.ln_prob_false(aligned_length, score).exp()
    }

    /// Posterior probability that the alignment is true, combining the caller's
    /// `prior` with the length's mixture weight and both densities. Returns 0.0
    /// when both weighted densities vanish.
    pub fn classify(&self, aligned_length: AlignedLength, score: Score, prior: f64) -> f64 {
        let Some(row) = self.row(aligned_length) else {
            return 0.0;
        };
        if !prior.is_finite() {
            return 0.0;
        }
        let prior = prior.clamp(0.0, 1.0);

        let ln_true = prior.ln() + row.weight.ln() + self.ln_density(&row.true_dist, aligned_length, score);
        let ln_invalid = (1.0 - prior).ln()
            + (1.0 - row.weight).ln()
            + self.ln_density(&row.invalid_dist, aligned_length, score);

        let ln_norm = log_add_exp(ln_true, ln_invalid);
        if ln_norm == f64::NEG_INFINITY || ln_true == f64::NEG_INFINITY {
            return 0.0;
        }

        let posterior = (ln_true - ln_norm).exp();
        if posterior.is_finite() {
            posterior.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Three-way decision: true when the posterior reaches `threshold`, otherwise
    /// invalid when the weighted invalid density dominates, otherwise false.
    /// Lengths without a calibration row are always invalid.
    pub fn call(&self, aligned_length: AlignedLength, score: Score, prior: f64, threshold: f64) -> AlignmentClass {
        let Some(row) = self.row(aligned_length) else {
            return AlignmentClass::Invalid;
        };
        if self.classify(aligned_length, score, prior) >= threshold {
            return AlignmentClass::True;
        }

        let ln_true = row.weight.ln() + self.ln_density(&row.true_dist, aligned_length, score);
        let ln_invalid = (1.0 - row.weight).ln() + self.ln_density(&row.invalid_dist, aligned_length, score);
        if ln_invalid > ln_true || (ln_true == f64::NEG_INFINITY && ln_invalid == f64::NEG_INFINITY) {
            AlignmentClass::Invalid
        } else {
            AlignmentClass::False
        }
    }

    /// Summary of the loaded table.
    pub fn summary(&self) -> TableSummary {
        let rows = self.table.len();
        let mean_weight = if rows == 0 {
            0.0
        } else {
            self.table.values().map(|r| r.weight).sum::<f64>() / rows as f64
        };

        TableSummary {
            match_score: self.match_score,
            rows,
            min_length: self.table.keys().next().copied(),
            max_length: self.table.keys().next_back().copied(),
            mean_weight,
        }
    }
}
