//! Posterior over the alternative placements of one read
//!
//! Aligners report several candidate placements per read. Each candidate's
//! true-population likelihood is accumulated (in log space) so that the share of
//! any single score in the total can be read off once all candidates are in.

use thiserror::Error;

use crate::model::ScoreModel;
use crate::negbin::log_add_exp;
use crate::types::{AlignedLength, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PosteriorError {
    #[error("Posterior aggregator used before initialize()")]
    NotInitialized,
    #[error("No alignments added; posterior is undefined over an empty candidate set")]
    NoAlignments,
}

pub type PosteriorResult<T> = Result<T, PosteriorError>;

#[derive(Debug, Clone, Copy)]
enum AggregatorState<'m> {
    Uninitialized,
    Accumulating {
        model: &'m ScoreModel,
        aligned_length: AlignedLength,
        max_score: Option<Score>,
        count: usize,
        ln_sum_prob_true: f64,
    },
}

/// Running posterior for one read's alignment group.
///
/// The aggregator borrows its model, so the model outlives every aggregator
/// built on it. One aggregator per read; it is not meant to be shared.
#[derive(Debug, Clone, Copy)]
pub struct PosteriorAggregator<'m> {
    state: AggregatorState<'m>,
}

impl Default for PosteriorAggregator<'_> {
    fn default() -> Self {
        Self { state: AggregatorState::Uninitialized }
    }
}

impl<'m> PosteriorAggregator<'m> {
    /// An aggregator already bound to `model` and `aligned_length`.
    pub fn new(model: &'m ScoreModel, aligned_length: AlignedLength) -> Self {
        let mut aggregator = Self::default();
        aggregator.initialize(model, aligned_length);
        aggregator
    }

    /// Bind to a model and aligned length, discarding any accumulated state.
    pub fn initialize(&mut self, model: &'m ScoreModel, aligned_length: AlignedLength) {
        self.state = AggregatorState::Accumulating {
            model,
            aligned_length,
            max_score: None,
            count: 0,
            ln_sum_prob_true: f64::NEG_INFINITY,
        };
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, AggregatorState::Accumulating { .. })
    }

    /// Record one candidate placement's score. Order of calls does not matter.
    pub fn add_alignment(&mut self, score: Score) -> PosteriorResult<()> {
        match &mut self.state {
            AggregatorState::Uninitialized => Err(PosteriorError::NotInitialized),
            AggregatorState::Accumulating {
                model,
                aligned_length,
                max_score,
                count,
                ln_sum_prob_true,
            } => {
                *max_score = Some(max_score.map_or(score, |m| m.max(score)));
                *count += 1;
                *ln_sum_prob_true = log_add_exp(*ln_sum_prob_true, model.ln_prob_true(*aligned_length, score));
                Ok(())
            }
        }
    }

    /// Posterior that the best-scoring candidate seen so far is the true one.
    pub fn max_posterior(&self) -> PosteriorResult<f64> {
        match self.state {
            AggregatorState::Uninitialized => Err(PosteriorError::NotInitialized),
            AggregatorState::Accumulating { max_score: None, .. } => Err(PosteriorError::NoAlignments),
            AggregatorState::Accumulating { max_score: Some(best), .. } => self.posterior(best),
        }
    }

    /// Share of `score` in the true-likelihood mass accumulated so far. `score`
    /// need not have been added. Zero when nothing (or only zero-mass scores) has
    /// been added.
    pub fn posterior(&self, score: Score) -> PosteriorResult<f64> {
        match self.state {
            AggregatorState::Uninitialized => Err(PosteriorError::NotInitialized),
            AggregatorState::Accumulating {
                model,
                aligned_length,
                ln_sum_prob_true,
                ..
            } => {
                if ln_sum_prob_true == f64::NEG_INFINITY {
                    return Ok(0.0);
                }
                let ln_p = model.ln_prob_true(aligned_length, score);
                if ln_p == f64::NEG_INFINITY {
                    return Ok(0.0);
                }
                let ratio = (ln_p - ln_sum_prob_true).exp();
                Ok(if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 1.0 })
            }
        }
    }

    /// Best score added so far.
    pub fn max_score(&self) -> Option<Score> {
        match self.state {
            AggregatorState::Accumulating { max_score, .. } => max_score,
            AggregatorState::Uninitialized => None,
        }
    }

    /// Number of candidates added since the last `initialize`.
    pub fn count(&self) -> usize {
        match self.state {
            AggregatorState::Accumulating { count, .. } => count,
            AggregatorState::Uninitialized => 0,
        }
    }

    pub fn aligned_length(&self) -> Option<AlignedLength> {
        match self.state {
            AggregatorState::Accumulating { aligned_length, .. } => Some(aligned_length),
            AggregatorState::Uninitialized => None,
        }
    }
}
