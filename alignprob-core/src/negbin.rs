//! Negative binomial count distribution evaluated in log space
//!
//! Counts are the score shortfall `k = max_score - score`: the number of
//! "failures" observed before `size` successes with success probability `prob`.
//! Long alignments push the mass of individual counts well below `f64::MIN_POSITIVE`,
//! so everything here stays in natural-log space and callers exponentiate once.

use statrs::function::gamma::ln_gamma;
use thiserror::Error;

/// Terms this many nats below the running total no longer change it.
const NEGLIGIBLE_LN: f64 = 50.0;

/// Rejected distribution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ParamError {
    #[error("size must be finite and > 0, got {0}")]
    Size(f64),
    #[error("prob must be in (0, 1], got {0}")]
    Prob(f64),
}

/// `ln(exp(a) + exp(b))` without leaving log space.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Log-sum-exp over an iterator of log values. Empty input yields `-inf`.
pub fn log_sum_exp<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    values.into_iter().fold(f64::NEG_INFINITY, log_add_exp)
}

/// Negative binomial with `size` > 0 and `prob` in (0, 1].
///
/// The log-gamma and log-probability terms that do not depend on `k` are
/// computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeBinomial {
    size: f64,
    prob: f64,
    ln_gamma_size: f64,
    ln_prob: f64,
    ln_fail: f64,
}

impl NegativeBinomial {
    /// Build a distribution, rejecting parameters outside `size > 0`, `0 < prob <= 1`.
    pub fn new(size: f64, prob: f64) -> Result<Self, ParamError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(ParamError::Size(size));
        }
        if !prob.is_finite() || prob <= 0.0 || prob > 1.0 {
            return Err(ParamError::Prob(prob));
        }

        Ok(Self {
            size,
            prob,
            ln_gamma_size: ln_gamma(size),
            ln_prob: prob.ln(),
            // ln(0) for prob == 1; handled as a point mass in ln_pmf
            ln_fail: (1.0 - prob).ln(),
        })
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Mean number of failures, `size * (1 - prob) / prob`.
    pub fn mean(&self) -> f64 {
        self.size * (1.0 - self.prob) / self.prob
    }

    /// `ln P(K = k)`.
    pub fn ln_pmf(&self, k: u64) -> f64 {
        if k == 0 {
            return self.size * self.ln_prob;
        }
        if self.ln_fail == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let kf = k as f64;
        ln_gamma(kf + self.size) - self.ln_gamma_size - ln_gamma(kf + 1.0)
            + self.size * self.ln_prob
            + kf * self.ln_fail
    }

    /// `P(K = k)`.
    pub fn pmf(&self, k: u64) -> f64 {
        self.ln_pmf(k).exp()
    }

    /// Count with the largest probability. The pmf rises up to it and falls after it.
    pub fn mode(&self) -> u64 {
        if self.size <= 1.0 || self.ln_fail == f64::NEG_INFINITY {
            return 0;
        }
        ((self.size - 1.0) * (1.0 - self.prob) / self.prob).floor() as u64
    }

    /// `ln P(K = k + 1) - ln P(K = k)`.
    fn ln_step(&self, k: u64) -> f64 {
        let kf = k as f64;
        (kf + self.size).ln() - (kf + 1.0).ln() + self.ln_fail
    }

    /// `ln P(K < end)`, i.e. the log mass of `k` in `[0, end)`.
    ///
    /// Sums outward from the largest term in range using the pmf recurrence and
    /// stops on each side once terms fall [`NEGLIGIBLE_LN`] nats below the total,
    /// so the cost depends on the spread of the distribution, not on `end`.
    pub fn ln_mass_below(&self, end: u64) -> f64 {
        if end == 0 {
            return f64::NEG_INFINITY;
        }
        if self.ln_fail == f64::NEG_INFINITY {
            return self.ln_pmf(0);
        }

        let start = self.mode().min(end - 1);
        let ln_start = self.ln_pmf(start);
        let mut acc = ln_start;

        let mut ln_term = ln_start;
        for k in (0..start).rev() {
            ln_term -= self.ln_step(k);
            acc = log_add_exp(acc, ln_term);
            if ln_term < acc - NEGLIGIBLE_LN {
                break;
            }
        }

        let mut ln_term = ln_start;
        for k in start..end - 1 {
            ln_term += self.ln_step(k);
            acc = log_add_exp(acc, ln_term);
            if ln_term < acc - NEGLIGIBLE_LN {
                break;
            }
        }

        acc.min(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert_eq!(NegativeBinomial::new(0.0, 0.5), Err(ParamError::Size(0.0)));
        assert_eq!(NegativeBinomial::new(-1.0, 0.5), Err(ParamError::Size(-1.0)));
        assert_eq!(NegativeBinomial::new(5.0, 0.0), Err(ParamError::Prob(0.0)));
        assert_eq!(NegativeBinomial::new(5.0, 1.5), Err(ParamError::Prob(1.5)));
        assert!(NegativeBinomial::new(f64::NAN, 0.5).is_err());
        assert!(NegativeBinomial::new(5.0, f64::INFINITY).is_err());
        assert!(NegativeBinomial::new(5.0, 1.0).is_ok());
    }

    #[test]
    fn test_pmf_matches_closed_form() {
        // size = 1 is geometric: P(k) = p (1-p)^k
        let nb = NegativeBinomial::new(1.0, 0.3).unwrap();
        for k in 0..10u64 {
            let expected = 0.3 * 0.7f64.powi(k as i32);
            assert!(approx(nb.pmf(k), expected, 1e-12), "k={}", k);
        }

        // size = 3, p = 0.5: P(2) = C(4,2) 0.5^3 0.5^2 = 6/32
        let nb = NegativeBinomial::new(3.0, 0.5).unwrap();
        assert!(approx(nb.pmf(2), 6.0 / 32.0, 1e-12));
    }

    #[test]
    fn test_pmf_sums_to_one() {
        let nb = NegativeBinomial::new(50.0, 0.6).unwrap();
        let total = nb.ln_mass_below(10_000).exp();
        assert!(approx(total, 1.0, 1e-9));
    }

    #[test]
    fn test_mass_below_matches_direct_sum() {
        let nb = NegativeBinomial::new(10.0, 0.2).unwrap();
        let direct: f64 = (0..25).map(|k| nb.pmf(k)).sum();
        assert!(approx(nb.ln_mass_below(25).exp(), direct, 1e-12));
        assert_eq!(nb.ln_mass_below(0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_mass_below_matches_log_sum_on_both_sides_of_mode() {
        let nb = NegativeBinomial::new(10.0, 0.2).unwrap();
        assert_eq!(nb.mode(), 36);
        for end in 1..200u64 {
            let direct = log_sum_exp((0..end).map(|k| nb.ln_pmf(k)));
            assert!(approx(nb.ln_mass_below(end), direct, 1e-9), "end={}", end);
        }
    }

    #[test]
    fn test_mass_below_deep_lower_tail() {
        // P(K < 10) is around exp(-1350), far below f64::MIN_POSITIVE
        let nb = NegativeBinomial::new(2000.0, 0.5).unwrap();
        let direct = log_sum_exp((0..10).map(|k| nb.ln_pmf(k)));
        let ln_mass = nb.ln_mass_below(10);
        assert!(ln_mass.is_finite());
        assert!(ln_mass < -1000.0);
        assert!(approx(ln_mass, direct, 1e-9));
    }

    #[test]
    fn test_mass_below_huge_end_is_total() {
        let nb = NegativeBinomial::new(50.0, 0.6).unwrap();
        assert!(approx(nb.ln_mass_below(20_000_000), 0.0, 1e-12));
        assert!(approx(nb.ln_mass_below(u64::MAX), 0.0, 1e-12));
    }

    #[test]
    fn test_point_mass_when_prob_is_one() {
        let nb = NegativeBinomial::new(4.0, 1.0).unwrap();
        assert_eq!(nb.pmf(0), 1.0);
        assert_eq!(nb.pmf(1), 0.0);
        assert_eq!(nb.ln_mass_below(100), 0.0);
    }

    #[test]
    fn test_log_space_survives_underflow() {
        // Far tail: the plain pmf underflows but the log value stays finite
        let nb = NegativeBinomial::new(2.0, 0.9).unwrap();
        let ln_p = nb.ln_pmf(400);
        assert!(ln_p.is_finite());
        assert!(ln_p < -700.0);
        assert_eq!(ln_p.exp(), 0.0);
    }

    #[test]
    fn test_log_add_exp() {
        assert!(approx(log_add_exp(0.5f64.ln(), 0.25f64.ln()).exp(), 0.75, 1e-15));
        assert_eq!(log_add_exp(f64::NEG_INFINITY, -3.0), -3.0);
        assert_eq!(log_sum_exp(Vec::<f64>::new()), f64::NEG_INFINITY);
        assert!(approx(log_sum_exp(vec![-1000.0, -1000.0]), -1000.0 + 2f64.ln(), 1e-12));
    }
}
