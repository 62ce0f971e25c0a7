//! Lead-Lag Scorer
//!
//! Pairwise causality test over hourly whale activity: wallets whose trading
//! activity statistically precedes (and predicts) other wallets' activity get
//! a lead score in [0, 1]. The aggregator boosts lead wallets by up to 20%.
//!
//! The scorer is a pure function from activity timestamps to a score map;
//! the engine applies the result to the tracker. Two implementations are
//! selected at startup: the real Granger-style test and a disabled variant
//! that returns neutral zeros.

use chrono::{DateTime, Duration, Utc};
use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Computes a lead score per wallet from trade activity timestamps.
pub trait LeadLagScorer: Send + Sync {
    /// Returns a score in [0, 1] per wallet id. Wallets absent from the
    /// result keep their previous score.
    fn score(
        &self,
        activity: &HashMap<String, Vec<DateTime<Utc>>>,
        now: DateTime<Utc>,
    ) -> HashMap<String, f64>;
}

/// Neutral scorer used when causality testing is disabled: every wallet
/// scores zero, nothing errors.
#[derive(Debug, Default)]
pub struct DisabledScorer;

impl LeadLagScorer for DisabledScorer {
    fn score(
        &self,
        activity: &HashMap<String, Vec<DateTime<Utc>>>,
        _now: DateTime<Utc>,
    ) -> HashMap<String, f64> {
        activity.keys().map(|w| (w.clone(), 0.0)).collect()
    }
}

/// Granger-style scorer: for each ordered wallet pair, a lagged-regression
/// F-test of "A's hourly trade counts predict B's". Significant predictors
/// (p < 0.1 across lags 1..=2) accumulate `1 - p`; raw scores are then
/// normalized by the maximum so results lie in [0, 1].
#[derive(Debug)]
pub struct GrangerScorer {
    /// Lookback window in hours (also the series length)
    pub lookback_hours: i64,
    /// Maximum lag depth tested
    pub max_lag: usize,
    /// Significance threshold on the minimum p-value
    pub p_threshold: f64,
    /// Minimum trades per wallet before it enters the test
    pub min_trades: usize,
}

impl Default for GrangerScorer {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            max_lag: 2,
            p_threshold: 0.1,
            min_trades: 5,
        }
    }
}

impl GrangerScorer {
    pub fn new(lookback_hours: i64) -> Self {
        Self {
            lookback_hours,
            ..Default::default()
        }
    }

    /// Hourly trade counts over the lookback window, oldest hour first
    fn hourly_series(&self, timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<f64> {
        let mut series = vec![0.0; self.lookback_hours as usize];
        let window_start = now - Duration::hours(self.lookback_hours);
        for ts in timestamps {
            if *ts < window_start || *ts >= now {
                continue;
            }
            let hours_in = (*ts - window_start).num_seconds() as f64 / 3600.0;
            let idx = (hours_in.floor() as usize).min(self.lookback_hours as usize - 1);
            series[idx] += 1.0;
        }
        series
    }

    /// Minimum p-value over lags 1..=max_lag for "predictor causes target"
    fn causality_p_value(&self, predictor: &[f64], target: &[f64]) -> Option<f64> {
        let mut best: Option<f64> = None;
        for lag in 1..=self.max_lag {
            if let Some(p) = granger_p_value(predictor, target, lag) {
                best = Some(best.map_or(p, |b: f64| b.min(p)));
            }
        }
        best
    }
}

impl LeadLagScorer for GrangerScorer {
    fn score(
        &self,
        activity: &HashMap<String, Vec<DateTime<Utc>>>,
        now: DateTime<Utc>,
    ) -> HashMap<String, f64> {
        let mut raw: HashMap<String, f64> = activity.keys().map(|w| (w.clone(), 0.0)).collect();

        let mut eligible: Vec<(&String, Vec<f64>)> = activity
            .iter()
            .filter(|(_, ts)| ts.len() >= self.min_trades)
            .map(|(w, ts)| (w, self.hourly_series(ts, now)))
            .collect();
        // Stable order so the output is deterministic
        eligible.sort_by(|a, b| a.0.cmp(b.0));

        if eligible.len() < 2 {
            return raw;
        }

        for i in 0..eligible.len() {
            for j in 0..eligible.len() {
                if i == j {
                    continue;
                }
                let (wallet_a, series_a) = &eligible[i];
                let (_, series_b) = &eligible[j];

                if let Some(p) = self.causality_p_value(series_a, series_b) {
                    if p < self.p_threshold {
                        *raw.entry((*wallet_a).clone()).or_insert(0.0) += 1.0 - p;
                    }
                }
            }
        }

        // Normalize by the maximum observed raw score
        let max_score = raw.values().cloned().fold(0.0_f64, f64::max);
        if max_score > 0.0 {
            for v in raw.values_mut() {
                *v /= max_score;
            }
        }

        debug!(wallets = eligible.len(), "lead-lag scores refreshed");
        raw
    }
}

/// F-test p-value for "x Granger-causes y" at a single lag depth.
///
/// Restricted model: y_t ~ 1 + y_{t-1..t-lag}
/// Unrestricted:     y_t ~ 1 + y_{t-1..t-lag} + x_{t-1..t-lag}
fn granger_p_value(x: &[f64], y: &[f64], lag: usize) -> Option<f64> {
    let n_total = y.len().min(x.len());
    if n_total <= lag {
        return None;
    }
    let n = n_total - lag;
    let k_unrestricted = 2 * lag + 1;
    if n <= k_unrestricted {
        return None;
    }

    let target = Array1::from_iter((lag..n_total).map(|t| y[t]));

    // Restricted design: intercept + lagged y
    let mut restricted = Array2::zeros((n, lag + 1));
    // Unrestricted design: intercept + lagged y + lagged x
    let mut unrestricted = Array2::zeros((n, k_unrestricted));
    for (row, t) in (lag..n_total).enumerate() {
        restricted[[row, 0]] = 1.0;
        unrestricted[[row, 0]] = 1.0;
        for l in 1..=lag {
            restricted[[row, l]] = y[t - l];
            unrestricted[[row, l]] = y[t - l];
            unrestricted[[row, lag + l]] = x[t - l];
        }
    }

    let rss_restricted = ols_rss(&restricted, &target)?;
    let rss_unrestricted = ols_rss(&unrestricted, &target)?;

    let df2 = (n - k_unrestricted) as f64;
    if rss_unrestricted <= 1e-9 {
        // Perfect fit with the extra regressors: either the restricted model
        // was already perfect (no information) or x fully explains y
        return if rss_restricted > 1e-6 { Some(0.0) } else { None };
    }

    let f_stat = ((rss_restricted - rss_unrestricted) / lag as f64) / (rss_unrestricted / df2);
    if !f_stat.is_finite() || f_stat <= 0.0 {
        return Some(1.0);
    }

    match FisherSnedecor::new(lag as f64, df2) {
        Ok(dist) => Some(1.0 - dist.cdf(f_stat)),
        Err(e) => {
            warn!("F-distribution construction failed: {e}");
            None
        }
    }
}

/// Residual sum of squares of the OLS fit y ~ X, via normal equations.
/// Returns None when the system is singular.
fn ols_rss(design: &Array2<f64>, target: &Array1<f64>) -> Option<f64> {
    let xtx = design.t().dot(design);
    let xty = design.t().dot(target);
    let beta = solve_linear(&xtx, &xty)?;
    let fitted = design.dot(&beta);
    let residuals = target - &fitted;
    Some(residuals.dot(&residuals))
}

/// Solve A·x = b by Gaussian elimination with partial pivoting
fn solve_linear(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return None;
    }
    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        // Pivot
        let mut pivot_row = col;
        let mut pivot_val = m[[col, col]].abs();
        for row in (col + 1)..n {
            if m[[row, col]].abs() > pivot_val {
                pivot_val = m[[row, col]].abs();
                pivot_row = row;
            }
        }
        if pivot_val < 1e-12 {
            return None;
        }
        if pivot_row != col {
            for c in 0..n {
                m.swap([col, c], [pivot_row, c]);
            }
            rhs.swap(col, pivot_row);
        }

        for row in (col + 1)..n {
            let factor = m[[row, col]] / m[[col, col]];
            for c in col..n {
                m[[row, c]] -= factor * m[[col, c]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut sum = rhs[row];
        for c in (row + 1)..n {
            sum -= m[[row, c]] * x[c];
        }
        x[row] = sum / m[[row, row]];
    }
    Some(x)
}
