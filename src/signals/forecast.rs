//! Trajectory Forecaster
//!
//! Predicts where whale positioning is heading by regressing observation
//! direction over time. The real implementation is a Gaussian-process
//! regressor (RBF covariance plus an explicit white-noise term); a disabled
//! variant returns no forecast so the aggregator degrades to agreement-only
//! confidence.

use ndarray::{Array1, Array2};
use tracing::debug;

/// Forecast of the direction trajectory at the requested horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub mean: f64,
    pub std: f64,
}

/// Fits (hours_ago, direction) samples and predicts direction at
/// `horizon_hours` into the future. Implementations must never error:
/// insufficient or degenerate data yields `None`.
pub trait TrajectoryForecaster: Send + Sync {
    fn forecast(&self, samples: &[(f64, f64)], horizon_hours: f64) -> Option<Forecast>;
}

/// No-op forecaster used when trajectory forecasting is disabled
#[derive(Debug, Default)]
pub struct DisabledForecaster;

impl TrajectoryForecaster for DisabledForecaster {
    fn forecast(&self, _samples: &[(f64, f64)], _horizon_hours: f64) -> Option<Forecast> {
        None
    }
}

/// Gaussian-process regressor over the observation timeline.
///
/// Inputs are hours-ago (so the future sits at negative coordinates);
/// targets are standardized before the fit and de-standardized after.
/// Hyperparameters are fixed rather than optimized.
#[derive(Debug)]
pub struct GpForecaster {
    /// Minimum samples before a fit is attempted
    pub min_observations: usize,
    /// RBF length scale in hours
    pub length_scale: f64,
    /// Signal variance of the RBF term
    pub signal_variance: f64,
    /// White-noise variance added on the diagonal
    pub noise_variance: f64,
}

impl Default for GpForecaster {
    fn default() -> Self {
        Self {
            min_observations: 10,
            length_scale: 2.0,
            signal_variance: 1.0,
            noise_variance: 0.1,
        }
    }
}

impl GpForecaster {
    pub fn new(min_observations: usize) -> Self {
        Self {
            min_observations,
            ..Default::default()
        }
    }

    fn kernel(&self, a: f64, b: f64) -> f64 {
        let d = (a - b) / self.length_scale;
        self.signal_variance * (-0.5 * d * d).exp()
    }
}

impl TrajectoryForecaster for GpForecaster {
    fn forecast(&self, samples: &[(f64, f64)], horizon_hours: f64) -> Option<Forecast> {
        if samples.len() < self.min_observations {
            return None;
        }

        let n = samples.len();
        let xs: Vec<f64> = samples.iter().map(|(h, _)| *h).collect();
        let ys: Vec<f64> = samples.iter().map(|(_, d)| *d).collect();

        // Standardize targets
        let y_mean = ys.iter().sum::<f64>() / n as f64;
        let y_var = ys.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = y_var.sqrt() + 1e-6;
        let y_norm = Array1::from_iter(ys.iter().map(|y| (y - y_mean) / y_std));

        // Covariance with noise on the diagonal
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                k[[i, j]] = self.kernel(xs[i], xs[j]);
            }
            k[[i, i]] += self.noise_variance;
        }

        let chol = cholesky(&k)?;
        let alpha = chol_solve(&chol, &y_norm);

        // Predict at the future coordinate
        let x_star = -horizon_hours;
        let k_star = Array1::from_iter(xs.iter().map(|x| self.kernel(*x, x_star)));

        let mean_norm = k_star.dot(&alpha);
        let v = chol_forward(&chol, &k_star);
        let var_norm = (self.kernel(x_star, x_star) - v.dot(&v)).max(1e-12);

        let forecast = Forecast {
            mean: mean_norm * y_std + y_mean,
            std: var_norm.sqrt() * y_std,
        };
        debug!(
            samples = n,
            mean = forecast.mean,
            std = forecast.std,
            "trajectory forecast"
        );
        Some(forecast)
    }
}

/// Lower-triangular Cholesky factor of a symmetric matrix, or None when the
/// matrix is not positive definite
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l: Array2<f64> = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve L·x = b (forward substitution)
fn chol_forward(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve (L·Lᵀ)·x = b via forward then backward substitution
fn chol_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let y = chol_forward(l, b);
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}
