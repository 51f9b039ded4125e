//! One-dimensional Gaussian kernel density estimation.
use std::f64::consts::PI;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::EpiError;

/// A Gaussian KDE fit to a sample. The kernel width follows Scott's rule, `n^(-1/5)` times the
/// sample standard deviation, unless a bandwidth factor is supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKde {
    data: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Fits the estimate. `source` names where the data came from for error messages.
    pub fn fit(data: Vec<f64>, factor: Option<f64>, source: &str) -> Result<Self, EpiError> {
        let failure = |reason: &str| EpiError::DistributionError {
            source: source.to_string(),
            reason: reason.to_string(),
        };
        if data.len() < 2 {
            return Err(failure("a density fit needs at least two data points"));
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(failure("data contains non-finite values"));
        }

        #[allow(clippy::cast_precision_loss)]
        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        if variance <= 0.0 {
            return Err(failure("data has zero variance, the density is singular"));
        }

        let factor = match factor {
            Some(f) if f > 0.0 && f.is_finite() => f,
            Some(_) => return Err(failure("bandwidth factor must be positive")),
            None => n.powf(-0.2),
        };

        Ok(GaussianKde {
            data,
            bandwidth: factor * variance.sqrt(),
        })
    }

    #[must_use]
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Evaluates the estimated density at `x`.
    #[must_use]
    pub fn density(&self, x: f64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = self.data.len() as f64;
        let norm = 1.0 / (self.bandwidth * (2.0 * PI).sqrt() * n);
        self.data
            .iter()
            .map(|xi| (-0.5 * ((x - xi) / self.bandwidth).powi(2)).exp())
            .sum::<f64>()
            * norm
    }

    /// Draws from the mixture: a data point chosen uniformly plus kernel noise.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let center = self.data[rng.random_range(0..self.data.len())];
        let noise: f64 = StandardNormal.sample(rng);
        center + self.bandwidth * noise
    }
}
