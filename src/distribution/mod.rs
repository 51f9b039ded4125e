//! Configurable random distributions.
//!
//! A [`Distribution`] is built once per (group, purpose) pair from a [`DistributionConfig`] and
//! reused for the whole simulation. Each one owns its own seeded random stream, so a run is
//! reproduced exactly from its base seed no matter how draws from different distributions
//! interleave.
//!
//! The four kinds are:
//! * `constant`: always the configured value (default `0`).
//! * `empirical`: a Gaussian kernel density fit to inline data or a data file.
//! * `weights`: a finite table of values drawn with the given probabilities.
//! * `numpy`: a named parametric family with numpy's keyword arguments, e.g.
//!   `{"dist_type": "numpy", "dist_name": "gamma", "kwargs": {"shape": 2.0, "scale": 3.0}}`.
//!
//! A missing or `"None"` type builds the *none* distribution. It yields `NaN` and reports
//! [`Distribution::is_none`], which callers use to skip the computation it would parametrize.
mod kde;
mod parametric;
mod source;

use std::cell::RefCell;
use std::path::PathBuf;

use indexmap::IndexMap;
use log::trace;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution as _;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Deserialize;

pub use kde::GaussianKde;
pub use parametric::ParametricFamily;

use crate::error::EpiError;
use crate::numeric::clamp_probability;

/// The parameter-file form of a distribution. Only the fields relevant to `dist_type` are read.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    #[serde(default)]
    pub dist_type: Option<String>,
    /// `constant`
    #[serde(default)]
    pub constant: Option<f64>,
    /// `empirical`: inline sample
    #[serde(default)]
    pub data: Option<Vec<f64>>,
    /// `empirical` / `weights`: data file
    #[serde(default)]
    pub filename: Option<PathBuf>,
    /// `empirical`: kernel bandwidth factor replacing Scott's rule
    #[serde(default)]
    pub bandwidth: Option<f64>,
    /// `weights`
    #[serde(default)]
    pub values: Option<Vec<f64>>,
    /// `weights`
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
    /// `numpy`: the family name
    #[serde(default)]
    pub dist_name: Option<String>,
    /// `numpy`: keyword arguments of the family
    #[serde(default)]
    pub kwargs: IndexMap<String, f64>,
}

impl DistributionConfig {
    #[must_use]
    pub fn none() -> Self {
        DistributionConfig::default()
    }

    #[must_use]
    pub fn constant(value: f64) -> Self {
        DistributionConfig {
            dist_type: Some("constant".to_string()),
            constant: Some(value),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn empirical(data: Vec<f64>) -> Self {
        DistributionConfig {
            dist_type: Some("empirical".to_string()),
            data: Some(data),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn weights(values: Vec<f64>, probabilities: Vec<f64>) -> Self {
        DistributionConfig {
            dist_type: Some("weights".to_string()),
            values: Some(values),
            probabilities: Some(probabilities),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn numpy(dist_name: &str, kwargs: &[(&str, f64)]) -> Self {
        DistributionConfig {
            dist_type: Some("numpy".to_string()),
            dist_name: Some(dist_name.to_string()),
            kwargs: kwargs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    /// Whether this config builds the *none* distribution.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self.dist_type.as_deref(), None | Some("None" | "none"))
    }
}

/// A finite table of values drawn with replacement according to their probabilities.
#[derive(Debug, Clone)]
pub struct WeightedTable {
    values: Vec<f64>,
    index: WeightedIndex<f64>,
}

impl WeightedTable {
    pub fn new(values: Vec<f64>, probabilities: &[f64], source: &str) -> Result<Self, EpiError> {
        let failure = |reason: String| EpiError::DistributionError {
            source: source.to_string(),
            reason,
        };
        if values.len() != probabilities.len() {
            return Err(failure(format!(
                "{} values but {} probabilities",
                values.len(),
                probabilities.len()
            )));
        }
        let index = WeightedIndex::new(probabilities).map_err(|e| failure(e.to_string()))?;
        Ok(WeightedTable { values, index })
    }
}

#[derive(Debug, Clone)]
pub enum DistributionKind {
    None,
    Constant(f64),
    Empirical(GaussianKde),
    Weights(WeightedTable),
    Numpy(ParametricFamily),
}

#[derive(Debug, Clone)]
pub struct Distribution {
    kind: DistributionKind,
    rng: RefCell<SmallRng>,
}

impl Distribution {
    /// Builds the distribution described by `config`, seeding its stream with `seed`.
    pub fn new(config: &DistributionConfig, seed: u64) -> Result<Self, EpiError> {
        let kind = match config.dist_type.as_deref() {
            None | Some("None" | "none") => DistributionKind::None,
            Some("constant") => DistributionKind::Constant(config.constant.unwrap_or(0.0)),
            Some("empirical") => {
                let (data, source) = match (&config.data, &config.filename) {
                    (Some(data), _) => (data.clone(), "inline data".to_string()),
                    (None, Some(path)) => {
                        let mut columns = source::read_columns(path, 1)?;
                        (columns.swap_remove(0), path.display().to_string())
                    }
                    (None, None) => {
                        return Err(EpiError::ConfigurationError(
                            "an empirical distribution needs `data` or `filename`".to_string(),
                        ))
                    }
                };
                DistributionKind::Empirical(GaussianKde::fit(data, config.bandwidth, &source)?)
            }
            Some("weights") => {
                let table = match (&config.values, &config.probabilities, &config.filename) {
                    (Some(values), Some(probabilities), _) => {
                        WeightedTable::new(values.clone(), probabilities, "inline data")?
                    }
                    (None, None, Some(path)) => {
                        let mut columns = source::read_columns(path, 2)?;
                        let probabilities = columns.pop().unwrap_or_default();
                        let values = columns.pop().unwrap_or_default();
                        WeightedTable::new(values, &probabilities, &path.display().to_string())?
                    }
                    _ => {
                        return Err(EpiError::ConfigurationError(
                            "a weights distribution needs `values` and `probabilities`, or `filename`"
                                .to_string(),
                        ))
                    }
                };
                DistributionKind::Weights(table)
            }
            Some("numpy") => {
                let name = config.dist_name.as_deref().ok_or_else(|| {
                    EpiError::ConfigurationError(
                        "a numpy distribution needs `dist_name`".to_string(),
                    )
                })?;
                DistributionKind::Numpy(ParametricFamily::from_kwargs(name, &config.kwargs)?)
            }
            Some(other) => {
                return Err(EpiError::ConfigurationError(format!(
                    "unknown distribution type `{other}`"
                )))
            }
        };
        trace!(
            "built {} distribution (seed={seed})",
            config.dist_type.as_deref().unwrap_or("None")
        );
        Ok(Distribution {
            kind,
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
        })
    }

    /// The *none* distribution.
    #[must_use]
    pub fn none() -> Self {
        Distribution {
            kind: DistributionKind::None,
            rng: RefCell::new(SmallRng::seed_from_u64(0)),
        }
    }

    #[must_use]
    pub fn constant(value: f64) -> Self {
        Distribution {
            kind: DistributionKind::Constant(value),
            rng: RefCell::new(SmallRng::seed_from_u64(0)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &DistributionKind {
        &self.kind
    }

    /// True for the *none* distribution, whose draws are `NaN`.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self.kind, DistributionKind::None)
    }

    /// Draws a single value.
    pub fn sample_one(&self) -> f64 {
        let mut rng = self.rng.borrow_mut();
        match &self.kind {
            DistributionKind::None => f64::NAN,
            DistributionKind::Constant(value) => *value,
            DistributionKind::Empirical(kde) => kde.sample(&mut *rng),
            DistributionKind::Weights(table) => table.values[table.index.sample(&mut *rng)],
            DistributionKind::Numpy(family) => family.sample(&mut *rng),
        }
    }

    /// Draws `size` values.
    pub fn sample(&self, size: usize) -> Vec<f64> {
        (0..size).map(|_| self.sample_one()).collect()
    }

    /// Draws `size` absolute values.
    pub fn sample_positive(&self, size: usize) -> Vec<f64> {
        (0..size).map(|_| self.sample_one().abs()).collect()
    }

    /// Draws a single absolute value.
    pub fn sample_positive_one(&self) -> f64 {
        self.sample_one().abs()
    }

    /// Draws a probability (absolute value clamped to `[0, 1]`). Returns `None` for the *none*
    /// distribution without consuming randomness.
    pub fn sample_probability(&self) -> Option<f64> {
        if self.is_none() {
            None
        } else {
            Some(clamp_probability(self.sample_positive_one()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn constant_defaults_to_zero() {
        let config = DistributionConfig {
            dist_type: Some("constant".to_string()),
            ..Default::default()
        };
        let distribution = Distribution::new(&config, 1).unwrap();
        assert_eq!(distribution.sample(3), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn none_yields_nan_and_skips_probabilities() {
        for dist_type in [None, Some("None".to_string())] {
            let config = DistributionConfig {
                dist_type,
                ..Default::default()
            };
            let distribution = Distribution::new(&config, 1).unwrap();
            assert!(distribution.is_none());
            assert!(distribution.sample_one().is_nan());
            assert_eq!(distribution.sample_probability(), None);
        }
    }

    #[test]
    fn unknown_type_is_a_configuration_error() {
        let config = DistributionConfig {
            dist_type: Some("lognormalish".to_string()),
            ..Default::default()
        };
        let error = Distribution::new(&config, 1).unwrap_err();
        assert!(matches!(error, EpiError::ConfigurationError(m) if m.contains("lognormalish")));
    }

    #[test]
    fn same_seed_same_draws() {
        let config = DistributionConfig::numpy("gamma", &[("shape", 2.0), ("scale", 3.0)]);
        let a = Distribution::new(&config, 99).unwrap();
        let b = Distribution::new(&config, 99).unwrap();
        assert_eq!(a.sample(20), b.sample(20));
        let c = Distribution::new(&config, 100).unwrap();
        assert_ne!(a.sample(20), c.sample(20));
    }

    #[test]
    fn sample_positive_is_absolute() {
        let config = DistributionConfig::numpy("normal", &[("loc", -5.0), ("scale", 1.0)]);
        let distribution = Distribution::new(&config, 4).unwrap();
        assert!(distribution.sample_positive(50).iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn weights_only_returns_table_values() {
        let config = DistributionConfig::weights(vec![1.0, 5.0, 9.0], vec![0.2, 0.0, 0.8]);
        let distribution = Distribution::new(&config, 5).unwrap();
        for x in distribution.sample(200) {
            assert!(x == 1.0 || x == 9.0);
        }
    }

    #[test]
    fn weights_length_mismatch_is_rejected() {
        let config = DistributionConfig::weights(vec![1.0, 5.0], vec![1.0]);
        assert!(matches!(
            Distribution::new(&config, 5),
            Err(EpiError::DistributionError { .. })
        ));
    }

    #[test]
    fn weights_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "3,0.5\n4,0.5").unwrap();
        let config = DistributionConfig {
            dist_type: Some("weights".to_string()),
            filename: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let distribution = Distribution::new(&config, 5).unwrap();
        assert!(distribution.sample(50).iter().all(|x| *x == 3.0 || *x == 4.0));
    }

    #[test]
    fn empirical_from_file_failure_names_the_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "7.0").unwrap();
        let config = DistributionConfig {
            dist_type: Some("empirical".to_string()),
            filename: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let error = Distribution::new(&config, 5).unwrap_err();
        assert!(
            matches!(error, EpiError::DistributionError { source, .. } if source == file.path().display().to_string())
        );
    }

    #[test]
    fn empirical_inline_centers_on_data() {
        let config = DistributionConfig::empirical(vec![4.0, 5.0, 6.0, 5.0, 4.5, 5.5]);
        let distribution = Distribution::new(&config, 12).unwrap();
        let mean = distribution.sample(2000).iter().sum::<f64>() / 2000.0;
        assert!((mean - 5.0).abs() < 0.2);
    }

    #[test]
    fn probability_is_clamped() {
        let distribution = Distribution::constant(-3.0);
        assert_eq!(distribution.sample_probability(), Some(1.0));
        let distribution = Distribution::constant(0.25);
        assert_eq!(distribution.sample_probability(), Some(0.25));
    }

    #[test]
    fn parses_from_json() {
        let config: DistributionConfig = serde_json::from_str(
            r#"{"dist_type": "numpy", "dist_name": "uniform", "kwargs": {"low": 1.0, "high": 2.0}}"#,
        )
        .unwrap();
        let distribution = Distribution::new(&config, 0).unwrap();
        assert!(distribution.sample(20).iter().all(|x| (1.0..2.0).contains(x)));
    }
}
