//! Named parametric families, configured with numpy's names and keyword arguments.
use indexmap::IndexMap;
use rand::distr::Uniform;
use rand::Rng;
use rand_distr::{
    Beta, ChiSquared, Distribution, Exp, Gamma, LogNormal, Normal, Poisson, StudentT, Triangular,
    Weibull,
};

use crate::error::EpiError;

#[derive(Debug, Clone)]
pub enum ParametricFamily {
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Uniform(Uniform<f64>),
    Beta(Beta<f64>),
    Gamma(Gamma<f64>),
    StudentT(StudentT<f64>),
    Exponential(Exp<f64>),
    Triangular(Triangular<f64>),
    Weibull(Weibull<f64>),
    Poisson(Poisson<f64>),
    ChiSquared(ChiSquared<f64>),
}

/// Keyword arguments with their numpy defaults. `None` marks a required keyword.
struct Kwargs<'a> {
    family: &'a str,
    given: &'a IndexMap<String, f64>,
}

impl Kwargs<'_> {
    fn check_known(&self, known: &[&str]) -> Result<(), EpiError> {
        let unknown: Vec<&str> = self
            .given
            .keys()
            .map(String::as_str)
            .filter(|key| !known.contains(key))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(EpiError::ConfigurationError(format!(
                "`{}` got unexpected keyword argument(s): {}",
                self.family,
                unknown.join(", ")
            )))
        }
    }

    fn get(&self, key: &str, default: Option<f64>) -> Result<f64, EpiError> {
        self.given.get(key).copied().or(default).ok_or_else(|| {
            EpiError::ConfigurationError(format!(
                "`{}` requires the keyword argument `{key}`",
                self.family
            ))
        })
    }
}

fn invalid(family: &str, error: impl std::fmt::Display) -> EpiError {
    EpiError::ConfigurationError(format!("invalid parameters for `{family}`: {error}"))
}

impl ParametricFamily {
    /// Builds the family called `name` from its keyword arguments.
    pub fn from_kwargs(name: &str, kwargs: &IndexMap<String, f64>) -> Result<Self, EpiError> {
        let args = Kwargs {
            family: name,
            given: kwargs,
        };
        let family = match name {
            "normal" => {
                args.check_known(&["loc", "scale"])?;
                Normal::new(args.get("loc", Some(0.0))?, args.get("scale", Some(1.0))?)
                    .map(ParametricFamily::Normal)
                    .map_err(|e| invalid(name, e))?
            }
            "lognormal" => {
                args.check_known(&["mean", "sigma"])?;
                LogNormal::new(args.get("mean", Some(0.0))?, args.get("sigma", Some(1.0))?)
                    .map(ParametricFamily::LogNormal)
                    .map_err(|e| invalid(name, e))?
            }
            "uniform" => {
                args.check_known(&["low", "high"])?;
                Uniform::new(args.get("low", Some(0.0))?, args.get("high", Some(1.0))?)
                    .map(ParametricFamily::Uniform)
                    .map_err(|e| invalid(name, e))?
            }
            "beta" => {
                args.check_known(&["a", "b"])?;
                Beta::new(args.get("a", None)?, args.get("b", None)?)
                    .map(ParametricFamily::Beta)
                    .map_err(|e| invalid(name, e))?
            }
            "gamma" => {
                args.check_known(&["shape", "scale"])?;
                Gamma::new(args.get("shape", None)?, args.get("scale", Some(1.0))?)
                    .map(ParametricFamily::Gamma)
                    .map_err(|e| invalid(name, e))?
            }
            "standard_t" => {
                args.check_known(&["df"])?;
                StudentT::new(args.get("df", None)?)
                    .map(ParametricFamily::StudentT)
                    .map_err(|e| invalid(name, e))?
            }
            "exponential" => {
                args.check_known(&["scale"])?;
                let scale = args.get("scale", Some(1.0))?;
                if scale <= 0.0 {
                    return Err(invalid(name, "scale must be positive"));
                }
                Exp::new(1.0 / scale)
                    .map(ParametricFamily::Exponential)
                    .map_err(|e| invalid(name, e))?
            }
            "triangular" => {
                args.check_known(&["left", "mode", "right"])?;
                Triangular::new(
                    args.get("left", None)?,
                    args.get("right", None)?,
                    args.get("mode", None)?,
                )
                .map(ParametricFamily::Triangular)
                .map_err(|e| invalid(name, e))?
            }
            "weibull" => {
                args.check_known(&["a"])?;
                Weibull::new(1.0, args.get("a", None)?)
                    .map(ParametricFamily::Weibull)
                    .map_err(|e| invalid(name, e))?
            }
            "poisson" => {
                args.check_known(&["lam"])?;
                Poisson::new(args.get("lam", Some(1.0))?)
                    .map(ParametricFamily::Poisson)
                    .map_err(|e| invalid(name, e))?
            }
            "chisquare" => {
                args.check_known(&["df"])?;
                ChiSquared::new(args.get("df", None)?)
                    .map(ParametricFamily::ChiSquared)
                    .map_err(|e| invalid(name, e))?
            }
            other => {
                return Err(EpiError::ConfigurationError(format!(
                    "unknown distribution family `{other}`"
                )))
            }
        };
        Ok(family)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            ParametricFamily::Normal(d) => d.sample(rng),
            ParametricFamily::LogNormal(d) => d.sample(rng),
            ParametricFamily::Uniform(d) => d.sample(rng),
            ParametricFamily::Beta(d) => d.sample(rng),
            ParametricFamily::Gamma(d) => d.sample(rng),
            ParametricFamily::StudentT(d) => d.sample(rng),
            ParametricFamily::Exponential(d) => d.sample(rng),
            ParametricFamily::Triangular(d) => d.sample(rng),
            ParametricFamily::Weibull(d) => d.sample(rng),
            ParametricFamily::Poisson(d) => d.sample(rng),
            ParametricFamily::ChiSquared(d) => d.sample(rng),
        }
    }
}
