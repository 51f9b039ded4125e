//! The run configuration, deserialized from JSON and stored as the [`SimulationParameters`]
//! global property.
//!
//! Every validation failure found by [`Parameters::validate`] is reported in one aggregated error
//! so that a configuration can be fixed in a single pass.
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::Deserialize;

use crate::define_global_property;
use crate::distribution::DistributionConfig;
use crate::error::EpiError;
use crate::log::LoggingConfig;
use crate::movement::BoxBounds;
use crate::restrictions::MonitoredCounter;

/// How the per-agent loops are executed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Column-at-a-time passes over the whole population.
    #[default]
    Vectorized,
    /// One agent at a time.
    Iterative,
    /// Partitioned, out-of-core execution.
    Dask,
}

impl ExecutionMode {
    /// Fails unless the mode has an implementation.
    pub fn ensure_supported(self) -> Result<(), EpiError> {
        match self {
            ExecutionMode::Vectorized => Ok(()),
            other => Err(EpiError::UnsupportedModeError(other.to_string())),
        }
    }
}

impl Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionMode::Vectorized => "vectorized",
            ExecutionMode::Iterative => "iterative",
            ExecutionMode::Dask => "dask",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ExecutionMode {
    type Err = EpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vectorized" => Ok(ExecutionMode::Vectorized),
            "iterative" => Ok(ExecutionMode::Iterative),
            "dask" => Ok(ExecutionMode::Dask),
            _ => Err(EpiError::invalid_fields(&["execution_mode"])),
        }
    }
}

/// A configured disease state.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DiseaseGroupConfig {
    pub name: String,
    #[serde(default)]
    pub can_get_infected: bool,
    #[serde(default)]
    pub is_infected: bool,
    #[serde(default)]
    pub can_spread: bool,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub spread_radius: Option<f64>,
    #[serde(default)]
    pub spread_probability: Option<f64>,
    /// Susceptible agents steer away from agents in this state within the radius.
    #[serde(default)]
    pub avoidance_radius: Option<f64>,
    #[serde(default)]
    pub diagnosis_probability: DistributionConfig,
    #[serde(default)]
    pub isolation_days: DistributionConfig,
    #[serde(default)]
    pub hospitalization_probability: DistributionConfig,
    #[serde(default)]
    pub icu_probability: DistributionConfig,
    #[serde(default)]
    pub immunization_time: DistributionConfig,
}

/// One outgoing edge of the natural history.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransitionEntryConfig {
    pub to: String,
    pub probability: f64,
    #[serde(default)]
    pub immunization_gain: f64,
}

/// The exits of a disease state for one vulnerability group, or for every group when
/// `vulnerability_group` is absent.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransitionConfig {
    #[serde(default)]
    pub vulnerability_group: Option<String>,
    pub disease_state: String,
    /// Residence time before a transition is attempted.
    #[serde(default)]
    pub time: DistributionConfig,
    #[serde(default)]
    pub transitions: Vec<TransitionEntryConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MobilityGroupConfig {
    pub name: String,
    #[serde(default)]
    pub speed: DistributionConfig,
    /// Initial heading. Uniform on `[0, 2π)` when absent.
    #[serde(default)]
    pub initial_angle: Option<DistributionConfig>,
    /// Variance of the heading change applied on every velocity update.
    #[serde(default)]
    pub angle_variance: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AdherenceGroupConfig {
    pub name: String,
    #[serde(default)]
    pub adherence_probability: DistributionConfig,
}

/// Restricts mobility groups while a monitored counter is high.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TracingPolicyConfig {
    pub name: String,
    pub counter: MonitoredCounter,
    pub start_level: f64,
    #[serde(default)]
    pub stop_level: Option<f64>,
    /// Time after which an enabled policy lifts for good.
    #[serde(default)]
    pub stop_after: Option<f64>,
    /// Restricted mobility groups. Empty means every group.
    #[serde(default)]
    pub mobility_groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CyclicGroupConfig {
    pub mobility_group: String,
    /// Length of each restricted phase.
    pub restricted: DistributionConfig,
    /// Length of each unrestricted phase.
    pub unrestricted: DistributionConfig,
    #[serde(default = "default_true")]
    pub start_restricted: bool,
}

/// Alternating restricted and unrestricted phases inside `[start_time + grace_time, end_time)`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CyclicRestrictionConfig {
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub grace_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    pub groups: Vec<CyclicGroupConfig>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    pub seed: u64,
    pub dt: f64,
    pub max_time: f64,
    #[serde(rename = "box")]
    pub bounds: BoxBounds,
    /// Transmission reduction divisor applied by isolation and confinement.
    #[serde(default = "default_one")]
    pub beta: f64,
    /// Transmission reduction multiplier applied to hospitalized agents outside the ICU.
    #[serde(default = "default_one")]
    pub alpha: f64,
    #[serde(default)]
    pub hospital_capacity: u32,
    #[serde(default)]
    pub icu_capacity: u32,
    #[serde(default)]
    pub tracing_radius: Option<f64>,
    pub infection_state: String,
    #[serde(default)]
    pub execution_mode: Option<String>,
    /// Velocities are re-randomized every this many steps. Zero disables updates.
    #[serde(default)]
    pub velocity_update_period: u64,
    pub disease_groups: Vec<DiseaseGroupConfig>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
    #[serde(default)]
    pub vulnerability_groups: Vec<String>,
    #[serde(default)]
    pub mobility_groups: Vec<MobilityGroupConfig>,
    #[serde(default)]
    pub isolation_adherence_groups: Vec<AdherenceGroupConfig>,
    #[serde(default)]
    pub restriction_adherence_groups: Vec<AdherenceGroupConfig>,
    #[serde(default)]
    pub tracing_policies: Vec<TracingPolicyConfig>,
    #[serde(default)]
    pub cyclic_restrictions: Option<CyclicRestrictionConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: Option<f64>) -> bool {
    value.is_none_or(|v| v.is_finite() && v >= 0.0)
}

impl Parameters {
    /// The configured execution mode, `vectorized` when unset.
    pub fn execution_mode(&self) -> Result<ExecutionMode, EpiError> {
        self.execution_mode
            .as_deref()
            .map_or(Ok(ExecutionMode::default()), str::parse)
    }

    /// Checks the scalar fields. Cross references between groups are checked when the catalogs
    /// are resolved.
    pub fn validate(&self) -> Result<(), EpiError> {
        let mut invalid = Vec::new();
        if !positive(self.dt) {
            invalid.push("dt");
        }
        if !(self.max_time.is_finite() && self.max_time >= 0.0) {
            invalid.push("max_time");
        }
        if !self.bounds.is_valid() {
            invalid.push("box");
        }
        if !positive(self.beta) {
            invalid.push("beta");
        }
        if !positive(self.alpha) {
            invalid.push("alpha");
        }
        if !non_negative(self.tracing_radius) {
            invalid.push("tracing_radius");
        }
        if self.disease_groups.is_empty() {
            invalid.push("disease_groups");
        }
        for group in &self.disease_groups {
            if !non_negative(group.spread_radius)
                || !non_negative(group.avoidance_radius)
                || !group
                    .spread_probability
                    .is_none_or(|p| (0.0..=1.0).contains(&p))
            {
                invalid.push("disease_groups");
                break;
            }
        }
        for group in &self.mobility_groups {
            if !(group.angle_variance.is_finite() && group.angle_variance >= 0.0) {
                invalid.push("mobility_groups");
                break;
            }
        }
        for rule in &self.transitions {
            let total: f64 = rule.transitions.iter().map(|t| t.probability).sum();
            let entries_valid = rule.transitions.iter().all(|t| {
                (0.0..=1.0).contains(&t.probability) && (0.0..=1.0).contains(&t.immunization_gain)
            });
            if !entries_valid || total > 1.0 + crate::numeric::ACC {
                invalid.push("transitions");
                break;
            }
        }

        let mut errors = Vec::new();
        if !invalid.is_empty() {
            invalid.dedup();
            errors.push(EpiError::invalid_fields(&invalid));
        }
        if let Err(error) = self.execution_mode() {
            errors.push(error);
        }
        match EpiError::aggregate(errors) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

define_global_property!(SimulationParameters, Parameters, Parameters::validate);
