//! Mobility restrictions.
//!
//! Two kinds of policy restrict mobility groups. Tracing policies watch a population counter and
//! switch on and off with hysteresis; cyclic policies alternate restricted and unrestricted
//! phases per mobility group inside a global time window. Every evaluation is appended to a
//! [`RestrictionLog`], which is also where tracing policies read their own history back from.
//!
//! An agent of a restricted group that does not adhere to the restriction is confined: it stops
//! moving and its transmission reduction factor is divided by β until the restriction ends.
mod cyclic;
mod tracing;

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalogs, DiseaseCatalog, GroupId};
use crate::context::Context;
use crate::define_data_plugin;
use crate::error::EpiError;
use crate::parameters::Parameters;
use crate::population::Population;
use crate::{HashSet, HashSetExt};

pub use cyclic::CyclicPhase;
pub use tracing::{next_status, TracingState};

/// The population count a tracing policy watches.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MonitoredCounter {
    /// Every agent that ever died.
    Dead,
    /// Living agents in an infected state.
    Infected,
    Diagnosed,
    Hospitalized,
    Icu,
}

impl MonitoredCounter {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn count(self, population: &Population, disease: &DiseaseCatalog) -> f64 {
        let alive = |row: usize| !population.is_dead[row];
        (0..population.len())
            .filter(|&row| match self {
                MonitoredCounter::Dead => population.is_dead[row],
                MonitoredCounter::Infected => {
                    alive(row) && disease.get(population.disease_state[row]).is_infected
                }
                MonitoredCounter::Diagnosed => alive(row) && population.is_diagnosed[row],
                MonitoredCounter::Hospitalized => population.is_hospitalized[row],
                MonitoredCounter::Icu => population.is_in_icu[row],
            })
            .count() as f64
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RestrictionStatus {
    Enabled,
    Disabled,
}

/// One evaluation of one policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestrictionLogEntry {
    pub step: u64,
    pub time: f64,
    pub policy: String,
    pub status: RestrictionStatus,
    /// The monitored counter for tracing policies, the end of the current phase for cyclic ones.
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestrictionLog {
    rows: Vec<RestrictionLogEntry>,
}

impl RestrictionLog {
    #[must_use]
    pub fn rows(&self) -> &[RestrictionLogEntry] {
        &self.rows
    }

    pub fn push(&mut self, entry: RestrictionLogEntry) {
        self.rows.push(entry);
    }

    /// The most recent row of `policy`.
    #[must_use]
    pub fn latest(&self, policy: &str) -> Option<&RestrictionLogEntry> {
        self.rows.iter().rev().find(|row| row.policy == policy)
    }

    /// When the current run of `enabled` rows of `policy` began. `None` if the policy is not
    /// enabled.
    #[must_use]
    pub fn enabled_since(&self, policy: &str) -> Option<f64> {
        let mut since = None;
        for row in self.rows.iter().rev().filter(|row| row.policy == policy) {
            if row.status != RestrictionStatus::Enabled {
                break;
            }
            since = Some(row.time);
        }
        since
    }

    /// Writes the log as CSV with a header row.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), EpiError> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Policy bookkeeping carried from step to step.
#[derive(Clone, Debug, Default)]
pub struct RestrictionState {
    pub tracing: Vec<TracingState>,
    /// `None` until the cyclic window opens, and again after it closes.
    pub cyclic: Vec<Option<CyclicPhase>>,
    pub log: RestrictionLog,
}

/// Enough of a [`RestrictionState`] to undo the updates made after it was taken.
#[derive(Clone, Debug, Default)]
pub struct RestrictionCheckpoint {
    tracing: Vec<TracingState>,
    cyclic: Vec<Option<CyclicPhase>>,
    log_len: usize,
}

impl RestrictionState {
    #[must_use]
    pub fn checkpoint(&self) -> RestrictionCheckpoint {
        RestrictionCheckpoint {
            tracing: self.tracing.clone(),
            cyclic: self.cyclic.clone(),
            log_len: self.log.rows.len(),
        }
    }

    /// Returns to `checkpoint`, dropping the log rows written since.
    pub fn rollback(&mut self, checkpoint: RestrictionCheckpoint) {
        self.tracing = checkpoint.tracing;
        self.cyclic = checkpoint.cyclic;
        self.log.rows.truncate(checkpoint.log_len);
    }
}

/// What one restriction update changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestrictionUpdate {
    pub enabled_policies: Vec<String>,
    pub restricted_groups: Vec<GroupId>,
    pub confined: usize,
    pub released: usize,
}

/// Evaluates every policy and confines or releases agents accordingly.
pub struct RestrictionStep<'a> {
    context: &'a Context,
    catalogs: &'a Catalogs,
    dt: f64,
    beta: f64,
}

impl<'a> RestrictionStep<'a> {
    #[must_use]
    pub fn new(context: &'a Context, catalogs: &'a Catalogs, parameters: &Parameters) -> Self {
        RestrictionStep {
            context,
            catalogs,
            dt: parameters.dt,
            beta: parameters.beta,
        }
    }

    pub fn run(
        &self,
        state: &mut RestrictionState,
        population: &mut Population,
        step: u64,
        time: f64,
    ) -> RestrictionUpdate {
        let policies = &self.catalogs.tracing_policies;
        state.tracing.resize(policies.len(), TracingState::default());
        let mut update = RestrictionUpdate::default();
        let mut enabled = Vec::new();
        for (policy, tracker) in policies.iter().zip(state.tracing.iter_mut()) {
            let value = policy.counter.count(population, &self.catalogs.disease);
            let previous = state.log.latest(&policy.name).map(|row| row.status);
            let status = next_status(policy, tracker, value, time, &state.log);
            if previous.unwrap_or(RestrictionStatus::Disabled) != status {
                info!(
                    "tracing policy {} {status} at t={time} ({} = {value})",
                    policy.name, policy.counter
                );
            }
            state.log.push(RestrictionLogEntry {
                step,
                time,
                policy: policy.name.clone(),
                status,
                value,
            });
            if status == RestrictionStatus::Enabled {
                enabled.push(policy);
                update.enabled_policies.push(policy.name.clone());
            }
        }

        let mut restricted_groups = HashSet::new();
        if let Some(schedule) = &self.catalogs.cyclic {
            state.cyclic.resize(schedule.groups.len(), None);
            let active = schedule.is_active(time);
            for (group, phase) in schedule.groups.iter().zip(state.cyclic.iter_mut()) {
                if !active {
                    *phase = None;
                    continue;
                }
                let current = match phase {
                    Some(current) => {
                        if current.advance(group, time, self.dt) {
                            debug!(
                                "cyclic restriction of {} switched to restricted={}",
                                group.name, current.restricted
                            );
                        }
                        *current
                    }
                    None => *phase.insert(CyclicPhase::start(group, time, self.dt)),
                };
                if current.restricted {
                    restricted_groups.insert(group.mobility_group);
                }
                state.log.push(RestrictionLogEntry {
                    step,
                    time,
                    policy: format!("cyclic.{}", group.name),
                    status: if current.restricted {
                        RestrictionStatus::Enabled
                    } else {
                        RestrictionStatus::Disabled
                    },
                    value: current.ends_at,
                });
            }
        }

        let restricted = |group: Option<GroupId>| {
            enabled.iter().any(|policy| policy.restricts(group))
                || group.is_some_and(|group| restricted_groups.contains(&group))
        };
        let (confined, released) = self.confine(population, restricted);
        update.confined = confined;
        update.released = released;
        update.restricted_groups = restricted_groups.into_iter().collect();
        update.restricted_groups.sort();
        update
    }

    /// Confines the non-adherent agents of restricted groups and releases everyone else.
    /// Hospitalized and dead agents are left alone. Returns the numbers confined and released.
    pub fn confine(
        &self,
        population: &mut Population,
        restricted: impl Fn(Option<GroupId>) -> bool,
    ) -> (usize, usize) {
        let mut confined = 0;
        let mut released = 0;
        for row in 0..population.len() {
            if population.is_dead[row] || population.is_hospitalized[row] {
                continue;
            }
            let confine =
                restricted(population.mobility_group[row]) && !population.adheres_to_restriction[row];
            if confine && !population.is_confined[row] {
                population.is_confined[row] = true;
                population.transmission_reduction_factor[row] /= self.beta;
                confined += 1;
            } else if !confine && population.is_confined[row] {
                population.is_confined[row] = false;
                population.transmission_reduction_factor[row] *= self.beta;
                population.adheres_to_restriction[row] = self
                    .catalogs
                    .restriction_adherence
                    .draw_adherence(self.context, population.restriction_adherence_group[row]);
                released += 1;
            }
        }
        (confined, released)
    }
}

define_data_plugin!(RestrictionPlugin, RestrictionState, RestrictionState::default());

pub trait ContextRestrictionExt {
    /// Clears every policy's history.
    fn reset_restrictions(&mut self);

    /// Removes the restriction state for an update; hand it back with `set_restriction_state`.
    fn take_restriction_state(&mut self) -> RestrictionState;

    fn set_restriction_state(&mut self, state: RestrictionState);

    fn restriction_checkpoint(&self) -> RestrictionCheckpoint;

    fn rollback_restrictions(&mut self, checkpoint: RestrictionCheckpoint);

    fn get_restriction_log(&self) -> Option<&RestrictionLog>;
}

impl ContextRestrictionExt for Context {
    fn reset_restrictions(&mut self) {
        self.set_restriction_state(RestrictionState::default());
    }

    fn take_restriction_state(&mut self) -> RestrictionState {
        std::mem::take(self.get_data_mut(RestrictionPlugin))
    }

    fn set_restriction_state(&mut self, state: RestrictionState) {
        *self.get_data_mut(RestrictionPlugin) = state;
    }

    fn restriction_checkpoint(&self) -> RestrictionCheckpoint {
        self.get_data(RestrictionPlugin)
            .map(RestrictionState::checkpoint)
            .unwrap_or_default()
    }

    fn rollback_restrictions(&mut self, checkpoint: RestrictionCheckpoint) {
        self.get_data_mut(RestrictionPlugin).rollback(checkpoint);
    }

    fn get_restriction_log(&self) -> Option<&RestrictionLog> {
        self.get_data(RestrictionPlugin).map(|state| &state.log)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::distribution::DistributionConfig;
    use crate::parameters::test_support::basic_parameters;
    use crate::parameters::{AdherenceGroupConfig, MobilityGroupConfig, Parameters};

    /// Basic parameters with `workers` and `others` mobility groups and a restriction adherence
    /// group nobody adheres to.
    pub(crate) fn restriction_parameters() -> Parameters {
        let mut parameters = basic_parameters();
        parameters.beta = 2.0;
        for name in ["workers", "others"] {
            parameters.mobility_groups.push(MobilityGroupConfig {
                name: name.to_string(),
                speed: DistributionConfig::constant(1.0),
                initial_angle: None,
                angle_variance: 0.0,
            });
        }
        parameters
            .restriction_adherence_groups
            .push(AdherenceGroupConfig {
                name: "defiant".to_string(),
                adherence_probability: DistributionConfig::constant(0.0),
            });
        parameters
    }
}
