//! Catalogs resolved from [`Parameters`]: disease states, the natural history keyed by
//! [`StateKey`], and the vulnerability, mobility and adherence groups.
//!
//! Labels are resolved to dense ids once, when the catalogs are built, so the per-step loops only
//! index vectors. Every distribution is seeded from the run's base seed and a name describing its
//! group and role.
use log::{debug, trace};

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::distribution::{Distribution, DistributionConfig};
use crate::error::EpiError;
use crate::parameters::{AdherenceGroupConfig, Parameters};
use crate::random::{stream_seed, ContextRandomExt};
use crate::restrictions::MonitoredCounter;
use crate::{HashMap, HashMapExt};

/// Index of a disease state in the [`DiseaseCatalog`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiseaseStateId(usize);

impl DiseaseStateId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a group in a [`GroupCatalog`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

impl GroupId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Key of the natural history: transitions depend on the agent's vulnerability group and its
/// current disease state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub vulnerability: GroupId,
    pub state: DiseaseStateId,
}

#[derive(Debug, Clone)]
pub struct DiseaseState {
    pub name: String,
    pub can_get_infected: bool,
    pub is_infected: bool,
    pub can_spread: bool,
    pub is_dead: bool,
    pub spread_radius: Option<f64>,
    pub spread_probability: f64,
    pub avoidance_radius: Option<f64>,
    pub diagnosis_probability: Distribution,
    pub isolation_days: Distribution,
    pub hospitalization_probability: Distribution,
    pub icu_probability: Distribution,
    pub immunization_time: Distribution,
}

impl DiseaseState {
    /// Whether agents in this state count as infectious spreaders.
    #[must_use]
    pub fn is_spreading(&self) -> bool {
        self.is_infected && self.can_spread
    }

    /// Whether agents in this state are candidates for hospital or ICU admission.
    #[must_use]
    pub fn can_be_hospitalized(&self) -> bool {
        self.is_infected
            && !(self.hospitalization_probability.is_none() && self.icu_probability.is_none())
    }
}

#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    states: Vec<DiseaseState>,
    by_name: HashMap<String, DiseaseStateId>,
    infection_state: DiseaseStateId,
    dead_state: Option<DiseaseStateId>,
}

impl DiseaseCatalog {
    #[must_use]
    pub fn get(&self, id: DiseaseStateId) -> &DiseaseState {
        &self.states[id.0]
    }

    #[must_use]
    pub fn id(&self, name: &str) -> Option<DiseaseStateId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DiseaseStateId, &DiseaseState)> {
        self.states
            .iter()
            .enumerate()
            .map(|(index, state)| (DiseaseStateId(index), state))
    }

    /// The state newly infected agents enter.
    #[must_use]
    pub fn infection_state(&self) -> DiseaseStateId {
        self.infection_state
    }

    /// The first state flagged `is_dead`, entered on capacity overflow.
    #[must_use]
    pub fn dead_state(&self) -> Option<DiseaseStateId> {
        self.dead_state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub to: DiseaseStateId,
    pub probability: f64,
    pub immunization_gain: f64,
}

#[derive(Debug, Clone)]
pub struct TransitionRules {
    pub residence_time: Distribution,
    pub transitions: Vec<Transition>,
}

impl TransitionRules {
    /// Picks the transition whose cumulative probability interval contains `u`, a uniform draw
    /// from `[0, 1)`. The residual mass above the sum of the probabilities means no transition.
    #[must_use]
    pub fn choose(&self, u: f64) -> Option<&Transition> {
        let mut cumulative = 0.0;
        for transition in &self.transitions {
            cumulative += transition.probability;
            if u < cumulative {
                return Some(transition);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct NaturalHistory {
    rules: HashMap<StateKey, TransitionRules>,
}

impl NaturalHistory {
    #[must_use]
    pub fn get(&self, key: StateKey) -> Option<&TransitionRules> {
        self.rules.get(&key)
    }

    pub fn insert(&mut self, key: StateKey, rules: TransitionRules) -> Option<TransitionRules> {
        self.rules.insert(key, rules)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Named groups with per-group data, addressed by [`GroupId`].
#[derive(Debug, Clone)]
pub struct GroupCatalog<T> {
    names: Vec<String>,
    groups: Vec<T>,
    by_name: HashMap<String, GroupId>,
}

impl<T> Default for GroupCatalog<T> {
    fn default() -> Self {
        GroupCatalog {
            names: Vec::new(),
            groups: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<T> GroupCatalog<T> {
    /// Adds a group. Returns `None` if the name is taken.
    pub fn push(&mut self, name: &str, group: T) -> Option<GroupId> {
        if self.by_name.contains_key(name) {
            return None;
        }
        let id = GroupId(self.groups.len());
        self.names.push(name.to_string());
        self.groups.push(group);
        self.by_name.insert(name.to_string(), id);
        Some(id)
    }

    #[must_use]
    pub fn id(&self, name: &str) -> Option<GroupId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn name(&self, id: GroupId) -> &str {
        &self.names[id.0]
    }

    #[must_use]
    pub fn get(&self, id: GroupId) -> &T {
        &self.groups[id.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.groups.len()).map(GroupId)
    }
}

#[derive(Debug, Clone)]
pub struct MobilityGroup {
    pub speed: Distribution,
    pub initial_angle: Distribution,
    pub angle_variance: f64,
}

#[derive(Debug, Clone)]
pub struct AdherenceGroup {
    pub adherence_probability: Distribution,
}

define_rng!(AdherenceRng);

impl GroupCatalog<AdherenceGroup> {
    /// Rolls whether an agent of `group` adheres. Agents without a group, or whose group has no
    /// adherence distribution, always adhere.
    pub fn draw_adherence(&self, context: &Context, group: Option<GroupId>) -> bool {
        match group.and_then(|group| self.get(group).adherence_probability.sample_probability()) {
            Some(p) => context.sample_bool(AdherenceRng, p),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingPolicy {
    pub name: String,
    pub counter: MonitoredCounter,
    pub start_level: f64,
    pub stop_level: Option<f64>,
    pub stop_after: Option<f64>,
    /// Empty means every mobility group.
    pub mobility_groups: Vec<GroupId>,
}

impl TracingPolicy {
    #[must_use]
    pub fn restricts(&self, group: Option<GroupId>) -> bool {
        self.mobility_groups.is_empty()
            || group.is_some_and(|group| self.mobility_groups.contains(&group))
    }
}

#[derive(Debug, Clone)]
pub struct CyclicGroup {
    pub name: String,
    pub mobility_group: GroupId,
    pub restricted: Distribution,
    pub unrestricted: Distribution,
    pub start_restricted: bool,
}

#[derive(Debug, Clone)]
pub struct CyclicSchedule {
    pub start_time: f64,
    pub grace_time: f64,
    pub end_time: Option<f64>,
    pub groups: Vec<CyclicGroup>,
}

impl CyclicSchedule {
    /// Whether restrictions may be in force at `time`.
    #[must_use]
    pub fn is_active(&self, time: f64) -> bool {
        time >= self.start_time + self.grace_time && self.end_time.is_none_or(|end| time < end)
    }
}

/// The label every agent belongs to when no vulnerability groups are configured.
pub const DEFAULT_VULNERABILITY_GROUP: &str = "default";

#[derive(Debug, Clone)]
pub struct Catalogs {
    pub disease: DiseaseCatalog,
    pub natural_history: NaturalHistory,
    pub vulnerability: GroupCatalog<()>,
    pub mobility: GroupCatalog<MobilityGroup>,
    pub isolation_adherence: GroupCatalog<AdherenceGroup>,
    pub restriction_adherence: GroupCatalog<AdherenceGroup>,
    pub tracing_policies: Vec<TracingPolicy>,
    pub cyclic: Option<CyclicSchedule>,
    /// Neighbor query radius, at least every spread and avoidance radius.
    pub tracing_radius: f64,
}

struct Builder<'a> {
    seed: u64,
    invalid: Vec<&'a str>,
}

impl<'a> Builder<'a> {
    fn distribution(
        &self,
        config: &DistributionConfig,
        purpose: &str,
    ) -> Result<Distribution, EpiError> {
        Distribution::new(config, stream_seed(self.seed, purpose))
    }

    fn invalid(&mut self, field: &'a str) {
        if !self.invalid.contains(&field) {
            self.invalid.push(field);
        }
    }
}

impl Catalogs {
    /// Resolves every label and builds every distribution of `parameters`.
    pub fn from_parameters(parameters: &Parameters) -> Result<Catalogs, EpiError> {
        let mut builder = Builder {
            seed: parameters.seed,
            invalid: Vec::new(),
        };

        let disease = build_disease_catalog(&mut builder, parameters)?;

        let mut vulnerability = GroupCatalog::default();
        if parameters.vulnerability_groups.is_empty() {
            vulnerability.push(DEFAULT_VULNERABILITY_GROUP, ());
        }
        for name in &parameters.vulnerability_groups {
            if vulnerability.push(name, ()).is_none() {
                builder.invalid("vulnerability_groups");
            }
        }

        let natural_history =
            build_natural_history(&mut builder, parameters, &disease, &vulnerability)?;

        let mut mobility = GroupCatalog::default();
        for group in &parameters.mobility_groups {
            let initial_angle = match &group.initial_angle {
                Some(config) => config.clone(),
                None => DistributionConfig::numpy(
                    "uniform",
                    &[("low", 0.0), ("high", std::f64::consts::TAU)],
                ),
            };
            let resolved = MobilityGroup {
                speed: builder.distribution(&group.speed, &format!("mobility.{}.speed", group.name))?,
                initial_angle: builder
                    .distribution(&initial_angle, &format!("mobility.{}.angle", group.name))?,
                angle_variance: group.angle_variance,
            };
            if mobility.push(&group.name, resolved).is_none() {
                builder.invalid("mobility_groups");
            }
        }

        let isolation_adherence = build_adherence(
            &mut builder,
            &parameters.isolation_adherence_groups,
            "isolation_adherence_groups",
        )?;
        let restriction_adherence = build_adherence(
            &mut builder,
            &parameters.restriction_adherence_groups,
            "restriction_adherence_groups",
        )?;

        let mut tracing_policies = Vec::new();
        for policy in &parameters.tracing_policies {
            let mut mobility_groups = Vec::new();
            for name in &policy.mobility_groups {
                match mobility.id(name) {
                    Some(id) => mobility_groups.push(id),
                    None => builder.invalid("tracing_policies"),
                }
            }
            tracing_policies.push(TracingPolicy {
                name: policy.name.clone(),
                counter: policy.counter,
                start_level: policy.start_level,
                stop_level: policy.stop_level,
                stop_after: policy.stop_after,
                mobility_groups,
            });
        }

        let cyclic = match &parameters.cyclic_restrictions {
            None => None,
            Some(config) => {
                let mut groups = Vec::new();
                for group in &config.groups {
                    let Some(mobility_group) = mobility.id(&group.mobility_group) else {
                        builder.invalid("cyclic_restrictions");
                        continue;
                    };
                    let purpose = format!("cyclic.{}", group.mobility_group);
                    groups.push(CyclicGroup {
                        name: group.mobility_group.clone(),
                        mobility_group,
                        restricted: builder
                            .distribution(&group.restricted, &format!("{purpose}.restricted"))?,
                        unrestricted: builder
                            .distribution(&group.unrestricted, &format!("{purpose}.unrestricted"))?,
                        start_restricted: group.start_restricted,
                    });
                }
                Some(CyclicSchedule {
                    start_time: config.start_time,
                    grace_time: config.grace_time,
                    end_time: config.end_time,
                    groups,
                })
            }
        };

        if !builder.invalid.is_empty() {
            return Err(EpiError::invalid_fields(&builder.invalid));
        }

        let tracing_radius = disease
            .iter()
            .flat_map(|(_, state)| [state.spread_radius, state.avoidance_radius])
            .flatten()
            .chain(parameters.tracing_radius)
            .fold(0.0, f64::max);

        debug!(
            "resolved {} disease states, {} transition rules, tracing radius {tracing_radius}",
            disease.len(),
            natural_history.len()
        );

        Ok(Catalogs {
            disease,
            natural_history,
            vulnerability,
            mobility,
            isolation_adherence,
            restriction_adherence,
            tracing_policies,
            cyclic,
            tracing_radius,
        })
    }
}

fn build_disease_catalog<'a>(
    builder: &mut Builder<'a>,
    parameters: &Parameters,
) -> Result<DiseaseCatalog, EpiError> {
    let mut states = Vec::with_capacity(parameters.disease_groups.len());
    let mut by_name = HashMap::new();
    for group in &parameters.disease_groups {
        if by_name
            .insert(group.name.clone(), DiseaseStateId(states.len()))
            .is_some()
        {
            builder.invalid("disease_groups");
        }
        let purpose = |role: &str| format!("disease.{}.{role}", group.name);
        states.push(DiseaseState {
            name: group.name.clone(),
            can_get_infected: group.can_get_infected,
            is_infected: group.is_infected,
            can_spread: group.can_spread,
            is_dead: group.is_dead,
            spread_radius: group.spread_radius,
            spread_probability: group.spread_probability.unwrap_or(0.0),
            avoidance_radius: group.avoidance_radius,
            diagnosis_probability: builder
                .distribution(&group.diagnosis_probability, &purpose("diagnosis"))?,
            isolation_days: builder.distribution(&group.isolation_days, &purpose("isolation"))?,
            hospitalization_probability: builder
                .distribution(&group.hospitalization_probability, &purpose("hospitalization"))?,
            icu_probability: builder.distribution(&group.icu_probability, &purpose("icu"))?,
            immunization_time: builder
                .distribution(&group.immunization_time, &purpose("immunization"))?,
        });
    }

    let infection_state = match by_name.get(&parameters.infection_state) {
        Some(id) => *id,
        None => {
            builder.invalid("infection_state");
            DiseaseStateId(0)
        }
    };
    let dead_state = states
        .iter()
        .position(|state| state.is_dead)
        .map(DiseaseStateId);

    if dead_state.is_none() && states.iter().any(DiseaseState::can_be_hospitalized) {
        return Err(EpiError::ConfigurationError(
            "hospital admission is configured but no disease group is flagged `is_dead`"
                .to_string(),
        ));
    }

    Ok(DiseaseCatalog {
        states,
        by_name,
        infection_state,
        dead_state,
    })
}

fn build_natural_history<'a>(
    builder: &mut Builder<'a>,
    parameters: &Parameters,
    disease: &DiseaseCatalog,
    vulnerability: &GroupCatalog<()>,
) -> Result<NaturalHistory, EpiError> {
    let mut natural_history = NaturalHistory::default();
    // Rules for every vulnerability group go first so group-specific rules replace them.
    let mut rules: Vec<_> = parameters.transitions.iter().collect();
    rules.sort_by_key(|rule| rule.vulnerability_group.is_some());

    for rule in rules {
        let Some(state) = disease.id(&rule.disease_state) else {
            builder.invalid("transitions");
            continue;
        };
        let groups: Vec<GroupId> = match &rule.vulnerability_group {
            None => vulnerability.ids().collect(),
            Some(name) => match vulnerability.id(name) {
                Some(id) => vec![id],
                None => {
                    builder.invalid("transitions");
                    continue;
                }
            },
        };
        let mut transitions = Vec::with_capacity(rule.transitions.len());
        for entry in &rule.transitions {
            match disease.id(&entry.to) {
                Some(to) => transitions.push(Transition {
                    to,
                    probability: entry.probability,
                    immunization_gain: entry.immunization_gain,
                }),
                None => builder.invalid("transitions"),
            }
        }

        for group in groups {
            let key = StateKey {
                vulnerability: group,
                state,
            };
            let purpose = format!(
                "transition.{}.{}.time",
                vulnerability.name(group),
                rule.disease_state
            );
            let replaced = natural_history.insert(
                key,
                TransitionRules {
                    residence_time: builder.distribution(&rule.time, &purpose)?,
                    transitions: transitions.clone(),
                },
            );
            if replaced.is_some() && rule.vulnerability_group.is_some() {
                trace!("`{purpose}` overrides the rule shared by every group");
            }
        }
    }
    Ok(natural_history)
}

fn build_adherence<'a>(
    builder: &mut Builder<'a>,
    configs: &[AdherenceGroupConfig],
    field: &'a str,
) -> Result<GroupCatalog<AdherenceGroup>, EpiError> {
    let mut catalog = GroupCatalog::default();
    for group in configs {
        let resolved = AdherenceGroup {
            adherence_probability: builder.distribution(
                &group.adherence_probability,
                &format!("{field}.{}", group.name),
            )?,
        };
        if catalog.push(&group.name, resolved).is_none() {
            builder.invalid(field);
        }
    }
    Ok(catalog)
}

define_data_plugin!(CatalogPlugin, Option<Catalogs>, None);

pub trait ContextCatalogExt {
    /// Resolves and stores the catalogs of `parameters`, replacing any previous ones.
    fn init_catalogs(&mut self, parameters: &Parameters) -> Result<(), EpiError>;

    fn get_catalogs(&self) -> Result<&Catalogs, EpiError>;
}

impl ContextCatalogExt for Context {
    fn init_catalogs(&mut self, parameters: &Parameters) -> Result<(), EpiError> {
        let catalogs = Catalogs::from_parameters(parameters)?;
        *self.get_data_mut(CatalogPlugin) = Some(catalogs);
        Ok(())
    }

    fn get_catalogs(&self) -> Result<&Catalogs, EpiError> {
        self.get_data(CatalogPlugin)
            .and_then(Option::as_ref)
            .ok_or_else(|| EpiError::EpiError("catalogs are not initialized".to_string()))
    }
}
