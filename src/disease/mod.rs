//! The disease state machine.
//!
//! One [`DiseaseStep`] advances every agent by `dt`: contagion between neighbors, residence
//! timing and transitions of the natural history, then diagnosis, isolation, hospital admission
//! and immunization decay.
mod hospital;
mod immunization;
mod isolation;

use log::trace;

use crate::catalog::{Catalogs, DiseaseStateId, StateKey};
use crate::context::Context;
use crate::define_rng;
use crate::numeric::clamp_probability;
use crate::parameters::Parameters;
use crate::population::Population;
use crate::random::ContextRandomExt;

pub use hospital::{Admissions, ContextHealthcareExt, HealthcareCapacity};
pub use isolation::IsolationChanges;

define_rng!(ContagionRng);
define_rng!(TransitionRng);

/// Counts of what happened during one disease step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiseaseOutcome {
    pub new_infections: usize,
    pub transitions: usize,
    pub deaths: usize,
    pub new_diagnoses: usize,
    pub new_isolations: usize,
    pub releases: usize,
    pub admitted_hospital: usize,
    pub admitted_icu: usize,
    pub overflow_deaths: usize,
}

/// The per-step disease update, borrowing the run's random streams and catalogs.
pub struct DiseaseStep<'a> {
    context: &'a Context,
    catalogs: &'a Catalogs,
    dt: f64,
    beta: f64,
    alpha: f64,
}

impl<'a> DiseaseStep<'a> {
    #[must_use]
    pub fn new(context: &'a Context, catalogs: &'a Catalogs, parameters: &Parameters) -> Self {
        DiseaseStep {
            context,
            catalogs,
            dt: parameters.dt,
            beta: parameters.beta,
            alpha: parameters.alpha,
        }
    }

    /// Runs the whole step on `population`. Neighbor sets must be current.
    pub fn run(
        &self,
        population: &mut Population,
        capacity: &mut HealthcareCapacity,
    ) -> DiseaseOutcome {
        let mut outcome = DiseaseOutcome {
            new_infections: self.spread(population, capacity),
            ..DiseaseOutcome::default()
        };
        let (transitions, deaths) = self.advance(population, capacity);
        outcome.transitions = transitions;
        outcome.deaths = deaths;

        let diagnosed = self.diagnose(population);
        outcome.new_diagnoses = diagnosed.len();
        let isolation = self.isolate(population, &diagnosed);
        outcome.new_isolations = isolation.isolated;
        outcome.releases = isolation.released;

        let admissions = self.hospitalize(population, capacity);
        outcome.admitted_hospital = admissions.hospital.len();
        outcome.admitted_icu = admissions.icu.len();
        outcome.overflow_deaths = admissions.overflow_deaths.len();

        self.update_immunization(population);
        trace!("disease step: {outcome:?}");
        outcome
    }

    /// Exposes every susceptible agent to its spreading neighbors. Exposures are decided against
    /// the states at the start of the step and applied afterwards. Returns the number infected.
    pub fn spread(&self, population: &mut Population, capacity: &mut HealthcareCapacity) -> usize {
        let disease = &self.catalogs.disease;
        let mut infected = Vec::new();
        for row in 0..population.len() {
            if population.is_dead[row] || !disease.get(population.disease_state[row]).can_get_infected
            {
                continue;
            }
            let susceptibility = population.transmission_reduction_factor[row]
                * (1.0 - population.immunization_level[row]);
            for neighbor in &population.neighbors[row].infectious_spreading {
                let source = disease.get(population.disease_state[neighbor.row]);
                if source
                    .spread_radius
                    .is_some_and(|radius| neighbor.distance_squared > radius * radius)
                {
                    continue;
                }
                let p = clamp_probability(
                    source.spread_probability
                        * population.transmission_reduction_factor[neighbor.row]
                        * susceptibility,
                );
                if self.context.sample_bool(ContagionRng, p) {
                    infected.push(row);
                    break;
                }
            }
        }

        let infection_state = disease.infection_state();
        for &row in &infected {
            self.enter_state(population, capacity, row, infection_state, 0.0);
            population.times_infected[row] += 1;
        }
        infected.len()
    }

    /// Adds `dt` to every living agent's residence time and fires the transitions that are due.
    /// Returns the number of transitions and how many of them were deaths.
    pub fn advance(
        &self,
        population: &mut Population,
        capacity: &mut HealthcareCapacity,
    ) -> (usize, usize) {
        let mut transitions = 0;
        let mut deaths = 0;
        for row in 0..population.len() {
            if population.is_dead[row] {
                continue;
            }
            if population.needs_max_time[row] {
                self.draw_residence_time(population, row);
            }
            population.disease_state_time[row] += self.dt;
            let max_time = population.disease_state_max_time[row];
            if !max_time.is_nan()
                && population.disease_state_time[row] > max_time
                && self.attempt_transition(population, capacity, row)
            {
                transitions += 1;
                if population.is_dead[row] {
                    deaths += 1;
                }
            }
        }
        (transitions, deaths)
    }

    /// Draws the destination of a due transition. When the residual probability is drawn the
    /// agent stays and gets a fresh residence time.
    fn attempt_transition(
        &self,
        population: &mut Population,
        capacity: &mut HealthcareCapacity,
        row: usize,
    ) -> bool {
        let key = StateKey {
            vulnerability: population.vulnerability_group[row],
            state: population.disease_state[row],
        };
        let u: f64 = self.context.sample_range(TransitionRng, 0.0..1.0);
        let chosen = self
            .catalogs
            .natural_history
            .get(key)
            .and_then(|rules| rules.choose(u))
            .map(|transition| (transition.to, transition.immunization_gain));
        match chosen {
            Some((to, gain)) => {
                self.enter_state(population, capacity, row, to, gain);
                true
            }
            None => {
                self.draw_residence_time(population, row);
                false
            }
        }
    }

    /// Draws how long the agent stays in its current state. States without timed exits get
    /// `NaN`.
    fn draw_residence_time(&self, population: &mut Population, row: usize) {
        let key = StateKey {
            vulnerability: population.vulnerability_group[row],
            state: population.disease_state[row],
        };
        let max_time = self
            .catalogs
            .natural_history
            .get(key)
            .filter(|rules| !rules.residence_time.is_none())
            .map_or(f64::NAN, |rules| rules.residence_time.sample_positive_one());
        population.disease_state_max_time[row] = max_time;
        population.disease_state_time[row] = 0.0;
        population.needs_max_time[row] = false;
    }

    /// Moves the agent into `to`, adding `immunization_gain` to its immunization level.
    pub fn enter_state(
        &self,
        population: &mut Population,
        capacity: &mut HealthcareCapacity,
        row: usize,
        to: DiseaseStateId,
        immunization_gain: f64,
    ) {
        population.disease_state[row] = to;
        population.immunization_level[row] =
            clamp_probability(population.immunization_level[row] + immunization_gain);
        population.needs_immunization_update[row] = true;

        let state = self.catalogs.disease.get(to);
        if state.is_dead {
            self.kill(population, capacity, row);
            return;
        }
        self.draw_residence_time(population, row);
        if !state.is_infected {
            population.is_diagnosed[row] = false;
            self.release_isolation(population, row);
            self.discharge(population, capacity, row);
        }
    }

    /// Marks the agent dead, frees its bed and stops it. Agents not already in a dead state are
    /// moved to the catalog's dead state.
    pub fn kill(&self, population: &mut Population, capacity: &mut HealthcareCapacity, row: usize) {
        let disease = &self.catalogs.disease;
        if !disease.get(population.disease_state[row]).is_dead {
            if let Some(dead) = disease.dead_state() {
                population.disease_state[row] = dead;
            }
        }
        population.is_dead[row] = true;
        self.discharge(population, capacity, row);
        self.release_isolation(population, row);
        if population.is_confined[row] {
            population.is_confined[row] = false;
            population.transmission_reduction_factor[row] *= self.beta;
        }
        population.disease_state_time[row] = 0.0;
        population.disease_state_max_time[row] = f64::NAN;
        population.needs_max_time[row] = false;
        crate::movement::stop_row(population, row);
    }
}


#[cfg(test)]
mod test {
    use super::test_support::{hospital_parameters, setup};
    use super::*;
    use crate::distribution::DistributionConfig;
    use crate::parameters::test_support::basic_parameters;
    use crate::parameters::{TransitionConfig, TransitionEntryConfig};
    use crate::population::test_support::frame_at;
    use crate::population::AgentId;
    use crate::spatial::compute_neighbors;

    fn recovery(probability: f64, gain: f64) -> TransitionConfig {
        TransitionConfig {
            vulnerability_group: None,
            disease_state: "infected".to_string(),
            time: DistributionConfig::constant(9.0),
            transitions: vec![TransitionEntryConfig {
                to: "recovered".to_string(),
                probability,
                immunization_gain: gain,
            }],
        }
    }

    #[test]
    fn certain_transition_fires_once_due() {
        let mut parameters = basic_parameters();
        parameters.transitions.push(recovery(1.0, 0.0));
        let (context, mut population) = setup(&parameters, &["infected"]);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();

        population.needs_max_time[0] = false;
        population.disease_state_max_time[0] = 9.0;
        population.disease_state_time[0] = 8.5;
        // 9.5 > 9 is due.
        assert_eq!(step.advance(&mut population, &mut capacity), (1, 0));
        assert_eq!(
            population.disease_state[0],
            catalogs.disease.id("recovered").unwrap()
        );
        assert_eq!(population.disease_state_time[0], 0.0);
        assert!(population.disease_state_max_time[0].is_nan());
    }

    #[test]
    fn residual_probability_keeps_the_state() {
        let mut parameters = basic_parameters();
        parameters.transitions.push(recovery(0.0, 0.0));
        let (context, mut population) = setup(&parameters, &["infected"]);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();

        population.needs_max_time[0] = false;
        population.disease_state_max_time[0] = 9.0;
        population.disease_state_time[0] = 9.0;
        assert_eq!(step.advance(&mut population, &mut capacity), (0, 0));
        assert_eq!(
            population.disease_state[0],
            catalogs.disease.id("infected").unwrap()
        );
        assert_eq!(population.disease_state_time[0], 0.0);
        assert_eq!(population.disease_state_max_time[0], 9.0);
    }

    #[test]
    fn timing_is_not_due_at_equality() {
        let mut parameters = basic_parameters();
        parameters.transitions.push(recovery(1.0, 0.0));
        let (context, mut population) = setup(&parameters, &["infected"]);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();

        // The first step draws the residence time of 9 and counts one day.
        for _ in 0..9 {
            assert_eq!(step.advance(&mut population, &mut capacity), (0, 0));
        }
        assert_eq!(population.disease_state_time[0], 9.0);
        assert_eq!(step.advance(&mut population, &mut capacity), (1, 0));
    }

    #[test]
    fn transition_gain_sets_up_immunization() {
        let mut parameters = basic_parameters();
        parameters.transitions.push(recovery(1.0, 0.7));
        let (context, mut population) = setup(&parameters, &["infected"]);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();

        population.immunization_level[0] = 0.5;
        let recovered = catalogs.disease.id("recovered").unwrap();
        step.enter_state(&mut population, &mut capacity, 0, recovered, 0.7);
        assert_eq!(population.immunization_level[0], 1.0);
        assert!(population.needs_immunization_update[0]);
    }

    #[test]
    fn leaving_infection_clears_diagnosis_and_bed() {
        let mut parameters = hospital_parameters(1.0, None);
        parameters.alpha = 0.5;
        let (context, mut population) = setup(&parameters, &["sick"]);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::new(1, 0);

        population.is_diagnosed[0] = true;
        step.hospitalize(&mut population, &mut capacity);
        assert_eq!(capacity.hospital_beds(), 0);

        let recovered = catalogs.disease.id("recovered").unwrap();
        step.enter_state(&mut population, &mut capacity, 0, recovered, 0.0);
        assert!(!population.is_diagnosed[0]);
        assert!(!population.is_hospitalized[0]);
        assert_eq!(population.transmission_reduction_factor[0], 1.0);
        assert_eq!(capacity.hospital_beds(), 1);
    }

    #[test]
    fn death_is_terminal() {
        let mut parameters = hospital_parameters(0.0, None);
        parameters.transitions.push(TransitionConfig {
            vulnerability_group: None,
            disease_state: "sick".to_string(),
            time: DistributionConfig::constant(1.0),
            transitions: vec![TransitionEntryConfig {
                to: "dead".to_string(),
                probability: 1.0,
                immunization_gain: 0.0,
            }],
        });
        let frame = frame_at(&[(1.0, 1.0)], &["sick"])
            .with_column("vx", vec![1.0])
            .with_column("vy", vec![2.0]);
        let mut context = Context::new();
        context.init_random(parameters.seed);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let mut population = Population::from_frame(&frame, &catalogs).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();

        step.advance(&mut population, &mut capacity);
        assert_eq!(step.advance(&mut population, &mut capacity), (1, 1));
        assert!(population.is_dead[0]);
        assert_eq!((population.vx[0], population.vy[0]), (0.0, 0.0));
        assert_eq!(step.advance(&mut population, &mut capacity), (0, 0));
    }

    #[test]
    fn contagion_within_spread_radius() {
        let parameters = basic_parameters();
        let mut context = Context::new();
        context.init_random(parameters.seed);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let frame = frame_at(
            &[(0.0, 0.0), (3.0, 4.0), (20.0, 20.0), (26.0, 20.0)],
            &["infected", "susceptible", "infected", "susceptible"],
        );
        let mut population = Population::from_frame(&frame, &catalogs).unwrap();
        compute_neighbors(&mut population, &catalogs.disease, 10.0).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();

        // Agent 1 is at distance 5 (inside), agent 3 at distance 6 (outside).
        assert_eq!(step.spread(&mut population, &mut capacity), 1);
        let infected = catalogs.disease.infection_state();
        assert_eq!(population.disease_state[1], infected);
        assert_eq!(population.times_infected[1], 1);
        assert_eq!(
            population.disease_state[population.row(AgentId(3)).unwrap()],
            catalogs.disease.id("susceptible").unwrap()
        );
    }

    #[test]
    fn full_immunity_blocks_contagion() {
        let parameters = basic_parameters();
        let mut context = Context::new();
        context.init_random(parameters.seed);
        let catalogs = Catalogs::from_parameters(&parameters).unwrap();
        let frame = frame_at(&[(0.0, 0.0), (1.0, 0.0)], &["infected", "susceptible"]);
        let mut population = Population::from_frame(&frame, &catalogs).unwrap();
        population.immunization_level[1] = 1.0;
        compute_neighbors(&mut population, &catalogs.disease, 5.0).unwrap();
        let step = DiseaseStep::new(&context, &catalogs, &parameters);
        let mut capacity = HealthcareCapacity::default();
        assert_eq!(step.spread(&mut population, &mut capacity), 0);
    }
}
