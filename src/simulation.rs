//! The step loop.
//!
//! A step at time `step·dt` runs as five plans of the same time, ordered by [`StepPhase`]:
//! movement, indexing, disease (including restrictions), avoidance and observation. Movement
//! stages a copy of the population and the healthcare capacity, the following phases work on that
//! copy, and observation commits it. A failing phase abandons the step: the population, capacity
//! and restriction history stay as the last completed step left them.
use log::{debug, info};

use crate::catalog::ContextCatalogExt;
use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::disease::{ContextHealthcareExt, DiseaseOutcome, DiseaseStep, HealthcareCapacity};
use crate::error::EpiError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::apply_logging_config;
use crate::movement::{
    avoid, avoidance_pairs, initialize_group_velocities, move_agents, update_group_velocities,
};
use crate::numeric::ACC;
use crate::parameters::{Parameters, SimulationParameters};
use crate::plan::StepPhase;
use crate::population::{ContextPopulationExt, Population};
use crate::random::ContextRandomExt;
use crate::restrictions::{
    ContextRestrictionExt, RestrictionCheckpoint, RestrictionStep, RestrictionUpdate,
};
use crate::spatial::compute_neighbors;

define_rng!(MovementRng);

/// What happened during one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepSummary {
    pub step: u64,
    pub time: f64,
    pub moved: usize,
    /// Ordered neighbor pairs within the tracing radius.
    pub neighbor_pairs: usize,
    pub disease: DiseaseOutcome,
    pub restrictions: RestrictionUpdate,
    pub avoiding: usize,
}

/// The uncommitted state of the step in progress.
struct StagedStep {
    population: Population,
    capacity: HealthcareCapacity,
    restrictions: RestrictionCheckpoint,
}

#[derive(Default)]
struct SimulationState {
    step: u64,
    current: StepSummary,
    staged: Option<StagedStep>,
    summaries: Vec<StepSummary>,
}

define_data_plugin!(SimulationPlugin, SimulationState, SimulationState::default());

const PHASES: [StepPhase; 5] = [
    StepPhase::Movement,
    StepPhase::Indexing,
    StepPhase::Disease,
    StepPhase::Avoidance,
    StepPhase::Observation,
];

fn begin_step(context: &mut Context) -> Result<(), EpiError> {
    let staged = StagedStep {
        population: context.get_population()?.clone(),
        capacity: context.get_healthcare_capacity(),
        restrictions: context.restriction_checkpoint(),
    };
    let state = context.get_data_mut(SimulationPlugin);
    state.staged = Some(staged);
    state.current = StepSummary::default();
    Ok(())
}

/// Runs `phase` on the staged state of the step in progress.
fn with_staged_step<T>(
    context: &mut Context,
    phase: impl FnOnce(&Context, &mut StagedStep) -> Result<T, EpiError>,
) -> Result<T, EpiError> {
    let mut staged = context
        .get_data_mut(SimulationPlugin)
        .staged
        .take()
        .ok_or_else(|| EpiError::EpiError("no step is in progress".to_string()))?;
    let result = phase(context, &mut staged);
    context.get_data_mut(SimulationPlugin).staged = Some(staged);
    result
}

/// Drops the staged state and undoes the restriction updates of the step in progress.
fn abandon_step(context: &mut Context) {
    let state = context.get_data_mut(SimulationPlugin);
    state.current = StepSummary::default();
    if let Some(staged) = state.staged.take() {
        context.rollback_restrictions(staged.restrictions);
        debug!("step abandoned at t={}", context.get_current_time());
    }
}

fn parameters(context: &Context) -> Result<&Parameters, EpiError> {
    context
        .get_global_property_value(SimulationParameters)
        .ok_or_else(|| EpiError::EpiError("the simulation is not initialized".to_string()))
}

fn current_summary(context: &mut Context) -> &mut StepSummary {
    &mut context.get_data_mut(SimulationPlugin).current
}

fn movement_phase(context: &mut Context, step: u64) -> Result<(), EpiError> {
    begin_step(context)?;
    let moved = with_staged_step(context, |context, staged| {
        let population = &mut staged.population;
        let parameters = parameters(context)?;
        let catalogs = context.get_catalogs()?;
        let period = parameters.velocity_update_period;
        if period > 0 && step > 0 && step % period == 0 {
            context.sample(MovementRng, |rng| {
                update_group_velocities(population, catalogs, rng)
            })?;
        }
        move_agents(population, parameters.dt, &parameters.bounds)
    })?;
    current_summary(context).moved = moved;
    Ok(())
}

fn indexing_phase(context: &mut Context) -> Result<(), EpiError> {
    let pairs = with_staged_step(context, |context, staged| {
        let population = &mut staged.population;
        let catalogs = context.get_catalogs()?;
        compute_neighbors(population, &catalogs.disease, catalogs.tracing_radius)?;
        Ok(population.neighbors.iter().map(|sets| sets.total.len()).sum())
    })?;
    current_summary(context).neighbor_pairs = pairs;
    Ok(())
}

fn disease_phase(context: &mut Context, step: u64, time: f64) -> Result<(), EpiError> {
    let mut restrictions = context.take_restriction_state();
    let result = with_staged_step(context, |context, staged| {
        let parameters = parameters(context)?;
        let catalogs = context.get_catalogs()?;
        let outcome = DiseaseStep::new(context, catalogs, parameters)
            .run(&mut staged.population, &mut staged.capacity);
        let update = RestrictionStep::new(context, catalogs, parameters).run(
            &mut restrictions,
            &mut staged.population,
            step,
            time,
        );
        Ok((outcome, update))
    });
    context.set_restriction_state(restrictions);
    let (outcome, update) = result?;
    let summary = current_summary(context);
    summary.disease = outcome;
    summary.restrictions = update;
    Ok(())
}

fn avoidance_phase(context: &mut Context) -> Result<(), EpiError> {
    let avoiding = with_staged_step(context, |context, staged| {
        let pairs = avoidance_pairs(&staged.population, context.get_catalogs()?);
        avoid(&mut staged.population, &pairs)
    })?;
    current_summary(context).avoiding = avoiding;
    Ok(())
}

/// Commits the staged step and records its summary.
fn observation_phase(context: &mut Context, step: u64, time: f64) -> Result<StepSummary, EpiError> {
    let state = context.get_data_mut(SimulationPlugin);
    let staged = state
        .staged
        .take()
        .ok_or_else(|| EpiError::EpiError("no step is in progress".to_string()))?;
    let mut summary = std::mem::take(&mut state.current);
    summary.step = step;
    summary.time = time;
    state.summaries.push(summary.clone());
    state.step = step + 1;
    context.set_population(staged.population);
    context.set_healthcare_capacity(staged.capacity);
    debug!("step {step} at t={time}: {summary:?}");
    Ok(summary)
}

fn run_phase(context: &mut Context, phase: StepPhase, step: u64, time: f64) -> Result<(), EpiError> {
    let result = match phase {
        StepPhase::Movement => movement_phase(context, step),
        StepPhase::Indexing => indexing_phase(context),
        StepPhase::Disease => disease_phase(context, step, time),
        StepPhase::Avoidance => avoidance_phase(context),
        StepPhase::Observation => observation_phase(context, step, time).map(|_| ()),
    };
    if result.is_err() {
        abandon_step(context);
    }
    result
}

/// Whether a step starting at `time` ends within the simulated period.
fn step_fits(parameters: &Parameters, time: f64) -> bool {
    time + parameters.dt <= parameters.max_time + ACC
}

#[allow(clippy::cast_precision_loss)]
fn schedule_step(context: &mut Context, step: u64) -> Result<(), EpiError> {
    let time = step as f64 * parameters(context)?.dt;
    for phase in PHASES {
        if phase == StepPhase::Observation {
            context.add_plan_with_phase(time, phase, move |context| {
                run_phase(context, phase, step, time)?;
                let next = step + 1;
                let parameters = parameters(context)?;
                if step_fits(parameters, next as f64 * parameters.dt) {
                    schedule_step(context, next)?;
                }
                Ok(())
            });
        } else {
            context.add_plan_with_phase(time, phase, move |context| {
                run_phase(context, phase, step, time)
            });
        }
    }
    Ok(())
}

pub trait ContextSimulationExt {
    /// Validates `parameters` and sets up logging, random streams, catalogs, healthcare capacity
    /// and restriction state. A context can be initialized once.
    fn init_simulation(&mut self, parameters: Parameters) -> Result<(), EpiError>;

    fn simulation_parameters(&self) -> Result<&Parameters, EpiError>;

    /// Draws a speed and heading for every agent of every mobility group.
    fn randomize_velocities(&mut self) -> Result<usize, EpiError>;

    /// Runs the next step immediately, outside the plan queue.
    fn step(&mut self) -> Result<StepSummary, EpiError>;

    /// Plans the steps from the current one up to `max_time`.
    fn schedule_simulation(&mut self) -> Result<(), EpiError>;

    /// Schedules and executes the remaining steps. Returns the summaries of every step run so
    /// far.
    fn run_simulation(&mut self) -> Result<&[StepSummary], EpiError>;

    fn get_step_summaries(&self) -> &[StepSummary];
}

impl ContextSimulationExt for Context {
    fn init_simulation(&mut self, parameters: Parameters) -> Result<(), EpiError> {
        parameters.validate()?;
        parameters.execution_mode()?.ensure_supported()?;
        if let Some(logging) = &parameters.logging {
            apply_logging_config(logging)?;
        }
        self.init_random(parameters.seed);
        self.init_catalogs(&parameters)?;
        self.init_healthcare_capacity(parameters.hospital_capacity, parameters.icu_capacity);
        self.reset_restrictions();
        *self.get_data_mut(SimulationPlugin) = SimulationState::default();
        info!(
            "simulation initialized: dt={}, max_time={}, seed={}",
            parameters.dt, parameters.max_time, parameters.seed
        );
        self.set_global_property_value(SimulationParameters, parameters)
    }

    fn simulation_parameters(&self) -> Result<&Parameters, EpiError> {
        parameters(self)
    }

    fn randomize_velocities(&mut self) -> Result<usize, EpiError> {
        let mut population = self.get_population()?.clone();
        let catalogs = self.get_catalogs()?;
        let updated = self.sample(MovementRng, |rng| {
            initialize_group_velocities(&mut population, catalogs, rng)
        })?;
        self.set_population(population);
        Ok(updated)
    }

    #[allow(clippy::cast_precision_loss)]
    fn step(&mut self) -> Result<StepSummary, EpiError> {
        let step = self.get_data_mut(SimulationPlugin).step;
        let time = step as f64 * parameters(self)?.dt;
        for phase in &PHASES[..PHASES.len() - 1] {
            run_phase(self, *phase, step, time)?;
        }
        let summary = observation_phase(self, step, time);
        if summary.is_err() {
            abandon_step(self);
        }
        summary
    }

    #[allow(clippy::cast_precision_loss)]
    fn schedule_simulation(&mut self) -> Result<(), EpiError> {
        let step = self.get_data_mut(SimulationPlugin).step;
        let time = step as f64 * parameters(self)?.dt;
        if step_fits(parameters(self)?, time) {
            schedule_step(self, step)?;
        }
        Ok(())
    }

    fn run_simulation(&mut self) -> Result<&[StepSummary], EpiError> {
        self.get_population()?;
        self.schedule_simulation()?;
        self.execute()?;
        info!("simulation finished at t={}", self.get_current_time());
        Ok(self.get_step_summaries())
    }

    fn get_step_summaries(&self) -> &[StepSummary] {
        self.get_data(SimulationPlugin)
            .map_or(&[], |state| state.summaries.as_slice())
    }
}
