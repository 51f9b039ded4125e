//! Diagnosis and self-isolation.
use crate::define_rng;
use crate::disease::DiseaseStep;
use crate::population::Population;
use crate::random::ContextRandomExt;

define_rng!(DiagnosisRng);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IsolationChanges {
    pub isolated: usize,
    pub released: usize,
}

impl DiseaseStep<'_> {
    /// Diagnoses infected agents with the probability drawn from their state. Returns the rows
    /// diagnosed this step.
    pub fn diagnose(&self, population: &mut Population) -> Vec<usize> {
        let mut diagnosed = Vec::new();
        for row in 0..population.len() {
            if population.is_dead[row] || population.is_diagnosed[row] {
                continue;
            }
            let state = self.catalogs.disease.get(population.disease_state[row]);
            if !state.is_infected {
                continue;
            }
            if let Some(p) = state.diagnosis_probability.sample_probability() {
                if self.context.sample_bool(DiagnosisRng, p) {
                    population.is_diagnosed[row] = true;
                    diagnosed.push(row);
                }
            }
        }
        diagnosed
    }

    /// Advances running isolations, releasing the finished ones, then isolates the agents in
    /// `diagnosed` whose state has an isolation duration.
    pub fn isolate(&self, population: &mut Population, diagnosed: &[usize]) -> IsolationChanges {
        let mut changes = IsolationChanges::default();
        for row in 0..population.len() {
            if !population.is_isolated[row] {
                continue;
            }
            population.isolation_time[row] += self.dt;
            if population.isolation_time[row] > population.isolation_max_time[row] {
                self.release_isolation(population, row);
                changes.released += 1;
            }
        }

        for &row in diagnosed {
            if population.is_dead[row] || population.is_isolated[row] {
                continue;
            }
            let days = &self
                .catalogs
                .disease
                .get(population.disease_state[row])
                .isolation_days;
            if days.is_none() {
                continue;
            }
            population.is_isolated[row] = true;
            population.isolation_time[row] = 0.0;
            population.isolation_max_time[row] = days.sample_positive_one();
            population.adheres_to_isolation[row] = self
                .catalogs
                .isolation_adherence
                .draw_adherence(self.context, population.isolation_adherence_group[row]);
            if population.adheres_to_isolation[row] {
                population.transmission_reduction_factor[row] /= self.beta;
            }
            changes.isolated += 1;
        }
        changes
    }

    /// Ends the agent's isolation, if any, lifting the β reduction. The agent is left ready to
    /// isolate again: time zero, no duration and adherence re-rolled.
    pub fn release_isolation(&self, population: &mut Population, row: usize) {
        if !population.is_isolated[row] {
            return;
        }
        if population.adheres_to_isolation[row] {
            population.transmission_reduction_factor[row] *= self.beta;
        }
        population.is_isolated[row] = false;
        population.isolation_time[row] = 0.0;
        population.isolation_max_time[row] = f64::NAN;
        population.adheres_to_isolation[row] = self
            .catalogs
            .isolation_adherence
            .draw_adherence(self.context, population.isolation_adherence_group[row]);
    }
}
