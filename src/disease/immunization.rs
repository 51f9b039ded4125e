//! Linear decay of acquired immunity.
use crate::disease::DiseaseStep;
use crate::numeric::clamp_probability;
use crate::population::Population;

impl DiseaseStep<'_> {
    /// Recomputes the decay of agents flagged after a state change, then decays every tracked
    /// level by `slope * dt`. Tracking stops once the decay time is reached.
    pub fn update_immunization(&self, population: &mut Population) {
        for row in 0..population.len() {
            if population.is_dead[row] {
                continue;
            }
            if population.needs_immunization_update[row] {
                self.start_decay(population, row);
            }
            let max_time = population.immunization_max_time[row];
            if max_time.is_nan() {
                continue;
            }
            population.immunization_time[row] += self.dt;
            population.immunization_level[row] = clamp_probability(
                population.immunization_level[row] - population.immunization_slope[row] * self.dt,
            );
            if population.immunization_time[row] >= max_time {
                population.immunization_level[row] =
                    clamp_probability(population.immunization_level[row]);
                population.immunization_time[row] = f64::NAN;
                population.immunization_max_time[row] = f64::NAN;
                population.immunization_slope[row] = f64::NAN;
            }
        }
    }

    fn start_decay(&self, population: &mut Population, row: usize) {
        population.needs_immunization_update[row] = false;
        let level = population.immunization_level[row];
        let decay = &self
            .catalogs
            .disease
            .get(population.disease_state[row])
            .immunization_time;
        let max_time = if level > 0.0 && !decay.is_none() {
            decay.sample_positive_one()
        } else {
            f64::NAN
        };
        if max_time > 0.0 {
            population.immunization_time[row] = 0.0;
            population.immunization_max_time[row] = max_time;
            population.immunization_slope[row] = level / max_time;
        } else {
            population.immunization_time[row] = f64::NAN;
            population.immunization_max_time[row] = f64::NAN;
            population.immunization_slope[row] = f64::NAN;
        }
    }
}
