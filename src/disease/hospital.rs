//! Hospital and ICU admission under finite capacity.
//!
//! Eligible agents are scanned in table order, ICU first. An ICU admission takes an ICU bed and
//! reserves a hospital bed; a hospital admission takes a hospital bed. An agent who needs a bed
//! when none is left dies.
use log::warn;

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::disease::DiseaseStep;
use crate::population::{AgentId, Population};
use crate::random::ContextRandomExt;

define_rng!(HospitalRng);

/// Free hospital and ICU beds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthcareCapacity {
    hospital_beds: u32,
    icu_beds: u32,
    hospital_total: u32,
    icu_total: u32,
}

impl HealthcareCapacity {
    #[must_use]
    pub fn new(hospital_beds: u32, icu_beds: u32) -> Self {
        HealthcareCapacity {
            hospital_beds,
            icu_beds,
            hospital_total: hospital_beds,
            icu_total: icu_beds,
        }
    }

    #[must_use]
    pub fn hospital_beds(&self) -> u32 {
        self.hospital_beds
    }

    #[must_use]
    pub fn icu_beds(&self) -> u32 {
        self.icu_beds
    }

    /// Takes a hospital bed if one is free.
    pub fn admit_hospital(&mut self) -> bool {
        if self.hospital_beds == 0 {
            return false;
        }
        self.hospital_beds -= 1;
        true
    }

    /// Takes an ICU bed and the hospital bed it occupies if both are free.
    pub fn admit_icu(&mut self) -> bool {
        if self.icu_beds == 0 || self.hospital_beds == 0 {
            return false;
        }
        self.icu_beds -= 1;
        self.hospital_beds -= 1;
        true
    }

    pub fn release_hospital(&mut self) {
        self.hospital_beds = (self.hospital_beds + 1).min(self.hospital_total);
    }

    /// Frees an ICU bed together with its hospital bed.
    pub fn release_icu(&mut self) {
        self.icu_beds = (self.icu_beds + 1).min(self.icu_total);
        self.release_hospital();
    }
}

define_data_plugin!(
    HealthcareCapacityPlugin,
    HealthcareCapacity,
    HealthcareCapacity::default()
);

pub trait ContextHealthcareExt {
    fn init_healthcare_capacity(&mut self, hospital_beds: u32, icu_beds: u32);

    fn get_healthcare_capacity(&self) -> HealthcareCapacity;

    fn set_healthcare_capacity(&mut self, capacity: HealthcareCapacity);
}

impl ContextHealthcareExt for Context {
    fn init_healthcare_capacity(&mut self, hospital_beds: u32, icu_beds: u32) {
        self.set_healthcare_capacity(HealthcareCapacity::new(hospital_beds, icu_beds));
    }

    fn get_healthcare_capacity(&self) -> HealthcareCapacity {
        self.get_data(HealthcareCapacityPlugin)
            .copied()
            .unwrap_or_default()
    }

    fn set_healthcare_capacity(&mut self, capacity: HealthcareCapacity) {
        *self.get_data_mut(HealthcareCapacityPlugin) = capacity;
    }
}

/// Agents admitted or turned away in one hospitalization pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Admissions {
    pub icu: Vec<AgentId>,
    pub hospital: Vec<AgentId>,
    /// Agents who needed a bed when none was free.
    pub overflow_deaths: Vec<AgentId>,
}

impl DiseaseStep<'_> {
    /// Draws who needs the ICU or a hospital bed and admits them while beds remain.
    pub fn hospitalize(
        &self,
        population: &mut Population,
        capacity: &mut HealthcareCapacity,
    ) -> Admissions {
        let disease = &self.catalogs.disease;
        let mut needs_icu = Vec::new();
        let mut needs_hospital = Vec::new();
        for row in 0..population.len() {
            let state = disease.get(population.disease_state[row]);
            if population.is_dead[row]
                || population.is_hospitalized[row]
                || !state.can_be_hospitalized()
            {
                continue;
            }
            let icu = self.draw(state.icu_probability.sample_probability());
            let hospital = self.draw(state.hospitalization_probability.sample_probability());
            if icu {
                needs_icu.push(row);
            } else if hospital {
                needs_hospital.push(row);
            }
        }

        let mut admissions = Admissions::default();
        for row in needs_icu {
            if capacity.admit_icu() {
                population.is_hospitalized[row] = true;
                population.is_in_icu[row] = true;
                crate::movement::stop_row(population, row);
                admissions.icu.push(population.agent[row]);
            } else {
                self.kill(population, capacity, row);
                admissions.overflow_deaths.push(population.agent[row]);
            }
        }
        for row in needs_hospital {
            if capacity.admit_hospital() {
                population.is_hospitalized[row] = true;
                population.transmission_reduction_factor[row] *= self.alpha;
                crate::movement::stop_row(population, row);
                admissions.hospital.push(population.agent[row]);
            } else {
                self.kill(population, capacity, row);
                admissions.overflow_deaths.push(population.agent[row]);
            }
        }

        if !admissions.overflow_deaths.is_empty() {
            warn!(
                "{} agents died for lack of a bed ({} hospital, {} ICU beds free)",
                admissions.overflow_deaths.len(),
                capacity.hospital_beds(),
                capacity.icu_beds()
            );
        }
        admissions
    }

    fn draw(&self, probability: Option<f64>) -> bool {
        probability.is_some_and(|p| self.context.sample_bool(HospitalRng, p))
    }

    /// Frees the agent's beds and lifts the hospital transmission reduction. A living agent
    /// leaves with a new velocity from its mobility group.
    pub fn discharge(
        &self,
        population: &mut Population,
        capacity: &mut HealthcareCapacity,
        row: usize,
    ) {
        if !population.is_hospitalized[row] {
            return;
        }
        if population.is_in_icu[row] {
            capacity.release_icu();
        } else {
            capacity.release_hospital();
            population.transmission_reduction_factor[row] /= self.alpha;
        }
        population.is_hospitalized[row] = false;
        population.is_in_icu[row] = false;
        if !population.is_dead[row] {
            crate::movement::restart_row(population, row, self.catalogs);
        }
    }
}
