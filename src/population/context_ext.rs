use log::info;

use crate::catalog::ContextCatalogExt;
use crate::context::Context;
use crate::define_data_plugin;
use crate::error::EpiError;
use crate::population::{AgentFrame, Population};

define_data_plugin!(PopulationPlugin, Option<Population>, None);

pub trait ContextPopulationExt {
    /// Builds the population from `frame`. Adherence is rolled from each agent's adherence group
    /// unless the frame provides it.
    fn load_population(&mut self, frame: &AgentFrame) -> Result<(), EpiError>;

    fn get_population(&self) -> Result<&Population, EpiError>;

    /// Replaces the population, typically with a staged copy after a successful phase.
    fn set_population(&mut self, population: Population);

    /// The current population as a frame, for the aggregation and output collaborators.
    fn export_population(&self) -> Result<AgentFrame, EpiError>;
}

impl ContextPopulationExt for Context {
    fn load_population(&mut self, frame: &AgentFrame) -> Result<(), EpiError> {
        let catalogs = self.get_catalogs()?;
        let mut population = Population::from_frame(frame, catalogs)?;

        if !frame.contains("adheres_to_isolation") {
            for row in 0..population.len() {
                population.adheres_to_isolation[row] = catalogs
                    .isolation_adherence
                    .draw_adherence(self, population.isolation_adherence_group[row]);
            }
        }
        if !frame.contains("adheres_to_restriction") {
            for row in 0..population.len() {
                population.adheres_to_restriction[row] = catalogs
                    .restriction_adherence
                    .draw_adherence(self, population.restriction_adherence_group[row]);
            }
        }

        info!("loaded a population of {} agents", population.len());
        self.set_population(population);
        Ok(())
    }

    fn get_population(&self) -> Result<&Population, EpiError> {
        self.get_data(PopulationPlugin)
            .and_then(Option::as_ref)
            .ok_or_else(|| EpiError::EpiError("no population is loaded".to_string()))
    }

    fn set_population(&mut self, population: Population) {
        *self.get_data_mut(PopulationPlugin) = Some(population);
    }

    fn export_population(&self) -> Result<AgentFrame, EpiError> {
        Ok(self.get_population()?.to_frame(self.get_catalogs()?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parameters::test_support::basic_parameters;
    use crate::parameters::AdherenceGroupConfig;
    use crate::distribution::DistributionConfig;
    use crate::population::test_support::frame_at;
    use crate::random::ContextRandomExt;

    #[test]
    fn requires_catalogs() {
        let mut context = Context::new();
        let frame = frame_at(&[(1.0, 1.0)], &["susceptible"]);
        assert!(context.load_population(&frame).is_err());
        assert!(context.get_population().is_err());
    }

    #[test]
    fn rolls_adherence_from_groups() {
        let mut parameters = basic_parameters();
        parameters.isolation_adherence_groups = vec![
            AdherenceGroupConfig {
                name: "never".to_string(),
                adherence_probability: DistributionConfig::constant(0.0),
            },
            AdherenceGroupConfig {
                name: "always".to_string(),
                adherence_probability: DistributionConfig::constant(1.0),
            },
        ];
        let mut context = Context::new();
        context.init_random(parameters.seed);
        context.init_catalogs(&parameters).unwrap();

        let frame = frame_at(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)], &["susceptible"; 3])
            .with_column(
                "isolation_adherence_group",
                crate::population::Column::Text(vec![
                    Some("always".to_string()),
                    Some("never".to_string()),
                    None,
                ]),
            );
        context.load_population(&frame).unwrap();
        let population = context.get_population().unwrap();
        // A null label falls back to the first group, which never adheres.
        assert_eq!(population.adheres_to_isolation, vec![true, false, false]);
        assert_eq!(population.adheres_to_restriction, vec![true, true, true]);

        let exported = context.export_population().unwrap();
        assert_eq!(exported.n_rows(), 3);
    }
}
